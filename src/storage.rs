// Storage Buckets
// Filesystem-backed object buckets, created on first use.
//
// Layout: <root>/<bucket>/<owner id>/<uuid>.<ext>
// Objects are served read-only at /storage/<bucket>/<key>.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::now_rfc3339;
use crate::error::{AppError, AppResult};

/// URL prefix under which bucket contents are served
pub const PUBLIC_PREFIX: &str = "/storage";

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: &'static str,
    pub public: bool,
    pub size_limit: Option<usize>,
}

/// Profile pictures
pub const AVATARS: BucketSpec = BucketSpec {
    name: "avatars",
    public: true,
    size_limit: None,
};

/// Listing photos, 5 MB each
pub const MARKETPLACE: BucketSpec = BucketSpec {
    name: "marketplace",
    public: true,
    size_limit: Some(5 * 1024 * 1024),
};

pub const BUCKETS: [BucketSpec; 2] = [AVATARS, MARKETPLACE];

pub fn bucket_by_name(name: &str) -> Option<BucketSpec> {
    BUCKETS.into_iter().find(|b| b.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub public_url: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct BucketStore {
    root: PathBuf,
}

impl BucketStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BucketStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the bucket record and directory unless they already exist
    pub fn ensure_bucket(&self, conn: &Connection, spec: BucketSpec) -> AppResult<()> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT name FROM storage_buckets WHERE name = ?1",
                params![spec.name],
                |row| row.get(0),
            )
            .optional()?;

        fs::create_dir_all(self.root.join(spec.name))?;

        if existing.is_none() {
            conn.execute(
                "INSERT INTO storage_buckets (name, public, size_limit, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    spec.name,
                    spec.public,
                    spec.size_limit.map(|l| l as i64),
                    now_rfc3339(),
                ],
            )?;
            tracing::info!(bucket = spec.name, "storage bucket created");
        }
        Ok(())
    }

    /// Write an image into a bucket under the owner's folder
    pub fn put_object(
        &self,
        conn: &Connection,
        spec: BucketSpec,
        owner_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<StoredObject> {
        if let Some(limit) = spec.size_limit {
            if bytes.len() > limit {
                return Err(AppError::PayloadTooLarge {
                    bucket: spec.name,
                    size: bytes.len(),
                    limit,
                });
            }
        }
        if bytes.is_empty() {
            return Err(AppError::validation("file", "is empty"));
        }

        let extension = image_extension(file_name)?;
        self.ensure_bucket(conn, spec)?;

        let key = format!("{}/{}.{}", owner_id, uuid::Uuid::new_v4(), extension);
        let path = self.object_path(spec.name, &key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        tracing::debug!(bucket = spec.name, key = %key, size = bytes.len(), "object stored");

        Ok(StoredObject {
            bucket: spec.name.to_string(),
            public_url: public_url(spec.name, &key),
            key,
            size: bytes.len(),
        })
    }

    /// Remove an object; missing objects are not an error
    pub fn remove_object(&self, bucket: &str, key: &str) -> AppResult<bool> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a key inside a bucket, refusing anything that escapes it
    pub fn object_path(&self, bucket: &str, key: &str) -> AppResult<PathBuf> {
        let safe = !key.is_empty()
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != "..")
            && !key.contains('\\');
        if !safe {
            return Err(AppError::validation("key", format!("'{}' is not a valid object key", key)));
        }
        Ok(self.root.join(bucket).join(key))
    }
}

pub fn public_url(bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", PUBLIC_PREFIX, bucket, key)
}

/// Split a public URL back into (bucket, key)
pub fn parse_public_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
    rest.split_once('/')
}

fn image_extension(file_name: &str) -> AppResult<String> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(AppError::validation(
            "file",
            format!("'{}' is not a jpg, png, webp or gif image", file_name),
        ))
    }
}
