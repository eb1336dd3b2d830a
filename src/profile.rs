// Profile management: public profile rows and avatar uploads.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{now_rfc3339, timestamp_at, Table};
use crate::entities::{Profile, ProfileUpdate};
use crate::error::{AppError, AppResult};
use crate::policy::PolicySet;
use crate::session::Session;
use crate::storage::{parse_public_url, BucketStore, AVATARS};

const COLUMNS: &str = "SELECT id, full_name, phone, location, bio, farm_name, avatar_url,
        created_at, updated_at
     FROM profiles";

fn map_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        phone: row.get(2)?,
        location: row.get(3)?,
        bio: row.get(4)?,
        farm_name: row.get(5)?,
        avatar_url: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

fn fetch(conn: &Connection, user_id: &str) -> AppResult<Option<Profile>> {
    let sql = format!("{} WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![user_id], map_profile).optional()?)
}

pub fn get_profile(
    conn: &Connection,
    session: Option<&Session>,
    user_id: &str,
) -> AppResult<Profile> {
    let policies = PolicySet::load(conn)?;
    match fetch(conn, user_id)? {
        Some(p) if policies.can_read(Table::Profiles, session, &p.id) => Ok(p),
        _ => Err(AppError::not_found("profile", user_id)),
    }
}

/// Create or replace the caller's own profile. The avatar is left untouched.
pub fn upsert_profile(
    conn: &Connection,
    session: &Session,
    update: &ProfileUpdate,
) -> AppResult<Profile> {
    update.validate()?;
    let now = now_rfc3339();

    conn.execute(
        "INSERT INTO profiles (id, full_name, phone, location, bio, farm_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name,
            phone = excluded.phone,
            location = excluded.location,
            bio = excluded.bio,
            farm_name = excluded.farm_name,
            updated_at = excluded.updated_at",
        params![
            session.user_id,
            update.full_name.trim(),
            update.phone,
            update.location,
            update.bio,
            update.farm_name,
            now,
        ],
    )?;

    fetch(conn, &session.user_id)?.ok_or_else(|| AppError::not_found("profile", &session.user_id))
}

/// Store a new avatar and point the profile at it; the previous file is removed
pub fn upload_avatar(
    conn: &Connection,
    store: &BucketStore,
    session: &Session,
    file_name: &str,
    bytes: &[u8],
) -> AppResult<Profile> {
    let profile = fetch(conn, &session.user_id)?
        .ok_or_else(|| AppError::not_found("profile", &session.user_id))?;

    let object = store.put_object(conn, AVATARS, &session.user_id, file_name, bytes)?;
    if let Err(e) = conn.execute(
        "UPDATE profiles SET avatar_url = ?1, updated_at = ?2 WHERE id = ?3",
        params![object.public_url, now_rfc3339(), session.user_id],
    ) {
        if let Err(cleanup) = store.remove_object(AVATARS.name, &object.key) {
            tracing::warn!(error = %cleanup, key = %object.key, "failed to remove orphaned avatar");
        }
        return Err(e.into());
    }

    if let Some((bucket, key)) = profile.avatar_url.as_deref().and_then(parse_public_url) {
        if let Err(e) = store.remove_object(bucket, key) {
            tracing::warn!(error = %e, "failed to remove previous avatar");
        }
    }

    fetch(conn, &session.user_id)?.ok_or_else(|| AppError::not_found("profile", &session.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::test_support::{signed_in, test_conn};

    fn update(name: &str) -> ProfileUpdate {
        ProfileUpdate {
            full_name: name.to_string(),
            phone: Some("+91 98765 43210".to_string()),
            location: Some("Namakkal, Tamil Nadu".to_string()),
            bio: None,
            farm_name: Some("Green Valley Poultry".to_string()),
        }
    }

    #[test]
    fn test_upsert_then_update() {
        let conn = test_conn();
        let me = signed_in(&conn, "me", Role::Farmer);

        let created = upsert_profile(&conn, &me, &update("Kumar")).unwrap();
        let updated = upsert_profile(&conn, &me, &update("Kumar S")).unwrap();

        assert_eq!(updated.full_name, "Kumar S");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[test]
    fn test_profiles_are_public() {
        let conn = test_conn();
        let me = signed_in(&conn, "me", Role::Farmer);
        upsert_profile(&conn, &me, &update("Kumar")).unwrap();

        assert_eq!(get_profile(&conn, None, &me.user_id).unwrap().full_name, "Kumar");
        assert!(get_profile(&conn, None, "nobody").is_err());
    }

    #[test]
    fn test_avatar_replaces_previous_file() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        let store = BucketStore::new(dir.path());
        let me = signed_in(&conn, "me", Role::Farmer);

        assert!(upload_avatar(&conn, &store, &me, "me.png", b"png").is_err(), "needs a profile first");

        upsert_profile(&conn, &me, &update("Kumar")).unwrap();
        let first = upload_avatar(&conn, &store, &me, "me.png", b"one").unwrap();
        let first_url = first.avatar_url.clone().unwrap();
        let second = upload_avatar(&conn, &store, &me, "me.webp", b"two").unwrap();

        assert_ne!(second.avatar_url.as_deref(), Some(first_url.as_str()));
        let (bucket, key) = parse_public_url(&first_url).unwrap();
        assert!(!store.object_path(bucket, key).unwrap().exists());
    }

    #[test]
    fn test_failed_avatar_update_keeps_previous_file() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        let store = BucketStore::new(dir.path());
        let me = signed_in(&conn, "me", Role::Farmer);
        upsert_profile(&conn, &me, &update("Kumar")).unwrap();
        let first = upload_avatar(&conn, &store, &me, "me.png", b"one").unwrap();

        conn.execute_batch(
            "CREATE TRIGGER refuse_avatar BEFORE UPDATE OF avatar_url ON profiles
             BEGIN SELECT RAISE(ABORT, 'write refused'); END;",
        )
        .unwrap();

        assert!(matches!(
            upload_avatar(&conn, &store, &me, "me.webp", b"two"),
            Err(AppError::Database(_))
        ));

        let entries = std::fs::read_dir(dir.path().join(AVATARS.name).join(&me.user_id))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
        let kept = get_profile(&conn, None, &me.user_id).unwrap();
        assert_eq!(kept.avatar_url, first.avatar_url);
        let (bucket, key) = parse_public_url(first.avatar_url.as_deref().unwrap()).unwrap();
        assert!(store.object_path(bucket, key).unwrap().exists());
    }

    #[test]
    fn test_invalid_phone_rejected() {
        let conn = test_conn();
        let me = signed_in(&conn, "me", Role::Farmer);
        let mut bad = update("Kumar");
        bad.phone = Some("123".to_string());
        assert!(matches!(
            upsert_profile(&conn, &me, &bad),
            Err(AppError::Validation { field: "phone", .. })
        ));
    }
}
