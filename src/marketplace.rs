// Marketplace
// Seller listings with photos in the marketplace bucket.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    delete_row, enum_at, json_at, new_id, now_rfc3339, record_event, timestamp_at, to_json_text,
    Event, Table,
};
use crate::entities::{ListingFilter, ListingStatus, MarketplaceListing, NewMarketplaceListing};
use crate::error::{AppError, AppResult};
use crate::policy::PolicySet;
use crate::session::Session;
use crate::storage::{parse_public_url, BucketStore, MARKETPLACE};

const COLUMNS: &str = "SELECT id, user_id, title, description, category, price, quantity, unit,
        location, image_urls, status, created_at
     FROM marketplace_listings";

fn map_listing(row: &Row<'_>) -> rusqlite::Result<MarketplaceListing> {
    Ok(MarketplaceListing {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        price: row.get(5)?,
        quantity: row.get(6)?,
        unit: row.get(7)?,
        location: row.get(8)?,
        image_urls: json_at(row, 9)?,
        status: enum_at(row, 10)?,
        created_at: timestamp_at(row, 11)?,
    })
}

fn fetch(conn: &Connection, id: &str) -> AppResult<Option<MarketplaceListing>> {
    let sql = format!("{} WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_listing).optional()?)
}

/// Fetch a listing the session may modify
fn fetch_writable(conn: &Connection, session: &Session, id: &str) -> AppResult<MarketplaceListing> {
    let policies = PolicySet::load(conn)?;
    match fetch(conn, id)? {
        Some(listing) if policies.can_write(session, &listing.user_id) => Ok(listing),
        _ => Err(AppError::not_found("marketplace listing", id)),
    }
}

pub fn create_listing(
    conn: &Connection,
    session: &Session,
    input: &NewMarketplaceListing,
) -> AppResult<MarketplaceListing> {
    if !(session.capabilities().can_sell || session.is_admin()) {
        return Err(AppError::Forbidden {
            required: "seller or farmer role",
        });
    }
    input.validate()?;

    let id = new_id();
    conn.execute(
        "INSERT INTO marketplace_listings (
            id, user_id, title, description, category, price, quantity, unit, location,
            image_urls, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, '[]', ?10, ?11)",
        params![
            id,
            session.user_id,
            input.title.trim(),
            input.description,
            input.category.trim(),
            input.price,
            input.quantity,
            input.unit,
            input.location,
            ListingStatus::Active.as_str(),
            now_rfc3339(),
        ],
    )?;

    tracing::info!(listing_id = %id, seller = %session.user_id, "marketplace listing created");
    fetch(conn, &id)?.ok_or_else(|| AppError::not_found("marketplace listing", id))
}

/// Fetch every visible listing, then filter and sort in memory
pub fn list_listings(
    conn: &Connection,
    session: Option<&Session>,
    filter: &ListingFilter,
) -> AppResult<Vec<MarketplaceListing>> {
    let policies = PolicySet::load(conn)?;
    let scope = policies.read_scope(Table::MarketplaceListings, session);
    let Some(owner) = scope.owner_filter() else {
        return Ok(Vec::new());
    };

    let sql = format!("{} WHERE (?1 IS NULL OR user_id = ?1)", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let listings = stmt
        .query_map(params![owner], map_listing)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(filter.apply(listings))
}

pub fn get_listing(
    conn: &Connection,
    session: Option<&Session>,
    id: &str,
) -> AppResult<MarketplaceListing> {
    let policies = PolicySet::load(conn)?;
    match fetch(conn, id)? {
        Some(l) if policies.can_read(Table::MarketplaceListings, session, &l.user_id) => Ok(l),
        _ => Err(AppError::not_found("marketplace listing", id)),
    }
}

pub fn mark_sold(conn: &Connection, session: &Session, id: &str) -> AppResult<MarketplaceListing> {
    fetch_writable(conn, session, id)?;
    conn.execute(
        "UPDATE marketplace_listings SET status = ?1 WHERE id = ?2",
        params![ListingStatus::Sold.as_str(), id],
    )?;
    fetch(conn, id)?.ok_or_else(|| AppError::not_found("marketplace listing", id))
}

/// Store a photo in the marketplace bucket and append its URL to the listing
pub fn attach_image(
    conn: &Connection,
    store: &BucketStore,
    session: &Session,
    id: &str,
    file_name: &str,
    bytes: &[u8],
) -> AppResult<MarketplaceListing> {
    let mut listing = fetch_writable(conn, session, id)?;

    let object = store.put_object(conn, MARKETPLACE, &listing.user_id, file_name, bytes)?;
    listing.image_urls.push(object.public_url.clone());

    let saved = to_json_text(&listing.image_urls).and_then(|urls| {
        conn.execute(
            "UPDATE marketplace_listings SET image_urls = ?1 WHERE id = ?2",
            params![urls, id],
        )
        .map_err(AppError::from)
    });

    // The stored object must not outlive a failed update
    if let Err(e) = saved {
        if let Err(cleanup) = store.remove_object(MARKETPLACE.name, &object.key) {
            tracing::warn!(error = %cleanup, key = %object.key, "failed to remove orphaned image");
        }
        return Err(e);
    }
    Ok(listing)
}

/// Delete a listing and its photos
pub fn delete_listing(
    conn: &Connection,
    store: &BucketStore,
    session: &Session,
    id: &str,
) -> AppResult<()> {
    let listing = fetch_writable(conn, session, id)?;
    let policies = PolicySet::load(conn)?;

    let removed = delete_row(
        conn,
        Table::MarketplaceListings,
        id,
        policies.write_owner_filter(session),
    )?;
    if removed == 0 {
        return Err(AppError::not_found("marketplace listing", id));
    }

    for url in &listing.image_urls {
        if let Some((bucket, key)) = parse_public_url(url) {
            if let Err(e) = store.remove_object(bucket, key) {
                tracing::warn!(error = %e, url = %url, "failed to remove listing image");
            }
        }
    }

    record_event(
        conn,
        Event::new(
            "deleted",
            "marketplace_listing",
            id,
            serde_json::json!({ "title": listing.title }),
            &session.user_id,
        ),
    );
    Ok(())
}
