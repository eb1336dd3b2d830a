// Training resources published by trainers.

use rusqlite::{params, Connection, Row};

use crate::db::{delete_row, enum_at, new_id, now_rfc3339, timestamp_at, Table};
use crate::entities::{NewTrainingResource, TrainingFormat, TrainingResource};
use crate::error::{AppError, AppResult};
use crate::policy::PolicySet;
use crate::session::Session;

const COLUMNS: &str = "SELECT id, user_id, title, description, category, format, url,
        duration_minutes, created_at
     FROM training_resources";

fn map_resource(row: &Row<'_>) -> rusqlite::Result<TrainingResource> {
    Ok(TrainingResource {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        format: enum_at(row, 5)?,
        url: row.get(6)?,
        duration_minutes: row.get(7)?,
        created_at: timestamp_at(row, 8)?,
    })
}

pub fn create_resource(
    conn: &Connection,
    session: &Session,
    input: &NewTrainingResource,
) -> AppResult<TrainingResource> {
    if !(session.capabilities().is_trainer || session.is_admin()) {
        return Err(AppError::Forbidden {
            required: "trainer role",
        });
    }
    input.validate()?;

    let id = new_id();
    conn.execute(
        "INSERT INTO training_resources (
            id, user_id, title, description, category, format, url, duration_minutes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            session.user_id,
            input.title.trim(),
            input.description,
            input.category.trim(),
            input.format.as_str(),
            input.url,
            input.duration_minutes,
            now_rfc3339(),
        ],
    )?;

    let sql = format!("{} WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_resource)?)
}

/// Visible resources, newest first, optionally narrowed by category and format
pub fn list_resources(
    conn: &Connection,
    session: Option<&Session>,
    category: Option<&str>,
    format: Option<TrainingFormat>,
) -> AppResult<Vec<TrainingResource>> {
    let policies = PolicySet::load(conn)?;
    let scope = policies.read_scope(Table::TrainingResources, session);
    let Some(owner) = scope.owner_filter() else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "{} WHERE (?1 IS NULL OR user_id = ?1)
            AND (?2 IS NULL OR category = ?2 COLLATE NOCASE)
            AND (?3 IS NULL OR format = ?3)
         ORDER BY created_at DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let resources = stmt
        .query_map(
            params![owner, category, format.map(|f| f.as_str())],
            map_resource,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(resources)
}

pub fn delete_resource(conn: &Connection, session: &Session, id: &str) -> AppResult<()> {
    let policies = PolicySet::load(conn)?;
    let removed = delete_row(
        conn,
        Table::TrainingResources,
        id,
        policies.write_owner_filter(session),
    )?;
    if removed == 0 {
        return Err(AppError::not_found("training resource", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::test_support::{signed_in, test_conn};

    fn biosecurity(format: TrainingFormat) -> NewTrainingResource {
        NewTrainingResource {
            title: "Farm biosecurity basics".to_string(),
            description: "Footbaths, visitor logs, all-in all-out".to_string(),
            category: "Biosecurity".to_string(),
            format,
            url: "https://training.example/biosecurity".to_string(),
            duration_minutes: Some(45),
        }
    }

    #[test]
    fn test_only_trainers_publish() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let trainer = signed_in(&conn, "trainer", Role::Trainer);

        assert!(create_resource(&conn, &farmer, &biosecurity(TrainingFormat::Video)).is_err());
        let created = create_resource(&conn, &trainer, &biosecurity(TrainingFormat::Video)).unwrap();
        assert_eq!(created.format, TrainingFormat::Video);
    }

    #[test]
    fn test_filters_by_category_and_format() {
        let conn = test_conn();
        let trainer = signed_in(&conn, "trainer", Role::Trainer);
        create_resource(&conn, &trainer, &biosecurity(TrainingFormat::Video)).unwrap();
        create_resource(&conn, &trainer, &biosecurity(TrainingFormat::Article)).unwrap();

        let videos =
            list_resources(&conn, Some(&trainer), Some("biosecurity"), Some(TrainingFormat::Video))
                .unwrap();
        assert_eq!(videos.len(), 1);

        let all = list_resources(&conn, Some(&trainer), None, None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_owner_deletes() {
        let conn = test_conn();
        let trainer = signed_in(&conn, "trainer", Role::Trainer);
        let other = signed_in(&conn, "other", Role::Trainer);
        let r = create_resource(&conn, &trainer, &biosecurity(TrainingFormat::Course)).unwrap();

        assert!(delete_resource(&conn, &other, &r.id).is_err());
        delete_resource(&conn, &trainer, &r.id).unwrap();
    }

    #[test]
    fn test_farmers_see_trainer_resources() {
        let conn = test_conn();
        let trainer = signed_in(&conn, "trainer", Role::Trainer);
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let r = create_resource(&conn, &trainer, &biosecurity(TrainingFormat::Webinar)).unwrap();

        let seen = list_resources(&conn, Some(&farmer), None, None).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, r.id);
        assert!(list_resources(&conn, None, None, None).unwrap().is_empty());

        assert!(delete_resource(&conn, &farmer, &r.id).is_err());
    }
}
