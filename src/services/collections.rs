use chrono::Utc;
use rusqlite::params;
use tracing::info;
use uuid::Uuid;

use crate::database::repo;
use crate::database::Database;
use crate::error::{BackendContext, Error, Result, ValidationErrors};
use crate::models::Collection;

pub const NAME_FIELD: &str = "name";

pub fn create_collection(db: &Database, owner_id: &str, name: &str) -> Result<Collection> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation(ValidationErrors::single(
            NAME_FIELD,
            "Collection name is required",
        )));
    }
    let collection = Collection {
        id: Uuid::new_v4().to_string(),
        user_id: owner_id.to_string(),
        name: name.to_string(),
        created_at: Utc::now(),
    };
    db.conn()
        .execute(
            "INSERT INTO collections (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                collection.id,
                collection.user_id,
                collection.name,
                collection.created_at
            ],
        )
        .backend("Failed to create collection")?;
    info!("Created collection '{}' for {}", collection.name, owner_id);
    Ok(collection)
}

/// Lists the owner's collections, oldest first.
pub fn list_collections(db: &Database, owner_id: &str) -> Result<Vec<Collection>> {
    let mut stmt = db
        .conn()
        .prepare(
            "SELECT id, user_id, name, created_at FROM collections
             WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .backend("Failed to prepare collection query")?;
    let rows = stmt
        .query_map(params![owner_id], repo::collection_from_row)
        .backend("Failed to list collections")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .backend("Failed to read collection row")
}
