use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::database::schema::SCHEMA;
use crate::error::{BackendContext, Result};
use crate::models::{
    Artwork, ArtworkWithRelations, Certificate, Collection, Dimensions, Edition, NfcTag,
    UserProfile, VerificationLevel,
};

pub const ARTWORK_COLUMNS: &str = "id, user_id, title, artist, year, medium, height, width, depth, \
     unit, description, edition_type, edition_number, edition_size, image_url, status, is_public, \
     current_certificate_id, active_tag_id, created_at, updated_at";

pub const PROFILE_COLUMNS: &str = "id, email, full_name, avatar_url, user_type, bio, website, \
     location, phone, handle, is_public, created_at, updated_at";

/// Owns the SQLite connection that stands in for the hosted row store.
/// Services borrow it explicitly; nothing in the crate holds a global handle.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening database at {}", path.display());
        let conn = Connection::open(path).backend("Failed to open database")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().backend("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .backend("Failed to initialize schema")?;
        debug!("Schema ready");
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Starts a transaction through a shared borrow so services can stay `&self`.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        self.conn
            .unchecked_transaction()
            .backend("Failed to begin transaction")
    }
}

pub fn artwork_from_row(row: &Row) -> rusqlite::Result<Artwork> {
    let edition_type: String = row.get("edition_type")?;
    let edition = match edition_type.as_str() {
        "editioned" => Edition::Editioned {
            number: row.get::<_, Option<u32>>("edition_number")?.unwrap_or(1),
            size: row.get::<_, Option<u32>>("edition_size")?.unwrap_or(1),
        },
        _ => Edition::Unique,
    };

    Ok(Artwork {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        artist: row.get("artist")?,
        year: row.get("year")?,
        medium: row.get("medium")?,
        dimensions: Dimensions {
            height: row.get("height")?,
            width: row.get("width")?,
            depth: row.get("depth")?,
            unit: row.get("unit")?,
        },
        description: row.get("description")?,
        edition,
        image_url: row.get("image_url")?,
        status: row.get("status")?,
        is_public: row.get("is_public")?,
        current_certificate_id: row.get("current_certificate_id")?,
        active_tag_id: row.get("active_tag_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn edition_columns(edition: &Edition) -> (&'static str, Option<u32>, Option<u32>) {
    match *edition {
        Edition::Unique => ("unique", None, None),
        Edition::Editioned { number, size } => ("editioned", Some(number), Some(size)),
    }
}

pub fn insert_artwork(conn: &Connection, artwork: &Artwork) -> rusqlite::Result<()> {
    let (edition_type, edition_number, edition_size) = edition_columns(&artwork.edition);
    conn.execute(
        "INSERT INTO artworks (id, user_id, title, artist, year, medium, height, width, depth,
             unit, description, edition_type, edition_number, edition_size, image_url, status,
             is_public, current_certificate_id, active_tag_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
             ?18, ?19, ?20, ?21)",
        params![
            artwork.id,
            artwork.user_id,
            artwork.title,
            artwork.artist,
            artwork.year,
            artwork.medium,
            artwork.dimensions.height,
            artwork.dimensions.width,
            artwork.dimensions.depth,
            artwork.dimensions.unit,
            artwork.description,
            edition_type,
            edition_number,
            edition_size,
            artwork.image_url,
            artwork.status,
            artwork.is_public,
            artwork.current_certificate_id,
            artwork.active_tag_id,
            artwork.created_at,
            artwork.updated_at,
        ],
    )?;
    Ok(())
}

/// Writes every mutable column of an already loaded artwork back to its row.
pub fn save_artwork(conn: &Connection, artwork: &Artwork) -> rusqlite::Result<usize> {
    let (edition_type, edition_number, edition_size) = edition_columns(&artwork.edition);
    conn.execute(
        "UPDATE artworks SET title = ?1, artist = ?2, year = ?3, medium = ?4, height = ?5,
             width = ?6, depth = ?7, unit = ?8, description = ?9, edition_type = ?10,
             edition_number = ?11, edition_size = ?12, image_url = ?13, status = ?14,
             is_public = ?15, updated_at = ?16
         WHERE id = ?17 AND user_id = ?18",
        params![
            artwork.title,
            artwork.artist,
            artwork.year,
            artwork.medium,
            artwork.dimensions.height,
            artwork.dimensions.width,
            artwork.dimensions.depth,
            artwork.dimensions.unit,
            artwork.description,
            edition_type,
            edition_number,
            edition_size,
            artwork.image_url,
            artwork.status,
            artwork.is_public,
            artwork.updated_at,
            artwork.id,
            artwork.user_id,
        ],
    )
}

pub fn find_owned_artwork(
    conn: &Connection,
    id: &str,
    owner_id: &str,
) -> rusqlite::Result<Option<Artwork>> {
    conn.query_row(
        &format!("SELECT {ARTWORK_COLUMNS} FROM artworks WHERE id = ?1 AND user_id = ?2"),
        params![id, owner_id],
        artwork_from_row,
    )
    .optional()
}

pub fn owns_artwork(conn: &Connection, id: &str, owner_id: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM artworks WHERE id = ?1 AND user_id = ?2",
            params![id, owner_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn certificate_from_row(row: &Row) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: row.get("id")?,
        artwork_id: row.get("artwork_id")?,
        certificate_id: row.get("certificate_id")?,
        qr_code_url: row.get("qr_code_url")?,
        blockchain_hash: row.get("blockchain_hash")?,
        generated_at: row.get("generated_at")?,
    })
}

/// Inserts a certificate and makes it the artwork's current one.
pub fn insert_certificate(conn: &Connection, certificate: &Certificate) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO certificates (id, artwork_id, certificate_id, qr_code_url, blockchain_hash,
             generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            certificate.id,
            certificate.artwork_id,
            certificate.certificate_id,
            certificate.qr_code_url,
            certificate.blockchain_hash,
            certificate.generated_at,
        ],
    )?;
    conn.execute(
        "UPDATE artworks SET current_certificate_id = ?1 WHERE id = ?2",
        params![certificate.id, certificate.artwork_id],
    )?;
    Ok(())
}

pub fn nfc_tag_from_row(row: &Row) -> rusqlite::Result<NfcTag> {
    Ok(NfcTag {
        id: row.get("id")?,
        artwork_id: row.get("artwork_id")?,
        nfc_uid: row.get("nfc_uid")?,
        is_bound: row.get("is_bound")?,
        binding_status: row.get("binding_status")?,
        created_at: row.get("created_at")?,
    })
}

/// Inserts a tag; a bound tag becomes the artwork's active one.
pub fn insert_nfc_tag(conn: &Connection, tag: &NfcTag) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO nfc_tags (id, artwork_id, nfc_uid, is_bound, binding_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tag.id,
            tag.artwork_id,
            tag.nfc_uid,
            tag.is_bound,
            tag.binding_status,
            tag.created_at,
        ],
    )?;
    if tag.is_bound {
        conn.execute(
            "UPDATE artworks SET active_tag_id = ?1 WHERE id = ?2",
            params![tag.id, tag.artwork_id],
        )?;
    }
    Ok(())
}

pub fn verification_from_row(row: &Row) -> rusqlite::Result<VerificationLevel> {
    Ok(VerificationLevel {
        id: row.get("id")?,
        artwork_id: row.get("artwork_id")?,
        level: row.get("level")?,
        verified_by: row.get("verified_by")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert_verification(conn: &Connection, level: &VerificationLevel) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO verification_levels (id, artwork_id, level, verified_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            level.id,
            level.artwork_id,
            level.level,
            level.verified_by,
            level.created_at,
        ],
    )?;
    Ok(())
}

/// Loads the child rows of an artwork. Verification levels come back newest first.
pub fn load_relations(conn: &Connection, artwork: Artwork) -> rusqlite::Result<ArtworkWithRelations> {
    let mut stmt_certificates = conn.prepare_cached(
        "SELECT id, artwork_id, certificate_id, qr_code_url, blockchain_hash, generated_at
         FROM certificates WHERE artwork_id = ?1 ORDER BY generated_at ASC, rowid ASC",
    )?;
    let certificates = stmt_certificates
        .query_map(params![artwork.id], certificate_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt_tags = conn.prepare_cached(
        "SELECT id, artwork_id, nfc_uid, is_bound, binding_status, created_at
         FROM nfc_tags WHERE artwork_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let nfc_tags = stmt_tags
        .query_map(params![artwork.id], nfc_tag_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt_levels = conn.prepare_cached(
        "SELECT id, artwork_id, level, verified_by, created_at
         FROM verification_levels WHERE artwork_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let verification_levels = stmt_levels
        .query_map(params![artwork.id], verification_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ArtworkWithRelations {
        artwork,
        certificates,
        nfc_tags,
        verification_levels,
    })
}

pub fn profile_from_row(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get("id")?,
        email: row.get("email")?,
        full_name: row.get("full_name")?,
        avatar_url: row.get("avatar_url")?,
        user_type: row.get("user_type")?,
        bio: row.get("bio")?,
        website: row.get("website")?,
        location: row.get("location")?,
        phone: row.get("phone")?,
        handle: row.get("handle")?,
        is_public: row.get("is_public")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn collection_from_row(row: &Row) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}
