use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artist::{artist_display_name, format_artist_name, looks_like_email};
use crate::database::repo::{self, ARTWORK_COLUMNS, PROFILE_COLUMNS};
use crate::database::Database;
use crate::error::{BackendContext, Error, Result};
use crate::models::{
    Artwork, ArtworkPatch, ArtworkStatus, ArtworkWithRelations, Certificate, CertificateData,
    NewArtwork, NfcBinding, NfcTag, VerificationLevel, VerificationTier,
};
use crate::storage::{self, ObjectStorage, ARTWORK_BUCKET};

/// Ownership-scoped access to artworks and their child rows. Every query
/// carries the caller's id; rows owned by someone else look absent.
pub struct ArtworkService<'a> {
    db: &'a Database,
    storage: &'a dyn ObjectStorage,
}

impl<'a> ArtworkService<'a> {
    pub fn new(db: &'a Database, storage: &'a dyn ObjectStorage) -> Self {
        Self { db, storage }
    }

    /// All of the owner's artworks with child rows, newest first.
    pub fn list_artworks(&self, owner_id: &str) -> Result<Vec<ArtworkWithRelations>> {
        self.query_artworks(
            &format!(
                "SELECT {ARTWORK_COLUMNS} FROM artworks WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            owner_id,
        )
        .backend("Failed to fetch artworks")
    }

    /// Artworks visible on the owner's public profile.
    pub fn list_public_artworks(&self, owner_id: &str) -> Result<Vec<ArtworkWithRelations>> {
        self.query_artworks(
            &format!(
                "SELECT {ARTWORK_COLUMNS} FROM artworks WHERE user_id = ?1 AND is_public = 1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            owner_id,
        )
        .backend("Failed to fetch public artworks")
    }

    fn query_artworks(&self, sql: &str, owner_id: &str) -> rusqlite::Result<Vec<ArtworkWithRelations>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(sql)?;
        let artworks = stmt
            .query_map(params![owner_id], repo::artwork_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        artworks
            .into_iter()
            .map(|artwork| repo::load_relations(conn, artwork))
            .collect()
    }

    /// `Ok(None)` when the artwork does not exist or belongs to someone else.
    pub fn get_artwork(&self, id: &str, owner_id: &str) -> Result<Option<ArtworkWithRelations>> {
        let conn = self.db.conn();
        let artwork = repo::find_owned_artwork(conn, id, owner_id).backend("Failed to fetch artwork")?;
        artwork
            .map(|artwork| repo::load_relations(conn, artwork))
            .transpose()
            .backend("Failed to fetch artwork relations")
    }

    pub fn create_artwork(&self, owner_id: &str, fields: NewArtwork) -> Result<Artwork> {
        let artist = resolve_artist(self.db, owner_id, fields.artist.as_deref())?;
        let artwork = build_artwork(owner_id, &Uuid::new_v4().to_string(), fields, artist, None);
        repo::insert_artwork(self.db.conn(), &artwork).backend("Failed to create artwork")?;
        info!("Created artwork {} for {}", artwork.id, owner_id);
        Ok(artwork)
    }

    pub fn update_artwork(&self, id: &str, owner_id: &str, patch: ArtworkPatch) -> Result<Artwork> {
        let conn = self.db.conn();
        let mut artwork = repo::find_owned_artwork(conn, id, owner_id)
            .backend("Failed to fetch artwork")?
            .ok_or(Error::NotFoundOrForbidden)?;

        if let Some(title) = patch.title {
            artwork.title = title;
        }
        if let Some(artist) = patch.artist {
            artwork.artist = artist;
        }
        if let Some(year) = patch.year {
            artwork.year = year;
        }
        if let Some(medium) = patch.medium {
            artwork.medium = medium;
        }
        if let Some(dimensions) = patch.dimensions {
            artwork.dimensions = dimensions;
        }
        if let Some(description) = patch.description {
            artwork.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(edition) = patch.edition {
            artwork.edition = edition;
        }
        if let Some(image_url) = patch.image_url {
            artwork.image_url = Some(image_url).filter(|u| !u.is_empty());
        }
        if let Some(status) = patch.status {
            artwork.status = status;
        }
        if let Some(is_public) = patch.is_public {
            artwork.is_public = is_public;
        }
        artwork.updated_at = Utc::now();

        let changed = repo::save_artwork(conn, &artwork).backend("Failed to update artwork")?;
        if changed == 0 {
            return Err(Error::NotFoundOrForbidden);
        }
        Ok(artwork)
    }

    /// Deletes the row (child rows cascade) and then tries to remove the
    /// stored image. A storage failure is logged, never returned.
    pub fn delete_artwork(&self, id: &str, owner_id: &str) -> Result<()> {
        let conn = self.db.conn();
        let image_url: Option<String> = conn
            .query_row(
                "SELECT image_url FROM artworks WHERE id = ?1 AND user_id = ?2",
                params![id, owner_id],
                |row| row.get(0),
            )
            .optional()
            .backend("Failed to fetch artwork")?
            .ok_or(Error::NotFoundOrForbidden)?;

        conn.execute(
            "DELETE FROM artworks WHERE id = ?1 AND user_id = ?2",
            params![id, owner_id],
        )
        .backend("Failed to delete artwork")?;
        info!("Deleted artwork {}", id);

        if let Some(url) = image_url {
            if let Err(e) = storage::remove_by_url(self.storage, ARTWORK_BUCKET, &url) {
                warn!("Artwork {} deleted but its image could not be removed: {}", id, e);
            }
        }
        Ok(())
    }

    pub fn create_certificate(
        &self,
        artwork_id: &str,
        owner_id: &str,
        data: CertificateData,
    ) -> Result<Certificate> {
        let tx = self.db.transaction()?;
        ensure_owned(&tx, artwork_id, owner_id)?;
        let certificate = build_certificate(artwork_id, data);
        repo::insert_certificate(&tx, &certificate).backend("Failed to create certificate")?;
        tx.commit().backend("Failed to commit certificate")?;
        info!("Certificate {} attached to {}", certificate.certificate_id, artwork_id);
        Ok(certificate)
    }

    pub fn create_nfc_tag(&self, artwork_id: &str, owner_id: &str, binding: NfcBinding) -> Result<NfcTag> {
        let tx = self.db.transaction()?;
        ensure_owned(&tx, artwork_id, owner_id)?;
        let tag = build_nfc_tag(artwork_id, binding);
        repo::insert_nfc_tag(&tx, &tag).backend("Failed to create NFC tag")?;
        tx.commit().backend("Failed to commit NFC tag")?;
        info!("NFC tag {} recorded for {}", tag.nfc_uid, artwork_id);
        Ok(tag)
    }

    pub fn update_verification_level(
        &self,
        artwork_id: &str,
        owner_id: &str,
        level: VerificationTier,
        verified_by: Option<&str>,
    ) -> Result<VerificationLevel> {
        let conn = self.db.conn();
        ensure_owned(conn, artwork_id, owner_id)?;
        let row = VerificationLevel {
            id: Uuid::new_v4().to_string(),
            artwork_id: artwork_id.to_string(),
            level,
            verified_by: verified_by.map(str::to_string),
            created_at: Utc::now(),
        };
        repo::insert_verification(conn, &row).backend("Failed to update verification level")?;
        Ok(row)
    }

    /// The certificate the artwork's pointer names, if any.
    pub fn current_certificate(&self, artwork_id: &str, owner_id: &str) -> Result<Option<Certificate>> {
        self.db
            .conn()
            .query_row(
                "SELECT c.id, c.artwork_id, c.certificate_id, c.qr_code_url, c.blockchain_hash,
                        c.generated_at
                 FROM artworks a JOIN certificates c ON c.id = a.current_certificate_id
                 WHERE a.id = ?1 AND a.user_id = ?2",
                params![artwork_id, owner_id],
                repo::certificate_from_row,
            )
            .optional()
            .backend("Failed to fetch current certificate")
    }

    pub fn active_tag(&self, artwork_id: &str, owner_id: &str) -> Result<Option<NfcTag>> {
        self.db
            .conn()
            .query_row(
                "SELECT t.id, t.artwork_id, t.nfc_uid, t.is_bound, t.binding_status, t.created_at
                 FROM artworks a JOIN nfc_tags t ON t.id = a.active_tag_id
                 WHERE a.id = ?1 AND a.user_id = ?2",
                params![artwork_id, owner_id],
                repo::nfc_tag_from_row,
            )
            .optional()
            .backend("Failed to fetch active NFC tag")
    }
}

fn ensure_owned(conn: &rusqlite::Connection, artwork_id: &str, owner_id: &str) -> Result<()> {
    if repo::owns_artwork(conn, artwork_id, owner_id).backend("Failed to verify artwork ownership")? {
        Ok(())
    } else {
        Err(Error::NotFoundOrForbidden)
    }
}

/// Picks the stored artist name. A typed name is kept as is; an empty value
/// or an email address falls back to the owner's profile.
pub fn resolve_artist(db: &Database, owner_id: &str, provided: Option<&str>) -> Result<String> {
    let provided = provided.map(str::trim).unwrap_or_default();
    if !provided.is_empty() && !looks_like_email(provided) {
        return Ok(provided.to_string());
    }

    let profile = db
        .conn()
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            params![owner_id],
            repo::profile_from_row,
        )
        .optional()
        .backend("Failed to fetch profile")?;

    Ok(match profile {
        Some(profile) => artist_display_name(profile.full_name.as_deref(), Some(&profile.email)),
        None => format_artist_name(provided),
    })
}

pub fn build_artwork(
    owner_id: &str,
    id: &str,
    fields: NewArtwork,
    artist: String,
    image_url: Option<String>,
) -> Artwork {
    let now = Utc::now();
    Artwork {
        id: id.to_string(),
        user_id: owner_id.to_string(),
        title: fields.title,
        artist,
        year: fields.year,
        medium: fields.medium,
        dimensions: fields.dimensions,
        description: fields.description,
        edition: fields.edition,
        image_url,
        status: ArtworkStatus::Unverified,
        is_public: fields.is_public,
        current_certificate_id: None,
        active_tag_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn build_certificate(artwork_id: &str, data: CertificateData) -> Certificate {
    Certificate {
        id: Uuid::new_v4().to_string(),
        artwork_id: artwork_id.to_string(),
        certificate_id: data.certificate_id,
        qr_code_url: data.qr_code_url,
        blockchain_hash: data.blockchain_hash,
        generated_at: data.generated_at,
    }
}

pub fn build_nfc_tag(artwork_id: &str, binding: NfcBinding) -> NfcTag {
    NfcTag {
        id: Uuid::new_v4().to_string(),
        artwork_id: artwork_id.to_string(),
        nfc_uid: binding.nfc_uid,
        is_bound: binding.is_bound,
        binding_status: binding.binding_status,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BindingStatus, DimensionUnit, Dimensions, Edition, UserProfile};
    use crate::services::profiles::ProfileService;
    use crate::simulate::certificate::{generate_certificate, CertificateRequest};
    use crate::storage::testing::RecordingStorage;

    fn seascape() -> NewArtwork {
        NewArtwork {
            title: "Seascape".to_string(),
            artist: Some("Jane Smith".to_string()),
            year: 2024,
            medium: "Oil".to_string(),
            dimensions: Dimensions {
                height: 10.0,
                width: 12.0,
                depth: None,
                unit: DimensionUnit::Inches,
            },
            description: None,
            edition: Edition::Unique,
            is_public: true,
        }
    }

    fn certificate_data() -> CertificateData {
        generate_certificate(
            "https://verify.test",
            &CertificateRequest {
                artwork_title: "Seascape".to_string(),
                artist_name: "Jane Smith".to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn created_artworks_start_unverified_and_list_newest_first() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);

        let first = service.create_artwork("owner", seascape())?;
        let mut later = seascape();
        later.title = "Harbour".to_string();
        let second = service.create_artwork("owner", later)?;
        service.create_artwork("someone-else", seascape())?;

        assert_eq!(first.status, ArtworkStatus::Unverified);
        let listed = service.list_artworks("owner")?;
        let ids: Vec<&str> = listed.iter().map(|a| a.artwork.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        Ok(())
    }

    #[test]
    fn artist_falls_back_to_profile_for_email_or_blank() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);

        let mut fields = seascape();
        fields.artist = Some("jane.smith@example.com".to_string());
        assert_eq!(service.create_artwork("no-profile", fields)?.artist, "Jane Smith");

        let profiles = ProfileService::new(&db, &storage);
        let mut profile = UserProfile::new("owner", "owner@example.com");
        profile.full_name = Some("ada lovelace".to_string());
        profiles.upsert_user_profile(&profile)?;

        let mut fields = seascape();
        fields.artist = Some(String::new());
        assert_eq!(service.create_artwork("owner", fields)?.artist, "Ada Lovelace");

        let mut fields = seascape();
        fields.artist = None;
        assert_eq!(service.create_artwork("unknown", fields)?.artist, "Unknown Artist");
        Ok(())
    }

    #[test]
    fn other_owners_see_nothing() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);
        let artwork = service.create_artwork("owner", seascape())?;

        assert!(service.get_artwork(&artwork.id, "intruder")?.is_none());
        assert!(service.get_artwork("missing", "owner")?.is_none());
        assert!(matches!(
            service.update_artwork(&artwork.id, "intruder", ArtworkPatch::default()),
            Err(Error::NotFoundOrForbidden)
        ));
        assert!(matches!(
            service.delete_artwork(&artwork.id, "intruder"),
            Err(Error::NotFoundOrForbidden)
        ));
        assert!(matches!(
            service.create_certificate(&artwork.id, "intruder", certificate_data()),
            Err(Error::NotFoundOrForbidden)
        ));
        assert!(matches!(
            service.update_verification_level(&artwork.id, "intruder", VerificationTier::ArtistVerified, None),
            Err(Error::NotFoundOrForbidden)
        ));
        assert!(service.get_artwork(&artwork.id, "owner")?.is_some());
        Ok(())
    }

    #[test]
    fn partial_update_touches_only_given_fields() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);
        let artwork = service.create_artwork("owner", seascape())?;

        let patch = ArtworkPatch {
            status: Some(ArtworkStatus::NeedsReview),
            is_public: Some(false),
            ..ArtworkPatch::default()
        };
        let updated = service.update_artwork(&artwork.id, "owner", patch)?;
        assert_eq!(updated.status, ArtworkStatus::NeedsReview);
        assert!(!updated.is_public);
        assert_eq!(updated.title, "Seascape");

        let fetched = service.get_artwork(&artwork.id, "owner")?.unwrap();
        assert_eq!(fetched.artwork.status, ArtworkStatus::NeedsReview);
        assert!(service.list_public_artworks("owner")?.is_empty());
        Ok(())
    }

    #[test]
    fn child_rows_set_explicit_pointers() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);
        let artwork = service.create_artwork("owner", seascape())?;

        service.create_certificate(&artwork.id, "owner", certificate_data())?;
        let second = service.create_certificate(&artwork.id, "owner", certificate_data())?;
        let unbound = service.create_nfc_tag(
            &artwork.id,
            "owner",
            NfcBinding {
                nfc_uid: "04:00:00:00:00:00:01".to_string(),
                is_bound: false,
                binding_status: BindingStatus::Failed,
            },
        )?;
        let bound = service.create_nfc_tag(
            &artwork.id,
            "owner",
            NfcBinding {
                nfc_uid: "04:00:00:00:00:00:02".to_string(),
                is_bound: true,
                binding_status: BindingStatus::Success,
            },
        )?;
        service.update_verification_level(&artwork.id, "owner", VerificationTier::ArtistVerified, None)?;
        service.update_verification_level(
            &artwork.id,
            "owner",
            VerificationTier::GalleryVerified,
            Some("Galerie Nord"),
        )?;

        assert_eq!(service.current_certificate(&artwork.id, "owner")?, Some(second.clone()));
        assert_eq!(service.active_tag(&artwork.id, "owner")?, Some(bound.clone()));
        assert_eq!(service.current_certificate(&artwork.id, "intruder")?, None);

        let full = service.get_artwork(&artwork.id, "owner")?.unwrap();
        assert_eq!(full.certificates.len(), 2);
        assert_eq!(full.nfc_tags.len(), 2);
        assert_eq!(full.current_certificate(), Some(&second));
        assert_eq!(full.active_tag(), Some(&bound));
        assert_ne!(full.active_tag(), Some(&unbound));
        assert_eq!(
            full.current_verification().map(|v| v.level),
            Some(VerificationTier::GalleryVerified)
        );
        Ok(())
    }

    #[test]
    fn delete_removes_stored_image_once() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);

        let artwork = service.create_artwork("owner", seascape())?;
        let url = storage.public_url(ARTWORK_BUCKET, &format!("owner/{}-abc.png", artwork.id));
        service.update_artwork(
            &artwork.id,
            "owner",
            ArtworkPatch {
                image_url: Some(url),
                ..ArtworkPatch::default()
            },
        )?;
        service.create_certificate(&artwork.id, "owner", certificate_data())?;

        service.delete_artwork(&artwork.id, "owner")?;
        assert_eq!(storage.removal_count(), 1);
        assert_eq!(
            storage.removals.borrow()[0],
            (
                ARTWORK_BUCKET.to_string(),
                vec![format!("owner/{}-abc.png", artwork.id)]
            )
        );
        assert!(service.get_artwork(&artwork.id, "owner")?.is_none());

        let orphans: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM certificates", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
        Ok(())
    }

    #[test]
    fn delete_removes_images_stored_under_another_base() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);

        let artwork = service.create_artwork("owner", seascape())?;
        service.update_artwork(
            &artwork.id,
            "owner",
            ArtworkPatch {
                image_url: Some("https://cdn.other/artworks/owner/x.png".to_string()),
                ..ArtworkPatch::default()
            },
        )?;

        service.delete_artwork(&artwork.id, "owner")?;
        assert_eq!(storage.removal_count(), 1);
        assert_eq!(
            storage.removals.borrow()[0],
            (ARTWORK_BUCKET.to_string(), vec!["owner/x.png".to_string()])
        );
        Ok(())
    }

    #[test]
    fn delete_without_image_never_touches_storage() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let service = ArtworkService::new(&db, &storage);

        let artwork = service.create_artwork("owner", seascape())?;
        service.delete_artwork(&artwork.id, "owner")?;
        assert_eq!(storage.removal_count(), 0);
        Ok(())
    }

    #[test]
    fn storage_failure_does_not_fail_delete() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        storage.fail_removals.set(true);
        let service = ArtworkService::new(&db, &storage);

        let artwork = service.create_artwork("owner", seascape())?;
        let url = storage.public_url(ARTWORK_BUCKET, "owner/x.png");
        service.update_artwork(
            &artwork.id,
            "owner",
            ArtworkPatch {
                image_url: Some(url),
                ..ArtworkPatch::default()
            },
        )?;

        assert!(service.delete_artwork(&artwork.id, "owner").is_ok());
        assert_eq!(storage.removal_count(), 1);
        assert!(service.get_artwork(&artwork.id, "owner")?.is_none());
        Ok(())
    }
}
