use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::repo;
use crate::database::Database;
use crate::error::{BackendContext, Result};
use crate::ingest::ImageFile;
use crate::models::{Artwork, Certificate, CertificateData, NewArtwork, NfcBinding, NfcTag};
use crate::services::artworks::{build_artwork, build_certificate, build_nfc_tag, resolve_artist};
use crate::storage::{self, ObjectStorage, ARTWORK_BUCKET};

/// Everything a finished wizard run wants persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub artwork: NewArtwork,
    pub image: Option<ImageFile>,
    pub certificate: Option<CertificateData>,
    pub nfc: Option<NfcBinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub artwork: Artwork,
    pub certificate: Option<Certificate>,
    pub nfc_tag: Option<NfcTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_warning: Option<String>,
}

/// Persists a registration: image upload first, then the artwork and its
/// optional certificate and tag rows in a single transaction.
///
/// A failed upload does not stop the registration; the artwork is saved
/// without an image and the outcome carries the warning. If the row writes
/// fail, the uploaded object is removed again before the error is returned.
pub fn register_artwork(
    db: &Database,
    storage: &dyn ObjectStorage,
    owner_id: &str,
    request: RegistrationRequest,
    max_image_bytes: usize,
) -> Result<RegistrationOutcome> {
    let artwork_id = Uuid::new_v4().to_string();

    let mut image_warning = None;
    let image_url = match &request.image {
        Some(image) => {
            storage::validate_artwork_image(image, max_image_bytes)?;
            match storage::upload_artwork_image(storage, owner_id, &artwork_id, image, max_image_bytes) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Image upload failed, registering without an image: {}", e);
                    image_warning = Some(format!("Image upload failed: {e}"));
                    None
                }
            }
        }
        None => None,
    };

    match persist(db, owner_id, &artwork_id, request, image_url.clone()) {
        Ok((artwork, certificate, nfc_tag)) => {
            info!(
                "Registered '{}' ({}), certificate: {}, tag: {}",
                artwork.title,
                artwork.id,
                certificate.is_some(),
                nfc_tag.is_some()
            );
            Ok(RegistrationOutcome {
                artwork,
                certificate,
                nfc_tag,
                image_warning,
            })
        }
        Err(e) => {
            if let Some(url) = image_url {
                if let Err(cleanup) = storage::remove_by_url(storage, ARTWORK_BUCKET, &url) {
                    warn!("Could not remove orphaned image {}: {}", url, cleanup);
                }
            }
            Err(e)
        }
    }
}

fn persist(
    db: &Database,
    owner_id: &str,
    artwork_id: &str,
    request: RegistrationRequest,
    image_url: Option<String>,
) -> Result<(Artwork, Option<Certificate>, Option<NfcTag>)> {
    let artist = resolve_artist(db, owner_id, request.artwork.artist.as_deref())?;
    let mut artwork = build_artwork(owner_id, artwork_id, request.artwork, artist, image_url);

    let tx = db.transaction()?;
    repo::insert_artwork(&tx, &artwork).backend("Failed to create artwork")?;

    let certificate = match request.certificate {
        Some(data) => {
            let certificate = build_certificate(artwork_id, data);
            repo::insert_certificate(&tx, &certificate).backend("Failed to create certificate")?;
            artwork.current_certificate_id = Some(certificate.id.clone());
            Some(certificate)
        }
        None => None,
    };

    let nfc_tag = match request.nfc {
        Some(binding) => {
            let tag = build_nfc_tag(artwork_id, binding);
            repo::insert_nfc_tag(&tx, &tag).backend("Failed to create NFC tag")?;
            if tag.is_bound {
                artwork.active_tag_id = Some(tag.id.clone());
            }
            Some(tag)
        }
        None => None,
    };

    tx.commit().backend("Failed to commit registration")?;
    Ok((artwork, certificate, nfc_tag))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::error::Error;
    use crate::models::{BindingStatus, DimensionUnit, Dimensions, Edition};
    use crate::services::artworks::ArtworkService;
    use crate::simulate::certificate::{generate_certificate, CertificateRequest};
    use crate::storage::testing::{png_of_size, RecordingStorage};

    const MAX: usize = 10 * 1024 * 1024;

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

    fn certificate() -> CertificateData {
        let request = CertificateRequest {
            artwork_title: "Seascape".to_string(),
            artist_name: "Jane Smith".to_string(),
        };
        generate_certificate("https://verify.test", &request, Utc::now())
    }

    fn binding() -> NfcBinding {
        NfcBinding {
            nfc_uid: "04:A1:B2:C3:D4:E5:F6".to_string(),
            is_bound: true,
            binding_status: BindingStatus::Success,
        }
    }

    fn child_counts(db: &Database, artwork_id: &str) -> (i64, i64) {
        let count = |table: &str| -> i64 {
            db.conn()
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE artwork_id = ?1"),
                    [artwork_id],
                    |row| row.get(0),
                )
                .unwrap()
        };
        (count("certificates"), count("nfc_tags"))
    }

    #[test]
    fn skipped_steps_create_no_child_rows() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let request = RegistrationRequest {
            artwork: seascape(),
            image: Some(png_of_size(2 * 1024 * 1024)),
            certificate: None,
            nfc: None,
        };

        let outcome = register_artwork(&db, &storage, "owner", request, MAX)?;
        assert!(outcome.certificate.is_none());
        assert!(outcome.nfc_tag.is_none());
        assert!(outcome.image_warning.is_none());
        assert_eq!(child_counts(&db, &outcome.artwork.id), (0, 0));

        let image_url = outcome.artwork.image_url.as_deref().unwrap();
        assert!(image_url.starts_with(&format!(
            "https://files.test/artworks/owner/{}-",
            outcome.artwork.id
        )));
        assert!(image_url.ends_with(".png"));
        Ok(())
    }

    #[test]
    fn full_registration_sets_pointers() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let request = RegistrationRequest {
            artwork: seascape(),
            image: Some(png_of_size(1024)),
            certificate: Some(certificate()),
            nfc: Some(binding()),
        };

        let outcome = register_artwork(&db, &storage, "owner", request, MAX)?;
        let certificate = outcome.certificate.clone().unwrap();
        let tag = outcome.nfc_tag.clone().unwrap();
        assert_eq!(outcome.artwork.current_certificate_id.as_deref(), Some(certificate.id.as_str()));
        assert_eq!(outcome.artwork.active_tag_id.as_deref(), Some(tag.id.as_str()));
        assert_eq!(child_counts(&db, &outcome.artwork.id), (1, 1));

        let service = ArtworkService::new(&db, &storage);
        let stored = service.get_artwork(&outcome.artwork.id, "owner")?.unwrap();
        assert_eq!(stored.current_certificate().map(|c| c.id.clone()), Some(certificate.id));
        assert_eq!(stored.active_tag().map(|t| t.id.clone()), Some(tag.id));
        assert_eq!(stored.artwork.artist, "Jane Smith");
        Ok(())
    }

    #[test]
    fn upload_failure_is_not_fatal() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        storage.fail_uploads.set(true);
        let request = RegistrationRequest {
            artwork: seascape(),
            image: Some(png_of_size(1024)),
            certificate: None,
            nfc: None,
        };

        let outcome = register_artwork(&db, &storage, "owner", request, MAX)?;
        assert!(outcome.artwork.image_url.is_none());
        assert!(outcome.image_warning.unwrap().contains("bucket unavailable"));
        let service = ArtworkService::new(&db, &storage);
        assert!(service.get_artwork(&outcome.artwork.id, "owner")?.is_some());
        Ok(())
    }

    #[test]
    fn invalid_image_is_rejected_before_any_write() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let request = RegistrationRequest {
            artwork: seascape(),
            image: Some(ImageFile::new("notes.txt", Some("text/plain"), b"hello".to_vec())),
            certificate: None,
            nfc: None,
        };

        let result = register_artwork(&db, &storage, "owner", request, MAX);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(storage.uploads.borrow().is_empty());
        let service = ArtworkService::new(&db, &storage);
        assert!(service.list_artworks("owner")?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_transaction_rolls_back_and_removes_image() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let shared = certificate();
        let request = RegistrationRequest {
            artwork: seascape(),
            image: Some(png_of_size(1024)),
            certificate: Some(shared.clone()),
            nfc: None,
        };
        register_artwork(&db, &storage, "owner", request.clone(), MAX)?;

        // Reusing a certificate id violates its uniqueness constraint.
        let result = register_artwork(&db, &storage, "owner", request, MAX);
        assert!(matches!(result, Err(Error::Backend { .. })));

        let service = ArtworkService::new(&db, &storage);
        assert_eq!(service.list_artworks("owner")?.len(), 1);
        assert_eq!(storage.uploads.borrow().len(), 2);
        assert_eq!(storage.removal_count(), 1);
        let (bucket, paths) = storage.removals.borrow()[0].clone();
        assert_eq!(bucket, ARTWORK_BUCKET);
        assert_eq!(paths[0], storage.uploads.borrow()[1].1);
        Ok(())
    }
}
