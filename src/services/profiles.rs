use chrono::Utc;
use rusqlite::{params, ErrorCode, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::repo::{self, PROFILE_COLUMNS};
use crate::database::Database;
use crate::error::{BackendContext, Error, Result, ValidationErrors};
use crate::ingest::ImageFile;
use crate::models::{ProfilePatch, UserProfile, UserStats};
use crate::storage::{self, ObjectStorage, AVATAR_BUCKET};

pub const HANDLE_FIELD: &str = "handle";

pub struct ProfileService<'a> {
    db: &'a Database,
    storage: &'a dyn ObjectStorage,
}

impl<'a> ProfileService<'a> {
    pub fn new(db: &'a Database, storage: &'a dyn ObjectStorage) -> Self {
        Self { db, storage }
    }

    pub fn get_user_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id],
                repo::profile_from_row,
            )
            .optional()
            .backend("Failed to fetch profile")
    }

    /// Returns the caller's profile, creating a default one on first access.
    pub fn get_or_create_profile(&self, id: &str, email: &str) -> Result<UserProfile> {
        if let Some(profile) = self.get_user_profile(id)? {
            return Ok(profile);
        }
        info!("Creating profile for {}", id);
        self.upsert_user_profile(&UserProfile::new(id, email))
    }

    pub fn find_by_handle(&self, handle: &str) -> Result<Option<UserProfile>> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE handle = ?1"),
                params![handle.to_ascii_lowercase()],
                repo::profile_from_row,
            )
            .optional()
            .backend("Failed to fetch profile")
    }

    pub fn upsert_user_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        if let Some(handle) = &profile.handle {
            validate_handle(handle)?;
        }
        let mut stored = profile.clone();
        stored.handle = profile.handle.as_ref().map(|h| h.to_ascii_lowercase());
        stored.updated_at = Utc::now();

        self.db
            .conn()
            .execute(
                "INSERT INTO profiles (id, email, full_name, avatar_url, user_type, bio, website,
                     location, phone, handle, is_public, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                     email = excluded.email,
                     full_name = excluded.full_name,
                     avatar_url = excluded.avatar_url,
                     user_type = excluded.user_type,
                     bio = excluded.bio,
                     website = excluded.website,
                     location = excluded.location,
                     phone = excluded.phone,
                     handle = excluded.handle,
                     is_public = excluded.is_public,
                     updated_at = excluded.updated_at",
                params![
                    stored.id,
                    stored.email,
                    stored.full_name,
                    stored.avatar_url,
                    stored.user_type,
                    stored.bio,
                    stored.website,
                    stored.location,
                    stored.phone,
                    stored.handle,
                    stored.is_public,
                    stored.created_at,
                    stored.updated_at,
                ],
            )
            .map_err(handle_conflict)?;

        self.get_user_profile(&stored.id)?
            .ok_or(Error::NotFoundOrForbidden)
    }

    pub fn update_user_profile(&self, id: &str, patch: ProfilePatch) -> Result<UserProfile> {
        let mut profile = self.get_user_profile(id)?.ok_or(Error::NotFoundOrForbidden)?;

        if let Some(full_name) = patch.full_name {
            profile.full_name = non_empty(full_name);
        }
        if let Some(avatar_url) = patch.avatar_url {
            profile.avatar_url = non_empty(avatar_url);
        }
        if let Some(user_type) = patch.user_type {
            profile.user_type = user_type;
        }
        if let Some(bio) = patch.bio {
            profile.bio = non_empty(bio);
        }
        if let Some(website) = patch.website {
            profile.website = non_empty(website);
        }
        if let Some(location) = patch.location {
            profile.location = non_empty(location);
        }
        if let Some(phone) = patch.phone {
            profile.phone = non_empty(phone);
        }
        if let Some(handle) = patch.handle {
            profile.handle = non_empty(handle);
        }
        if let Some(is_public) = patch.is_public {
            profile.is_public = is_public;
        }
        self.upsert_user_profile(&profile)
    }

    /// Deletes the profile row and, best effort, its stored avatar.
    pub fn delete_user_profile(&self, id: &str) -> Result<()> {
        let profile = self.get_user_profile(id)?.ok_or(Error::NotFoundOrForbidden)?;
        self.db
            .conn()
            .execute("DELETE FROM profiles WHERE id = ?1", params![id])
            .backend("Failed to delete profile")?;
        if let Some(url) = profile.avatar_url {
            self.remove_avatar(id, &url);
        }
        info!("Deleted profile {}", id);
        Ok(())
    }

    pub fn upload_avatar(&self, user_id: &str, image: &ImageFile) -> Result<UserProfile> {
        let mut profile = self
            .get_user_profile(user_id)?
            .ok_or(Error::NotFoundOrForbidden)?;
        let url = storage::upload_avatar(self.storage, user_id, image)?;
        let previous = profile.avatar_url.replace(url.clone());
        let updated = match self.upsert_user_profile(&profile) {
            Ok(updated) => updated,
            Err(e) => {
                self.remove_avatar(user_id, &url);
                return Err(e);
            }
        };
        if let Some(old) = previous.filter(|old| *old != url) {
            self.remove_avatar(user_id, &old);
        }
        Ok(updated)
    }

    fn remove_avatar(&self, user_id: &str, url: &str) {
        if let Err(e) = storage::remove_by_url(self.storage, AVATAR_BUCKET, url) {
            warn!("Could not remove avatar for {}: {}", user_id, e);
        }
    }

    pub fn get_user_stats(&self, user_id: &str) -> Result<UserStats> {
        let conn = self.db.conn();
        let count = |sql: &str| -> Result<i64> {
            conn.query_row(sql, params![user_id], |row| row.get(0))
                .backend("Failed to compute user stats")
        };
        Ok(UserStats {
            artworks: count("SELECT COUNT(*) FROM artworks WHERE user_id = ?1")?,
            certificates: count(
                "SELECT COUNT(*) FROM certificates c JOIN artworks a ON a.id = c.artwork_id
                 WHERE a.user_id = ?1",
            )?,
            collections: count("SELECT COUNT(*) FROM collections WHERE user_id = ?1")?,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Handles are 3 to 30 lowercase letters, digits, `-` or `_`, and must not
/// be mistakable for a profile id.
pub fn validate_handle(handle: &str) -> Result<()> {
    let valid_chars = handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let message = if !(3..=30).contains(&handle.len()) || !valid_chars {
        Some("Handle must be 3-30 letters, digits, '-' or '_'")
    } else if Uuid::parse_str(handle).is_ok() {
        Some("Handle cannot look like an id")
    } else {
        None
    };
    match message {
        Some(message) => Err(Error::Validation(ValidationErrors::single(HANDLE_FIELD, message))),
        None => Ok(()),
    }
}

fn handle_conflict(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::Validation(ValidationErrors::single(HANDLE_FIELD, "Handle is already taken"))
        }
        _ => Error::Backend {
            context: "Failed to save profile".to_string(),
            source: e,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DimensionUnit, Dimensions, NewArtwork, UserType};
    use crate::services::artworks::ArtworkService;
    use crate::services::collections;
    use crate::simulate::certificate::{generate_certificate, CertificateRequest};
    use crate::storage::testing::{png_of_size, RecordingStorage};

    #[test]
    fn upsert_then_fetch_round_trips() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let profiles = ProfileService::new(&db, &storage);

        let mut profile = UserProfile::new("user-1", "gallery@example.com");
        profile.user_type = UserType::Gallery;
        profiles.upsert_user_profile(&profile)?;

        let fetched = profiles.get_user_profile("user-1")?.unwrap();
        assert_eq!(fetched.id, "user-1");
        assert_eq!(fetched.email, "gallery@example.com");
        assert_eq!(fetched.user_type, UserType::Gallery);
        Ok(())
    }

    #[test]
    fn profile_is_created_lazily() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let profiles = ProfileService::new(&db, &storage);

        assert!(profiles.get_user_profile("new")?.is_none());
        let created = profiles.get_or_create_profile("new", "new@example.com")?;
        assert_eq!(created.user_type, UserType::Artist);
        let again = profiles.get_or_create_profile("new", "ignored@example.com")?;
        assert_eq!(again.email, "new@example.com");
        assert_eq!(again.created_at, created.created_at);
        Ok(())
    }

    #[test]
    fn updates_and_handle_rules() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let profiles = ProfileService::new(&db, &storage);
        profiles.get_or_create_profile("a", "a@example.com")?;
        profiles.get_or_create_profile("b", "b@example.com")?;

        let updated = profiles.update_user_profile(
            "a",
            ProfilePatch {
                full_name: Some("Ada".to_string()),
                handle: Some("Ada_Studio".to_string()),
                ..ProfilePatch::default()
            },
        )?;
        assert_eq!(updated.handle.as_deref(), Some("ada_studio"));
        assert_eq!(profiles.find_by_handle("ADA_STUDIO")?.unwrap().id, "a");

        let taken = profiles.update_user_profile(
            "b",
            ProfilePatch {
                handle: Some("ada_studio".to_string()),
                ..ProfilePatch::default()
            },
        );
        assert!(matches!(taken, Err(Error::Validation(ref e)) if e.contains(HANDLE_FIELD)));

        let uuid_like = Uuid::new_v4().to_string();
        assert!(validate_handle(&uuid_like).is_err());
        assert!(validate_handle("no spaces").is_err());

        assert!(matches!(
            profiles.update_user_profile("ghost", ProfilePatch::default()),
            Err(Error::NotFoundOrForbidden)
        ));
        Ok(())
    }

    #[test]
    fn avatar_upload_replaces_previous_object() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let profiles = ProfileService::new(&db, &storage);
        profiles.get_or_create_profile("u", "u@example.com")?;

        let first = profiles.upload_avatar("u", &png_of_size(32))?;
        assert!(first.avatar_url.as_deref().unwrap().contains("/avatars/u/avatar-"));
        let second = profiles.upload_avatar("u", &png_of_size(64))?;
        assert_ne!(first.avatar_url, second.avatar_url);
        assert_eq!(storage.removal_count(), 1);

        profiles.delete_user_profile("u")?;
        assert_eq!(storage.removal_count(), 2);
        assert!(profiles.get_user_profile("u")?.is_none());
        Ok(())
    }

    #[test]
    fn failed_avatar_save_removes_the_new_object() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let profiles = ProfileService::new(&db, &storage);
        profiles.get_or_create_profile("u", "u@example.com")?;
        db.conn()
            .execute_batch(
                "CREATE TRIGGER profiles_locked BEFORE UPDATE ON profiles
                 BEGIN SELECT RAISE(ABORT, 'profiles are locked'); END;",
            )
            .unwrap();

        let err = profiles.upload_avatar("u", &png_of_size(32)).unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));

        let uploaded = storage.uploads.borrow()[0].1.clone();
        assert_eq!(storage.removal_count(), 1);
        assert_eq!(
            storage.removals.borrow()[0],
            (AVATAR_BUCKET.to_string(), vec![uploaded])
        );
        assert!(profiles.get_user_profile("u")?.unwrap().avatar_url.is_none());
        Ok(())
    }

    #[test]
    fn stats_count_related_rows() -> Result<()> {
        let db = Database::open_in_memory()?;
        let storage = RecordingStorage::new();
        let profiles = ProfileService::new(&db, &storage);
        let artworks = ArtworkService::new(&db, &storage);

        let fields = NewArtwork {
            title: "Study".to_string(),
            artist: Some("Ada".to_string()),
            year: 2020,
            medium: "Ink".to_string(),
            dimensions: Dimensions {
                height: 5.0,
                width: 7.0,
                depth: None,
                unit: DimensionUnit::Centimeters,
            },
            description: None,
            edition: Default::default(),
            is_public: true,
        };
        let artwork = artworks.create_artwork("u", fields.clone())?;
        artworks.create_artwork("u", fields.clone())?;
        artworks.create_artwork("other", fields)?;
        let request = CertificateRequest {
            artwork_title: "Study".to_string(),
            artist_name: "Ada".to_string(),
        };
        artworks.create_certificate(
            &artwork.id,
            "u",
            generate_certificate("https://v", &request, Utc::now()),
        )?;
        collections::create_collection(&db, "u", "Works on paper")?;

        let stats = profiles.get_user_stats("u")?;
        assert_eq!(
            stats,
            UserStats {
                artworks: 2,
                certificates: 1,
                collections: 1
            }
        );
        assert_eq!(profiles.get_user_stats("nobody")?, UserStats::default());
        Ok(())
    }
}
