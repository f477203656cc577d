//! Read-only compositions for the public profile page and the owner's
//! dashboard.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::models::{ArtworkWithRelations, UserProfile, UserStats};
use crate::services::{ArtworkService, ProfileService};
use crate::storage::ObjectStorage;

#[derive(Debug, Clone, Serialize)]
pub struct PublicProfileView {
    pub profile: UserProfile,
    pub stats: UserStats,
    pub artworks: Vec<ArtworkWithRelations>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum ProfileRoute {
    /// The profile was addressed by id but has a handle; use the handle URL.
    Redirect { handle: String },
    Show(PublicProfileView),
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub profile: UserProfile,
    pub stats: UserStats,
    pub artworks: Vec<ArtworkWithRelations>,
}

pub fn is_uuid_like(param: &str) -> bool {
    Uuid::parse_str(param).is_ok()
}

/// Resolves `/profile/{param}`. Ids redirect to the handle when one is set;
/// anything else is looked up as a handle. Private profiles are not found.
pub fn resolve_profile_route(
    db: &Database,
    storage: &dyn ObjectStorage,
    param: &str,
) -> Result<ProfileRoute> {
    let profiles = ProfileService::new(db, storage);
    let param = param.trim();

    let profile = if is_uuid_like(param) {
        profiles.get_user_profile(&param.to_ascii_lowercase())?
    } else {
        profiles.find_by_handle(param)?
    };
    let profile = profile
        .filter(|p| p.is_public)
        .ok_or(Error::NotFoundOrForbidden)?;

    if is_uuid_like(param) {
        if let Some(handle) = &profile.handle {
            debug!("Redirecting profile {} to @{}", profile.id, handle);
            return Ok(ProfileRoute::Redirect {
                handle: handle.clone(),
            });
        }
    }

    let artworks = ArtworkService::new(db, storage).list_public_artworks(&profile.id)?;
    let stats = profiles.get_user_stats(&profile.id)?;
    Ok(ProfileRoute::Show(PublicProfileView {
        profile,
        stats,
        artworks,
    }))
}

/// The signed-in owner's view: profile (created on first visit), stats and
/// every artwork regardless of visibility.
pub fn dashboard(
    db: &Database,
    storage: &dyn ObjectStorage,
    user_id: &str,
    email: &str,
) -> Result<DashboardView> {
    let profiles = ProfileService::new(db, storage);
    let profile = profiles.get_or_create_profile(user_id, email)?;
    let stats = profiles.get_user_stats(user_id)?;
    let artworks = ArtworkService::new(db, storage).list_artworks(user_id)?;
    Ok(DashboardView {
        profile,
        stats,
        artworks,
    })
}
