use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declares a unit enum stored as the same text label in SQLite and JSON.
macro_rules! label_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

label_enum!(
    /// Free-form provenance label; any value may be set at any time.
    ArtworkStatus {
        Unverified => "unverified",
        PendingVerification => "pending_verification",
        Authenticated => "authenticated",
        NeedsReview => "needs_review",
    }
);

label_enum!(BindingStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
});

label_enum!(VerificationTier {
    Unverified => "unverified",
    ArtistVerified => "artist_verified",
    GalleryVerified => "gallery_verified",
    ThirdPartyVerified => "third_party_verified",
});

label_enum!(UserType {
    Artist => "artist",
    Gallery => "gallery",
    Collector => "collector",
});

label_enum!(DimensionUnit {
    Inches => "in",
    Centimeters => "cm",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: f64,
    pub width: f64,
    pub depth: Option<f64>,
    pub unit: DimensionUnit,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.depth {
            Some(depth) => write!(
                f,
                "{} x {} x {} {}",
                self.height, self.width, depth, self.unit
            ),
            None => write!(f, "{} x {} {}", self.height, self.width, self.unit),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Edition {
    #[default]
    Unique,
    Editioned { number: u32, size: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artwork {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub artist: String,
    pub year: i32,
    pub medium: String,
    pub dimensions: Dimensions,
    pub description: Option<String>,
    pub edition: Edition,
    pub image_url: Option<String>,
    pub status: ArtworkStatus,
    pub is_public: bool,
    pub current_certificate_id: Option<String>,
    pub active_tag_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub artwork_id: String,
    pub certificate_id: String,
    pub qr_code_url: String,
    pub blockchain_hash: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfcTag {
    pub id: String,
    pub artwork_id: String,
    pub nfc_uid: String,
    pub is_bound: bool,
    pub binding_status: BindingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLevel {
    pub id: String,
    pub artwork_id: String,
    pub level: VerificationTier,
    pub verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtworkWithRelations {
    #[serde(flatten)]
    pub artwork: Artwork,
    pub certificates: Vec<Certificate>,
    pub nfc_tags: Vec<NfcTag>,
    pub verification_levels: Vec<VerificationLevel>,
}

impl ArtworkWithRelations {
    pub fn current_certificate(&self) -> Option<&Certificate> {
        let current = self.artwork.current_certificate_id.as_deref()?;
        self.certificates.iter().find(|c| c.id == current)
    }

    pub fn active_tag(&self) -> Option<&NfcTag> {
        let active = self.artwork.active_tag_id.as_deref()?;
        self.nfc_tags.iter().find(|t| t.id == active)
    }

    /// Verification rows are loaded newest first.
    pub fn current_verification(&self) -> Option<&VerificationLevel> {
        self.verification_levels.first()
    }
}

/// Fields accepted when inserting an artwork. `artist` may be empty or an
/// email address, in which case the owner's profile name is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtwork {
    pub title: String,
    pub artist: Option<String>,
    pub year: i32,
    pub medium: String,
    pub dimensions: Dimensions,
    pub description: Option<String>,
    #[serde(default)]
    pub edition: Edition,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtworkPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub year: Option<i32>,
    pub medium: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub description: Option<String>,
    pub edition: Option<Edition>,
    pub image_url: Option<String>,
    pub status: Option<ArtworkStatus>,
    pub is_public: Option<bool>,
}

impl ArtworkPatch {
    pub fn is_empty(&self) -> bool {
        *self == ArtworkPatch::default()
    }
}

/// Certificate fields produced by an issuer before they are attached to an
/// artwork row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateData {
    pub certificate_id: String,
    pub qr_code_url: String,
    pub blockchain_hash: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfcBinding {
    pub nfc_uid: String,
    pub is_bound: bool,
    pub binding_status: BindingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub user_type: UserType,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub handle: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(id: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            email: email.to_string(),
            full_name: None,
            avatar_url: None,
            user_type: UserType::Artist,
            bio: None,
            website: None,
            location: None,
            phone: None,
            handle: None,
            is_public: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub user_type: Option<UserType>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub handle: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub artworks: i64,
    pub certificates: i64,
    pub collections: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_is_the_default_edition() {
        assert_eq!(Edition::default(), Edition::Unique);
        let json = serde_json::to_value(Edition::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "unique" }));
    }

    #[test]
    fn labels_parse_back() {
        assert_eq!("cm".parse::<DimensionUnit>(), Ok(DimensionUnit::Centimeters));
        assert!("feet".parse::<DimensionUnit>().is_err());
    }
}
