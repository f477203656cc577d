//! Local email/password accounts and a single on-disk session.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{BackendContext, Error, Result, ValidationErrors};
use crate::services::outreach::is_valid_email;

pub const EMAIL_FIELD: &str = "email";
pub const PASSWORD_FIELD: &str = "password";
pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub token: String,
    pub signed_in_at: DateTime<Utc>,
}

/// argon2id PHC string. The salt travels inside the hash.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| Error::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn sign_up(db: &Database, email: &str, password: &str) -> Result<AuthUser> {
    let email = normalize_email(email);
    let mut errors = ValidationErrors::new();
    if !is_valid_email(&email) {
        errors.add(EMAIL_FIELD, "Enter a valid email address");
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        errors.add(
            PASSWORD_FIELD,
            format!("Password must be at least {MIN_PASSWORD_CHARS} characters"),
        );
    }
    errors.into_result()?;

    let user = AuthUser {
        id: Uuid::new_v4().to_string(),
        email,
        created_at: Utc::now(),
    };
    let password_hash = hash_password(password)?;
    let inserted = db.conn().execute(
        "INSERT INTO auth_users (id, email, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![user.id, user.email, password_hash, user.created_at],
    );
    match inserted {
        Ok(_) => {
            info!("Signed up {}", user.email);
            Ok(user)
        }
        Err(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Err(Error::Validation(ValidationErrors::single(
                EMAIL_FIELD,
                "An account with this email already exists",
            )))
        }
        Err(e) => Err(Error::Backend {
            context: "Failed to create account".to_string(),
            source: e,
        }),
    }
}

/// Checks the credentials and writes a fresh session to `session_path`.
pub fn sign_in_with_password(
    db: &Database,
    session_path: &Path,
    email: &str,
    password: &str,
) -> Result<Session> {
    let email = normalize_email(email);
    let stored: Option<(String, String)> = db
        .conn()
        .query_row(
            "SELECT id, password_hash FROM auth_users WHERE email = ?1",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .backend("Failed to look up account")?;

    let user_id = match stored {
        Some((id, hash)) if verify_password(password, &hash) => id,
        _ => {
            debug!("Rejected sign-in for {}", email);
            return Err(Error::NotAuthenticated);
        }
    };

    let session = Session {
        user_id,
        email,
        token: Uuid::new_v4().to_string(),
        signed_in_at: Utc::now(),
    };
    if let Some(parent) = session_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(session_path, serde_json::to_vec_pretty(&session)?)?;
    info!("Signed in as {}", session.email);
    Ok(session)
}

/// The signed-in user, or `NotAuthenticated` when the session is missing,
/// unreadable or points at an account that no longer exists.
pub fn current_user(db: &Database, session_path: &Path) -> Result<Session> {
    let raw = match fs::read(session_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::NotAuthenticated),
        Err(e) => return Err(e.into()),
    };
    let session: Session = serde_json::from_slice(&raw).map_err(|_| Error::NotAuthenticated)?;

    let exists = db
        .conn()
        .query_row(
            "SELECT 1 FROM auth_users WHERE id = ?1 AND email = ?2",
            params![session.user_id, session.email],
            |_| Ok(()),
        )
        .optional()
        .backend("Failed to validate session")?
        .is_some();
    if exists {
        Ok(session)
    } else {
        Err(Error::NotAuthenticated)
    }
}

pub fn sign_out(session_path: &Path) -> Result<()> {
    match fs::remove_file(session_path) {
        Ok(()) => {
            info!("Signed out");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
