//! Waitlist and survey submissions. These sit beside the registry and only
//! store what they are given.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::database::Database;
use crate::error::{BackendContext, Error, Result, ValidationErrors};

pub const EMAIL_FIELD: &str = "email";
pub const NAME_FIELD: &str = "name";
pub const ROLE_FIELD: &str = "role";
pub const RESPONSES_FIELD: &str = "responses";

pub const WAITLIST_ROLES: &[&str] = &["artist", "gallery", "collector", "other"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveySubmission {
    pub email: String,
    pub responses: Value,
}

/// `local@domain.tld` with no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if email.is_empty() {
        errors.add(EMAIL_FIELD, "Email is required");
    } else if !is_valid_email(email) {
        errors.add(EMAIL_FIELD, "Enter a valid email address");
    }
}

pub fn submit_waitlist(db: &Database, entry: &WaitlistEntry) -> Result<Value> {
    let email = entry.email.trim().to_ascii_lowercase();
    let name = entry.name.trim();
    let role = entry.role.trim().to_ascii_lowercase();

    let mut errors = ValidationErrors::new();
    check_email(&mut errors, &email);
    if name.is_empty() {
        errors.add(NAME_FIELD, "Name is required");
    }
    if !WAITLIST_ROLES.contains(&role.as_str()) {
        errors.add(
            ROLE_FIELD,
            format!("Role must be one of {}", WAITLIST_ROLES.join(", ")),
        );
    }
    errors.into_result()?;

    db.conn()
        .execute(
            "INSERT INTO waitlist_entries (email, name, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![email, name, role, Utc::now()],
        )
        .backend("Failed to store waitlist entry")?;
    let id = db.conn().last_insert_rowid();
    info!("Waitlist entry {} added ({})", id, role);
    Ok(json!({ "success": true, "id": id }))
}

pub fn submit_survey(db: &Database, submission: &SurveySubmission) -> Result<Value> {
    let email = submission.email.trim().to_ascii_lowercase();

    let mut errors = ValidationErrors::new();
    check_email(&mut errors, &email);
    if !submission.responses.is_object() {
        errors.add(RESPONSES_FIELD, "Responses must be a JSON object");
    }
    errors.into_result()?;

    let responses = serde_json::to_string(&submission.responses)?;
    db.conn()
        .execute(
            "INSERT INTO survey_responses (email, responses, created_at) VALUES (?1, ?2, ?3)",
            params![email, responses, Utc::now()],
        )
        .backend("Failed to store survey response")?;
    let id = db.conn().last_insert_rowid();
    info!("Survey response {} stored", id);
    Ok(json!({ "success": true, "id": id }))
}

impl From<ValidationErrors> for Value {
    fn from(errors: ValidationErrors) -> Self {
        json!({ "success": false, "errors": errors })
    }
}

/// Renders a submission result as the JSON body a form handler would return.
pub fn receipt(result: Result<Value>) -> Result<Value> {
    match result {
        Ok(value) => Ok(value),
        Err(Error::Validation(errors)) => Ok(errors.into()),
        Err(e) => Err(e),
    }
}
