use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

/// Column separator of the flat user table.
pub const FIELD_SEPARATOR: char = ',';
/// Separator used to flatten the role list into one column.
pub const ROLE_SEPARATOR: char = ':';

fn is_false(b: &bool) -> bool { !*b }

/// A directory account. `username` is the only identity.
///
/// Every field is optional on input and left out of the JSON output when
/// empty, so `{"username":"bob"}` is a complete payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub claim1: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub claim2: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), ..Default::default() }
    }
}

fn check_plain(field: &str, value: &str) -> Result<(), ModelError> {
    if value.contains(FIELD_SEPARATOR) || value.contains('\n') || value.contains('\r') {
        return Err(ModelError::Validation(format!(
            "{field} must not contain '{FIELD_SEPARATOR}' or line breaks"
        )));
    }
    Ok(())
}

/// Reject records that could not be written to and read back from the user table.
pub fn validate_user(user: &User) -> Result<(), ModelError> {
    if user.username.trim().is_empty() {
        return Err(ModelError::Validation("username required".into()));
    }
    check_plain("username", &user.username)?;
    check_plain("password", &user.password)?;
    check_plain("claim1", &user.claim1)?;
    check_plain("claim2", &user.claim2)?;
    for role in &user.roles {
        if role.is_empty() {
            return Err(ModelError::Validation("role names must not be empty".into()));
        }
        check_plain("role", role)?;
        if role.contains(ROLE_SEPARATOR) {
            return Err(ModelError::Validation(format!("role '{role}' must not contain '{ROLE_SEPARATOR}'")));
        }
    }
    Ok(())
}
