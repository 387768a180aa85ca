//! Request and response types for the auth API. Responses are parsed and
//! validated at the network boundary; a body that does not match is a
//! [`ProtocolError`], never a half-filled struct. Request payloads carry
//! passwords, so they must never be logged.

use crate::error::{sanitize_message, ProtocolError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Student,
    Parent,
    SchoolStudent,
    SchoolProfessor,
    SchoolAdmin,
    #[serde(other)]
    Other,
}

impl UserType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::SchoolStudent => "school_student",
            Self::SchoolProfessor => "school_professor",
            Self::SchoolAdmin => "school_admin",
            Self::Other => "other",
        }
    }

    /// School accounts are provisioned by their school and skip onboarding.
    #[must_use]
    pub const fn is_school(self) -> bool {
        matches!(
            self,
            Self::SchoolStudent | Self::SchoolProfessor | Self::SchoolAdmin
        )
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            "school_student" => Ok(Self::SchoolStudent),
            "school_professor" | "professor" | "teacher" => Ok(Self::SchoolProfessor),
            "school_admin" => Ok(Self::SchoolAdmin),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

/// Backends hand out either numeric or string identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolRef {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// User record as returned by the API. Only `id` is mandatory; every other
/// field is treated as optional because older records may lack it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub has_onboarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<SchoolRef>,
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub user_type: UserType,
}

#[derive(Serialize)]
pub struct SchoolLoginRequest<'a> {
    pub school_code: &'a str,
    pub identifier: &'a str,
    pub password: &'a str,
    pub user_type: UserType,
}

#[derive(Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
    pub user_type: UserType,
    pub has_onboarded: bool,
}

#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl LoginResponse {
    /// Parses a login body and rejects empty tokens.
    ///
    /// # Errors
    /// Returns `ProtocolError` when the body is not a valid login response.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let response: Self = decode_json(body, "login response")?;
        require_non_empty(&response.access_token, "login response", "access_token")?;
        require_non_empty(&response.refresh_token, "login response", "refresh_token")?;
        Ok(response)
    }
}

#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

impl RefreshResponse {
    /// # Errors
    /// Returns `ProtocolError` when the body has no usable `access_token`.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let response: Self = decode_json(body, "refresh response")?;
        require_non_empty(&response.access_token, "refresh response", "access_token")?;
        Ok(response)
    }
}

/// Error payload: `{"detail": "..."}`; validation errors carry a list of
/// `{"msg": "..."}` objects instead.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// Extracts a user-facing message from an error body, if there is one.
#[must_use]
pub fn error_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.detail? {
        Value::String(message) => sanitize_message(&message),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(Value::as_str))
            .and_then(sanitize_message),
        _ => None,
    }
}

/// Decodes a JSON body into `T`, naming the payload in the error.
///
/// # Errors
/// Returns `ProtocolError::InvalidJson` when the body does not match `T`.
pub fn decode_json<T: DeserializeOwned>(
    body: &[u8],
    context: &'static str,
) -> Result<T, ProtocolError> {
    serde_json::from_slice(body).map_err(|err| ProtocolError::InvalidJson {
        context,
        reason: err.to_string(),
    })
}

fn require_non_empty(
    value: &str,
    context: &'static str,
    field: &'static str,
) -> Result<(), ProtocolError> {
    if value.trim().is_empty() {
        Err(ProtocolError::EmptyField { context, field })
    } else {
        Ok(())
    }
}
