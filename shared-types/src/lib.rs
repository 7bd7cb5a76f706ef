//! Shared types between the editor engine and the web front end
//!
//! These types are used by both:
//! - the autosave engine (native Rust)
//! - the screenplay editor UI (TypeScript bindings via ts-rs)
//!
//! Serializable with serde for JSON over HTTP

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use ts_rs::TS;

/// Title used when a script has none at save time.
pub const UNTITLED_SCRIPT_TITLE: &str = "Untitled";

// ============================================================================
// Script Identity
// ============================================================================

/// Script identifier.
///
/// The REST API hands out ids as JSON numbers for some records and strings
/// for others; both deserialize into the same string form so that `5` and
/// `"5"` compare equal.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct ScriptId(pub String);

impl ScriptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScriptId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ScriptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ScriptId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for ScriptId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Uint(u64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(v) => Self(v.to_string()),
            RawId::Uint(v) => Self(v.to_string()),
            RawId::Str(v) => Self(v),
        })
    }
}

// ============================================================================
// Script Records
// ============================================================================

/// Authoritative script record as held by the client.
///
/// `version_number` is assigned by the server on every content-changing
/// write. The client never advances it on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct ScriptRecord {
    pub id: Option<ScriptId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub version_number: u64,
    /// Optimistic record that the server has not confirmed yet
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScriptRecord {
    pub fn new(id: impl Into<ScriptId>, content: impl Into<String>, version_number: u64) -> Self {
        Self {
            id: Some(id.into()),
            title: None,
            content: content.into(),
            version_number,
            pending: false,
            updated_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title to persist, falling back to [`UNTITLED_SCRIPT_TITLE`].
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_SCRIPT_TITLE)
    }

    /// True when `other` names the same script (string-compared ids).
    pub fn same_script(&self, other: &ScriptId) -> bool {
        self.id.as_ref().is_some_and(|id| id == other)
    }
}

/// Body of `PUT /api/scripts/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct UpdateScriptRequest {
    pub content: String,
    pub title: String,
    /// Version the edit was based on
    pub version_number: u64,
}

/// Successful answer to an update; carries the server-assigned version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct UpdateScriptResponse {
    pub id: ScriptId,
    pub content: String,
    pub version_number: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/scripts`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct CreateScriptRequest {
    pub title: String,
    pub content: String,
}

// ============================================================================
// Save State
// ============================================================================

/// Autosave state shown by the editor toolbar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

impl SaveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveState::Idle => "idle",
            SaveState::Saving => "saving",
            SaveState::Saved => "saved",
            SaveState::Error => "error",
        }
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// API Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Machine-readable error body returned by the script API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../bindings/script_types.ts")]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}
