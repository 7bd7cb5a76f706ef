//! Screenplay editor autosave engine
//!
//! Content change -> validation -> debounce -> persistence -> version
//! reconciliation. The [`SaveService`] owns the autosave state machine, the
//! [`ScriptStore`] owns the authoritative script record, and the
//! [`ScriptsController`] decides when a store change should reload the
//! editor.

pub mod api;
pub mod change_tracker;
pub mod config;
pub mod content;
pub mod controller;
pub mod debounce;
pub mod save_service;
pub mod status;
pub mod store;
pub mod validator;

pub use api::{HttpScriptApi, ScriptApi, ScriptApiError};
pub use config::{AutosaveConfig, ClientConfig};
pub use content::{ContentSource, EditorSurface, MemoryEditor, Subscription};
pub use controller::{LoadOutcome, LoadTracker, ScriptsController, SkipReason};
pub use save_service::{SaveError, SaveService};
pub use status::{StatusReporter, TracingStatusReporter, WatchStatusReporter};
pub use store::{EventOrigin, ScriptEvent, ScriptStore, ScriptStoreError};

pub use shared_types::{SaveState, ScriptId, ScriptRecord};
