//! Script store - the single authoritative in-memory script record.
//!
//! The store is the only component that mutates the current record, and it
//! does so only from confirmed server responses. Version numbers are always
//! copied from the server, never computed locally.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use shared_types::{CreateScriptRequest, ScriptId, ScriptRecord, UpdateScriptRequest};

use crate::api::{ScriptApi, ScriptApiError};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why the current script changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// A script was loaded, created or selected
    Selected,
    /// The store's own update was confirmed by the server
    LocalSave,
    /// Another client changed the script
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEvent {
    pub record: ScriptRecord,
    pub origin: EventOrigin,
    /// Position in the store's event stream, starting at 1. Zero marks an
    /// event that was not issued by a store.
    pub seq: u64,
}

impl ScriptEvent {
    pub fn new(record: ScriptRecord, origin: EventOrigin) -> Self {
        Self {
            record,
            origin,
            seq: 0,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ScriptStoreError {
    #[error(transparent)]
    Api(#[from] ScriptApiError),

    #[error("server returned no record for script {0}")]
    EmptyResponse(ScriptId),

    #[error("script {0} is not the current script")]
    NotCurrent(ScriptId),

    #[error("script record has no id")]
    MissingId,
}

#[derive(Default)]
struct StoreState {
    current: Option<ScriptRecord>,
    last_seq: u64,
}

pub struct ScriptStore {
    api: Arc<dyn ScriptApi>,
    state: Mutex<StoreState>,
    events: broadcast::Sender<ScriptEvent>,
}

impl ScriptStore {
    pub fn new(api: Arc<dyn ScriptApi>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            state: Mutex::new(StoreState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast a change. Called with the state lock held so that event
    /// order always matches the order of record mutations.
    fn emit(
        &self,
        state: &mut StoreState,
        record: ScriptRecord,
        origin: EventOrigin,
    ) -> ScriptEvent {
        state.last_seq += 1;
        let event = ScriptEvent {
            record,
            origin,
            seq: state.last_seq,
        };
        // No receivers is fine: nobody is displaying the script yet.
        let _ = self.events.send(event.clone());
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScriptEvent> {
        self.events.subscribe()
    }

    pub fn current_script(&self) -> Option<ScriptRecord> {
        self.state().current.clone()
    }

    pub fn current_id(&self) -> Option<ScriptId> {
        self.state().current.as_ref().and_then(|r| r.id.clone())
    }

    /// Fetch a script and make it current. Returns the broadcast event.
    pub async fn load_script(&self, id: &ScriptId) -> Result<ScriptEvent, ScriptStoreError> {
        let record = self.api.get_script(id).await.map_err(|e| {
            if e.is_not_found() {
                tracing::warn!(script_id = %id, "Script no longer exists");
            }
            e
        })?;
        tracing::info!(
            script_id = %id,
            version = record.version_number,
            "Loaded script"
        );
        Ok(self.select_script(record))
    }

    /// Create a script on the server and make it current. Returns the
    /// broadcast event.
    pub async fn create_script(
        &self,
        title: &str,
        content: &str,
    ) -> Result<ScriptEvent, ScriptStoreError> {
        let request = CreateScriptRequest {
            title: title.to_string(),
            content: Self::normalize_content(content),
        };
        let record = self.api.create_script(&request).await?;
        if record.id.is_none() {
            return Err(ScriptStoreError::MissingId);
        }
        Ok(self.select_script(record))
    }

    /// Adopt an already-fetched (or optimistic) record as current.
    pub fn select_script(&self, mut record: ScriptRecord) -> ScriptEvent {
        record.content = Self::normalize_content(&record.content);
        let mut state = self.state();
        state.current = Some(record.clone());
        self.emit(&mut state, record, EventOrigin::Selected)
    }

    /// Forget the current script (editor unloaded).
    pub fn clear(&self) {
        self.state().current = None;
    }

    /// Persist `request` for the current script.
    ///
    /// The request carries the version the edit was based on. On success the
    /// server's content and version number replace the current record's.
    pub async fn update_script(
        &self,
        id: &ScriptId,
        request: UpdateScriptRequest,
    ) -> Result<ScriptRecord, ScriptStoreError> {
        if self.current_id().as_ref() != Some(id) {
            return Err(ScriptStoreError::NotCurrent(id.clone()));
        }

        let response = self
            .api
            .update_script(id, &request)
            .await?
            .ok_or_else(|| ScriptStoreError::EmptyResponse(id.clone()))?;

        let mut state = self.state();
        let updated = match state.current.as_mut() {
            // The user may have switched scripts while the write was in flight.
            Some(current) if current.same_script(id) => {
                current.content = Self::normalize_content(&response.content);
                current.version_number = response.version_number;
                current.title = Some(request.title);
                current.updated_at = response.updated_at;
                current.pending = false;
                current.clone()
            }
            _ => return Err(ScriptStoreError::NotCurrent(id.clone())),
        };

        tracing::debug!(
            script_id = %id,
            version = updated.version_number,
            "Script update confirmed"
        );
        self.emit(&mut state, updated.clone(), EventOrigin::LocalSave);
        Ok(updated)
    }

    /// Merge a record pushed by the server for another client's change.
    ///
    /// Returns true when the current record was replaced.
    pub fn apply_remote(&self, record: ScriptRecord) -> bool {
        let mut state = self.state();
        let replaced = match (state.current.as_mut(), record.id.as_ref()) {
            (Some(current), Some(id))
                if current.same_script(id) && current.version_number != record.version_number =>
            {
                *current = ScriptRecord {
                    content: Self::normalize_content(&record.content),
                    ..record.clone()
                };
                current.clone()
            }
            _ => return false,
        };

        self.emit(&mut state, replaced, EventOrigin::Remote);
        true
    }

    /// Sanitize document text coming from or going to the server.
    pub fn normalize_content(content: &str) -> String {
        content
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\0', "")
    }
}

impl std::fmt::Debug for ScriptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptStore")
            .field("current", &self.current_id())
            .finish()
    }
}
