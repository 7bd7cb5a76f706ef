//! Scripts controller - keeps the editor in step with the script store.
//!
//! Every store event is a candidate reload. Reloading replaces the editor
//! document and its undo history, so redundant reloads are suppressed: the
//! echo of the editor's own save, repeated notifications for a version that
//! is already displayed, and optimistic records the server has not
//! confirmed yet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use shared_types::{ScriptId, ScriptRecord};

use crate::content::EditorSurface;
use crate::save_service::SaveService;
use crate::store::{EventOrigin, ScriptEvent, ScriptStore, ScriptStoreError};

/// Id and version of the document currently shown in the editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadTracker {
    last_loaded_id: Option<ScriptId>,
    last_loaded_version: Option<u64>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when loading `record` would be redundant.
    ///
    /// Pending records are always skipped. Otherwise a load is skipped only
    /// when the editor is ready and both the id (compared as strings) and
    /// the version match what was last loaded.
    pub fn should_skip(&self, record: &ScriptRecord, editor_ready: bool) -> bool {
        if record.pending {
            return true;
        }
        editor_ready
            && record.id.is_some()
            && record.id == self.last_loaded_id
            && Some(record.version_number) == self.last_loaded_version
    }

    pub fn mark_loaded(&mut self, record: &ScriptRecord) {
        self.last_loaded_id = record.id.clone();
        self.last_loaded_version = Some(record.version_number);
    }

    pub fn reset(&mut self) {
        self.last_loaded_id = None;
        self.last_loaded_version = None;
    }

    pub fn last_loaded_id(&self) -> Option<&ScriptId> {
        self.last_loaded_id.as_ref()
    }

    pub fn last_loaded_version(&self) -> Option<u64> {
        self.last_loaded_version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Optimistic record not confirmed by the server
    Pending,
    /// Same id and version as the document already shown
    AlreadyLoaded,
    /// A remote change arrived while local edits are unsaved
    UnsavedLocalEdits,
    /// Save confirmation for a script that is no longer displayed
    NotDisplayed,
    /// Store event this controller has already processed
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The editor's own save was confirmed; only the version was recorded
    Acknowledged,
    Skipped(SkipReason),
}

pub struct ScriptsController {
    store: Arc<ScriptStore>,
    save_service: SaveService,
    editor: Arc<dyn EditorSurface>,
    tracker: Mutex<LoadTracker>,
    /// Highest store event sequence handled so far
    handled_seq: AtomicU64,
}

impl ScriptsController {
    pub fn new(
        store: Arc<ScriptStore>,
        save_service: SaveService,
        editor: Arc<dyn EditorSurface>,
    ) -> Self {
        Self {
            store,
            save_service,
            editor,
            tracker: Mutex::new(LoadTracker::new()),
            handled_seq: AtomicU64::new(0),
        }
    }

    fn tracker(&self) -> MutexGuard<'_, LoadTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load_tracker(&self) -> LoadTracker {
        self.tracker().clone()
    }

    /// Load a script from the server and show it.
    ///
    /// The store also broadcasts the load; whichever of this call and the
    /// [`Self::run`] loop sees the event second skips it as a duplicate.
    pub async fn open_script(&self, id: &ScriptId) -> Result<LoadOutcome, ScriptStoreError> {
        let event = self.store.load_script(id).await?;
        Ok(self.handle_event(&event))
    }

    /// Create a script and show it.
    pub async fn create_script(
        &self,
        title: &str,
        content: &str,
    ) -> Result<LoadOutcome, ScriptStoreError> {
        let event = self.store.create_script(title, content).await?;
        Ok(self.handle_event(&event))
    }

    /// Detach the editor from the current script.
    ///
    /// The save service stays subscribed to the editor so that the next
    /// [`Self::open_script`] resumes autosave.
    pub fn close_script(&self) {
        self.save_service.unbind();
        self.store.clear();
        self.tracker().reset();
    }

    pub fn handle_event(&self, event: &ScriptEvent) -> LoadOutcome {
        let record = &event.record;
        let mut tracker = self.tracker();

        // Sequence zero marks events injected from outside a store.
        if event.seq != 0 && self.handled_seq.fetch_max(event.seq, Ordering::SeqCst) >= event.seq
        {
            return LoadOutcome::Skipped(SkipReason::Duplicate);
        }

        if event.origin == EventOrigin::LocalSave {
            let displayed = record
                .id
                .as_ref()
                .is_some_and(|id| tracker.last_loaded_id() == Some(id));
            if !displayed {
                return LoadOutcome::Skipped(SkipReason::NotDisplayed);
            }
            tracker.mark_loaded(record);
            return LoadOutcome::Acknowledged;
        }

        if record.pending {
            tracing::debug!(script_id = ?record.id, "Skipping reload of pending script");
            return LoadOutcome::Skipped(SkipReason::Pending);
        }
        if tracker.should_skip(record, self.editor.is_ready()) {
            tracing::debug!(
                script_id = ?record.id,
                version = record.version_number,
                "Skipping reload of already loaded version"
            );
            return LoadOutcome::Skipped(SkipReason::AlreadyLoaded);
        }
        if event.origin == EventOrigin::Remote && self.save_service.is_dirty() {
            tracing::warn!(
                script_id = ?record.id,
                version = record.version_number,
                "Remote change arrived with unsaved local edits; keeping local document"
            );
            return LoadOutcome::Skipped(SkipReason::UnsavedLocalEdits);
        }

        self.editor.load_content(&record.content);
        self.save_service.bind_script(record);
        tracker.mark_loaded(record);
        tracing::info!(
            script_id = ?record.id,
            version = record.version_number,
            "Loaded script into editor"
        );
        LoadOutcome::Loaded
    }

    /// Apply store events until the store goes away.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ScriptEvent>) {
        loop {
            let received = events.recv().await;
            match received {
                Ok(event) => {
                    self.handle_event(&event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Script events lagged; resyncing from store");
                    // The backlog is stale once the current record is applied.
                    events = events.resubscribe();
                    if let Some(record) = self.store.current_script() {
                        // Same script as shown: treat like a remote change so
                        // unsaved edits are not overwritten.
                        let displayed = record.id.is_some()
                            && self.tracker().last_loaded_id() == record.id.as_ref();
                        let origin = if displayed {
                            EventOrigin::Remote
                        } else {
                            EventOrigin::Selected
                        };
                        self.handle_event(&ScriptEvent::new(record, origin));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Subscribe to the store and run the event loop on a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let events = self.store.subscribe();
        tokio::spawn(self.run(events))
    }
}
