//! Autosave service.
//!
//! Turns a stream of content changes into debounced, validated,
//! single-flight writes through the [`ScriptStore`].
//!
//! State machine: `idle -> saving -> {saved | error} -> idle`. Only one
//! save may be in flight; a save requested meanwhile returns `false`
//! immediately instead of queuing. Content that fails to persist stays
//! dirty and is retried by the next debounce cycle, forced save or
//! focus-out flush.
//!
//! Change handling and scheduling run on spawned tokio tasks, so the
//! service must be driven from inside a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;

use shared_types::{SaveState, ScriptId, ScriptRecord, UpdateScriptRequest};

use crate::change_tracker::ChangeTracker;
use crate::config::AutosaveConfig;
use crate::content::{ContentSource, Subscription};
use crate::debounce::Debouncer;
use crate::status::StatusReporter;
use crate::store::{ScriptStore, ScriptStoreError};
use crate::validator;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SaveError {
    #[error("a save is already in flight")]
    AlreadySaving,

    #[error("refusing to save empty content")]
    EmptyContent,

    #[error("content failed screenplay validation ({0})")]
    Invalid(&'static str),

    #[error("no current script to save into")]
    MissingScriptIdentity,

    #[error("no script is bound to the editor")]
    NotBound,

    #[error("editor is bound to script {bound} but the current script is {current}")]
    ScriptMismatch { bound: ScriptId, current: ScriptId },

    #[error("save service has been disposed")]
    Disposed,

    #[error("save task ended before completing: {0}")]
    Interrupted(String),

    #[error(transparent)]
    Persistence(#[from] ScriptStoreError),
}

struct SaveCore {
    save_state: SaveState,
    last_saved_content: String,
    pending_content: String,
    tracker: ChangeTracker,
    bound_script: Option<ScriptId>,
    /// Bumped whenever the baseline is replaced; completions of saves
    /// started under an older generation leave the snapshots alone.
    generation: u64,
    debouncer: Debouncer,
    source: Option<Arc<dyn ContentSource>>,
    subscription: Option<Subscription>,
    disposed: bool,
}

impl SaveCore {
    fn is_dirty(&self) -> bool {
        self.pending_content != self.last_saved_content
    }
}

struct SaveInner {
    config: AutosaveConfig,
    store: Arc<ScriptStore>,
    reporter: Arc<dyn StatusReporter>,
    core: Mutex<SaveCore>,
    /// Signalled whenever an in-flight save completes
    settled: Notify,
}

/// Cloneable handle to one editor's autosave pipeline.
#[derive(Clone)]
pub struct SaveService {
    inner: Arc<SaveInner>,
}

impl SaveService {
    pub fn new(
        config: AutosaveConfig,
        store: Arc<ScriptStore>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let core = SaveCore {
            save_state: SaveState::Idle,
            last_saved_content: String::new(),
            pending_content: String::new(),
            tracker: ChangeTracker::new(config.max_changes_before_save),
            bound_script: None,
            generation: 0,
            debouncer: Debouncer::new(),
            source: None,
            subscription: None,
            disposed: false,
        };
        Self {
            inner: Arc::new(SaveInner {
                config,
                store,
                reporter,
                core: Mutex::new(core),
                settled: Notify::new(),
            }),
        }
    }

    fn core(&self) -> MutexGuard<'_, SaveCore> {
        lock_core(&self.inner)
    }

    fn from_weak(weak: &Weak<SaveInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn report(&self, state: SaveState) {
        self.inner.reporter.set_save_state(state);
    }

    /// Subscribe to `source` so every edit feeds [`Self::handle_content_change`].
    ///
    /// Replaces any previously attached source.
    pub fn attach(&self, source: Arc<dyn ContentSource>) {
        let weak = Arc::downgrade(&self.inner);
        let subscription = source.subscribe(Arc::new(move |content: &str| {
            if let Some(service) = SaveService::from_weak(&weak) {
                service.handle_content_change(content);
            }
        }));

        let previous = {
            let mut core = self.core();
            core.disposed = false;
            core.source = Some(source);
            core.subscription.replace(subscription)
        };
        drop(previous);
    }

    /// Cancel the pending debounce and detach from the content source.
    ///
    /// A save already in flight runs to completion.
    pub fn dispose(&self) {
        let subscription = {
            let mut core = self.core();
            core.disposed = true;
            core.debouncer.clear();
            core.source = None;
            core.subscription.take()
        };
        drop(subscription);
        tracing::debug!("Save service disposed");
    }

    /// Rebase the service on a freshly loaded script.
    ///
    /// Both snapshots become the record's content and the change count,
    /// pending timer and state are reset, so no dirty state leaks between
    /// documents.
    pub fn bind_script(&self, record: &ScriptRecord) {
        let mut core = self.core();
        core.debouncer.clear();
        core.tracker.reset();
        core.last_saved_content = record.content.clone();
        core.pending_content = record.content.clone();
        core.bound_script = record.id.clone();
        core.generation += 1;
        if core.save_state != SaveState::Saving {
            core.save_state = SaveState::Idle;
        }
        tracing::debug!(
            script_id = ?record.id,
            version = record.version_number,
            "Save service bound to script"
        );
    }

    /// Detach from the current script while keeping the content source.
    ///
    /// Pending edits are dropped and nothing is saved until the next
    /// [`Self::bind_script`].
    pub fn unbind(&self) {
        let mut core = self.core();
        core.debouncer.clear();
        core.tracker.reset();
        core.last_saved_content.clear();
        core.pending_content.clear();
        core.bound_script = None;
        core.generation += 1;
        if core.save_state != SaveState::Saving {
            core.save_state = SaveState::Idle;
        }
        tracing::debug!("Save service unbound");
    }

    /// Override the persisted baseline after a load or reload.
    ///
    /// `None` is ignored with a warning.
    pub fn set_last_saved_content(&self, content: Option<&str>) {
        let Some(content) = content else {
            tracing::warn!("Ignoring attempt to set last saved content to nothing");
            return;
        };
        self.core().last_saved_content = content.to_string();
    }

    /// Record an edit and schedule (or force) a save.
    pub fn handle_content_change(&self, content: &str) {
        let force_with = {
            let mut core = self.core();
            if core.disposed {
                return;
            }

            core.pending_content = content.to_string();
            if core.bound_script.is_none() {
                return;
            }
            let count = core.tracker.record_change();

            if !core.is_dirty() {
                return;
            }
            if matches!(core.save_state, SaveState::Saved | SaveState::Error) {
                core.save_state = SaveState::Idle;
            }

            // The timer is always rearmed so a forced save that loses the
            // single-flight race is still followed by a trailing save.
            let weak = Arc::downgrade(&self.inner);
            core.debouncer
                .reschedule(self.inner.config.save_delay, flush_when_idle(weak));

            if core.tracker.should_force_save() {
                tracing::debug!(changes = count, "Change threshold exceeded, forcing save");
                Some(core.pending_content.clone())
            } else {
                None
            }
        };

        if let Some(content) = force_with {
            self.spawn_save(content);
        }
    }

    /// Save whatever the content source currently holds, if it changed.
    pub async fn handle_manual_save(&self) -> bool {
        let (content, dirty) = {
            let core = self.core();
            if core.disposed {
                tracing::debug!("Manual save ignored, save service disposed");
                return false;
            }
            let content = match core.source.as_ref() {
                Some(source) => source.content(),
                None => core.pending_content.clone(),
            };
            let dirty = content != core.last_saved_content;
            (content, dirty)
        };

        if !dirty {
            return true;
        }
        self.save(&content).await
    }

    /// Flush pending edits immediately when the editor loses focus.
    pub async fn handle_focus_out(&self) -> bool {
        let content = {
            let mut core = self.core();
            if core.disposed {
                tracing::debug!("Focus-out flush ignored, save service disposed");
                return false;
            }
            if !core.is_dirty() {
                return true;
            }
            core.debouncer.clear();
            core.pending_content.clone()
        };
        self.save(&content).await
    }

    /// Persist `content`. Never fails loudly: every failure is logged,
    /// reflected in the save state where appropriate, and returned as `false`.
    pub async fn save(&self, content: &str) -> bool {
        match self.try_save(content).await {
            Ok(_) => true,
            Err(SaveError::AlreadySaving) => {
                tracing::debug!("Save skipped, another save is in flight");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Save failed");
                false
            }
        }
    }

    /// Persist `content`, returning the confirmed record or why it failed.
    pub async fn try_save(&self, content: &str) -> Result<ScriptRecord, SaveError> {
        let (id, request, generation) = self.begin_save(content)?;
        self.report(SaveState::Saving);
        tracing::debug!(
            script_id = %id,
            base_version = request.version_number,
            bytes = content.len(),
            "Saving script"
        );

        // The write runs on its own task: dropping this future must not
        // leave the single-flight gate closed.
        let service = self.clone();
        let content = content.to_string();
        let write = tokio::spawn(async move {
            service
                .complete_save(id, request, generation, content)
                .await
        });

        match write.await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.abandon_save();
                Err(SaveError::Interrupted(e.to_string()))
            }
        }
    }

    /// Run the pre-dispatch checks and enter `saving`.
    fn begin_save(&self, content: &str) -> Result<(ScriptId, UpdateScriptRequest, u64), SaveError> {
        let mut core = self.core();
        if core.disposed {
            return Err(SaveError::Disposed);
        }
        if core.save_state == SaveState::Saving {
            return Err(SaveError::AlreadySaving);
        }
        if content.is_empty() {
            return Err(SaveError::EmptyContent);
        }

        let kind = validator::classify(content);
        if !kind.is_valid() {
            core.save_state = SaveState::Error;
            drop(core);
            self.report(SaveState::Error);
            return Err(SaveError::Invalid(kind.as_str()));
        }

        let record = self
            .inner
            .store
            .current_script()
            .ok_or(SaveError::MissingScriptIdentity)?;
        let id = record.id.clone().ok_or(SaveError::MissingScriptIdentity)?;
        match core.bound_script.as_ref() {
            None => return Err(SaveError::NotBound),
            Some(bound) if *bound != id => {
                return Err(SaveError::ScriptMismatch {
                    bound: bound.clone(),
                    current: id,
                })
            }
            Some(_) => {}
        }

        let request = UpdateScriptRequest {
            content: content.to_string(),
            title: record.display_title().to_string(),
            version_number: record.version_number,
        };
        core.save_state = SaveState::Saving;
        Ok((id, request, core.generation))
    }

    async fn complete_save(
        &self,
        id: ScriptId,
        request: UpdateScriptRequest,
        generation: u64,
        content: String,
    ) -> Result<ScriptRecord, SaveError> {
        let result = self.inner.store.update_script(&id, request).await;

        let (outcome, trailing) = {
            let mut core = self.core();
            match result {
                Ok(record) => {
                    if core.generation == generation {
                        core.last_saved_content = content;
                        core.tracker.reset();
                    }
                    core.save_state = SaveState::Saved;
                    // Edits that arrived while the write was in flight may
                    // have had their timer fire into the single-flight gate.
                    let trailing = !core.disposed
                        && core.bound_script.is_some()
                        && core.is_dirty()
                        && !core.debouncer.is_pending();
                    (Ok(record), trailing)
                }
                Err(e) => {
                    core.save_state = SaveState::Error;
                    (Err(SaveError::Persistence(e)), false)
                }
            }
        };

        self.inner.settled.notify_waiters();

        match &outcome {
            Ok(record) => {
                self.report(SaveState::Saved);
                tracing::info!(
                    script_id = %id,
                    version = record.version_number,
                    "Script saved"
                );
            }
            Err(_) => self.report(SaveState::Error),
        }

        if trailing {
            let weak = Arc::downgrade(&self.inner);
            self.core()
                .debouncer
                .reschedule(self.inner.config.save_delay, flush_when_idle(weak));
        }

        outcome
    }

    /// Release the gate after the write task died without finishing.
    fn abandon_save(&self) {
        let was_saving = {
            let mut core = self.core();
            let was_saving = core.save_state == SaveState::Saving;
            if was_saving {
                core.save_state = SaveState::Error;
            }
            was_saving
        };
        if was_saving {
            tracing::warn!("Save task ended without completing");
            self.inner.settled.notify_waiters();
            self.report(SaveState::Error);
        }
    }

    /// Wait until no save is in flight.
    pub async fn settle(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if !self.is_saving() {
                return;
            }
            notified.await;
        }
    }

    fn spawn_save(&self, content: String) {
        let service = self.clone();
        tokio::spawn(async move {
            service.save(&content).await;
        });
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.inner.config
    }

    pub fn save_state(&self) -> SaveState {
        self.core().save_state
    }

    pub fn is_saving(&self) -> bool {
        self.save_state() == SaveState::Saving
    }

    pub fn change_count(&self) -> u32 {
        self.core().tracker.count()
    }

    pub fn last_saved_content(&self) -> String {
        self.core().last_saved_content.clone()
    }

    pub fn pending_content(&self) -> String {
        self.core().pending_content.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.core().is_dirty()
    }

    pub fn bound_script(&self) -> Option<ScriptId> {
        self.core().bound_script.clone()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.core().debouncer.is_pending()
    }
}

fn lock_core(inner: &SaveInner) -> MutexGuard<'_, SaveCore> {
    inner.core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Debounce expiry: save the latest pending content if it is still dirty.
///
/// The save runs on its own task so that rearming the timer never cancels
/// a write that has already been dispatched.
async fn flush_when_idle(weak: Weak<SaveInner>) {
    let Some(service) = SaveService::from_weak(&weak) else {
        return;
    };
    let content = {
        let core = service.core();
        if core.disposed || !core.is_dirty() {
            return;
        }
        core.pending_content.clone()
    };
    service.spawn_save(content);
}

impl std::fmt::Debug for SaveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core();
        f.debug_struct("SaveService")
            .field("save_state", &core.save_state)
            .field("bound_script", &core.bound_script)
            .field("changes", &core.tracker.count())
            .field("dirty", &core.is_dirty())
            .finish()
    }
}
