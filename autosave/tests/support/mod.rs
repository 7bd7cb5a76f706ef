#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use autosave::{
    AutosaveConfig, ContentSource, MemoryEditor, SaveService, ScriptApi, ScriptApiError,
    ScriptId, ScriptRecord, ScriptStore, WatchStatusReporter,
};
use shared_types::{CreateScriptRequest, UpdateScriptRequest, UpdateScriptResponse};

pub const DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub enum UpdateMode {
    Succeed,
    ReturnNone,
    Fail(ScriptApiError),
}

/// In-memory script API that behaves like the REST backend: every accepted
/// update bumps the version by one.
pub struct MockScriptApi {
    scripts: Mutex<HashMap<ScriptId, ScriptRecord>>,
    updates: Mutex<Vec<(ScriptId, UpdateScriptRequest)>>,
    mode: Mutex<UpdateMode>,
    gate: Option<Semaphore>,
}

impl MockScriptApi {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
            mode: Mutex::new(UpdateMode::Succeed),
            gate: None,
        }
    }

    /// Updates block until [`MockScriptApi::release`] is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn with_script(self, record: ScriptRecord) -> Self {
        if let Some(id) = record.id.clone() {
            self.scripts.lock().unwrap().insert(id, record);
        }
        self
    }

    pub fn set_mode(&self, mode: UpdateMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn updates(&self) -> Vec<(ScriptId, UpdateScriptRequest)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last_update(&self) -> Option<UpdateScriptRequest> {
        self.updates.lock().unwrap().last().map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl ScriptApi for MockScriptApi {
    async fn get_script(&self, id: &ScriptId) -> Result<ScriptRecord, ScriptApiError> {
        self.scripts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ScriptApiError::NotFound(id.clone()))
    }

    async fn update_script(
        &self,
        id: &ScriptId,
        request: &UpdateScriptRequest,
    ) -> Result<Option<UpdateScriptResponse>, ScriptApiError> {
        self.updates
            .lock()
            .unwrap()
            .push((id.clone(), request.clone()));

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let mode = self.mode.lock().unwrap().clone();
        match mode {
            UpdateMode::Succeed => {
                let response = UpdateScriptResponse {
                    id: id.clone(),
                    content: request.content.clone(),
                    version_number: request.version_number + 1,
                    updated_at: None,
                };
                let mut scripts = self.scripts.lock().unwrap();
                let entry = scripts
                    .entry(id.clone())
                    .or_insert_with(|| ScriptRecord::new(id.clone(), "", 0));
                entry.content = response.content.clone();
                entry.version_number = response.version_number;
                Ok(Some(response))
            }
            UpdateMode::ReturnNone => Ok(None),
            UpdateMode::Fail(e) => Err(e),
        }
    }

    async fn create_script(
        &self,
        request: &CreateScriptRequest,
    ) -> Result<ScriptRecord, ScriptApiError> {
        let mut scripts = self.scripts.lock().unwrap();
        let id = ScriptId::from((scripts.len() + 100) as u64);
        let record =
            ScriptRecord::new(id.clone(), request.content.clone(), 1).with_title(&request.title);
        scripts.insert(id, record.clone());
        Ok(record)
    }
}

pub struct Harness {
    pub api: Arc<MockScriptApi>,
    pub store: Arc<ScriptStore>,
    pub reporter: Arc<WatchStatusReporter>,
    pub service: SaveService,
    pub editor: MemoryEditor,
}

pub fn harness_with(api: MockScriptApi, config: AutosaveConfig) -> Harness {
    let api = Arc::new(api);
    let store = Arc::new(ScriptStore::new(api.clone()));
    let reporter = Arc::new(WatchStatusReporter::new());
    let service = SaveService::new(config, store.clone(), reporter.clone());
    Harness {
        api,
        store,
        reporter,
        service,
        editor: MemoryEditor::ready(),
    }
}

/// Harness with script "5" (version 3) selected, bound and attached.
pub fn harness(api: MockScriptApi) -> Harness {
    let h = harness_with(api, AutosaveConfig::default());
    let record = ScriptRecord::new("5", "<action>Opening</action>", 3).with_title("Heat");
    h.store.select_script(record.clone());
    h.editor.set_content(record.content.clone());
    h.service.bind_script(&record);
    h.service
        .attach(Arc::new(h.editor.clone()) as Arc<dyn ContentSource>);
    h
}

pub fn scene(n: usize) -> String {
    format!("<action>Opening</action><dialog>Line {n}</dialog>")
}

/// Let spawned tasks run without reaching the debounce deadline.
pub async fn settle_tasks() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
