//! Scripts controller integration tests
//!
//! Covers the load-skip protocol end to end: store events, editor reloads
//! and the save service baseline.

mod support;

use std::sync::Arc;
use std::time::Duration;

use autosave::{
    AutosaveConfig, ContentSource, EventOrigin, LoadOutcome, ScriptEvent, ScriptId, ScriptRecord,
    ScriptStoreError, ScriptsController, SkipReason,
};
use support::{harness_with, scene, settle_tasks, Harness, MockScriptApi, DELAY};

fn setup(api: MockScriptApi) -> (Harness, Arc<ScriptsController>) {
    let h = harness_with(api, AutosaveConfig::default());
    let controller = Arc::new(ScriptsController::new(
        h.store.clone(),
        h.service.clone(),
        Arc::new(h.editor.clone()),
    ));
    h.service
        .attach(Arc::new(h.editor.clone()) as Arc<dyn ContentSource>);
    (h, controller)
}

fn stored_script() -> ScriptRecord {
    ScriptRecord::new("5", "<action>Opening</action>", 3).with_title("Heat")
}

fn event(record: ScriptRecord, origin: EventOrigin) -> ScriptEvent {
    ScriptEvent::new(record, origin)
}

#[tokio::test]
async fn test_open_script_loads_editor_and_rebases_save_service() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));

    let outcome = controller.open_script(&ScriptId::new("5")).await.unwrap();

    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(h.editor.load_count(), 1);
    assert_eq!(h.service.last_saved_content(), "<action>Opening</action>");
    assert_eq!(h.service.bound_script(), Some(ScriptId::new("5")));
    assert!(!h.service.is_dirty());

    let tracker = controller.load_tracker();
    assert_eq!(tracker.last_loaded_id(), Some(&ScriptId::new("5")));
    assert_eq!(tracker.last_loaded_version(), Some(3));
}

#[tokio::test]
async fn test_open_missing_script_surfaces_not_found() {
    let (h, controller) = setup(MockScriptApi::new());

    let err = controller
        .open_script(&ScriptId::new("404"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScriptStoreError::Api(ref e) if e.is_not_found()));
    assert_eq!(h.editor.load_count(), 0);
}

#[tokio::test]
async fn test_same_id_and_version_is_skipped() {
    let (h, controller) = setup(MockScriptApi::new());
    let loaded: ScriptRecord =
        serde_json::from_str(r#"{"id": 5, "content": "<action>A</action>", "version_number": 3}"#)
            .unwrap();
    assert_eq!(
        controller.handle_event(&event(loaded, EventOrigin::Selected)),
        LoadOutcome::Loaded
    );

    let same = ScriptRecord::new("5", "<action>A</action>", 3);
    assert_eq!(
        controller.handle_event(&event(same, EventOrigin::Selected)),
        LoadOutcome::Skipped(SkipReason::AlreadyLoaded)
    );

    let newer = ScriptRecord::new("5", "<action>B</action>", 4);
    assert_eq!(
        controller.handle_event(&event(newer, EventOrigin::Selected)),
        LoadOutcome::Loaded
    );
    assert_eq!(h.editor.load_count(), 2);
}

#[tokio::test]
async fn test_reload_happens_when_editor_not_ready() {
    let (h, controller) = setup(MockScriptApi::new());
    controller.handle_event(&event(stored_script(), EventOrigin::Selected));

    h.editor.set_ready(false);
    assert_eq!(
        controller.handle_event(&event(stored_script(), EventOrigin::Selected)),
        LoadOutcome::Loaded
    );
    assert_eq!(h.editor.load_count(), 2);
}

#[tokio::test]
async fn test_pending_record_is_never_loaded() {
    let (h, controller) = setup(MockScriptApi::new());
    let mut optimistic = ScriptRecord::new("77", "<action>Draft</action>", 0);
    optimistic.pending = true;

    assert_eq!(
        controller.handle_event(&event(optimistic, EventOrigin::Selected)),
        LoadOutcome::Skipped(SkipReason::Pending)
    );
    assert_eq!(h.editor.load_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_own_save_echo_does_not_reload_editor() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    let _events = controller.clone().spawn();
    controller.open_script(&ScriptId::new("5")).await.unwrap();

    h.editor.set_content(scene(1));
    tokio::time::sleep(DELAY + Duration::from_millis(10)).await;

    assert_eq!(h.api.update_count(), 1);
    assert_eq!(h.editor.load_count(), 1);
    assert_eq!(controller.load_tracker().last_loaded_version(), Some(4));

    // A later notification for the saved version is a duplicate.
    let saved = h.store.current_script().unwrap();
    assert_eq!(
        controller.handle_event(&event(saved, EventOrigin::Selected)),
        LoadOutcome::Skipped(SkipReason::AlreadyLoaded)
    );
}

#[tokio::test]
async fn test_save_confirmation_for_other_script_is_ignored() {
    let (_h, controller) = setup(MockScriptApi::new());
    controller.handle_event(&event(stored_script(), EventOrigin::Selected));

    let other = ScriptRecord::new("6", "<action>Elsewhere</action>", 9);
    assert_eq!(
        controller.handle_event(&event(other, EventOrigin::LocalSave)),
        LoadOutcome::Skipped(SkipReason::NotDisplayed)
    );
    assert_eq!(controller.load_tracker().last_loaded_version(), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_remote_change_reloads_clean_editor() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    let _events = controller.clone().spawn();
    controller.open_script(&ScriptId::new("5")).await.unwrap();

    let remote = ScriptRecord::new("5", "<action>Rewritten</action>", 8);
    assert!(h.store.apply_remote(remote));
    settle_tasks().await;

    assert_eq!(h.editor.load_count(), 2);
    assert_eq!(h.service.last_saved_content(), "<action>Rewritten</action>");
    assert_eq!(controller.load_tracker().last_loaded_version(), Some(8));
}

#[tokio::test(start_paused = true)]
async fn test_remote_change_keeps_unsaved_local_edits() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    controller.open_script(&ScriptId::new("5")).await.unwrap();
    h.editor.set_content(scene(1));

    let remote = ScriptRecord::new("5", "<action>Rewritten</action>", 8);
    assert_eq!(
        controller.handle_event(&event(remote, EventOrigin::Remote)),
        LoadOutcome::Skipped(SkipReason::UnsavedLocalEdits)
    );
    assert_eq!(h.service.pending_content(), scene(1));
    assert_eq!(h.editor.load_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_scripts_never_saves_previous_edits_into_new_script() {
    let second = ScriptRecord::new("6", "<header>Act Two</header>", 1);
    let (h, controller) = setup(
        MockScriptApi::new()
            .with_script(stored_script())
            .with_script(second),
    );
    controller.open_script(&ScriptId::new("5")).await.unwrap();
    h.editor.set_content(scene(1));

    controller.open_script(&ScriptId::new("6")).await.unwrap();
    tokio::time::sleep(DELAY * 2).await;

    assert_eq!(h.api.update_count(), 0);
    assert_eq!(h.service.bound_script(), Some(ScriptId::new("6")));
    assert_eq!(h.service.change_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_script_becomes_current() {
    let (h, controller) = setup(MockScriptApi::new());

    let outcome = controller.create_script("Pilot", "FADE IN.").await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);

    let current = h.store.current_script().unwrap();
    assert_eq!(current.display_title(), "Pilot");
    assert_eq!(h.service.bound_script(), current.id);
}

#[tokio::test(start_paused = true)]
async fn test_close_script_tears_down() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    controller.open_script(&ScriptId::new("5")).await.unwrap();
    h.editor.set_content(scene(1));

    controller.close_script();
    tokio::time::sleep(DELAY * 2).await;

    assert_eq!(h.api.update_count(), 0);
    assert!(h.store.current_script().is_none());
    assert!(h.service.bound_script().is_none());
    assert_eq!(h.editor.subscriber_count(), 1);
    assert!(controller.load_tracker().last_loaded_id().is_none());

    // Nothing is open, so a flush cannot claim success.
    h.editor.set_content(scene(2));
    assert!(!h.service.handle_focus_out().await);
    assert_eq!(h.api.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reopening_after_close_resumes_autosave() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    controller.open_script(&ScriptId::new("5")).await.unwrap();
    controller.close_script();

    let outcome = controller.open_script(&ScriptId::new("5")).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(h.editor.load_count(), 2);

    h.editor.set_content(scene(1));
    tokio::time::sleep(DELAY + Duration::from_millis(10)).await;

    assert_eq!(h.api.update_count(), 1);
    assert_eq!(h.api.last_update().unwrap().content, scene(1));
    assert_eq!(h.service.last_saved_content(), scene(1));

    h.editor.set_content(scene(2));
    assert!(h.service.handle_focus_out().await);
    assert_eq!(h.api.update_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_open_script_loads_once_with_event_loop_running() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    // Without a ready editor the id/version check cannot suppress reloads.
    h.editor.set_ready(false);
    let _events = controller.clone().spawn();

    let outcome = controller.open_script(&ScriptId::new("5")).await.unwrap();
    settle_tasks().await;

    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(h.editor.load_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replayed_store_event_is_a_duplicate() {
    let (h, controller) = setup(MockScriptApi::new());
    let selected = h.store.select_script(stored_script());

    assert_eq!(controller.handle_event(&selected), LoadOutcome::Loaded);
    h.editor.set_ready(false);
    assert_eq!(
        controller.handle_event(&selected),
        LoadOutcome::Skipped(SkipReason::Duplicate)
    );
    assert_eq!(h.editor.load_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lagged_event_loop_resyncs_to_current_script() {
    let (h, controller) = setup(MockScriptApi::new());
    let _events = controller.clone().spawn();

    // Overflow the event channel before the loop gets to run.
    for version in 1..=70u64 {
        h.store.select_script(ScriptRecord::new(
            "5",
            format!("<action>Draft {version}</action>"),
            version,
        ));
    }
    settle_tasks().await;

    // One load of the latest record; the stale backlog is dropped.
    assert_eq!(h.editor.load_count(), 1);
    assert_eq!(h.editor.content(), "<action>Draft 70</action>");
    assert_eq!(controller.load_tracker().last_loaded_version(), Some(70));
    assert_eq!(h.service.last_saved_content(), "<action>Draft 70</action>");
}

#[tokio::test(start_paused = true)]
async fn test_lagged_resync_keeps_unsaved_edits() {
    let (h, controller) = setup(MockScriptApi::new().with_script(stored_script()));
    controller.open_script(&ScriptId::new("5")).await.unwrap();
    h.editor.set_content(scene(1));
    let _events = controller.clone().spawn();

    for version in 4..=73u64 {
        h.store
            .apply_remote(ScriptRecord::new("5", "<action>Theirs</action>", version));
    }
    settle_tasks().await;

    assert_eq!(h.editor.load_count(), 1);
    assert_eq!(h.editor.content(), scene(1));
    assert_eq!(h.service.pending_content(), scene(1));
}
