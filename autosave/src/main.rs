//! Development harness: drives the autosave pipeline from stdin.
//!
//! Each input line is appended to an in-memory editor as a user edit.
//! `:w` forces a manual save. EOF or Ctrl-C flushes pending edits as a
//! focus-out would and exits.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autosave::{
    AutosaveConfig, ClientConfig, ContentSource, HttpScriptApi, MemoryEditor, SaveService,
    ScriptId, ScriptStore, ScriptsController, TracingStatusReporter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autosave=debug,script_autosave=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let autosave_config = AutosaveConfig::from_env()?;
    let client_config = ClientConfig::from_env()?;
    tracing::info!(
        api = %client_config.api_base_url,
        save_delay_ms = autosave_config.save_delay.as_millis() as u64,
        max_changes = autosave_config.max_changes_before_save,
        "script-autosave starting"
    );

    let api = Arc::new(HttpScriptApi::new(&client_config)?);
    let store = Arc::new(ScriptStore::new(api));
    let save_service = SaveService::new(
        autosave_config,
        store.clone(),
        Arc::new(TracingStatusReporter),
    );
    let editor = MemoryEditor::ready();
    let controller = Arc::new(ScriptsController::new(
        store.clone(),
        save_service.clone(),
        Arc::new(editor.clone()),
    ));
    let events = controller.clone().spawn();

    match std::env::var("SCRIPT_ID") {
        Ok(id) => {
            controller.open_script(&ScriptId::new(id)).await?;
        }
        Err(_) => {
            let title = std::env::var("SCRIPT_TITLE").unwrap_or_else(|_| "Untitled".to_string());
            controller.create_script(&title, "").await?;
        }
    }
    save_service.attach(Arc::new(editor.clone()) as Arc<dyn ContentSource>);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == ":w" => {
                        let saved = save_service.handle_manual_save().await;
                        tracing::info!(saved, "Manual save");
                    }
                    Some(line) => editor.append(&format!("{line}\n")),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    save_service.settle().await;
    let flushed = save_service.handle_focus_out().await;
    tracing::info!(
        flushed,
        state = save_service.save_state().as_str(),
        "Flushed pending edits"
    );

    controller.close_script();
    save_service.dispose();
    events.abort();
    Ok(())
}
