//! Document content sources and editor surfaces.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked with the full document text after every user edit.
pub type ContentHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Holds the in-memory document and notifies subscribers on mutation.
pub trait ContentSource: Send + Sync {
    fn content(&self) -> String;

    fn subscribe(&self, handler: ContentHandler) -> Subscription;
}

/// Editor widget the scripts controller loads documents into.
pub trait EditorSurface: Send + Sync {
    /// True once the widget is attached and can accept content.
    fn is_ready(&self) -> bool;

    /// Replace the whole document. This is not a user edit.
    fn load_content(&self, content: &str);
}

/// Active content subscription; unsubscribes when dropped.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[derive(Default)]
struct EditorInner {
    content: String,
    ready: bool,
    loads: usize,
    next_handler_id: u64,
    handlers: BTreeMap<u64, ContentHandler>,
}

/// In-memory editor implementing both [`ContentSource`] and [`EditorSurface`].
#[derive(Clone, Default)]
pub struct MemoryEditor {
    inner: Arc<Mutex<EditorInner>>,
}

impl MemoryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An editor that is attached and ready to receive documents.
    pub fn ready() -> Self {
        let editor = Self::new();
        editor.set_ready(true);
        editor
    }

    fn lock(&self) -> MutexGuard<'_, EditorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    /// Simulate a user edit: replace content and notify subscribers.
    pub fn set_content(&self, content: impl Into<String>) {
        let content = content.into();
        let handlers: Vec<ContentHandler> = {
            let mut inner = self.lock();
            inner.content = content.clone();
            inner.handlers.values().cloned().collect()
        };
        // Handlers run outside the lock so they may read the editor back.
        for handler in handlers {
            handler(&content);
        }
    }

    /// Simulate typing at the end of the document.
    pub fn append(&self, text: &str) {
        let next = {
            let inner = self.lock();
            format!("{}{}", inner.content, text)
        };
        self.set_content(next);
    }

    /// Number of times a document was loaded through [`EditorSurface`].
    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().handlers.len()
    }
}

impl ContentSource for MemoryEditor {
    fn content(&self) -> String {
        self.lock().content.clone()
    }

    fn subscribe(&self, handler: ContentHandler) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_handler_id;
            inner.next_handler_id += 1;
            inner.handlers.insert(id, handler);
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handlers
                    .remove(&id);
            }
        })
    }
}

impl EditorSurface for MemoryEditor {
    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    fn load_content(&self, content: &str) {
        let mut inner = self.lock();
        inner.content = content.to_string();
        inner.loads += 1;
    }
}

impl fmt::Debug for MemoryEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryEditor")
            .field("content_len", &inner.content.len())
            .field("ready", &inner.ready)
            .field("loads", &inner.loads)
            .field("subscribers", &inner.handlers.len())
            .finish()
    }
}
