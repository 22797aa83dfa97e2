pub(crate) mod edit_buffer;
pub(crate) mod note_sync;

use crate::api::{ApiClient, RestStore};
use crate::config::EnvConfig;
use crate::models::Note;
use crate::runtime::{BrowserRuntime, Runtime};
use crate::store::{MemoryStore, NoteStore, StoreError};
use edit_buffer::EditBuffer;
use leptos::prelude::*;
use note_sync::{NoteSyncController, ObserverId};
use std::rc::Rc;

#[derive(Clone, Copy)]
pub(crate) struct AppState {
    pub config: StoredValue<EnvConfig>,

    /// Mirrors of the sync controller, in display order.
    pub notes: RwSignal<Vec<Note>>,
    pub current_note_id: RwSignal<Option<String>>,
    /// The selected note was just created and has not arrived yet; the editor is locked.
    pub awaiting: RwSignal<bool>,
    /// False until the first snapshot arrived.
    pub loaded: RwSignal<bool>,

    /// Text shown in the editor; owned by the edit buffer.
    pub editor_text: RwSignal<String>,
    pub preview: RwSignal<bool>,

    pub creating: RwSignal<bool>,
    pub error: RwSignal<Option<String>>,
}

impl AppState {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            config: StoredValue::new(config),
            notes: RwSignal::new(vec![]),
            current_note_id: RwSignal::new(None),
            awaiting: RwSignal::new(false),
            loaded: RwSignal::new(false),
            editor_text: RwSignal::new(String::new()),
            preview: RwSignal::new(false),
            creating: RwSignal::new(false),
            error: RwSignal::new(None),
        }
    }

    pub fn report(&self, e: &StoreError) {
        self.error.set(Some(e.to_string()));
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(EnvConfig::new())
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);

/// Sync controller plus edit buffer for one mounted notes page.
#[derive(Clone)]
pub(crate) struct NoteSession {
    pub controller: NoteSyncController,
    pub buffer: EditBuffer,
    observer: ObserverId,
}

impl NoteSession {
    /// Pick the backend from the config and start syncing.
    pub fn connect(state: AppState) -> Self {
        let config = state.config.get_value();
        let runtime: Rc<dyn Runtime> = Rc::new(BrowserRuntime::new());
        let store: Rc<dyn NoteStore> = if config.is_sandbox() {
            tracing::info!("no PROJECT_ID configured; notes are kept in memory");
            Rc::new(MemoryStore::new())
        } else {
            tracing::info!(project = %config.project_id, collection = %config.collection, "syncing notes");
            Rc::new(RestStore::new(
                Rc::new(ApiClient::new(&config)),
                runtime.clone(),
                config.poll_ms,
            ))
        };
        Self::new(state, store, runtime)
    }

    pub fn new(state: AppState, store: Rc<dyn NoteStore>, runtime: Rc<dyn Runtime>) -> Self {
        let config = state.config.get_value();
        let controller = NoteSyncController::new(store, runtime.clone());

        let observer = controller.observe(move |snap| {
            state.notes.set(snap.notes.clone());
            state.current_note_id.set(snap.current_note_id.clone());
            state.awaiting.set(snap.awaiting);
            state.loaded.set(snap.loaded);
        });

        let buffer = EditBuffer::new(
            controller.clone(),
            runtime,
            config.debounce_ms,
            config.switch_policy,
        );
        buffer.observe_text(move |text| state.editor_text.set(text.to_string()));
        buffer.set_error_handler(move |e| state.report(&e));
        state.editor_text.set(buffer.text());

        controller.start();
        Self {
            controller,
            buffer,
            observer,
        }
    }

    /// Detach from the page. Writes still in flight no longer reach the signals.
    pub fn shutdown(&self) {
        self.buffer.shutdown();
        self.controller.unobserve(self.observer);
        self.controller.shutdown();
    }
}

/// UI entry points into the session.
#[derive(Clone, Copy)]
pub(crate) struct NoteActions {
    pub select: Callback<String>,
    pub create: Callback<()>,
    pub delete: Callback<String>,
    pub edit: Callback<String>,
}

impl NoteActions {
    pub fn new(state: AppState, session: StoredValue<NoteSession, LocalStorage>) -> Self {
        let select = Callback::new(move |id: String| {
            session.with_value(|s| s.controller.select_note(&id));
        });

        let create = Callback::new(move |_: ()| {
            if state.creating.get_untracked() {
                return;
            }
            let controller = session.with_value(|s| s.controller.clone());
            state.creating.set(true);
            state.error.set(None);
            leptos::task::spawn_local(async move {
                if let Err(e) = controller.create_note().await {
                    state.report(&e);
                }
                state.creating.set(false);
            });
        });

        let delete = Callback::new(move |id: String| {
            let controller = session.with_value(|s| s.controller.clone());
            leptos::task::spawn_local(async move {
                if let Err(e) = controller.delete_note(&id).await {
                    state.report(&e);
                }
            });
        });

        let edit = Callback::new(move |text: String| {
            let accepted = session.with_value(|s| s.buffer.set_text(text.clone()));
            if accepted {
                state.editor_text.set(text);
            } else {
                tracing::debug!("edit ignored, no stored note selected");
            }
        });

        Self {
            select,
            create,
            delete,
            edit,
        }
    }
}
