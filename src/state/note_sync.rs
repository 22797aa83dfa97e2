use crate::models::{sort_for_display, Note, NoteData, NotePatch};
use crate::runtime::Runtime;
use crate::store::{NoteStore, Snapshot, StoreError, StoreResult, Subscription};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

pub(crate) type ObserverId = u64;

/// What observers see after every change: notes in display order plus the selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SyncSnapshot {
    pub notes: Vec<Note>,
    pub current_note_id: Option<String>,
    pub current_note: Option<Note>,
    /// The selection is a just-created note the store has not sent back yet.
    pub awaiting: bool,
    /// False until the first snapshot from the store has been applied.
    pub loaded: bool,
}

#[derive(Default)]
struct SyncState {
    /// Latest delivered collection, in store order.
    notes: Vec<Note>,
    current_note_id: Option<String>,
    /// Id returned by a create whose document has not shown up in a snapshot yet.
    awaiting_id: Option<String>,
    loaded: bool,
}

impl SyncState {
    fn sorted(&self) -> Vec<Note> {
        let mut notes = self.notes.clone();
        sort_for_display(&mut notes);
        notes
    }

    fn contains(&self, id: &str) -> bool {
        self.notes.iter().any(|n| n.id == id)
    }

    fn current_note(&self) -> Option<Note> {
        if let Some(id) = &self.current_note_id {
            if let Some(note) = self.notes.iter().find(|n| &n.id == id) {
                return Some(note.clone());
            }
            if self.awaiting_id.as_ref() == Some(id) {
                return None;
            }
        }
        self.sorted().into_iter().next()
    }

    fn select_default_if_missing(&mut self) {
        let keep = match &self.current_note_id {
            Some(id) => self.contains(id) || self.awaiting_id.as_ref() == Some(id),
            None => false,
        };
        if !keep {
            self.current_note_id = self.sorted().into_iter().next().map(|n| n.id);
        }
    }

    fn view(&self) -> SyncSnapshot {
        SyncSnapshot {
            notes: self.sorted(),
            current_note_id: self.current_note_id.clone(),
            current_note: self.current_note(),
            awaiting: self.awaiting_id.is_some() && self.awaiting_id == self.current_note_id,
            loaded: self.loaded,
        }
    }
}

struct SyncInner {
    store: Rc<dyn NoteStore>,
    runtime: Rc<dyn Runtime>,
    state: RefCell<SyncState>,
    observers: RefCell<Vec<(ObserverId, Rc<dyn Fn(&SyncSnapshot)>)>>,
    next_observer_id: Cell<ObserverId>,
    subscription: RefCell<Option<Subscription>>,
}

/// Mirrors the remote notes collection and owns the current selection.
///
/// Responsibilities:
/// - one live subscription; every snapshot replaces the local collection
/// - default selection (most recently updated note)
/// - create / update / delete intents sent to the store
///
/// Local state is never patched from a write. It only changes when a snapshot
/// arrives or the selection moves.
#[derive(Clone)]
pub(crate) struct NoteSyncController {
    inner: Rc<SyncInner>,
}

impl NoteSyncController {
    pub fn new(store: Rc<dyn NoteStore>, runtime: Rc<dyn Runtime>) -> Self {
        Self {
            inner: Rc::new(SyncInner {
                store,
                runtime,
                state: RefCell::new(SyncState::default()),
                observers: RefCell::new(Vec::new()),
                next_observer_id: Cell::new(0),
                subscription: RefCell::new(None),
            }),
        }
    }

    fn from_weak(weak: &Weak<SyncInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Attach to the store. Calling this while already subscribed does nothing.
    pub fn start(&self) {
        if self.inner.subscription.borrow().is_some() {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let sub = self.inner.store.subscribe(Rc::new(move |snap: Snapshot| {
            if let Some(c) = Self::from_weak(&weak) {
                c.apply_snapshot(snap);
            }
        }));
        *self.inner.subscription.borrow_mut() = Some(sub);
        tracing::debug!("note subscription started");
    }

    #[allow(dead_code)]
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscription.borrow().is_some()
    }

    /// Drop the subscription. Local state keeps the last snapshot.
    pub fn shutdown(&self) {
        let sub = self.inner.subscription.borrow_mut().take();
        if let Some(sub) = sub {
            sub.unsubscribe();
            tracing::debug!("note subscription stopped");
        }
    }

    fn apply_snapshot(&self, snap: Snapshot) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.notes = snap.into_notes();
            state.loaded = true;

            if let Some(id) = state.awaiting_id.clone() {
                if state.contains(&id) {
                    state.awaiting_id = None;
                }
            }

            state.select_default_if_missing();
            tracing::debug!(
                count = state.notes.len(),
                current = ?state.current_note_id,
                "applied notes snapshot"
            );
        }
        self.notify();
    }

    /// Called by the sidebar when the user picks a note.
    pub fn select_note(&self, id: &str) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.current_note_id.as_deref() == Some(id) {
                return;
            }
            state.current_note_id = Some(id.to_string());
            if state.awaiting_id.as_deref() != Some(id) {
                state.awaiting_id = None;
            }
        }
        self.notify();
    }

    #[allow(dead_code)]
    pub fn notes(&self) -> Vec<Note> {
        self.inner.state.borrow().notes.clone()
    }

    /// Notes in display order (most recently updated first).
    #[allow(dead_code)]
    pub fn sorted_notes(&self) -> Vec<Note> {
        self.inner.state.borrow().sorted()
    }

    #[allow(dead_code)]
    pub fn current_note_id(&self) -> Option<String> {
        self.inner.state.borrow().current_note_id.clone()
    }

    /// The selected note, falling back to the first in display order.
    pub fn current_note(&self) -> Option<Note> {
        self.inner.state.borrow().current_note()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.state.borrow().view()
    }

    pub fn observe(&self, observer: impl Fn(&SyncSnapshot) + 'static) -> ObserverId {
        let id = self.inner.next_observer_id.get() + 1;
        self.inner.next_observer_id.set(id);
        self.inner
            .observers
            .borrow_mut()
            .push((id, Rc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.inner.observers.borrow_mut().retain(|(k, _)| *k != id);
    }

    fn notify(&self) {
        let view = self.snapshot();
        let observers: Vec<Rc<dyn Fn(&SyncSnapshot)>> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            observer(&view);
        }
    }

    /// Create a placeholder note and select it once the store assigns its id.
    pub async fn create_note(&self) -> StoreResult<String> {
        let now = self.inner.runtime.now_ms();
        let id = self
            .inner
            .store
            .create(NoteData::placeholder(now))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "create note failed"))?;

        {
            let mut state = self.inner.state.borrow_mut();
            state.current_note_id = Some(id.clone());
            state.awaiting_id = if state.contains(&id) {
                None
            } else {
                Some(id.clone())
            };
        }
        tracing::info!(note_id = %id, "created note");
        self.notify();
        Ok(id)
    }

    /// Merge-write `{ body, updatedAt }` into the selected note.
    pub async fn update_note(&self, text: String) -> StoreResult<()> {
        let Some(id) = self.current_note().map(|n| n.id) else {
            return Err(StoreError::NoSelection);
        };
        self.write_body(id, text).await
    }

    /// Merge-write a body into a specific note, regardless of the selection.
    pub(crate) async fn write_body(&self, id: String, text: String) -> StoreResult<()> {
        let patch = NotePatch::body(text, self.inner.runtime.now_ms());
        self.inner
            .store
            .merge_write(&id, patch)
            .await
            .inspect_err(|e| tracing::error!(note_id = %id, error = %e, "update note failed"))?;
        tracing::debug!(note_id = %id, "note body written");
        Ok(())
    }

    /// Remove a note from the store. The list updates with the next snapshot.
    pub async fn delete_note(&self, id: &str) -> StoreResult<()> {
        self.inner
            .store
            .delete(id)
            .await
            .inspect_err(|e| tracing::error!(note_id = %id, error = %e, "delete note failed"))?;
        tracing::info!(note_id = %id, "deleted note");
        Ok(())
    }
}
