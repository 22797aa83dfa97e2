mod memory;

pub(crate) use memory::MemoryStore;
#[cfg(test)]
pub(crate) use memory::StoreOp;

use crate::models::{Note, NoteData, NotePatch};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("permission denied")]
    Unauthorized,

    #[error("note {0} does not exist")]
    NotFound(String),

    #[error("request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("no note is selected")]
    NoSelection,
}

impl StoreError {
    pub(crate) fn parse(e: impl std::fmt::Display) -> Self {
        Self::Parse(e.to_string())
    }
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

pub(crate) type StoreFuture<T> = LocalBoxFuture<'static, StoreResult<T>>;

/// One document of a snapshot: its field data tagged with its identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DocumentSnapshot {
    pub id: String,
    pub data: NoteData,
}

impl DocumentSnapshot {
    pub fn into_note(self) -> Note {
        Note::from_doc(self.id, self.data)
    }
}

/// Full point-in-time copy of the notes collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub docs: Vec<DocumentSnapshot>,
}

impl Snapshot {
    pub fn into_notes(self) -> Vec<Note> {
        self.docs.into_iter().map(DocumentSnapshot::into_note).collect()
    }
}

pub(crate) type SnapshotListener = Rc<dyn Fn(Snapshot)>;

/// Handle to a live subscription. Dropping it unsubscribes.
pub(crate) struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Remote document store holding the notes collection.
///
/// Writes resolve once the store has accepted them; their effect on local
/// state is only ever observed through the next snapshot.
pub(crate) trait NoteStore {
    /// Push full-collection snapshots to `listener` until the returned handle is dropped.
    fn subscribe(&self, listener: SnapshotListener) -> Subscription;

    /// Create a document and resolve with its assigned identifier.
    fn create(&self, data: NoteData) -> StoreFuture<String>;

    /// Write only the fields set in `patch`.
    fn merge_write(&self, id: &str, patch: NotePatch) -> StoreFuture<()>;

    fn delete(&self, id: &str) -> StoreFuture<()>;
}
