use super::{
    DocumentSnapshot, NoteStore, Snapshot, SnapshotListener, StoreError, StoreFuture,
    StoreResult, Subscription,
};
use crate::models::{NoteData, NotePatch};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A write accepted by the in-memory store, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoreOp {
    Create { id: String },
    MergeWrite { id: String, patch: NotePatch },
    Delete { id: String },
}

#[derive(Default)]
struct MemoryInner {
    /// Insertion order is kept so snapshots are deterministic.
    docs: Vec<(String, NoteData)>,
    listeners: Vec<(u64, SnapshotListener)>,
    next_listener_id: u64,
    next_doc_seq: u64,
    scripted_ids: VecDeque<String>,
    ops: Vec<StoreOp>,
    fail_next: Option<StoreError>,
    /// When set, snapshots are held back until `release_snapshots`.
    held: bool,
    held_dirty: bool,
}

/// In-process document store.
///
/// Backs the sandbox mode of the app (no remote project configured) and the
/// unit tests. Every accepted write is followed by a snapshot to all listeners,
/// delivered before the write's future resolves.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without recording a write or notifying anyone.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn insert(&self, id: &str, data: NoteData) {
        let mut inner = self.inner.borrow_mut();
        inner.docs.retain(|(k, _)| k != id);
        inner.docs.push((id.to_string(), data));
    }

    /// Identifiers handed out by upcoming creates, before falling back to generated ones.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn push_next_id(&self, id: &str) {
        self.inner.borrow_mut().scripted_ids.push_back(id.to_string());
    }

    /// Make the next write fail with `err` without touching any document.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn fail_next(&self, err: StoreError) {
        self.inner.borrow_mut().fail_next = Some(err);
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn hold_snapshots(&self) {
        self.inner.borrow_mut().held = true;
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn release_snapshots(&self) {
        let dirty = {
            let mut inner = self.inner.borrow_mut();
            inner.held = false;
            std::mem::take(&mut inner.held_dirty)
        };
        if dirty {
            self.emit();
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.inner.borrow().ops.clone()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn merge_writes(&self) -> Vec<(String, String)> {
        self.inner
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                StoreOp::MergeWrite { id, patch } => {
                    Some((id.clone(), patch.body.clone().unwrap_or_default()))
                }
                _ => None,
            })
            .collect()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn get(&self, id: &str) -> Option<NoteData> {
        self.inner
            .borrow()
            .docs
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, d)| d.clone())
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.inner.borrow();
        Snapshot {
            docs: inner
                .docs
                .iter()
                .map(|(id, data)| DocumentSnapshot {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect(),
        }
    }

    fn emit(&self) {
        let listeners: Vec<SnapshotListener> = {
            let mut inner = self.inner.borrow_mut();
            if inner.held {
                inner.held_dirty = true;
                return;
            }
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in listeners {
            listener(self.snapshot());
        }
    }

    fn take_failure(&self) -> StoreResult<()> {
        match self.inner.borrow_mut().fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create_now(&self, data: NoteData) -> StoreResult<String> {
        self.take_failure()?;
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = match inner.scripted_ids.pop_front() {
                Some(id) => id,
                None => {
                    inner.next_doc_seq += 1;
                    format!("note-{:04}", inner.next_doc_seq)
                }
            };
            inner.docs.push((id.clone(), data));
            inner.ops.push(StoreOp::Create { id: id.clone() });
            id
        };
        self.emit();
        Ok(id)
    }

    fn merge_now(&self, id: &str, patch: NotePatch) -> StoreResult<()> {
        self.take_failure()?;
        {
            let mut inner = self.inner.borrow_mut();
            let Some((_, data)) = inner.docs.iter_mut().find(|(k, _)| k == id) else {
                return Err(StoreError::NotFound(id.to_string()));
            };
            patch.apply_to(data);
            inner.ops.push(StoreOp::MergeWrite {
                id: id.to_string(),
                patch,
            });
        }
        self.emit();
        Ok(())
    }

    fn delete_now(&self, id: &str) -> StoreResult<()> {
        self.take_failure()?;
        {
            let mut inner = self.inner.borrow_mut();
            // Deleting a missing document is not an error.
            inner.docs.retain(|(k, _)| k != id);
            inner.ops.push(StoreOp::Delete { id: id.to_string() });
        }
        self.emit();
        Ok(())
    }
}

impl NoteStore for MemoryStore {
    fn subscribe(&self, listener: SnapshotListener) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_listener_id += 1;
            let id = inner.next_listener_id;
            inner.listeners.push((id, listener.clone()));
            id
        };

        // Initial snapshot, like a live query does on attach.
        listener(self.snapshot());

        let inner = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().listeners.retain(|(k, _)| *k != id);
            }
        })
    }

    fn create(&self, data: NoteData) -> StoreFuture<String> {
        let store = self.clone();
        Box::pin(async move { store.create_now(data) })
    }

    fn merge_write(&self, id: &str, patch: NotePatch) -> StoreFuture<()> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move { store.merge_now(&id, patch) })
    }

    fn delete(&self, id: &str) -> StoreFuture<()> {
        let store = self.clone();
        let id = id.to_string();
        Box::pin(async move { store.delete_now(&id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::Cell;

    fn data(body: &str, ts: i64) -> NoteData {
        NoteData {
            body: body.to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_subscribe_delivers_initial_snapshot_and_every_write() {
        let store = MemoryStore::new();
        store.insert("a", data("X", 10));

        let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
        let seen2 = seen.clone();
        let sub = store.subscribe(Rc::new(move |snap: Snapshot| {
            seen2.borrow_mut().push(snap.docs.len());
        }));

        let id = block_on(store.create(data("Y", 20))).expect("create should succeed");
        block_on(store.delete("a")).expect("delete should succeed");

        assert_eq!(*seen.borrow(), vec![1, 2, 1]);
        assert_eq!(store.get(&id).map(|d| d.body), Some("Y".to_string()));

        sub.unsubscribe();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_dropping_subscription_stops_delivery() {
        let store = MemoryStore::new();
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        {
            let _sub = store.subscribe(Rc::new(move |_: Snapshot| calls2.set(calls2.get() + 1)));
        }
        block_on(store.create(data("Y", 1))).expect("create should succeed");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_merge_write_on_missing_note_is_not_found() {
        let store = MemoryStore::new();
        let err = block_on(store.merge_write("ghost", NotePatch::body("x", 1)))
            .expect_err("missing doc should fail");
        assert_eq!(err, StoreError::NotFound("ghost".to_string()));
        assert!(store.ops().is_empty());
    }

    #[test]
    fn test_scripted_ids_and_failures() {
        let store = MemoryStore::new();
        store.push_next_id("b");
        assert_eq!(block_on(store.create(data("", 0))), Ok("b".to_string()));

        store.fail_next(StoreError::Unauthorized);
        assert_eq!(
            block_on(store.create(data("", 0))),
            Err(StoreError::Unauthorized)
        );
        assert_eq!(store.ops(), vec![StoreOp::Create { id: "b".to_string() }]);
    }

    #[test]
    fn test_held_snapshots_are_released_once() {
        let store = MemoryStore::new();
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let _sub = store.subscribe(Rc::new(move |_: Snapshot| calls2.set(calls2.get() + 1)));

        store.hold_snapshots();
        block_on(store.create(data("", 0))).expect("create should succeed");
        block_on(store.create(data("", 0))).expect("create should succeed");
        assert_eq!(calls.get(), 1);

        store.release_snapshots();
        assert_eq!(calls.get(), 2);
    }
}
