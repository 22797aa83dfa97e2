use super::note_sync::{NoteSyncController, ObserverId, SyncSnapshot};
use crate::runtime::{Runtime, TimerId};
use crate::store::{StoreError, StoreResult};
use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Quiet period between the last keystroke and the write.
pub(crate) const DEFAULT_QUIET_MS: i32 = 500;

/// What to do with an unsaved edit when the selection moves to another note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub(crate) enum SwitchPolicy {
    /// Drop the pending edit.
    #[default]
    Discard,
    /// Write the pending edit to the note it was typed into, then switch.
    Flush,
}

#[derive(Default)]
struct BufferState {
    /// Note the text belongs to.
    note_id: Option<String>,
    text: String,
    /// Last body seen for `note_id` in a snapshot.
    persisted: String,
    timer: Option<TimerId>,
}

impl BufferState {
    fn is_dirty(&self) -> bool {
        self.note_id.is_some() && self.text != self.persisted
    }
}

struct BufferInner {
    controller: NoteSyncController,
    runtime: Rc<dyn Runtime>,
    quiet_ms: i32,
    policy: SwitchPolicy,
    state: RefCell<BufferState>,
    observer: Cell<Option<ObserverId>>,
    listeners: RefCell<Vec<Rc<dyn Fn(&str)>>>,
    on_error: RefCell<Option<Rc<dyn Fn(StoreError)>>>,
}

/// Debounced editor text for the selected note.
///
/// Idle until the text changes; then a single timer is (re)armed on every
/// change and, once it expires, the text is persisted through
/// [`NoteSyncController::update_note`] if it differs from the stored body.
#[derive(Clone)]
pub(crate) struct EditBuffer {
    inner: Rc<BufferInner>,
}

impl EditBuffer {
    pub fn new(
        controller: NoteSyncController,
        runtime: Rc<dyn Runtime>,
        quiet_ms: i32,
        policy: SwitchPolicy,
    ) -> Self {
        let buffer = Self {
            inner: Rc::new(BufferInner {
                controller: controller.clone(),
                runtime,
                quiet_ms: quiet_ms.max(0),
                policy,
                state: RefCell::new(BufferState::default()),
                observer: Cell::new(None),
                listeners: RefCell::new(Vec::new()),
                on_error: RefCell::new(None),
            }),
        };

        let weak = Rc::downgrade(&buffer.inner);
        let id = controller.observe(move |snap| {
            if let Some(b) = Self::from_weak(&weak) {
                b.on_sync(snap);
            }
        });
        buffer.inner.observer.set(Some(id));
        buffer.on_sync(&controller.snapshot());

        buffer
    }

    fn from_weak(weak: &Weak<BufferInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn text(&self) -> String {
        self.inner.state.borrow().text.clone()
    }

    #[allow(dead_code)]
    pub fn note_id(&self) -> Option<String> {
        self.inner.state.borrow().note_id.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().timer.is_some()
    }

    /// Called with the new text whenever it is replaced from outside the editor.
    pub fn observe_text(&self, listener: impl Fn(&str) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Receives failures of writes started by the buffer.
    pub fn set_error_handler(&self, handler: impl Fn(StoreError) + 'static) {
        *self.inner.on_error.borrow_mut() = Some(Rc::new(handler));
    }

    /// Editor input. Re-arms the quiet-period timer.
    ///
    /// Returns false, and keeps nothing, while no stored note is selected.
    pub fn set_text(&self, text: impl Into<String>) -> bool {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            if state.note_id.is_none() {
                return false;
            }
            state.text = text.into();
            state.timer.take()
        };
        if let Some(tid) = previous {
            self.inner.runtime.clear_timeout(tid);
        }

        let weak = Rc::downgrade(&self.inner);
        let tid = self.inner.runtime.set_timeout(
            self.inner.quiet_ms,
            Box::new(move || {
                if let Some(b) = Self::from_weak(&weak) {
                    b.on_quiet();
                }
            }),
        );
        self.inner.state.borrow_mut().timer = Some(tid);
        true
    }

    fn on_quiet(&self) {
        let text = {
            let mut state = self.inner.state.borrow_mut();
            state.timer = None;
            if !state.is_dirty() {
                tracing::trace!("quiet period over, body unchanged");
                return;
            }
            state.text.clone()
        };

        let c = self.inner.controller.clone();
        self.spawn_write(Box::pin(async move { c.update_note(text).await }));
    }

    /// Persist right away if there is an unsaved edit. Returns whether a write was started.
    pub fn flush(&self) -> bool {
        let (timer, pending) = {
            let mut state = self.inner.state.borrow_mut();
            let timer = state.timer.take();
            let pending = if state.is_dirty() {
                state.note_id.clone().map(|id| (id, state.text.clone()))
            } else {
                None
            };
            (timer, pending)
        };
        if let Some(tid) = timer {
            self.inner.runtime.clear_timeout(tid);
        }

        let Some((id, text)) = pending else {
            return false;
        };
        let c = self.inner.controller.clone();
        self.spawn_write(Box::pin(async move { c.write_body(id, text).await }));
        true
    }

    /// Cancel any pending write and detach from the controller.
    pub fn shutdown(&self) {
        let timer = self.inner.state.borrow_mut().timer.take();
        if let Some(tid) = timer {
            self.inner.runtime.clear_timeout(tid);
        }
        if let Some(id) = self.inner.observer.take() {
            self.inner.controller.unobserve(id);
        }
        self.inner.listeners.borrow_mut().clear();
        self.inner.on_error.borrow_mut().take();
    }

    fn on_sync(&self, snap: &SyncSnapshot) {
        let current = snap.current_note.as_ref();
        let mut cancelled = None;
        let mut flush = None;

        let replaced = {
            let mut state = self.inner.state.borrow_mut();
            match current {
                Some(note) if state.note_id.as_deref() == Some(note.id.as_str()) => {
                    // Same note: refresh the persisted body. Adopt it only when
                    // the editor holds nothing unsaved.
                    let untouched = state.timer.is_none() && state.text == state.persisted;
                    state.persisted = note.body.clone();
                    if untouched && state.text != note.body {
                        state.text = note.body.clone();
                        Some(state.text.clone())
                    } else {
                        None
                    }
                }
                _ => {
                    if let Some(tid) = state.timer.take() {
                        cancelled = Some(tid);
                        // A note that left the collection has nothing to write into.
                        let still_stored = state
                            .note_id
                            .as_deref()
                            .is_some_and(|id| snap.notes.iter().any(|n| n.id == id));
                        if self.inner.policy == SwitchPolicy::Flush
                            && state.is_dirty()
                            && still_stored
                        {
                            flush = state.note_id.clone().map(|id| (id, state.text.clone()));
                        } else if state.is_dirty() {
                            tracing::debug!(
                                note_id = ?state.note_id,
                                "selection changed, pending edit dropped"
                            );
                        }
                    }

                    let body = current.map(|n| n.body.clone()).unwrap_or_default();
                    state.note_id = current.map(|n| n.id.clone());
                    state.text = body.clone();
                    state.persisted = body;
                    Some(state.text.clone())
                }
            }
        };

        if let Some(tid) = cancelled {
            self.inner.runtime.clear_timeout(tid);
        }
        if let Some((id, text)) = flush {
            let c = self.inner.controller.clone();
            self.spawn_write(Box::pin(async move { c.write_body(id, text).await }));
        }
        if let Some(text) = replaced {
            self.notify(&text);
        }
    }

    fn notify(&self, text: &str) {
        let listeners: Vec<Rc<dyn Fn(&str)>> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(text);
        }
    }

    fn spawn_write(&self, write: LocalBoxFuture<'static, StoreResult<()>>) {
        let on_error = self.inner.on_error.borrow().clone();
        self.inner.runtime.spawn(Box::pin(async move {
            if let Err(e) = write.await {
                tracing::warn!(error = %e, "debounced note write failed");
                if let Some(handler) = on_error {
                    handler(e);
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteData;
    use crate::runtime::manual::ManualRuntime;
    use crate::store::{MemoryStore, NoteStore};
    use futures::executor::block_on;
    use std::str::FromStr;

    struct Harness {
        store: MemoryStore,
        rt: Rc<ManualRuntime>,
        controller: NoteSyncController,
        buffer: EditBuffer,
    }

    fn harness(docs: &[(&str, &str, i64)], policy: SwitchPolicy) -> Harness {
        let store = MemoryStore::new();
        for (id, body, ts) in docs {
            store.insert(
                id,
                NoteData {
                    body: body.to_string(),
                    created_at: *ts,
                    updated_at: *ts,
                },
            );
        }
        let rt = Rc::new(ManualRuntime::starting_at(0));
        let controller = NoteSyncController::new(Rc::new(store.clone()), rt.clone());
        controller.start();
        let buffer = EditBuffer::new(controller.clone(), rt.clone(), DEFAULT_QUIET_MS, policy);
        Harness {
            store,
            rt,
            controller,
            buffer,
        }
    }

    #[test]
    fn test_buffer_starts_with_selected_note_body() {
        let h = harness(&[("a", "alpha", 10), ("b", "beta", 20)], SwitchPolicy::Discard);
        assert_eq!(h.buffer.note_id().as_deref(), Some("b"));
        assert_eq!(h.buffer.text(), "beta");
        assert!(!h.buffer.is_pending());
    }

    #[test]
    fn test_write_fires_at_quiet_period_not_before() {
        let h = harness(&[("a", "foo", 10)], SwitchPolicy::Discard);
        h.buffer.set_text("foobar");
        assert!(h.buffer.is_pending());

        h.rt.advance(499);
        assert!(h.store.merge_writes().is_empty());

        h.rt.advance(1);
        assert_eq!(
            h.store.merge_writes(),
            vec![("a".to_string(), "foobar".to_string())]
        );
        assert!(!h.buffer.is_pending());
        assert_eq!(h.store.get("a").map(|d| d.updated_at), Some(500));
    }

    #[test]
    fn test_rapid_changes_coalesce_into_one_write_with_last_text() {
        let h = harness(&[("a", "", 10)], SwitchPolicy::Discard);
        for text in ["h", "he", "hel", "hell", "hello"] {
            h.buffer.set_text(text);
            h.rt.advance(100);
        }
        assert!(h.store.merge_writes().is_empty());
        assert_eq!(h.rt.pending_timers(), 1);

        h.rt.advance(400);
        assert_eq!(
            h.store.merge_writes(),
            vec![("a".to_string(), "hello".to_string())]
        );

        h.rt.advance(5_000);
        assert_eq!(h.store.merge_writes().len(), 1);
    }

    #[test]
    fn test_reverting_to_persisted_body_writes_nothing() {
        let h = harness(&[("a", "foo", 10)], SwitchPolicy::Discard);
        h.buffer.set_text("foob");
        h.rt.advance(200);
        h.buffer.set_text("foo");
        h.rt.advance(1_000);
        assert!(h.store.ops().is_empty());
    }

    #[test]
    fn test_same_text_after_persisted_write_is_not_written_again() {
        let h = harness(&[("a", "foo", 10)], SwitchPolicy::Discard);
        h.buffer.set_text("bar");
        h.rt.advance(500);
        assert_eq!(h.store.merge_writes().len(), 1);

        h.buffer.set_text("bar");
        h.rt.advance(500);
        assert_eq!(h.store.merge_writes().len(), 1);
    }

    #[test]
    fn test_selection_switch_discards_pending_edit() {
        let h = harness(&[("a", "alpha", 10), ("b", "beta", 20)], SwitchPolicy::Discard);
        h.controller.select_note("a");
        h.buffer.set_text("alpha edited");
        h.rt.advance(200);

        h.controller.select_note("b");
        assert_eq!(h.buffer.text(), "beta");
        assert!(!h.buffer.is_pending());

        h.rt.advance(2_000);
        assert!(h.store.ops().is_empty());
        assert_eq!(h.store.get("a").map(|d| d.body), Some("alpha".to_string()));
    }

    #[test]
    fn test_selection_switch_with_flush_writes_old_note_only() {
        let h = harness(&[("a", "alpha", 10), ("b", "beta", 20)], SwitchPolicy::Flush);
        h.controller.select_note("a");
        h.buffer.set_text("alpha edited");
        h.rt.advance(200);

        h.controller.select_note("b");
        h.rt.advance(2_000);

        assert_eq!(
            h.store.merge_writes(),
            vec![("a".to_string(), "alpha edited".to_string())]
        );
        assert_eq!(h.store.get("b").map(|d| d.body), Some("beta".to_string()));
        // The write bumped "a" to the top, but the user's selection stays on "b".
        assert_eq!(h.controller.current_note_id().as_deref(), Some("b"));
        assert_eq!(h.buffer.text(), "beta");
    }

    #[test]
    fn test_unsaved_text_survives_unrelated_snapshots() {
        let h = harness(&[("a", "alpha", 10), ("b", "beta", 20)], SwitchPolicy::Discard);
        h.buffer.set_text("beta draft");

        block_on(h.store.merge_write("a", crate::models::NotePatch::body("alpha 2", 5)))
            .expect("write should succeed");
        assert_eq!(h.buffer.text(), "beta draft");

        h.rt.advance(500);
        assert_eq!(
            h.store.merge_writes().last(),
            Some(&("b".to_string(), "beta draft".to_string()))
        );
    }

    #[test]
    fn test_remote_body_is_adopted_when_idle() {
        let h = harness(&[("a", "alpha", 10)], SwitchPolicy::Discard);
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let seen2 = seen.clone();
        h.buffer.observe_text(move |t| seen2.borrow_mut().push(t.to_string()));

        block_on(h.store.merge_write("a", crate::models::NotePatch::body("from elsewhere", 50)))
            .expect("write should succeed");
        assert_eq!(h.buffer.text(), "from elsewhere");
        assert_eq!(*seen.borrow(), vec!["from elsewhere".to_string()]);
    }

    #[test]
    fn test_flush_writes_immediately_and_cancels_timer() {
        let h = harness(&[("a", "alpha", 10)], SwitchPolicy::Discard);
        assert!(!h.buffer.flush());

        h.buffer.set_text("alpha!");
        assert!(h.buffer.flush());
        assert_eq!(h.rt.pending_timers(), 0);
        assert_eq!(
            h.store.merge_writes(),
            vec![("a".to_string(), "alpha!".to_string())]
        );

        h.rt.advance(1_000);
        assert_eq!(h.store.merge_writes().len(), 1);
    }

    #[test]
    fn test_shutdown_cancels_pending_write() {
        let h = harness(&[("a", "alpha", 10)], SwitchPolicy::Discard);
        h.buffer.set_text("never saved");
        h.buffer.shutdown();
        h.rt.advance(1_000);
        assert!(h.store.ops().is_empty());
    }

    #[test]
    fn test_flush_policy_skips_note_deleted_while_pending() {
        let h = harness(&[("a", "alpha", 10), ("b", "beta", 20)], SwitchPolicy::Flush);
        let errors: Rc<RefCell<Vec<StoreError>>> = Rc::default();
        let errors2 = errors.clone();
        h.buffer
            .set_error_handler(move |e| errors2.borrow_mut().push(e));

        assert!(h.buffer.set_text("beta edited"));
        block_on(h.controller.delete_note("b")).expect("delete should succeed");
        h.rt.advance(2_000);

        assert!(h.store.merge_writes().is_empty());
        assert!(errors.borrow().is_empty());
        assert_eq!(h.buffer.note_id().as_deref(), Some("a"));
        assert_eq!(h.buffer.text(), "alpha");
    }

    #[test]
    fn test_edits_without_a_note_are_ignored() {
        let h = harness(&[], SwitchPolicy::Discard);
        assert!(!h.buffer.set_text("orphan"));
        assert_eq!(h.buffer.text(), "");
        assert_eq!(h.rt.pending_timers(), 0);
    }

    #[test]
    fn test_new_note_resets_buffer_to_placeholder() {
        let h = harness(&[("a", "alpha", 10)], SwitchPolicy::Discard);
        h.buffer.set_text("alpha typing");

        h.rt.advance(100);
        let id = block_on(h.controller.create_note()).expect("create should succeed");
        assert_eq!(h.buffer.note_id(), Some(id));
        assert_eq!(h.buffer.text(), crate::models::NEW_NOTE_BODY);
        h.rt.advance(1_000);
        assert!(h.store.merge_writes().is_empty());
    }

    #[test]
    fn test_write_errors_reach_error_handler() {
        let h = harness(&[("a", "alpha", 10)], SwitchPolicy::Discard);
        let errors: Rc<RefCell<Vec<StoreError>>> = Rc::default();
        let errors2 = errors.clone();
        h.buffer
            .set_error_handler(move |e| errors2.borrow_mut().push(e));

        h.store.fail_next(StoreError::Unauthorized);
        h.buffer.set_text("alpha?");
        h.rt.advance(500);
        assert_eq!(*errors.borrow(), vec![StoreError::Unauthorized]);
    }

    #[test]
    fn test_switch_policy_parses_case_insensitively() {
        assert_eq!(SwitchPolicy::from_str("flush"), Ok(SwitchPolicy::Flush));
        assert_eq!(SwitchPolicy::from_str("DISCARD"), Ok(SwitchPolicy::Discard));
        assert!(SwitchPolicy::from_str("merge").is_err());
        assert_eq!(SwitchPolicy::Flush.to_string(), "flush");
    }
}
