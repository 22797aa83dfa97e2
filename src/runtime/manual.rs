use super::{Runtime, TimerId};
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

type RepeatFn = Rc<RefCell<Box<dyn FnMut()>>>;

enum Task {
    Once(Box<dyn FnOnce()>),
    Repeat(RepeatFn, i64),
}

enum Fired {
    Once(Box<dyn FnOnce()>),
    Repeat(RepeatFn),
}

struct Scheduled {
    due: i64,
    task: Task,
}

#[derive(Default)]
struct ManualInner {
    now: i64,
    next_id: TimerId,
    timers: BTreeMap<TimerId, Scheduled>,
}

/// Virtual-clock runtime for tests. Time only moves through `advance`.
#[derive(Default)]
pub(crate) struct ManualRuntime {
    inner: RefCell<ManualInner>,
}

impl ManualRuntime {
    pub fn starting_at(now: i64) -> Self {
        let rt = Self::default();
        rt.inner.borrow_mut().now = now;
        rt
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Move the clock forward, firing every timer that falls due on the way.
    pub fn advance(&self, ms: i64) {
        let target = self.inner.borrow().now + ms;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let due = inner
                    .timers
                    .iter()
                    .filter(|(_, s)| s.due <= target)
                    .min_by_key(|(id, s)| (s.due, **id))
                    .map(|(id, _)| *id);
                let Some(id) = due else {
                    break;
                };
                let Some(scheduled) = inner.timers.remove(&id) else {
                    break;
                };
                inner.now = scheduled.due;
                match scheduled.task {
                    Task::Once(f) => Fired::Once(f),
                    Task::Repeat(f, period) => {
                        // Re-arm first so the callback can clear its own interval.
                        inner.timers.insert(
                            id,
                            Scheduled {
                                due: scheduled.due + period,
                                task: Task::Repeat(f.clone(), period),
                            },
                        );
                        Fired::Repeat(f)
                    }
                }
            };

            match next {
                Fired::Once(f) => f(),
                Fired::Repeat(f) => (&mut *f.borrow_mut())(),
            }
        }
        self.inner.borrow_mut().now = target;
    }

    fn schedule(&self, delay_ms: i64, task: Task) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        let due = inner.now + delay_ms.max(0);
        inner.timers.insert(id, Scheduled { due, task });
        id
    }
}

impl Runtime for ManualRuntime {
    fn set_timeout(&self, delay_ms: i32, callback: Box<dyn FnOnce()>) -> TimerId {
        self.schedule(delay_ms as i64, Task::Once(callback))
    }

    fn clear_timeout(&self, id: TimerId) {
        self.inner.borrow_mut().timers.remove(&id);
    }

    fn set_interval(&self, period_ms: i32, callback: Box<dyn FnMut()>) -> TimerId {
        let period = (period_ms as i64).max(1);
        self.schedule(period, Task::Repeat(Rc::new(RefCell::new(callback)), period))
    }

    fn clear_interval(&self, id: TimerId) {
        self.inner.borrow_mut().timers.remove(&id);
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        futures::executor::block_on(task);
    }

    fn now_ms(&self) -> i64 {
        self.inner.borrow().now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_timeouts_fire_in_due_order_and_can_be_cleared() {
        let rt = ManualRuntime::starting_at(100);
        let log: Rc<RefCell<Vec<&str>>> = Rc::default();

        let l = log.clone();
        rt.set_timeout(50, Box::new(move || l.borrow_mut().push("late")));
        let l = log.clone();
        rt.set_timeout(10, Box::new(move || l.borrow_mut().push("early")));
        let l = log.clone();
        let cancelled = rt.set_timeout(20, Box::new(move || l.borrow_mut().push("cancelled")));
        rt.clear_timeout(cancelled);

        rt.advance(49);
        assert_eq!(*log.borrow(), vec!["early"]);
        rt.advance(1);
        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert_eq!(rt.now_ms(), 150);
        assert_eq!(rt.pending_timers(), 0);
    }

    #[test]
    fn test_interval_repeats_until_it_clears_itself() {
        let rt = Rc::new(ManualRuntime::starting_at(0));
        let ticks = Rc::new(Cell::new(0));
        let id: Rc<Cell<TimerId>> = Rc::default();

        let (rt2, ticks2, id2) = (rt.clone(), ticks.clone(), id.clone());
        id.set(rt.set_interval(
            100,
            Box::new(move || {
                ticks2.set(ticks2.get() + 1);
                if ticks2.get() == 3 {
                    rt2.clear_interval(id2.get());
                }
            }),
        ));

        rt.advance(1_000);
        assert_eq!(ticks.get(), 3);
        assert_eq!(rt.pending_timers(), 0);
    }
}
