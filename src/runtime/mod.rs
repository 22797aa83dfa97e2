#[cfg(test)]
pub(crate) mod manual;

use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

/// Handle returned by the runtime's timer functions.
pub(crate) type TimerId = i32;

/// Event-loop services used by the sync core: timers, task spawning and the clock.
pub(crate) trait Runtime {
    fn set_timeout(&self, delay_ms: i32, callback: Box<dyn FnOnce()>) -> TimerId;

    fn clear_timeout(&self, id: TimerId);

    fn set_interval(&self, period_ms: i32, callback: Box<dyn FnMut()>) -> TimerId;

    fn clear_interval(&self, id: TimerId);

    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Browser implementation on top of `window.setTimeout` / `setInterval`.
#[derive(Clone, Default)]
pub(crate) struct BrowserRuntime {
    /// Interval closures stay alive until cleared.
    intervals: Rc<RefCell<HashMap<TimerId, Closure<dyn FnMut()>>>>,
}

impl BrowserRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Runtime for BrowserRuntime {
    fn set_timeout(&self, delay_ms: i32, callback: Box<dyn FnOnce()>) -> TimerId {
        let Some(win) = web_sys::window() else {
            return 0;
        };
        let cb = Closure::once_into_js(move || callback());
        win.set_timeout_with_callback_and_timeout_and_arguments_0(
            cb.as_ref().unchecked_ref(),
            delay_ms,
        )
        .unwrap_or(0)
    }

    fn clear_timeout(&self, id: TimerId) {
        if let Some(win) = web_sys::window() {
            win.clear_timeout_with_handle(id);
        }
    }

    fn set_interval(&self, period_ms: i32, callback: Box<dyn FnMut()>) -> TimerId {
        let Some(win) = web_sys::window() else {
            return 0;
        };
        let cb = Closure::wrap(callback);
        let tid = win
            .set_interval_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                period_ms,
            )
            .unwrap_or(0);
        self.intervals.borrow_mut().insert(tid, cb);
        tid
    }

    fn clear_interval(&self, id: TimerId) {
        if let Some(win) = web_sys::window() {
            win.clear_interval_with_handle(id);
        }
        self.intervals.borrow_mut().remove(&id);
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::task::spawn_local(task);
    }

    fn now_ms(&self) -> i64 {
        js_sys::Date::now().round() as i64
    }
}
