mod api;
mod app;
mod components;
mod config;
mod logging;
mod markdown;
mod models;
mod pages;
mod runtime;
mod state;
mod store;

use crate::app::App;
use crate::config::EnvConfig;
use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    logging::init(EnvConfig::new().log_level);
    mount_to_body(App);
}

// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use crate::state::edit_buffer::SwitchPolicy;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn set_env(pairs: &[(&str, JsValue)]) {
        let window = web_sys::window().expect("window");
        let env = js_sys::Object::new();
        for (k, v) in pairs {
            js_sys::Reflect::set(&env, &JsValue::from_str(k), v).expect("set ENV key");
        }
        js_sys::Reflect::set(&window, &JsValue::from_str("ENV"), &env).expect("set window.ENV");
    }

    fn clear_env() {
        let window = web_sys::window().expect("window");
        js_sys::Reflect::delete_property(&window, &JsValue::from_str("ENV")).expect("delete ENV");
    }

    #[wasm_bindgen_test]
    fn test_env_config_reads_window_env() {
        set_env(&[
            ("API_URL", JsValue::from_str("http://localhost:8080")),
            ("project_id", JsValue::from_str("demo")),
            ("POLL_MS", JsValue::from_f64(5000.0)),
            ("SWITCH_POLICY", JsValue::from_str("flush")),
        ]);

        let c = EnvConfig::new();
        assert_eq!(c.api_url, "http://localhost:8080");
        assert_eq!(c.project_id, "demo");
        assert_eq!(c.poll_ms, 5_000);
        assert_eq!(c.switch_policy, SwitchPolicy::Flush);
        assert!(!c.is_sandbox());

        clear_env();
    }

    #[wasm_bindgen_test]
    fn test_env_config_defaults_without_window_env() {
        clear_env();
        let c = EnvConfig::new();
        assert_eq!(c, EnvConfig::default());
        assert!(c.is_sandbox());
    }

    #[wasm_bindgen_test]
    fn test_logging_init_is_idempotent() {
        logging::init(tracing::Level::DEBUG);
        logging::init(tracing::Level::INFO);
        tracing::info!("still logging");
    }
}
