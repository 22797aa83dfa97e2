use crate::state::edit_buffer::{SwitchPolicy, DEFAULT_QUIET_MS};
use std::str::FromStr;

pub(crate) const DEFAULT_API_URL: &str = "https://firestore.googleapis.com";
pub(crate) const DEFAULT_COLLECTION: &str = "notes";
pub(crate) const DEFAULT_POLL_MS: i32 = 2_000;

/// Runtime configuration, read from `window.ENV`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EnvConfig {
    pub api_url: String,
    /// Empty means no remote project: notes live in memory for this page only.
    pub project_id: String,
    pub collection: String,
    pub poll_ms: i32,
    pub debounce_ms: i32,
    pub switch_policy: SwitchPolicy,
    pub log_level: tracing::Level,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            project_id: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            poll_ms: DEFAULT_POLL_MS,
            debounce_ms: DEFAULT_QUIET_MS,
            switch_policy: SwitchPolicy::default(),
            log_level: tracing::Level::INFO,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring invalid config value");
            default
        }
    }
}

impl EnvConfig {
    /// Build from a key lookup. Keys are tried in README style (`API_URL`) first,
    /// then lower-case (`api_url`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .or_else(|| lookup(&key.to_ascii_lowercase()))
                .filter(|v| !v.trim().is_empty())
        };
        let d = Self::default();

        Self {
            api_url: get("API_URL").unwrap_or(d.api_url),
            project_id: get("PROJECT_ID")
                .map(|s| s.trim().to_string())
                .unwrap_or(d.project_id),
            collection: get("COLLECTION").unwrap_or(d.collection),
            poll_ms: parse_or("POLL_MS", get("POLL_MS"), d.poll_ms),
            debounce_ms: parse_or("DEBOUNCE_MS", get("DEBOUNCE_MS"), d.debounce_ms),
            switch_policy: parse_or("SWITCH_POLICY", get("SWITCH_POLICY"), d.switch_policy),
            log_level: parse_or("LOG_LEVEL", get("LOG_LEVEL"), d.log_level),
        }
    }

    pub fn new() -> Self {
        let env = web_sys::window()
            .and_then(|w| w.get("ENV"))
            .map(wasm_bindgen::JsValue::from)
            .filter(|env| !env.is_undefined() && env.is_object());

        let Some(env) = env else {
            return Self::default();
        };

        Self::from_lookup(|key| {
            let v = js_sys::Reflect::get(&env, &key.into()).ok()?;
            // Numbers are allowed too, e.g. `POLL_MS: 5000`.
            v.as_string().or_else(|| v.as_f64().map(|n| n.to_string()))
        })
    }

    pub fn is_sandbox(&self) -> bool {
        self.project_id.is_empty()
    }
}
