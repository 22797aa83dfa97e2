use crate::config::EnvConfig;
use crate::pages::NotesPage;
use crate::state::{AppContext, AppState};
use leptos::prelude::*;

#[component]
pub fn App() -> impl IntoView {
    provide_context(AppContext(AppState::new(EnvConfig::new())));

    // Single screen; no router needed.
    view! { <NotesPage /> }
}
