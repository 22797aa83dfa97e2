use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Alert, div, "relative w-full rounded-lg border px-4 py-3 text-sm flex items-start gap-3"}
    clx! {AlertDescription, p, "flex-1 text-sm [&_p]:leading-relaxed"}
}

pub use components::*;
