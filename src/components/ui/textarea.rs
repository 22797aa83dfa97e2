use leptos::prelude::*;
use tw_merge::tw_merge;
use wasm_bindgen::JsCast;

/// Plain-text editing surface. The caller owns the value and is told about every input.
#[component]
pub fn Textarea(
    #[prop(into, optional)] class: String,
    #[prop(into, optional)] placeholder: String,

    #[prop(into)] value: Signal<String>,
    #[prop(into)] on_input: Callback<String>,
) -> impl IntoView {
    let merged_class = tw_merge!(
        "placeholder:text-muted-foreground selection:bg-primary selection:text-primary-foreground border-input flex w-full min-h-16 rounded-md border bg-transparent px-3 py-2 text-base shadow-xs outline-none resize-none md:text-sm",
        "focus-visible:border-ring focus-visible:ring-ring/50 focus-visible:ring-2",
        class
    );

    let handle_input = move |ev: web_sys::Event| {
        if let Some(area) = ev
            .target()
            .and_then(|t| t.dyn_into::<web_sys::HtmlTextAreaElement>().ok())
        {
            on_input.run(area.value());
        }
    };

    // Assigning an identical value leaves the caret alone, so echoing input back is fine.
    view! {
        <textarea
            data-name="Textarea"
            class=merged_class
            placeholder=placeholder
            spellcheck="false"
            prop:value=move || value.get()
            on:input=handle_input
        ></textarea>
    }
}
