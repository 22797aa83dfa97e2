use crate::components::ui::{
    Alert, AlertDescription, Button, ButtonSize, ButtonVariant, Spinner, Textarea,
};
use crate::markdown::render_markdown;
use crate::models::Note;
use crate::state::{AppContext, NoteActions, NoteSession};
use icons::{Plus, X};
use leptos::ev;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;

#[component]
pub fn NotesPage() -> impl IntoView {
    let AppContext(state) = expect_context::<AppContext>();

    let session = StoredValue::new_local(NoteSession::connect(state));
    let actions = NoteActions::new(state, session);
    provide_context(actions);

    // Last chance to persist an edit that is still waiting out the quiet period.
    let pagehide = window_event_listener(ev::pagehide, move |_ev: web_sys::PageTransitionEvent| {
        session.with_value(|s| {
            if s.buffer.flush() {
                tracing::debug!("flushed pending edit on pagehide");
            }
        });
    });

    on_cleanup(move || {
        pagehide.remove();
        session.with_value(|s| s.shutdown());
    });

    view! {
        <div class="flex h-screen flex-col bg-background text-foreground">
            <ErrorBanner />
            {move || {
                if !state.loaded.get() {
                    view! {
                        <div class="flex flex-1 items-center justify-center gap-2 text-sm text-muted-foreground">
                            <Spinner />
                            "Loading notes..."
                        </div>
                    }
                    .into_any()
                } else if state.notes.with(|n| n.is_empty()) {
                    view! { <EmptyNotes /> }.into_any()
                } else {
                    view! {
                        <div class="flex min-h-0 flex-1">
                            <Sidebar />
                            <NoteEditor />
                        </div>
                    }
                    .into_any()
                }
            }}
        </div>
    }
}

#[component]
fn ErrorBanner() -> impl IntoView {
    let AppContext(state) = expect_context::<AppContext>();

    view! {
        <Show when=move || state.error.get().is_some() fallback=|| ().into_view()>
            <div class="px-4 pt-3">
                <Alert class="border-destructive/30">
                    <AlertDescription class="text-destructive text-xs">
                        {move || state.error.get().unwrap_or_default()}
                    </AlertDescription>
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        attr:title="Dismiss"
                        on:click=move |_| state.error.set(None)
                    >
                        <X />
                    </Button>
                </Alert>
            </div>
        </Show>
    }
}

#[component]
fn EmptyNotes() -> impl IntoView {
    let AppContext(state) = expect_context::<AppContext>();
    let actions = expect_context::<NoteActions>();

    view! {
        <div class="flex flex-1 flex-col items-center justify-center gap-4">
            <h1 class="text-lg font-semibold">"You have no notes"</h1>
            <Button
                size=ButtonSize::Sm
                attr:disabled=move || state.creating.get()
                on:click=move |_| actions.create.run(())
            >
                <span class="inline-flex items-center gap-2">
                    <Show when=move || state.creating.get() fallback=|| ().into_view()>
                        <Spinner />
                    </Show>
                    "Create one now"
                </span>
            </Button>
        </div>
    }
}

#[component]
fn Sidebar() -> impl IntoView {
    let AppContext(state) = expect_context::<AppContext>();
    let actions = expect_context::<NoteActions>();

    view! {
        <aside class="flex w-[30%] min-w-48 flex-col border-r">
            <div class="flex items-center justify-between border-b px-3 py-2">
                <h3 class="text-sm font-semibold">"Notes"</h3>
                <Button
                    variant=ButtonVariant::Outline
                    size=ButtonSize::Icon
                    attr:title="New note"
                    attr:disabled=move || state.creating.get()
                    on:click=move |_| actions.create.run(())
                >
                    <Show when=move || state.creating.get() fallback=|| view! { <Plus /> }>
                        <Spinner />
                    </Show>
                </Button>
            </div>
            <ul class="min-h-0 flex-1 overflow-y-auto py-1">
                <For
                    each=move || state.notes.get()
                    key=|note: &Note| (note.id.clone(), note.title())
                    let:note
                >
                    <NoteRow note=note />
                </For>
            </ul>
        </aside>
    }
}

#[component]
fn NoteRow(note: Note) -> impl IntoView {
    let AppContext(state) = expect_context::<AppContext>();
    let actions = expect_context::<NoteActions>();

    let title = note.title();
    let id_for_class = note.id.clone();
    let id_for_select = note.id.clone();
    let id_for_delete = note.id;

    let row_class = move || {
        let current = state
            .current_note_id
            .with(|c| c.as_deref() == Some(id_for_class.as_str()));
        if current {
            "group flex cursor-pointer items-center justify-between gap-2 bg-accent px-3 py-1.5 text-accent-foreground"
        } else {
            "group flex cursor-pointer items-center justify-between gap-2 px-3 py-1.5 hover:bg-accent/50"
        }
    };

    view! {
        <li class=row_class on:click=move |_| actions.select.run(id_for_select.clone())>
            <span class="truncate text-sm">{title}</span>
            <Button
                variant=ButtonVariant::Ghost
                size=ButtonSize::Icon
                class="invisible group-hover:visible"
                attr:title="Delete note"
                on:click=move |ev: web_sys::MouseEvent| {
                    ev.stop_propagation();
                    actions.delete.run(id_for_delete.clone());
                }
            >
                <X />
            </Button>
        </li>
    }
}

#[component]
fn NoteEditor() -> impl IntoView {
    let AppContext(state) = expect_context::<AppContext>();
    let actions = expect_context::<NoteActions>();

    let rendered = Memo::new(move |_| state.editor_text.with(|t| render_markdown(t)));
    let tab_state = move |preview: bool| {
        if state.preview.get() == preview {
            "true"
        } else {
            "false"
        }
    };

    view! {
        <section class="flex w-[70%] min-w-0 flex-col">
            <div class="flex items-center gap-1 border-b px-3 py-2">
                <Button
                    variant=ButtonVariant::Ghost
                    size=ButtonSize::Sm
                    class="data-[active=true]:bg-accent"
                    attr:data-active=move || tab_state(false)
                    on:click=move |_| state.preview.set(false)
                >
                    "Write"
                </Button>
                <Button
                    variant=ButtonVariant::Ghost
                    size=ButtonSize::Sm
                    class="data-[active=true]:bg-accent"
                    attr:data-active=move || tab_state(true)
                    on:click=move |_| state.preview.set(true)
                >
                    "Preview"
                </Button>
            </div>
            <div class="min-h-0 flex-1 p-3">
                // Keystrokes before the new note arrives would have nowhere to go.
                <Show
                    when=move || !state.awaiting.get()
                    fallback=|| {
                        view! {
                            <div class="flex h-full items-center justify-center gap-2 text-sm text-muted-foreground">
                                <Spinner />
                                "Creating note..."
                            </div>
                        }
                    }
                >
                    <Show
                        when=move || state.preview.get()
                        fallback=move || {
                            view! {
                                <Textarea
                                    class="h-full font-mono"
                                    placeholder="Write your note in markdown"
                                    value=state.editor_text
                                    on_input=actions.edit
                                />
                            }
                        }
                    >
                        <div class="prose h-full max-w-none overflow-y-auto" inner_html=move || rendered.get()></div>
                    </Show>
                </Show>
            </div>
        </section>
    }
}
