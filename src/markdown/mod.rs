use pulldown_cmark::{html::push_html, Options, Parser};

fn options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts
}

/// Render a note body for the preview pane.
pub(crate) fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, options());
    let mut html = String::with_capacity(text.len() * 3 / 2);
    push_html(&mut html, parser);
    html
}
