//! Comrak-backed [`RenderSink`] that accumulates sanitised HTML.
//!
//! Each delivered chunk is parsed and rendered on its own. The chunkers only
//! cut at block boundaries, so a chunk is always a well-formed Markdown
//! fragment and the concatenated HTML matches a whole-document render block
//! for block.

use std::collections::HashSet;
use std::sync::Mutex;

use ammonia::Builder as AmmoniaBuilder;
use async_trait::async_trait;
use comrak::options::Options;
use comrak::{Arena, format_html, parse_document};
use tracing::trace;

use crate::application::render::{RenderSink, SinkError};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "infra::render_sink";

#[derive(Debug, Default)]
struct Buffer {
    html: String,
    open: bool,
    chunks: usize,
}

pub struct HtmlRenderSink {
    options: Options<'static>,
    sanitizer: AmmoniaBuilder<'static>,
    buffer: Mutex<Buffer>,
}

impl HtmlRenderSink {
    pub fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: build_sanitizer(),
            buffer: Mutex::new(Buffer::default()),
        }
    }

    /// Markup accumulated so far, including a partially delivered document.
    pub fn snapshot(&self) -> String {
        mutex_lock(&self.buffer, SOURCE, "snapshot").html.clone()
    }

    fn render_fragment(&self, text: &str, index: usize) -> Result<String, SinkError> {
        let arena = Arena::new();
        let root = parse_document(&arena, text, &self.options);
        let mut html = String::new();
        format_html(root, &self.options, &mut html)
            .map_err(|err| SinkError::rejected(index, err.to_string()))?;
        Ok(self.sanitizer.clean(&html).to_string())
    }
}

impl Default for HtmlRenderSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderSink for HtmlRenderSink {
    async fn initialize(&self) -> Result<(), SinkError> {
        let mut buffer = mutex_lock(&self.buffer, SOURCE, "initialize");
        buffer.html.clear();
        buffer.chunks = 0;
        buffer.open = true;
        Ok(())
    }

    async fn append_chunk(&self, text: &str, index: usize) -> Result<(), SinkError> {
        if !mutex_lock(&self.buffer, SOURCE, "append_chunk").open {
            return Err(SinkError::NotInitialized);
        }

        let fragment = self.render_fragment(text, index)?;
        trace!(target: SOURCE, index, bytes = fragment.len(), "Chunk rendered");

        let mut buffer = mutex_lock(&self.buffer, SOURCE, "append_chunk");
        buffer.html.push_str(&fragment);
        buffer.chunks += 1;
        Ok(())
    }

    async fn finalize(&self) -> Result<String, SinkError> {
        let mut buffer = mutex_lock(&self.buffer, SOURCE, "finalize");
        if !buffer.open {
            return Err(SinkError::NotInitialized);
        }
        buffer.open = false;
        trace!(target: SOURCE, chunks = buffer.chunks, "Render finalised");
        Ok(buffer.html.clone())
    }

    async fn load_precomputed(&self, markup: &str) -> Result<(), SinkError> {
        let mut buffer = mutex_lock(&self.buffer, SOURCE, "load_precomputed");
        buffer.html.clear();
        buffer.html.push_str(markup);
        buffer.open = false;
        buffer.chunks = 0;
        Ok(())
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.math_dollars = true;
    ext.math_code = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.tasklist_classes = true;
    render.r#unsafe = true;

    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "blockquote",
        "br",
        "code",
        "del",
        "div",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "img",
        "input",
        "li",
        "ol",
        "p",
        "pre",
        "section",
        "span",
        "strong",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]);
    builder.tags(tags);

    let generic: HashSet<&'static str> = HashSet::from([
        "class",
        "id",
        "title",
        "data-footnote-ref",
        "data-footnotes",
        "data-footnote-backref",
        "data-math-style",
    ]);
    builder.generic_attributes(generic);

    builder.add_tag_attributes("img", &["alt", "width", "height"]);
    builder.add_tag_attributes("code", &["data-language", "data-math-style"]);
    builder.add_tag_attributes("pre", &["lang", "data-language"]);
    builder.add_tag_attributes("th", &["align"]);
    builder.add_tag_attributes("td", &["align"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_url_schemes(["http", "https", "mailto"].iter().copied());

    builder
}
