//! HTML fragment serialization.
//!
//! Chapters are stored as body-level HTML fragments. Every transformation of a
//! fragment (sanitizing at processing time, wrapping highlights at render time)
//! is a single walk over the parsed tree that writes a fresh string through a
//! [`Rewriter`]. The parsed tree itself is never mutated.

use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];

/// Elements whose content is parsed as escapable text, never as markup.
const RCDATA_ELEMENTS: &[&str] = &["textarea", "title"];

/// Elements removed from chapter content, with their subtree.
const STRIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "video", "nav", "form", "button", "input",
];

/// Hooks applied while serializing a tree.
pub trait Rewriter {
    /// Return `false` to drop the element and its whole subtree.
    fn keep_element(&mut self, _element: &Element) -> bool {
        true
    }

    /// Rewrite an attribute value. Returning `None` drops the attribute.
    fn attribute<'a>(
        &mut self,
        _element: &Element,
        _name: &str,
        value: &'a str,
    ) -> Option<Cow<'a, str>> {
        Some(Cow::Borrowed(value))
    }

    /// Write one text node. Called once per text node, in document order.
    fn text(&mut self, parent: &Element, text: &str, out: &mut String) {
        write_text(parent, text, out);
    }
}

/// Serializer that leaves the tree untouched.
pub struct Identity;

impl Rewriter for Identity {}

/// Parse a stored chapter fragment.
pub fn parse_fragment(content: &str) -> Html {
    Html::parse_fragment(content)
}

/// Serialize the children of `element` (not the element itself).
pub fn serialize_children(element: ElementRef<'_>, rewriter: &mut impl Rewriter) -> String {
    let mut out = String::new();
    write_children(element, rewriter, &mut out);
    out
}

fn write_children(element: ElementRef<'_>, rewriter: &mut impl Rewriter, out: &mut String) {
    let parent = element.value();

    for child in element.children() {
        match child.value() {
            Node::Text(text) => rewriter.text(parent, text, out),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, rewriter, out);
                }
            }
            // Comments, doctypes and processing instructions are not content.
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, rewriter: &mut impl Rewriter, out: &mut String) {
    let value = element.value();
    if !rewriter.keep_element(value) {
        return;
    }

    let name = value.name();
    out.push('<');
    out.push_str(name);
    for (attr, raw) in value.attrs() {
        if let Some(rewritten) = rewriter.attribute(value, attr, raw) {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            escape_attribute(&rewritten, out);
            out.push('"');
        }
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    write_children(element, rewriter, out);

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Whether a browser reads the children of `element` as text only, so any
/// markup written inside would show up as literal characters.
pub fn is_text_only(element: &Element) -> bool {
    let name = element.name();
    RAW_TEXT_ELEMENTS.contains(&name) || RCDATA_ELEMENTS.contains(&name)
}

/// Default text serialization: escaped, except inside raw-text elements.
pub fn write_text(parent: &Element, text: &str, out: &mut String) {
    if RAW_TEXT_ELEMENTS.contains(&parent.name()) {
        out.push_str(text);
    } else {
        escape_text(text, out);
    }
}

/// Escape text content.
pub fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Escape an attribute value (double-quoted).
pub fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Escape a string for embedding in a page template.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text(text, &mut out);
    out.replace('"', "&quot;")
}

/// Plain text of an HTML snippet, whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Chapter sanitizer used by the EPUB pipeline.
///
/// Drops active content and comments, strips event handlers and `javascript:`
/// URLs, and points `<img src>` at the extracted copies under `images/`.
pub struct Sanitizer<'a> {
    images: &'a BTreeMap<String, String>,
    base_dir: &'a str,
}

impl<'a> Sanitizer<'a> {
    /// Create a sanitizer for a document living in `base_dir` inside the container.
    pub fn new(images: &'a BTreeMap<String, String>, base_dir: &'a str) -> Self {
        Self { images, base_dir }
    }

    /// Sanitize a full (X)HTML document and return the body's inner HTML.
    pub fn sanitize_document(&mut self, source: &str) -> String {
        let document = Html::parse_document(source);
        let body = Selector::parse("body")
            .ok()
            .and_then(|selector| document.select(&selector).next());

        match body {
            Some(body) => serialize_children(body, self),
            None => serialize_children(document.root_element(), self),
        }
    }

    /// Resolve an `<img src>` against the extracted image map.
    pub fn resolve_image(&self, src: &str) -> Option<&'a String> {
        resolve_image(self.images, self.base_dir, src)
    }
}

impl Rewriter for Sanitizer<'_> {
    fn keep_element(&mut self, element: &Element) -> bool {
        !STRIPPED_ELEMENTS.contains(&element.name())
    }

    fn attribute<'v>(
        &mut self,
        element: &Element,
        name: &str,
        value: &'v str,
    ) -> Option<Cow<'v, str>> {
        if name.starts_with("on") {
            return None;
        }
        if (name == "href" || name == "src")
            && value.trim().to_lowercase().starts_with("javascript:")
        {
            return None;
        }
        if element.name() == "img"
            && name == "src"
            && let Some(local) = self.resolve_image(value)
        {
            return Some(Cow::Owned(local.clone()));
        }
        Some(Cow::Borrowed(value))
    }
}

/// Look up an image reference the way chapter HTML tends to spell it:
/// URL-decoded, relative to the document, then by bare file name.
pub fn resolve_image<'m>(
    images: &'m BTreeMap<String, String>,
    base_dir: &str,
    src: &str,
) -> Option<&'m String> {
    let decoded = urlencoding::decode(src)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| src.to_string());

    let joined = join_path(base_dir, &decoded);
    let filename = decoded.rsplit('/').next().unwrap_or(&decoded);

    images
        .get(&joined)
        .or_else(|| images.get(&decoded))
        .or_else(|| images.get(filename))
}

/// Join a relative reference onto a container directory, resolving `.` and `..`.
pub fn join_path(base_dir: &str, reference: &str) -> String {
    let mut parts: Vec<&str> = if reference.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|p| !p.is_empty()).collect()
    };

    for part in reference.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    parts.join("/")
}
