use crate::config::{Config, VaultConfig};
use crate::error::AppError;
use crate::formats;
use crate::highlight::{
    Highlight, HighlightApplier, HighlightStore, Highlights, NewHighlight, OffsetIndex, Position,
    Restoration, TextNodeId, capture,
};
use crate::html::{self, Identity, Sanitizer};
use crate::library::book::BOOK_FORMAT_VERSION;
use crate::library::{self, Book, BookCache, BookDir, BookMetadata, Chapter, Library};
use crate::server::{self, AppState};
use crate::vault::{self, Export, NoteBuilder, Vault};
use axum::{
    body::{self, Body},
    http::{Request, StatusCode, header},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const STORMY: &str = "<p>It was a dark and stormy night.</p>";

fn chapter(index: usize, content: &str) -> Chapter {
    Chapter {
        index,
        href: format!("OEBPS/ch{index}.xhtml"),
        title: format!("Chapter {}", index + 1),
        content: content.to_string(),
        plain_text_len: OffsetIndex::from_html(content).total_len(),
    }
}

fn sample_book(id: &str, contents: &[&str]) -> Book {
    Book {
        id: id.to_string(),
        metadata: BookMetadata {
            title: "Sample".to_string(),
            authors: vec!["Ann Author".to_string()],
            ..BookMetadata::default()
        },
        chapters: contents
            .iter()
            .enumerate()
            .map(|(i, c)| chapter(i, c))
            .collect(),
        toc: Vec::new(),
        images: BTreeMap::new(),
        cover_image: None,
        source_file: format!("{id}.epub"),
        processed_at: Utc::now(),
        version: BOOK_FORMAT_VERSION.to_string(),
    }
}

fn library_with(contents: &[&str]) -> (TempDir, Library, Book) {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("sample_data", contents);
    let dir = BookDir::at(tmp.path().join(&book.id));
    std::fs::create_dir_all(dir.path()).unwrap();
    dir.save_book(&book).unwrap();
    let library = Library::new(tmp.path());
    (tmp, library, book)
}

fn highlight(id: &str, start: usize, end: usize, text: &str) -> Highlight {
    Highlight {
        id: id.to_string(),
        chapter_index: 0,
        start,
        end,
        text: text.to_string(),
        created_at: Utc::now(),
    }
}

fn new_highlight(chapter_index: usize, start: usize, end: usize, text: &str) -> NewHighlight {
    NewHighlight {
        chapter_index,
        start,
        end,
        text: text.to_string(),
    }
}

fn mark(id: &str, inner: &str) -> String {
    format!("<mark class=\"highlight\" data-highlight-id=\"{id}\">{inner}</mark>")
}

// ============================================================================
// OFFSET INDEX
// ============================================================================

#[derive(Deserialize)]
struct OffsetVector {
    name: String,
    html: String,
    text: String,
    total: usize,
    locate: Vec<(usize, usize, usize)>,
}

#[test]
fn offsets_shared_vectors() {
    let vectors: Vec<OffsetVector> =
        serde_json::from_str(include_str!("../tests/fixtures/offset_vectors.json")).unwrap();
    assert!(!vectors.is_empty());

    for v in vectors {
        let index = OffsetIndex::from_html(&v.html);
        assert_eq!(index.text(), v.text, "{}", v.name);
        assert_eq!(index.total_len(), v.total, "{}", v.name);

        for (offset, node, local) in v.locate {
            let position = index.locate(offset);
            assert_eq!(
                position,
                Some(Position {
                    node: TextNodeId(node),
                    offset: local
                }),
                "{}: locate({offset})",
                v.name
            );
            assert_eq!(position.and_then(|p| index.offset_of(p)), Some(offset));
        }
    }
}

#[test]
fn offsets_are_stable_across_builds() {
    let content = "<h1>Title</h1><p>One <em>two</em> three</p><ul><li>four</li></ul>";
    let first = OffsetIndex::from_html(content);
    let second = OffsetIndex::from_html(content);

    assert_eq!(first.segments(), second.segments());
    assert_eq!(first.text(), second.text());
    assert_eq!(first.text(), "TitleOne two threefour");
}

#[test]
fn offsets_end_prefers_preceding_node() {
    let index = OffsetIndex::from_html("<p>ab<b>cd</b></p>");

    assert_eq!(
        index.locate(2),
        Some(Position {
            node: TextNodeId(1),
            offset: 0
        })
    );
    assert_eq!(
        index.locate_end(2),
        Some(Position {
            node: TextNodeId(0),
            offset: 2
        })
    );
    assert_eq!(
        index.locate(4),
        Some(Position {
            node: TextNodeId(1),
            offset: 2
        })
    );
}

#[test]
fn offsets_out_of_range_are_rejected() {
    let index = OffsetIndex::from_html(STORMY);
    assert_eq!(index.locate(32), None);
    assert_eq!(index.locate_end(32), None);
    assert_eq!(index.slice(30, 32), None);

    let empty = OffsetIndex::from_html("<p></p><img src=\"a.png\">");
    assert_eq!(empty.total_len(), 0);
    assert_eq!(empty.locate(0), None);
}

#[test]
fn offsets_slice_and_find_count_characters() {
    let index = OffsetIndex::from_html("<p>héllo <i>wörld</i></p>");

    assert_eq!(index.slice(1, 2), Some("é"));
    assert_eq!(index.slice(6, 11), Some("wörld"));
    assert_eq!(index.find_text("wörld"), Some((6, 11)));
    assert_eq!(index.find_text("missing"), None);
    assert_eq!(index.find_text(""), None);
}

// ============================================================================
// HIGHLIGHT APPLIER
// ============================================================================

#[test]
fn applier_without_highlights_returns_content() {
    let content = "<p>Untouched <b>content</b></p>";
    let applied = HighlightApplier::default().apply(content, &[]);
    assert_eq!(applied.html, content);
    assert!(applied.outcomes.is_empty());
}

#[test]
fn applier_wraps_exact_offsets() {
    let content = "<h1>1.</h1><p>It was a dark and stormy night.</p>";
    let index = OffsetIndex::from_html(content);
    assert_eq!(index.slice(11, 15), Some("dark"));

    let applied = HighlightApplier::default().apply(content, &[highlight("h1", 11, 15, "dark")]);

    assert_eq!(
        applied.html,
        format!(
            "<h1>1.</h1><p>It was a {} and stormy night.</p>",
            mark("h1", "dark")
        )
    );
    assert_eq!(applied.outcomes, vec![("h1".to_string(), Restoration::Offsets)]);
}

#[test]
fn applier_restores_non_overlapping_highlights_in_one_pass() {
    // Created in reverse document order.
    let highlights = vec![
        highlight("late", 25, 30, "night"),
        highlight("early", 9, 13, "dark"),
    ];
    let applied = HighlightApplier::default().apply(STORMY, &highlights);

    assert_eq!(
        applied.html,
        format!(
            "<p>It was a {} and stormy {}.</p>",
            mark("early", "dark"),
            mark("late", "night")
        )
    );
    assert_eq!(applied.restored(), 2);
}

#[test]
fn applier_splits_spans_across_elements() {
    let content = "<p>ab<em>cd</em>ef</p>";
    let applied = HighlightApplier::default().apply(content, &[highlight("x", 1, 5, "bcde")]);

    assert_eq!(
        applied.html,
        format!(
            "<p>a{}<em>{}</em>{}f</p>",
            mark("x", "b"),
            mark("x", "cd"),
            mark("x", "e")
        )
    );
}

#[test]
fn applier_nests_overlapping_highlights_in_creation_order() {
    let content = "<p>abcdef</p>";
    let highlights = vec![highlight("a", 0, 4, "abcd"), highlight("b", 2, 6, "cdef")];
    let applied = HighlightApplier::default().apply(content, &highlights);

    assert_eq!(
        applied.html,
        format!(
            "<p>{}{}{}</p>",
            mark("a", "ab"),
            mark("a", &mark("b", "cd")),
            mark("b", "ef")
        )
    );
}

#[test]
fn applier_duplicate_span_wraps_twice() {
    let highlights = vec![
        highlight("first", 9, 13, "dark"),
        highlight("second", 9, 13, "dark"),
    ];
    let applied = HighlightApplier::default().apply(STORMY, &highlights);

    assert_eq!(
        applied.html,
        format!(
            "<p>It was a {} and stormy night.</p>",
            mark("first", &mark("second", "dark"))
        )
    );
}

#[test]
fn applier_falls_back_to_text_search() {
    // Offsets recorded against a longer version of the chapter.
    let content = "<p>The night was dark.</p>";
    let applied = HighlightApplier::default().apply(content, &[highlight("moved", 40, 44, "dark")]);

    assert_eq!(
        applied.html,
        format!("<p>The night was {}.</p>", mark("moved", "dark"))
    );
    assert_eq!(applied.outcomes[0].1, Restoration::TextSearch);
}

#[test]
fn applier_fallback_picks_first_occurrence() {
    let content = "<p>dark, darker, dark</p>";
    let applied = HighlightApplier::default().apply(content, &[highlight("d", 50, 54, "dark")]);

    assert_eq!(
        applied.html,
        format!("<p>{}, darker, dark</p>", mark("d", "dark"))
    );
}

#[test]
fn applier_skips_missing_highlight_and_keeps_others() {
    let highlights = vec![
        highlight("gone", 100, 107, "vanished"),
        highlight("kept", 9, 13, "dark"),
    ];
    let applied = HighlightApplier::default().apply(STORMY, &highlights);

    assert_eq!(
        applied.html,
        format!("<p>It was a {} and stormy night.</p>", mark("kept", "dark"))
    );
    assert_eq!(
        applied.outcomes,
        vec![
            ("gone".to_string(), Restoration::Missed),
            ("kept".to_string(), Restoration::Offsets),
        ]
    );
}

#[test]
fn applier_render_is_idempotent() {
    let content = "<h2>Intro</h2><p>One <em>two</em> three</p><p>four five</p>";
    let highlights = vec![highlight("a", 3, 10, "oOne two"), highlight("b", 12, 20, "ee")];
    let applier = HighlightApplier::default();

    let first = applier.apply(content, &highlights);
    let second = applier.apply(content, &highlights);
    assert_eq!(first.html, second.html);
    assert_eq!(first.outcomes, second.outcomes);
}

#[test]
fn applier_output_keeps_text_offsets() {
    let content = "<p>It was <em>a dark</em> and stormy night.</p>";
    let applied = HighlightApplier::default().apply(content, &[highlight("x", 4, 20, "as a dark and st")]);

    let rendered = OffsetIndex::from_html(&applied.html);
    assert_eq!(rendered.text(), OffsetIndex::from_html(content).text());
    assert_eq!(rendered.slice(4, 20), Some("as a dark and st"));
}

#[test]
fn applier_leaves_text_only_elements_unwrapped() {
    for tag in ["textarea", "title", "xmp", "noscript"] {
        let content = format!("<p>ab</p><{tag}>hello</{tag}><p>cd</p>");
        let stored = OffsetIndex::from_html(&content);
        assert_eq!(stored.find_text("cd"), Some((7, 9)), "{tag}");

        let applied = HighlightApplier::default().apply(&content, &[highlight("h", 2, 7, "hello")]);
        assert_eq!(applied.html, content, "{tag}");

        let rendered = OffsetIndex::from_html(&applied.html);
        assert_eq!(rendered.text(), stored.text(), "{tag}");
        assert_eq!(rendered.find_text("cd"), Some((7, 9)), "{tag}");
    }
}

#[test]
fn applier_span_into_textarea_wraps_only_markup_text() {
    let content = "<p>ab</p><textarea>hello</textarea><p>cd</p>";
    let applied = HighlightApplier::default().apply(content, &[highlight("h", 0, 9, "abhellocd")]);

    assert_eq!(
        applied.html,
        format!(
            "<p>{}</p><textarea>hello</textarea><p>{}</p>",
            mark("h", "ab"),
            mark("h", "cd")
        )
    );
    let rendered = OffsetIndex::from_html(&applied.html);
    assert_eq!(rendered.text(), OffsetIndex::from_html(content).text());
}

#[test]
fn applier_escapes_text_and_uses_marker_class() {
    let content = "<p>Tom &amp; Jerry</p>";
    let applied = HighlightApplier::new("hl").apply(content, &[highlight("amp", 4, 5, "&")]);

    assert_eq!(
        applied.html,
        "<p>Tom <mark class=\"hl\" data-highlight-id=\"amp\">&amp;</mark> Jerry</p>"
    );
}

// ============================================================================
// HIGHLIGHT STORE
// ============================================================================

#[test]
fn store_create_list_delete_round_trip() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY, "<p>Second chapter.</p>"]);
    let store = HighlightStore::open(tmp.path().join("highlights.json"));

    assert!(store.list(0).unwrap().is_empty());

    let created = store.create(&book, new_highlight(0, 9, 13, "dark")).unwrap();
    assert_eq!(created.start, 9);
    assert_eq!(created.end, 13);
    assert_eq!(created.text, "dark");
    assert!(!created.id.is_empty());

    assert_eq!(store.list(0).unwrap(), vec![created.clone()]);
    assert!(store.list(1).unwrap().is_empty());

    let removed = store.delete(&created.id).unwrap();
    assert_eq!(removed.id, created.id);
    assert!(store.list(0).unwrap().is_empty());
    assert!(store.all().unwrap().is_empty());
}

#[test]
fn store_keeps_creation_order() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY]);
    let store = HighlightStore::open(tmp.path().join("highlights.json"));

    let night = store.create(&book, new_highlight(0, 25, 30, "night")).unwrap();
    let dark = store.create(&book, new_highlight(0, 9, 13, "dark")).unwrap();

    let ids: Vec<String> = store.list(0).unwrap().into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![night.id, dark.id]);
}

#[test]
fn store_rejects_invalid_bounds() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY]);
    let store = HighlightStore::open(tmp.path().join("highlights.json"));

    for new in [
        new_highlight(0, 5, 5, ""),
        new_highlight(0, 6, 5, "x"),
        new_highlight(0, 20, 32, "too long"),
        new_highlight(3, 0, 4, "It w"),
    ] {
        let err = store.create(&book, new).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{err}");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    assert!(!store.path().exists());
}

#[test]
fn store_accepts_highlight_ending_at_chapter_end() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY]);
    let store = HighlightStore::open(tmp.path().join("highlights.json"));

    let created = store.create(&book, new_highlight(0, 25, 31, "night.")).unwrap();
    assert_eq!(created.end, book.chapters[0].plain_text_len);
}

#[test]
fn store_delete_unknown_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY]);
    let store = HighlightStore::open(tmp.path().join("highlights.json"));
    store.create(&book, new_highlight(0, 9, 13, "dark")).unwrap();

    let err = store.delete("nope").unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(store.all().unwrap().len(), 1);
}

#[test]
fn store_file_is_plain_json_array_without_leftovers() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY]);
    let store = HighlightStore::open(tmp.path().join("highlights.json"));

    store.create(&book, new_highlight(0, 9, 13, "dark")).unwrap();
    store.create(&book, new_highlight(0, 25, 30, "night")).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let records = value.as_array().unwrap();
    assert_eq!(records.len(), 2);
    for key in ["id", "chapter_index", "start", "end", "text", "created_at"] {
        assert!(records[0].get(key).is_some(), "missing {key}");
    }

    let entries: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["highlights.json".to_string()]);
}

#[test]
fn store_write_failure_reports_error() {
    let tmp = TempDir::new().unwrap();
    let book = sample_book("b", &[STORMY]);
    let store = HighlightStore::open(tmp.path().join("missing").join("highlights.json"));

    let err = store.create(&book, new_highlight(0, 9, 13, "dark")).unwrap_err();
    assert!(matches!(err, AppError::Io(_)));
    assert!(store.all().unwrap().is_empty());
}

#[test]
fn store_concurrent_creates_are_not_lost() {
    let (_tmp, library, book) = library_with(&[STORMY]);
    let highlights = Highlights::new(library);
    highlights.create(&book, new_highlight(0, 0, 2, "It")).unwrap();
    let before = highlights.all(&book.id).unwrap().len();

    let barrier = std::sync::Barrier::new(2);
    std::thread::scope(|s| {
        for (start, end, text) in [(9, 13, "dark"), (25, 30, "night")] {
            let (highlights, book, barrier) = (&highlights, &book, &barrier);
            s.spawn(move || {
                barrier.wait();
                highlights
                    .create(book, new_highlight(0, start, end, text))
                    .unwrap();
            });
        }
    });

    assert_eq!(highlights.all(&book.id).unwrap().len(), before + 2);
}

#[test]
fn store_many_writers_serialize() {
    let (_tmp, library, book) = library_with(&[STORMY]);
    let highlights = Highlights::new(library);

    std::thread::scope(|s| {
        for i in 0..12 {
            let (highlights, book) = (&highlights, &book);
            s.spawn(move || {
                highlights
                    .create(book, new_highlight(0, i, i + 1, "x"))
                    .unwrap();
            });
        }
    });

    let all = highlights.all(&book.id).unwrap();
    assert_eq!(all.len(), 12);
    let mut starts: Vec<usize> = all.iter().map(|h| h.start).collect();
    starts.sort_unstable();
    assert_eq!(starts, (0..12).collect::<Vec<_>>());
}

#[test]
fn store_unknown_book_is_not_found() {
    let (_tmp, library, _book) = library_with(&[STORMY]);
    let highlights = Highlights::new(library);

    assert!(matches!(
        highlights.list("other_data", 0),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        highlights.delete("../sample_data", "x"),
        Err(AppError::NotFound(_))
    ));
}

// ============================================================================
// SELECTION CAPTURE
// ============================================================================

#[test]
fn selection_capture_orders_endpoints() {
    let content = "<p>It was <em>a dark</em> and stormy night.</p>";
    let index = OffsetIndex::from_html(content);
    let anchor = Position {
        node: TextNodeId(1),
        offset: 6,
    };
    let focus = Position {
        node: TextNodeId(1),
        offset: 2,
    };

    let captured = capture(&index, 0, anchor, focus).unwrap();
    assert_eq!((captured.start, captured.end), (9, 13));
    assert_eq!(captured.text, "dark");
}

#[test]
fn selection_capture_across_nodes_restores_exactly() {
    let (_tmp, library, book) = library_with(&["<p>It was <em>a dark</em> and stormy night.</p>"]);
    let index = OffsetIndex::from_html(&book.chapters[0].content);
    let captured = capture(
        &index,
        0,
        Position {
            node: TextNodeId(0),
            offset: 3,
        },
        Position {
            node: TextNodeId(2),
            offset: 4,
        },
    )
    .unwrap();
    assert_eq!(captured.text, "was a dark and");

    let highlights = Highlights::new(library);
    let stored = highlights.create(&book, captured.into()).unwrap();
    let applied = HighlightApplier::default().apply(&book.chapters[0].content, &[stored.clone()]);

    assert_eq!(
        applied.html,
        format!(
            "<p>It {}<em>{}</em>{} stormy night.</p>",
            mark(&stored.id, "was "),
            mark(&stored.id, "a dark"),
            mark(&stored.id, " and")
        )
    );
}

#[test]
fn selection_capture_on_rendered_page_matches_stored_offsets() {
    let applied = HighlightApplier::default().apply(STORMY, &[highlight("old", 9, 13, "dark")]);
    let rendered = OffsetIndex::from_html(&applied.html);

    // "stormy" lies in the text node after the marker.
    let start = Position {
        node: TextNodeId(2),
        offset: 5,
    };
    let end = Position {
        node: TextNodeId(2),
        offset: 11,
    };
    let captured = capture(&rendered, 0, start, end).unwrap();

    assert_eq!(captured.text, "stormy");
    assert_eq!(OffsetIndex::from_html(STORMY).slice(captured.start, captured.end), Some("stormy"));
}

#[test]
fn selection_rejects_whitespace_and_empty() {
    let index = OffsetIndex::from_html("<p>one</p> <p>two</p>");
    let at = |node, offset| Position {
        node: TextNodeId(node),
        offset,
    };

    assert!(matches!(
        capture(&index, 0, at(1, 0), at(1, 1)),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        capture(&index, 0, at(0, 2), at(0, 2)),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        capture(&index, 0, at(0, 0), at(9, 0)),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn selection_client_script_walks_text_nodes() {
    let script = crate::highlight::CLIENT_SCRIPT;
    assert!(script.contains("NodeFilter.SHOW_TEXT"));
    assert!(script.contains("/api/highlights"));
    assert!(script.contains("chapter-content"));
}

// ============================================================================
// HTML
// ============================================================================

#[test]
fn html_identity_serialization_round_trips() {
    let content = "<p class=\"x\">a &lt; b &amp; c<br><img alt=\"A &quot;q&quot;\"></p>";
    let fragment = html::parse_fragment(content);
    let out = html::serialize_children(fragment.root_element(), &mut Identity);
    assert_eq!(out, content);
}

#[test]
fn html_sanitizer_strips_active_content_and_rewrites_images() {
    let mut images = BTreeMap::new();
    images.insert("OEBPS/Images/pic 1.png".to_string(), "images/pic1.png".to_string());

    let source = concat!(
        "<html><head><title>t</title><style>p{}</style></head><body>",
        "<p onclick=\"x()\">Hi<script>alert(1)</script></p>",
        "<!-- note -->",
        "<a href=\"javascript:evil()\">l</a>",
        "<img src=\"../Images/pic%201.png\">",
        "<form><input value=\"v\"></form>",
        "</body></html>"
    );
    let cleaned = Sanitizer::new(&images, "OEBPS/Text").sanitize_document(source);

    assert_eq!(cleaned, "<p>Hi</p><a>l</a><img src=\"images/pic1.png\">");
}

#[test]
fn html_resolve_image_falls_back_to_file_name() {
    let mut images = BTreeMap::new();
    images.insert("cover.jpg".to_string(), "images/cover.jpg".to_string());

    assert_eq!(
        html::resolve_image(&images, "OEBPS/Text", "../../elsewhere/cover.jpg"),
        Some(&"images/cover.jpg".to_string())
    );
    assert_eq!(html::resolve_image(&images, "OEBPS", "nothing.png"), None);
}

#[test]
fn html_join_path_resolves_dots() {
    assert_eq!(html::join_path("OEBPS/Text", "../Images/a.png"), "OEBPS/Images/a.png");
    assert_eq!(html::join_path("", "./a/b.xhtml"), "a/b.xhtml");
    assert_eq!(html::join_path("OEBPS", "/root.xhtml"), "root.xhtml");
}

#[test]
fn html_strip_tags_collapses_whitespace() {
    assert_eq!(html::strip_tags("<p>Hello <b>world</b></p>\n<p> again </p>"), "Hello world again");
}

// ============================================================================
// LIBRARY
// ============================================================================

#[test]
fn library_lists_processed_books_only() {
    let (tmp, library, book) = library_with(&[STORMY]);
    std::fs::create_dir_all(tmp.path().join("empty_data")).unwrap();
    std::fs::create_dir_all(tmp.path().join("notes")).unwrap();

    let ids: Vec<String> = library
        .list()
        .unwrap()
        .iter()
        .map(|d| d.id().to_string())
        .collect();
    assert_eq!(ids, vec![book.id.clone()]);

    let loaded = library.book_dir(&book.id).unwrap().load_book().unwrap();
    assert_eq!(loaded.chapters.len(), 1);
    assert_eq!(loaded.chapters[0].plain_text_len, 31);
}

#[test]
fn library_rejects_unknown_and_traversal_ids() {
    let (_tmp, library, _book) = library_with(&[STORMY]);

    for id in ["missing_data", "..", ".", ""] {
        assert!(
            matches!(library.book_dir(id), Err(AppError::NotFound(_))),
            "{id:?}"
        );
    }
    // Only the final component is used.
    assert_eq!(library.book_dir("../x/sample_data").unwrap().id(), "sample_data");
}

#[test]
fn library_cache_evicts_least_recently_used() {
    let tmp = TempDir::new().unwrap();
    for id in ["a_data", "b_data"] {
        let dir = BookDir::at(tmp.path().join(id));
        std::fs::create_dir_all(dir.path()).unwrap();
        dir.save_book(&sample_book(id, &[STORMY])).unwrap();
    }
    let library = Library::new(tmp.path());
    let cache = BookCache::new(1);

    let a = cache.get_or_load(&library, "a_data").unwrap();
    let again = cache.get_or_load(&library, "a_data").unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &again));

    let b = cache.get_or_load(&library, "b_data").unwrap();
    let reloaded = cache.get_or_load(&library, "a_data").unwrap();
    assert!(!std::sync::Arc::ptr_eq(&a, &reloaded));
    let b_again = cache.get_or_load(&library, "b_data").unwrap();
    assert!(!std::sync::Arc::ptr_eq(&b, &b_again));

    assert!(matches!(
        cache.get_or_load(&library, "c_data"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn library_cache_keys_by_final_path_component() {
    let (_tmp, library, book) = library_with(&[STORMY]);
    let cache = BookCache::new(2);

    let plain = cache.get_or_load(&library, &book.id).unwrap();
    let nested = cache.get_or_load(&library, "x/sample_data").unwrap();
    assert!(std::sync::Arc::ptr_eq(&plain, &nested));

    assert!(matches!(
        cache.get_or_load(&library, ".."),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn library_clean_name_strips_metadata() {
    assert_eq!(
        library::clean_name("Dune -- Frank Herbert -- 1965 -- Ace.epub"),
        Some("Dune.epub".to_string())
    );
    assert_eq!(
        library::clean_name("Dune -- Frank Herbert_data"),
        Some("Dune_data".to_string())
    );
    assert_eq!(
        library::clean_name("Dune -- Frank Herbert.sdr"),
        Some("Dune.sdr".to_string())
    );
    assert_eq!(library::clean_name("Dune.epub"), None);
    assert_eq!(library::clean_name("Dune -- notes.txt"), None);
}

#[test]
fn library_tidy_is_dry_run_by_default_and_never_overwrites() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("Dune -- Frank Herbert.epub"), b"x").unwrap();
    std::fs::write(tmp.path().join("Emma -- Jane Austen.epub"), b"x").unwrap();
    std::fs::write(tmp.path().join("Emma.epub"), b"existing").unwrap();

    let plan = library::tidy(tmp.path(), false).unwrap();
    assert_eq!(plan.len(), 1);
    assert!(!plan[0].applied);
    assert!(tmp.path().join("Dune -- Frank Herbert.epub").exists());

    let done = library::tidy(tmp.path(), true).unwrap();
    assert_eq!(done.len(), 1);
    assert!(done[0].applied);
    assert!(tmp.path().join("Dune.epub").exists());
    assert_eq!(std::fs::read(tmp.path().join("Emma.epub")).unwrap(), b"existing");
    assert!(tmp.path().join("Emma -- Jane Austen.epub").exists());
}

// ============================================================================
// EPUB PROCESSING
// ============================================================================

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>A Stormy Tale</dc:title>
    <dc:creator>Ann Author</dc:creator>
    <dc:creator>Bo Writer</dc:creator>
    <dc:language>fr</dc:language>
    <dc:date>2019-05-01</dc:date>
    <dc:identifier id="uid">urn:uuid:1234</dc:identifier>
    <dc:identifier opf:scheme="ISBN">9780000000001</dc:identifier>
    <dc:subject>Weather</dc:subject>
    <dc:description>&lt;p&gt;A tale of &lt;b&gt;weather&lt;/b&gt;.&lt;/p&gt;</dc:description>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="Text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="Text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="Images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const NAV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Nav</title></head><body><nav epub:type="toc"><ol><li><a href="Text/ch1.xhtml">Chapter One</a></li><li><a href="Text/ch2.xhtml#s1">Chapter Two</a></li></ol></nav></body></html>"#;

const CH1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head><body><p>It was a dark and stormy night.</p><script>alert(1)</script><img src="../Images/cover.jpg"/></body></html>"#;

const CH2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Two</title></head><body><h1 id="s1">Two</h1><p onclick="x()">Second <a href="javascript:void(0)">link</a>.</p></body></html>"#;

fn write_epub(path: &Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    let entries: [(&str, &[u8]); 7] = [
        ("mimetype", b"application/epub+zip"),
        ("META-INF/container.xml", CONTAINER.as_bytes()),
        ("OEBPS/content.opf", OPF.as_bytes()),
        ("OEBPS/nav.xhtml", NAV.as_bytes()),
        ("OEBPS/Text/ch1.xhtml", CH1.as_bytes()),
        ("OEBPS/Text/ch2.xhtml", CH2.as_bytes()),
        ("OEBPS/Images/cover.jpg", b"\xff\xd8\xff\xe0fake-jpeg"),
    ];
    for (name, data) in entries {
        zip.start_file(name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn processed_library() -> (TempDir, Book) {
    let tmp = TempDir::new().unwrap();
    let epub = tmp.path().join("stormy.epub");
    write_epub(&epub);
    let book = formats::process(&epub, tmp.path()).unwrap();
    (tmp, book)
}

#[test]
fn epub_extracts_metadata() {
    let (_tmp, book) = processed_library();
    let meta = &book.metadata;

    assert_eq!(book.id, "stormy_data");
    assert_eq!(meta.title, "A Stormy Tale");
    assert_eq!(meta.authors, vec!["Ann Author", "Bo Writer"]);
    assert_eq!(meta.language, "fr");
    assert_eq!(meta.date.as_deref(), Some("2019-05-01"));
    assert_eq!(meta.identifiers.get("ISBN").map(String::as_str), Some("9780000000001"));
    assert_eq!(meta.identifiers.get("uid").map(String::as_str), Some("urn:uuid:1234"));
    assert_eq!(meta.subjects, vec!["Weather"]);
    assert_eq!(book.source_file, "stormy.epub");
}

#[test]
fn epub_builds_sanitized_chapters_in_spine_order() {
    let (_tmp, book) = processed_library();

    assert_eq!(book.chapters.len(), 2);
    let first = &book.chapters[0];
    assert_eq!(first.href, "OEBPS/Text/ch1.xhtml");
    assert_eq!(first.title, "Chapter One");
    assert_eq!(
        first.content,
        "<p>It was a dark and stormy night.</p><img src=\"images/cover.jpg\">"
    );
    assert_eq!(first.plain_text_len, 31);

    let second = &book.chapters[1];
    assert_eq!(second.title, "Chapter Two");
    assert_eq!(second.content, "<h1 id=\"s1\">Two</h1><p>Second <a>link</a>.</p>");
}

#[test]
fn epub_toc_images_and_cover() {
    let (tmp, book) = processed_library();

    assert_eq!(book.toc.len(), 2);
    assert_eq!(book.toc[1].file_href, "OEBPS/Text/ch2.xhtml");
    assert_eq!(book.toc[1].anchor, "s1");

    assert_eq!(book.cover_image.as_deref(), Some("images/cover.jpg"));
    assert_eq!(
        book.images.get("OEBPS/Images/cover.jpg").map(String::as_str),
        Some("images/cover.jpg")
    );
    assert_eq!(book.images.get("cover.jpg").map(String::as_str), Some("images/cover.jpg"));

    let dir = tmp.path().join("stormy_data");
    assert!(dir.join("images").join("cover.jpg").is_file());
    assert!(dir.join("book.json").is_file());
}

#[test]
fn epub_reprocessing_keeps_highlights() {
    let (tmp, book) = processed_library();
    let highlights = Highlights::new(Library::new(tmp.path()));
    highlights.create(&book, new_highlight(0, 9, 13, "dark")).unwrap();

    let epub = tmp.path().join("stormy.epub");
    let again = formats::process(&epub, tmp.path()).unwrap();

    assert_eq!(again.chapters.len(), book.chapters.len());
    assert_eq!(highlights.list(&again.id, 0).unwrap().len(), 1);
}

#[test]
fn epub_reprocessing_stops_on_unreadable_highlights() {
    let (tmp, _book) = processed_library();
    let dir = tmp.path().join("stormy_data");
    // Readable by nobody as a file, root included.
    let highlights = dir.join("highlights.json");
    std::fs::create_dir(&highlights).unwrap();
    std::fs::write(highlights.join("keep"), b"x").unwrap();

    let err = formats::process(&tmp.path().join("stormy.epub"), tmp.path()).unwrap_err();

    assert!(matches!(err, AppError::Io(_)));
    assert!(highlights.join("keep").is_file());
    assert!(dir.join("book.json").is_file());
}

#[test]
fn epub_process_all_skips_processed_books() {
    let tmp = TempDir::new().unwrap();
    let inbox = tmp.path().join("books");
    std::fs::create_dir_all(&inbox).unwrap();
    write_epub(&inbox.join("one.epub"));
    write_epub(&inbox.join("two.epub"));
    std::fs::write(inbox.join("broken.epub"), b"not a zip").unwrap();
    std::fs::write(inbox.join("notes.txt"), b"ignored").unwrap();

    let first = formats::process_all(&inbox, tmp.path()).unwrap();
    assert_eq!(first.processed, 2);
    assert_eq!(first.failed, 1);
    assert_eq!(first.skipped, 0);

    let second = formats::process_all(&inbox, tmp.path()).unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);

    let ids: Vec<String> = Library::new(tmp.path())
        .list()
        .unwrap()
        .iter()
        .map(|d| d.id().to_string())
        .collect();
    assert_eq!(ids, vec!["one_data", "two_data"]);
}

#[test]
fn epub_missing_inbox_is_empty_batch() {
    let tmp = TempDir::new().unwrap();
    let report = formats::process_all(&tmp.path().join("nope"), tmp.path()).unwrap();
    assert_eq!(report, formats::BatchReport::default());
}

// ============================================================================
// VAULT EXPORT
// ============================================================================

#[test]
fn vault_sanitize_title() {
    assert_eq!(vault::sanitize_title("What? A: \"Title\"/Here"), "What A TitleHere");
    assert_eq!(vault::sanitize_title("  spaced   out  "), "spaced out");

    let long = "The Remarkably Long Title of a Book That Keeps Going On and On";
    let cleaned = vault::sanitize_title(long);
    assert_eq!(cleaned, "The Remarkably Long Title of a Book That Keeps");
    assert!(cleaned.chars().count() <= 50);
}

#[test]
fn vault_published_year() {
    assert_eq!(vault::published_year("2019-05-01T00:00:00Z").as_deref(), Some("2019"));
    assert_eq!(vault::published_year("circa 1997").as_deref(), Some("1997"));
    assert_eq!(vault::published_year("unknown"), None);
}

#[test]
fn vault_note_layout() {
    let mut book = sample_book("b", &[STORMY]);
    book.metadata.title = "The Book".to_string();
    book.metadata.description = Some("<p>A \"quoted\" tale.</p>".to_string());
    book.metadata.date = Some("2019-05-01".to_string());

    let highlights = vec![
        highlight("1", 9, 13, "dark"),
        highlight("2", 0, 17, "line one\nline two"),
    ];
    let note = NoteBuilder::new(&book)
        .created(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        .cover("The Book_cover.jpg")
        .highlights(&highlights)
        .build();

    let expected = concat!(
        "---\n",
        "title: \"The Book\"\n",
        "created: 2024-01-02\n",
        "description: \"A \\\"quoted\\\" tale.\"\n",
        "tags:\n",
        "  - books\n",
        "cover: \"[[The Book_cover.jpg]]\"\n",
        "author:\n",
        "  - \"[[Ann Author]]\"\n",
        "status: want to read\n",
        "published: 2019\n",
        "---\n",
        "![[The Book_cover.jpg]]\n",
        "\n",
        "## notes\n",
        "\n",
        "## highlights\n",
        "\n",
        "> dark\n",
        "\n",
        "> line one\n",
        "> line two\n",
    );
    assert_eq!(note, expected);
}

#[test]
fn vault_note_quotes_wiki_links() {
    let mut book = sample_book("b", &[STORMY]);
    book.metadata.authors = vec!["Ann \"Nan\" Author".to_string()];

    let note = NoteBuilder::new(&book).cover("Sample_cover.jpg").build();

    assert!(note.contains("  - \"[[Ann \\\"Nan\\\" Author]]\"\n"));
    assert!(note.contains("cover: \"[[Sample_cover.jpg]]\"\n"));
}

#[test]
fn vault_note_defaults() {
    let mut book = sample_book("b", &[STORMY]);
    book.metadata.authors.clear();
    book.metadata.description = Some("x".repeat(400));

    let note = NoteBuilder::new(&book).status("reading").build();

    assert!(note.contains("  - \"[[Unknown]]\"\n"));
    assert!(note.contains("status: reading\n"));
    assert!(note.contains(&format!("description: \"{}...\"", "x".repeat(297))));
    assert!(!note.contains("cover:"));
    assert!(!note.contains("## highlights"));
    assert!(!note.contains("published:"));
}

#[test]
fn vault_requires_configured_directories() {
    let err = Vault::from_config(&VaultConfig::default()).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn vault_export_writes_note_once_and_copies_cover() {
    let (tmp, book) = processed_library();
    let highlights = Highlights::new(Library::new(tmp.path()));
    highlights.create(&book, new_highlight(0, 9, 13, "dark")).unwrap();

    let notes = TempDir::new().unwrap();
    let vault = Vault::new(notes.path().join("books"), notes.path().join("Images"));
    let dir = BookDir::at(tmp.path().join(&book.id));

    let note_path = match vault.export_book(&dir).unwrap() {
        Export::Written(path) => path,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(note_path, notes.path().join("books").join("A Stormy Tale.md"));

    let note = std::fs::read_to_string(&note_path).unwrap();
    assert!(note.contains("title: \"A Stormy Tale\""));
    assert!(note.contains("description: \"A tale of weather .\"\n"));
    assert!(note.contains("  - \"[[Bo Writer]]\""));
    assert!(note.contains("cover: \"[[A Stormy Tale_cover.jpg]]\""));
    assert!(note.contains("> dark\n"));
    assert!(notes.path().join("Images").join("A Stormy Tale_cover.jpg").is_file());

    assert!(matches!(vault.export_book(&dir).unwrap(), Export::Skipped(_)));

    let library = Library::new(tmp.path());
    assert_eq!(vault.export_all(&library).unwrap(), (0, 1));
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "My Books"

[library]
dir = "/srv/books"
cache_capacity = 3

[vault]
books_dir = "/notes/books"
images_dir = "/notes/Images"

[highlights]
marker_class = "hl"
"#;
    let config = Config::parse(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "My Books");
    assert_eq!(config.library.dir, Path::new("/srv/books"));
    assert_eq!(config.library.inbox, Path::new("books"));
    assert_eq!(config.library.cache_capacity, 3);
    assert_eq!(config.vault.status, "want to read");
    assert_eq!(config.highlights.marker_class, "hl");
    assert!(Vault::from_config(&config.vault).is_ok());
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8123);
    assert_eq!(config.library.cache_capacity, 10);
    assert_eq!(config.highlights.marker_class, "highlight");
    assert!(config.vault.books_dir.is_none());
}

#[test]
fn config_generated_default_parses() {
    let config = Config::parse(&Config::generate_default()).unwrap();
    assert_eq!(config.server.bind.port(), 8123);
    assert_eq!(config.library.inbox, Path::new("books"));
}

#[test]
fn config_invalid_toml_is_config_error() {
    assert!(matches!(
        Config::parse("[server]\nbind = 12"),
        Err(AppError::Config(_))
    ));
}

// ============================================================================
// HTTP
// ============================================================================

fn test_app() -> (TempDir, axum::Router, Book) {
    let (tmp, book) = processed_library();
    let mut config = Config::default();
    config.library.dir = tmp.path().to_path_buf();
    config.library.inbox = tmp.path().join("inbox");
    let app = server::create_router(AppState::new(config));
    (tmp, app, book)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn server_highlight_lifecycle() {
    let (_tmp, app, book) = test_app();
    let list_uri = format!("/api/highlights/{}/0", book.id);

    let (status, bytes) = send(&app, get(&list_uri)).await;
    assert_eq!(status, StatusCode::OK);
    let list: server::HighlightList = serde_json::from_slice(&bytes).unwrap();
    assert!(list.highlights.is_empty());

    let (status, bytes) = send(
        &app,
        json_request(
            "POST",
            "/api/highlights",
            serde_json::json!({
                "book_id": book.id,
                "chapter_index": 0,
                "start": 9,
                "end": 13,
                "text": "dark"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created: Highlight = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(created.text, "dark");

    let (_, bytes) = send(&app, get(&list_uri)).await;
    let list: server::HighlightList = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(list.highlights, vec![created.clone()]);

    let (status, bytes) = send(&app, get(&format!("/read/{}/0", book.id))).await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(bytes).unwrap();
    assert!(page.contains(&format!(
        "<p>It was a {} and stormy night.</p>",
        mark(&created.id, "dark")
    )));
    assert!(page.contains("/static/reader.js"));

    let delete = serde_json::json!({
        "book_id": book.id,
        "highlight_id": created.id,
        "chapter_index": 0
    });
    let (status, bytes) = send(&app, json_request("DELETE", "/api/highlights", delete.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let deleted: server::DeleteHighlightResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(deleted.status, "deleted");
    assert_eq!(deleted.id, created.id);

    let (status, _) = send(&app, json_request("DELETE", "/api/highlights", delete)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bytes) = send(&app, get(&format!("/read/{}/0", book.id))).await;
    assert!(!String::from_utf8(bytes).unwrap().contains("<mark"));
}

#[tokio::test]
async fn server_rejects_invalid_highlight() {
    let (_tmp, app, book) = test_app();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/highlights",
            serde_json::json!({
                "book_id": book.id,
                "chapter_index": 0,
                "start": 20,
                "end": 99,
                "text": "x"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/highlights",
            serde_json::json!({
                "book_id": "nobody_data",
                "chapter_index": 0,
                "start": 0,
                "end": 1,
                "text": "x"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_reading_routes() {
    let (_tmp, app, book) = test_app();

    let response = app
        .clone()
        .oneshot(get(&format!("/read/{}", book.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/read/stormy_data/0"
    );

    let (status, _) = send(&app, get(&format!("/read/{}/9", book.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/read/unknown_data/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, bytes) = send(&app, get(&format!("/read/{}/images/cover.jpg", book.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"\xff\xd8"));

    let (status, _) = send(&app, get(&format!("/cover/{}", book.id))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, bytes) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(bytes).unwrap().contains("A Stormy Tale"));

    let (status, bytes) = send(&app, get("/static/reader.js")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(bytes).unwrap().contains("SHOW_TEXT"));
}

#[tokio::test]
async fn server_book_metadata_omits_content() {
    let (_tmp, app, book) = test_app();

    let (status, bytes) = send(&app, get(&format!("/api/books/{}", book.id))).await;
    assert_eq!(status, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["metadata"]["title"], "A Stormy Tale");
    assert_eq!(value["chapters"].as_array().unwrap().len(), 2);
    assert!(value["chapters"][0].get("content").is_none());
    assert_eq!(value["chapters"][0]["plain_text_len"], 31);
}
