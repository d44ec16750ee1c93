//! HTML page templates.

use crate::html::escape;
use crate::library::{Book, TocEntry};

const STYLE: &str = r#"
    body { font-family: Georgia, serif; margin: 0; color: #222; background: #fdfdfb; }
    a { color: #0066cc; text-decoration: none; }
    .library { max-width: 760px; margin: 2rem auto; padding: 0 1rem; }
    .book { display: flex; gap: 1rem; padding: 1rem 0; border-bottom: 1px solid #eee; }
    .book img { width: 64px; height: 96px; object-fit: cover; background: #eee; }
    .meta { color: #666; font-size: 0.9rem; }
    .layout { display: flex; }
    nav.toc { width: 260px; height: 100vh; overflow-y: auto; position: sticky; top: 0;
              padding: 1rem; border-right: 1px solid #eee; font-family: system-ui, sans-serif; font-size: 0.9rem; }
    nav.toc ul { list-style: none; padding-left: 1rem; margin: 0; }
    nav.toc li.current > a { font-weight: bold; }
    main { flex: 1; max-width: 720px; margin: 0 auto; padding: 2rem 1rem; line-height: 1.6; }
    main img { max-width: 100%; }
    .pager { display: flex; justify-content: space-between; margin: 2rem 0; font-family: system-ui, sans-serif; }
    .highlight-button { position: absolute; z-index: 10; padding: 0.3rem 0.6rem; }
"#;

fn page(title: &str, extra_style: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>{STYLE}{extra_style}</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
    )
}

/// Library listing.
pub fn library_page(title: &str, books: &[Book]) -> String {
    let mut body = format!(
        "<div class=\"library\">\n<h1>{}</h1>\n",
        escape(title)
    );

    if books.is_empty() {
        body.push_str("<p>No processed books yet. Drop EPUB files in the inbox folder and restart, or run <code>reader-rs process-all</code>.</p>\n");
    }

    for book in books {
        let id = urlencoding::encode(&book.id);
        let cover = if book.cover_image.is_some() {
            format!("<img src=\"/cover/{id}\" alt=\"\">")
        } else {
            String::new()
        };
        body.push_str(&format!(
            "<div class=\"book\">{cover}<div><a href=\"/read/{id}\">{title}</a>\
             <div class=\"meta\">{authors} &middot; {chapters} chapters</div></div></div>\n",
            title = escape(&book.metadata.title),
            authors = escape(&book.authors_display()),
            chapters = book.chapters.len(),
        ));
    }

    body.push_str("</div>");
    page(title, "", &body)
}

fn toc_list(book: &Book, entries: &[TocEntry], current: usize, out: &mut String) {
    out.push_str("<ul>");
    for entry in entries {
        let target = book.chapter_for(&entry.file_href);
        let class = if target.is_some_and(|c| c.index == current) {
            " class=\"current\""
        } else {
            ""
        };

        out.push_str(&format!("<li{class}>"));
        match target {
            Some(chapter) => {
                let anchor = if entry.anchor.is_empty() {
                    String::new()
                } else {
                    format!("#{}", escape(&entry.anchor))
                };
                out.push_str(&format!(
                    "<a href=\"/read/{}/{}{anchor}\">{}</a>",
                    urlencoding::encode(&book.id),
                    chapter.index,
                    escape(&entry.title)
                ));
            }
            None => out.push_str(&escape(&entry.title)),
        }
        if !entry.children.is_empty() {
            toc_list(book, &entry.children, current, out);
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
}

/// Reading page for one chapter. `content` already carries highlight markers.
pub fn chapter_page(book: &Book, index: usize, content: &str, marker_class: &str) -> String {
    let id = urlencoding::encode(&book.id);
    let chapter_title = book
        .chapter(index)
        .map(|c| c.title.as_str())
        .unwrap_or_default();

    let mut toc = String::new();
    toc_list(book, &book.toc, index, &mut toc);

    let prev = match index.checked_sub(1) {
        Some(prev) => format!("<a href=\"/read/{id}/{prev}\">&larr; Previous</a>"),
        None => "<span></span>".to_string(),
    };
    let next = if index + 1 < book.chapters.len() {
        format!("<a href=\"/read/{id}/{}\">Next &rarr;</a>", index + 1)
    } else {
        "<span></span>".to_string()
    };

    let body = format!(
        r#"<div class="layout">
<nav class="toc"><a href="/">&larr; Library</a><h3>{book_title}</h3>{toc}</nav>
<main>
<article id="chapter-content" data-book-id="{book_id}" data-chapter-index="{index}">{content}</article>
<div class="pager">{prev}{next}</div>
</main>
</div>
<script src="/static/reader.js"></script>"#,
        book_title = escape(&book.metadata.title),
        book_id = escape(&book.id),
    );

    let extra_style = format!(
        "\n    mark.{class} {{ background: #fff3a3; cursor: pointer; }}\n",
        class = escape(marker_class)
    );
    let title = format!("{} - {}", chapter_title, book.metadata.title);
    page(&title, &extra_style, &body)
}
