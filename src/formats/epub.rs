//! EPUB processing.

use crate::error::{AppError, Result};
use crate::highlight::OffsetIndex;
use crate::html::{self, Sanitizer};
use crate::library::book::BOOK_FORMAT_VERSION;
use crate::library::{Book, BookDir, BookMetadata, Chapter, IMAGES_DIR, TocEntry};
use roxmltree::{Document, Node, ParsingOptions};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// A manifest entry, with its href resolved to a container path.
#[derive(Debug, Clone)]
struct ManifestItem {
    id: String,
    path: String,
    media_type: String,
    properties: String,
}

impl ManifestItem {
    fn is_document(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html"
        ) || [".xhtml", ".html", ".htm"]
            .iter()
            .any(|ext| self.path.to_lowercase().ends_with(ext))
    }

    fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    fn has_property(&self, property: &str) -> bool {
        self.properties.split_whitespace().any(|p| p == property)
    }
}

/// The parts of the OPF package the pipeline uses.
#[derive(Debug, Default)]
struct Package {
    metadata: BookMetadata,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
    ncx_id: Option<String>,
    cover_id: Option<String>,
}

impl Package {
    fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    fn spine_documents(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine
            .iter()
            .filter_map(|idref| self.item(idref))
            .filter(|item| item.is_document())
    }
}

fn parse_xml(text: &str) -> Result<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_name(name)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

fn read_text(archive: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let data = read_entry(archive, name)?;
    let text = String::from_utf8_lossy(&data);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Find the OPF file path from container.xml.
fn find_opf_path(archive: &mut ZipArchive<File>) -> Result<String> {
    let content = read_text(archive, "META-INF/container.xml")?;
    let doc = parse_xml(&content)?;

    doc.descendants()
        .find(|n| n.tag_name().name() == "rootfile")
        .and_then(|n| n.attribute("full-path"))
        .map(String::from)
        .ok_or_else(|| AppError::InvalidFormat("No rootfile in container.xml".into()))
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn decode(href: &str) -> String {
    urlencoding::decode(href)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a document-relative href (keeping its fragment) to a container path.
fn resolve_href(base_dir: &str, href: &str) -> String {
    match href.split_once('#') {
        Some((file, anchor)) => format!("{}#{}", html::join_path(base_dir, &decode(file)), anchor),
        None => html::join_path(base_dir, &decode(href)),
    }
}

fn node_text(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Parse the OPF file.
fn parse_package(content: &str, opf_dir: &str) -> Result<Package> {
    let doc = parse_xml(content)?;
    let mut package = Package::default();
    let meta = &mut package.metadata;
    let mut title = None;
    let mut language = None;

    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "title" if title.is_none() => title = node_text(node),
            "language" if language.is_none() => language = node_text(node),
            "creator" => meta.authors.extend(node_text(node)),
            "subject" => meta.subjects.extend(node_text(node)),
            "description" if meta.description.is_none() => meta.description = node_text(node),
            "publisher" if meta.publisher.is_none() => meta.publisher = node_text(node),
            "date" if meta.date.is_none() => meta.date = node_text(node),
            "identifier" => {
                if let Some(value) = node_text(node) {
                    let scheme = node
                        .attributes()
                        .find(|a| a.name() == "scheme")
                        .map(|a| a.value().to_string())
                        .or_else(|| node.attribute("id").map(String::from))
                        .unwrap_or_else(|| "identifier".to_string());
                    meta.identifiers.entry(scheme).or_insert(value);
                }
            }
            "meta" => {
                if node.attribute("name") == Some("cover") {
                    package.cover_id = node.attribute("content").map(String::from);
                }
            }
            "item" => {
                let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href")) else {
                    continue;
                };
                package.manifest.push(ManifestItem {
                    id: id.to_string(),
                    path: html::join_path(opf_dir, &decode(href)),
                    media_type: node.attribute("media-type").unwrap_or_default().to_string(),
                    properties: node.attribute("properties").unwrap_or_default().to_string(),
                });
            }
            "spine" => package.ncx_id = node.attribute("toc").map(String::from),
            "itemref" => {
                if let Some(idref) = node.attribute("idref") {
                    package.spine.push(idref.to_string());
                }
            }
            _ => {}
        }
    }

    let meta = &mut package.metadata;
    if let Some(title) = title {
        meta.title = title;
    }
    if let Some(language) = language {
        meta.language = language;
    }

    Ok(package)
}

/// Table of contents from an EPUB 3 navigation document.
fn parse_nav(content: &str, base_dir: &str) -> Vec<TocEntry> {
    let document = Html::parse_document(content);
    let Ok(nav_selector) = Selector::parse("nav") else {
        return Vec::new();
    };

    let navs: Vec<ElementRef<'_>> = document.select(&nav_selector).collect();
    let is_toc = |nav: &&ElementRef<'_>| {
        nav.value()
            .attr("epub:type")
            .is_some_and(|t| t.split_whitespace().any(|t| t == "toc"))
    };
    let Some(nav) = navs.iter().find(is_toc).or(navs.first()) else {
        return Vec::new();
    };

    nav.descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "ol")
        .map(|ol| nav_list(ol, base_dir))
        .unwrap_or_default()
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn nav_list(ol: ElementRef<'_>, base_dir: &str) -> Vec<TocEntry> {
    child_elements(ol)
        .filter(|li| li.value().name() == "li")
        .filter_map(|li| {
            let label = child_elements(li).find(|e| matches!(e.value().name(), "a" | "span"))?;
            let title = label.text().collect::<Vec<_>>().join(" ");
            let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
            let href = label.value().attr("href").unwrap_or_default();

            let mut entry = TocEntry::new(title, resolve_href(base_dir, href));
            if let Some(nested) = child_elements(li).find(|e| e.value().name() == "ol") {
                entry.children = nav_list(nested, base_dir);
            }
            Some(entry)
        })
        .collect()
}

/// Table of contents from an EPUB 2 NCX file.
fn parse_ncx(content: &str, base_dir: &str) -> Result<Vec<TocEntry>> {
    let doc = parse_xml(content)?;
    Ok(doc
        .descendants()
        .find(|n| n.tag_name().name() == "navMap")
        .map(|map| nav_points(map, base_dir))
        .unwrap_or_default())
}

fn nav_points(parent: Node<'_, '_>, base_dir: &str) -> Vec<TocEntry> {
    parent
        .children()
        .filter(|n| n.tag_name().name() == "navPoint")
        .map(|point| {
            let title = point
                .children()
                .find(|n| n.tag_name().name() == "navLabel")
                .and_then(node_text)
                .unwrap_or_default();
            let src = point
                .children()
                .find(|n| n.tag_name().name() == "content")
                .and_then(|n| n.attribute("src"))
                .unwrap_or_default();

            let mut entry = TocEntry::new(title, resolve_href(base_dir, src));
            entry.children = nav_points(point, base_dir);
            entry
        })
        .collect()
}

/// Flat table of contents built from the spine.
fn fallback_toc(package: &Package) -> Vec<TocEntry> {
    package
        .spine_documents()
        .map(|item| TocEntry::new(title_from_file_name(&item.path), item.path.clone()))
        .collect()
}

fn title_from_file_name(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name
        .trim_end_matches(".xhtml")
        .trim_end_matches(".html")
        .trim_end_matches(".htm");

    stem.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Keep characters that are safe in a file name on any platform.
fn safe_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

fn extract_images(
    archive: &mut ZipArchive<File>,
    package: &Package,
    images_dir: &Path,
) -> Result<BTreeMap<String, String>> {
    let mut images = BTreeMap::new();

    for item in package.manifest.iter().filter(|item| item.is_image()) {
        let data = match read_entry(archive, &item.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(image = %item.path, error = %e, "Missing image, skipping");
                continue;
            }
        };

        let basename = item.path.rsplit('/').next().unwrap_or(&item.path);
        let safe = safe_file_name(basename);
        if safe.is_empty() {
            continue;
        }

        std::fs::write(images_dir.join(&safe), data)?;
        let local = format!("{IMAGES_DIR}/{safe}");
        images.insert(item.path.clone(), local.clone());
        images.insert(basename.to_string(), local);
    }

    Ok(images)
}

/// Cover from package metadata, then a `cover` file name, then the first image
/// of the first document.
fn detect_cover(
    package: &Package,
    images: &BTreeMap<String, String>,
    first_document: Option<(&str, &str)>,
) -> Option<String> {
    let declared = package
        .cover_id
        .as_deref()
        .and_then(|id| package.item(id))
        .or_else(|| package.manifest.iter().find(|i| i.has_property("cover-image")));
    if let Some(local) = declared.and_then(|item| images.get(&item.path)) {
        return Some(local.clone());
    }

    if let Some((_, local)) = images
        .iter()
        .find(|(original, _)| original.to_lowercase().contains("cover"))
    {
        return Some(local.clone());
    }

    let (source, base_dir) = first_document?;
    let document = Html::parse_document(source);
    let selector = Selector::parse("img").ok()?;
    let src = document.select(&selector).next()?.value().attr("src")?;
    html::resolve_image(images, base_dir, src).cloned()
}

/// Process an EPUB into `out_dir`, replacing any previous output.
///
/// An existing highlights file in `out_dir` is kept.
pub fn process_epub(epub_path: &Path, out_dir: &Path) -> Result<Book> {
    tracing::info!(epub = %epub_path.display(), "Processing EPUB");
    let started = std::time::Instant::now();

    let file = File::open(epub_path)?;
    let mut archive = ZipArchive::new(file)?;

    let opf_path = find_opf_path(&mut archive)?;
    let opf_dir = parent_dir(&opf_path).to_string();
    let opf_content = read_text(&mut archive, &opf_path)?;
    let package = parse_package(&opf_content, &opf_dir)?;

    let dir = BookDir::at(out_dir);
    let highlights = match std::fs::read(dir.highlights_file()) {
        Ok(data) => Some(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::error!(
                book = %dir.id(),
                error = %e,
                "Existing highlights are unreadable, not reprocessing"
            );
            return Err(e.into());
        }
    };
    if out_dir.exists() {
        std::fs::remove_dir_all(out_dir)?;
    }
    std::fs::create_dir_all(dir.images_dir())?;
    if let Some(highlights) = highlights {
        std::fs::write(dir.highlights_file(), highlights)?;
    }

    let images = extract_images(&mut archive, &package, &dir.images_dir())?;

    let nav = package
        .manifest
        .iter()
        .find(|item| item.has_property("nav"))
        .cloned();
    let mut toc = match nav {
        Some(item) => read_text(&mut archive, &item.path)
            .map(|content| parse_nav(&content, parent_dir(&item.path)))
            .unwrap_or_default(),
        None => Vec::new(),
    };
    if toc.is_empty()
        && let Some(ncx) = package.ncx_id.as_deref().and_then(|id| package.item(id)).cloned()
    {
        toc = match read_text(&mut archive, &ncx.path) {
            Ok(content) => parse_ncx(&content, parent_dir(&ncx.path)).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Unreadable NCX");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
    }
    if toc.is_empty() {
        tracing::warn!("Empty table of contents, building one from the spine");
        toc = fallback_toc(&package);
    }

    let mut chapters = Vec::new();
    let mut first_document = None;
    let documents: Vec<ManifestItem> = package.spine_documents().cloned().collect();

    for item in documents {
        let source = match read_text(&mut archive, &item.path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(document = %item.path, error = %e, "Missing spine document, skipping");
                continue;
            }
        };
        let base_dir = parent_dir(&item.path);

        let content = Sanitizer::new(&images, base_dir).sanitize_document(&source);
        let plain_text_len = OffsetIndex::from_html(&content).total_len();

        let index = chapters.len();
        let title = TocEntry::find(&toc, &item.path)
            .map(|entry| entry.title.clone())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| format!("Section {}", index + 1));

        chapters.push(Chapter {
            index,
            href: item.path.clone(),
            title,
            content,
            plain_text_len,
        });

        if first_document.is_none() {
            first_document = Some((source, base_dir.to_string()));
        }
    }

    let cover_image = detect_cover(
        &package,
        &images,
        first_document
            .as_ref()
            .map(|(source, base_dir)| (source.as_str(), base_dir.as_str())),
    );
    match &cover_image {
        Some(cover) => tracing::debug!(cover = %cover, "Found cover image"),
        None => tracing::debug!("No cover image detected"),
    }

    let book = Book {
        id: dir.id().to_string(),
        metadata: package.metadata,
        chapters,
        toc,
        images,
        cover_image,
        source_file: epub_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        processed_at: chrono::Utc::now(),
        version: BOOK_FORMAT_VERSION.to_string(),
    };
    dir.save_book(&book)?;

    tracing::info!(
        book = %book.id,
        title = %book.metadata.title,
        chapters = book.chapters.len(),
        images = book.images.values().collect::<std::collections::BTreeSet<_>>().len(),
        elapsed = ?started.elapsed(),
        "Processed EPUB"
    );

    Ok(book)
}
