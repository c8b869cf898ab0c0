//! Book backend: SUMMARY.md parsing and chapter/asset reads.
//!
//! A book is a directory containing `SUMMARY.md` (an mdbook-style nested
//! list of chapter links) plus the chapter files and any static assets they
//! reference.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use regex::Regex;

/// One entry of the table of contents. An item with an empty `path` is a
/// heading-only grouping node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TocItem {
    pub title: String,
    pub path: String,
    pub level: usize,
    pub children: Vec<TocItem>,
}

impl TocItem {
    pub fn is_navigable(&self) -> bool {
        crate::paths::is_chapter_path(&self.path)
    }
}

/// Whole-book response: TOC plus the initially displayed chapter. On error
/// the other fields still carry best-effort fallback values.
#[derive(Debug, Default)]
pub struct BookData {
    pub toc: Vec<TocItem>,
    pub initial_markdown: String,
    pub initial_path: String,
    pub error: Option<String>,
}

/// Backend collaborator the navigation layer talks to.
pub trait BookSource {
    fn book_data(&self) -> BookData;
    fn chapter(&self, relative_path: &str) -> Result<String>;
}

/// Filesystem-backed book rooted at one directory.
#[derive(Debug, Clone)]
pub struct FsBook {
    root: PathBuf,
}

impl FsBook {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a book-relative path, with `..` clamped at the
    /// book root so requests cannot escape it.
    pub fn contained_path(&self, relative_path: &str) -> PathBuf {
        let mut kept: Vec<&str> = Vec::new();
        for segment in relative_path.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    kept.pop();
                }
                other => kept.push(other),
            }
        }
        let mut path = self.root.clone();
        for segment in kept {
            path.push(segment);
        }
        path
    }

    /// Raw bytes of a static asset, or `None` if it does not exist.
    pub fn read_asset(&self, relative_path: &str) -> Option<Vec<u8>> {
        let path = self.contained_path(relative_path);
        std::fs::read(&path).ok()
    }
}

impl BookSource for FsBook {
    fn book_data(&self) -> BookData {
        let summary_path = self.root.join("SUMMARY.md");
        info!("loading book data from {}", summary_path.display());

        let mut data = BookData::default();

        let summary = match std::fs::read_to_string(&summary_path) {
            Ok(text) => text,
            Err(err) => {
                let msg = format!("failed to open {}: {}", summary_path.display(), err);
                warn!("{msg}");
                data.error = Some(msg.clone());
                data.initial_markdown = format!("# Failed to Load Book\n\n{msg}\n");
                return data;
            }
        };

        let (toc, first_chapter) = parse_summary(&summary);
        data.toc = toc;
        data.initial_path = if first_chapter.is_empty() {
            // Common default when SUMMARY.md carries no .md links at all.
            "README.md".to_string()
        } else {
            first_chapter
        };

        match self.chapter(&data.initial_path) {
            Ok(markdown) => data.initial_markdown = markdown,
            Err(err) => {
                let msg = format!("error loading initial chapter '{}': {err}", data.initial_path);
                warn!("{msg}");
                data.error = Some(match data.error.take() {
                    Some(prev) => format!("{prev}; {msg}"),
                    None => msg,
                });
                data.initial_markdown = error_document(&data.initial_path, &err.to_string());
            }
        }

        data
    }

    fn chapter(&self, relative_path: &str) -> Result<String> {
        let path = self.contained_path(relative_path);
        if !path.is_file() {
            bail!("markdown file not found: {relative_path}");
        }
        std::fs::read_to_string(&path)
            .with_context(|| format!("could not read markdown file: {relative_path}"))
    }
}

/// Markdown document shown in place of a chapter that failed to load.
pub fn error_document(relative_path: &str, message: &str) -> String {
    format!(
        "# Error Loading Content\n\nCould not load: `{relative_path}`\n\n**Details:**\n```\n{message}\n```\n"
    )
}

fn summary_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `  - [Title](./path.md)`, with `*` accepted as list marker and an
    // empty path allowed for heading-only entries.
    RE.get_or_init(|| Regex::new(r"^(?P<indent>\s*)[-*]\s*\[(?P<title>[^\]]+)\]\((?P<path>[^)]*)\)").unwrap())
}

/// Parse `SUMMARY.md` into the TOC tree plus the first chapter path
/// (depth-first first `.md` link; empty when the file has none).
pub fn parse_summary(summary: &str) -> (Vec<TocItem>, String) {
    let re = summary_line_re();

    let mut toc: Vec<TocItem> = Vec::new();
    let mut first_chapter = String::new();
    // Index path from the root into the item currently accepting children.
    let mut parent_trail: Vec<usize> = Vec::new();
    let mut last_level: Option<usize> = None;

    for line in summary.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.starts_with("- ") || trimmed.starts_with("* ")) {
            continue;
        }
        let Some(caps) = re.captures(line) else {
            continue;
        };

        let title = caps["title"].trim().to_string();
        let mut path = caps["path"].trim().to_string();
        if let Some(stripped) = path.strip_prefix("./") {
            path = stripped.to_string();
        }
        // Two spaces per nesting level, as mdbook conventionally writes it.
        let level = caps["indent"].len() / 2;

        if first_chapter.is_empty() && crate::paths::is_chapter_path(&path) {
            first_chapter = path.clone();
        }

        match last_level {
            Some(last) if level > last => {
                // Deeper: nest under the most recently added sibling, when
                // there is one to nest under.
                if let Some(idx) = last_sibling_index(&toc, &parent_trail) {
                    parent_trail.push(idx);
                }
            }
            Some(last) if level < last => {
                for _ in 0..(last - level) {
                    parent_trail.pop();
                }
            }
            _ => {}
        }

        let item = TocItem {
            title,
            path,
            level,
            children: Vec::new(),
        };
        current_list(&mut toc, &parent_trail).push(item);
        last_level = Some(level);
    }

    if first_chapter.is_empty() {
        first_chapter = first_chapter_in(&toc);
    }

    (toc, first_chapter)
}

fn current_list<'a>(toc: &'a mut Vec<TocItem>, trail: &[usize]) -> &'a mut Vec<TocItem> {
    let mut list = toc;
    for &idx in trail {
        list = &mut list[idx].children;
    }
    list
}

fn last_sibling_index(toc: &[TocItem], trail: &[usize]) -> Option<usize> {
    let mut list = toc;
    for &idx in trail {
        list = &list[idx].children;
    }
    list.len().checked_sub(1)
}

fn first_chapter_in(items: &[TocItem]) -> String {
    for item in items {
        if item.is_navigable() {
            return item.path.clone();
        }
        let nested = first_chapter_in(&item.children);
        if !nested.is_empty() {
            return nested;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SUMMARY: &str = "\
# Summary

- [Introduction](./intro.md)
- [Guide](guide/index.md)
  - [Setup](guide/setup.md)
  - [Usage](guide/usage.md)
    - [Advanced](guide/advanced.md)
- [Reference]()
  - [API](reference/api.md)
";

    #[test]
    fn parses_nested_summary() {
        let (toc, first) = parse_summary(SUMMARY);
        assert_eq!(first, "intro.md");
        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].title, "Introduction");
        assert_eq!(toc[0].path, "intro.md");
        assert_eq!(toc[1].children.len(), 2);
        assert_eq!(toc[1].children[1].children[0].path, "guide/advanced.md");
        assert_eq!(toc[1].children[1].children[0].level, 2);
    }

    #[test]
    fn heading_only_entries_keep_children() {
        let (toc, _) = parse_summary(SUMMARY);
        let reference = &toc[2];
        assert_eq!(reference.path, "");
        assert!(!reference.is_navigable());
        assert_eq!(reference.children[0].path, "reference/api.md");
    }

    #[test]
    fn first_chapter_falls_back_to_depth_first_search() {
        let (_, first) = parse_summary("- [Section]()\n  - [Deep](a/b.md)\n");
        assert_eq!(first, "a/b.md");
    }

    #[test]
    fn non_list_lines_are_skipped() {
        let (toc, first) = parse_summary("# Title\n\nprose\n- [One](one.md)\n");
        assert_eq!(toc.len(), 1);
        assert_eq!(first, "one.md");
    }

    #[test]
    fn contained_path_clamps_traversal() {
        let book = FsBook::new("/tmp/book");
        assert_eq!(
            book.contained_path("../../etc/passwd"),
            PathBuf::from("/tmp/book/etc/passwd")
        );
        assert_eq!(
            book.contained_path("a/../b.md"),
            PathBuf::from("/tmp/book/b.md")
        );
    }

    #[test]
    fn book_data_reads_initial_chapter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SUMMARY.md"), "- [Intro](intro.md)\n").unwrap();
        fs::write(dir.path().join("intro.md"), "# Hello\n").unwrap();

        let data = FsBook::new(dir.path()).book_data();
        assert!(data.error.is_none());
        assert_eq!(data.initial_path, "intro.md");
        assert_eq!(data.initial_markdown, "# Hello\n");
        assert_eq!(data.toc.len(), 1);
    }

    #[test]
    fn book_data_surfaces_missing_chapter_as_error_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SUMMARY.md"), "- [Gone](gone.md)\n").unwrap();

        let data = FsBook::new(dir.path()).book_data();
        assert!(data.error.is_some());
        assert_eq!(data.initial_path, "gone.md");
        assert!(data.initial_markdown.contains("Error Loading Content"));
        assert!(data.initial_markdown.contains("gone.md"));
        // TOC is still usable despite the failed content load.
        assert_eq!(data.toc.len(), 1);
    }

    #[test]
    fn book_data_without_summary_reports_error_but_stays_displayable() {
        let dir = tempfile::tempdir().unwrap();
        let data = FsBook::new(dir.path()).book_data();
        assert!(data.error.is_some());
        assert!(data.initial_markdown.contains("Failed to Load Book"));
    }
}
