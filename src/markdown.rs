//! Markdown-to-HTML conversion.
//!
//! Wraps pulldown-cmark behind a fixed configuration and layers the book's
//! markdown extensions on top: `:::` container blocks (admonitions, tabs,
//! collapsible details), deterministic heading anchors, `==mark==`,
//! `~sub~`/`^sup^` and bare-URL autolinking. Fenced code keeps language
//! classes for client-side highlighting; math spans are rendered client-side.

use std::collections::HashMap;
use std::sync::OnceLock;

use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unterminated `:::{name}` container opened on line {line}")]
    UnterminatedContainer { name: String, line: usize },
    #[error("`:::` closer on line {line} has no matching opener")]
    UnmatchedCloser { line: usize },
}

pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_MATH
            | Options::ENABLE_SMART_PUNCTUATION;
        Self { options }
    }

    /// Convert one chapter of markdown into an HTML fragment.
    pub fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let prepared = preprocess(markdown)?;
        let parser = Parser::new_ext(&prepared, self.options);
        let mut out = String::with_capacity(prepared.len() * 3 / 2);
        html::push_html(&mut out, parser);
        let out = add_heading_ids(&out);
        Ok(transform_outside_code(&out, inline_extensions))
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn strip_html_tags(s: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for c in s.chars() {
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
        } else if !in_tag {
            result.push(c);
        }
    }
    result
}

#[derive(Debug)]
struct Container {
    name: String,
    kind: ContainerKind,
    title: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ContainerKind {
    Admonition,
    Details,
    Tab,
}

impl Container {
    fn open(name: &str, title: &str) -> Self {
        let kind = match name {
            "details" => ContainerKind::Details,
            "tab" => ContainerKind::Tab,
            _ => ContainerKind::Admonition,
        };
        Self {
            name: name.to_string(),
            kind,
            title: title.to_string(),
        }
    }

    fn open_html(&self) -> String {
        match self.kind {
            ContainerKind::Admonition => {
                let label = if self.title.is_empty() {
                    capitalize(&self.name)
                } else {
                    self.title.clone()
                };
                format!(
                    r#"<div class="custom-block {}"><p class="custom-block-title"><i class="{}-icon">{}</i> {}</p>"#,
                    self.name,
                    self.name,
                    admonition_icon(&self.name),
                    html_escape(&label)
                )
            }
            ContainerKind::Details => {
                let summary = if self.title.is_empty() {
                    "Details".to_string()
                } else {
                    self.title.clone()
                };
                format!(
                    r#"<details class="collapsible"><summary>{}</summary><div class="collapsible-body">"#,
                    html_escape(&summary)
                )
            }
            ContainerKind::Tab => format!(
                r#"<div class="tab-panel"><p class="tab-title">{}</p>"#,
                html_escape(&self.title)
            ),
        }
    }

    fn close_html(&self) -> &'static str {
        match self.kind {
            ContainerKind::Admonition | ContainerKind::Tab => "</div>",
            ContainerKind::Details => "</div></details>",
        }
    }
}

fn admonition_icon(name: &str) -> &'static str {
    match name {
        "note" => "ℹ️",
        "tip" | "hint" => "💡",
        "important" => "❗",
        "warning" => "⚠️",
        "caution" => "🛑",
        _ => "",
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Expand `:::` containers into raw HTML blocks and autolink bare URLs.
/// Lines inside fenced code are passed through untouched. Containers must
/// balance; anything else is a conversion error.
fn preprocess(markdown: &str) -> Result<String, RenderError> {
    let mut out = String::with_capacity(markdown.len() + 64);
    let mut stack: Vec<(Container, usize)> = Vec::new();
    let mut fence: Option<&str> = None;

    for (idx, line) in markdown.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start();

        if let Some(marker) = fence {
            out.push_str(line);
            out.push('\n');
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence = Some(&trimmed[..3]);
            out.push_str(line);
            out.push('\n');
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(":::") {
            let rest = rest.trim_start_matches(':').trim();
            if rest.is_empty() {
                match stack.pop() {
                    Some((container, _)) => {
                        out.push('\n');
                        out.push_str(container.close_html());
                        out.push_str("\n\n");
                    }
                    None => return Err(RenderError::UnmatchedCloser { line: line_no }),
                }
            } else {
                let (name, title) = match rest.split_once(char::is_whitespace) {
                    Some((name, title)) => (name, title.trim()),
                    None => (rest, ""),
                };
                let name = slugify(name);
                if name.is_empty() {
                    // Not a container after all; keep the line as written.
                    out.push_str(line);
                    out.push('\n');
                    continue;
                }
                let container = Container::open(&name, title);
                out.push('\n');
                out.push_str(&container.open_html());
                out.push_str("\n\n");
                stack.push((container, line_no));
            }
            continue;
        }

        if is_indented_code(line) {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        out.push_str(&autolink_line(line));
        out.push('\n');
    }

    if let Some((container, line)) = stack.pop() {
        return Err(RenderError::UnterminatedContainer {
            name: container.name,
            line,
        });
    }
    Ok(out)
}

/// Heuristic for indented code blocks, which the autolink pass must leave
/// untouched. Deeply nested list items are exempt so their links survive.
fn is_indented_code(line: &str) -> bool {
    let mut width = 0usize;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    if width < 4 {
        return false;
    }
    let rest = line.trim_start();
    let list_marker = rest.starts_with("- ")
        || rest.starts_with("* ")
        || rest.starts_with("+ ")
        || rest
            .split_once(". ")
            .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    !list_marker
}

fn autolink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?P<pre>^|\s)(?P<url>https?://[^\s<>()\[\]]+)").unwrap())
}

/// Wrap bare URLs in CommonMark autolink brackets, skipping inline code.
fn autolink_line(line: &str) -> String {
    if !line.contains("http://") && !line.contains("https://") {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + 8);
    for (i, segment) in line.split('`').enumerate() {
        if i > 0 {
            out.push('`');
        }
        if i % 2 == 0 {
            let replaced = autolink_re().replace_all(segment, |caps: &Captures| {
                let full = &caps["url"];
                let url = full.trim_end_matches(['.', ',', ';', ':', '!', '?']);
                let tail = &full[url.len()..];
                format!("{}<{}>{}", &caps["pre"], url, tail)
            });
            out.push_str(&replaced);
        } else {
            out.push_str(segment);
        }
    }
    out
}

/// Assign a stable slug id to every heading. Duplicate heading text gets a
/// numeric suffix so ids stay unique within one document.
fn add_heading_ids(html: &str) -> String {
    let mut used: HashMap<String, usize> = HashMap::new();
    let mut result = html.to_string();
    for tag in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        let open_tag = format!("<{tag}>");
        let close_tag = format!("</{tag}>");

        let mut rebuilt = String::with_capacity(result.len());
        let mut remaining = result.as_str();

        while let Some(start) = remaining.find(&open_tag) {
            rebuilt.push_str(&remaining[..start]);
            remaining = &remaining[start + open_tag.len()..];

            if let Some(end) = remaining.find(&close_tag) {
                let text = &remaining[..end];
                let mut slug = slugify(&strip_html_tags(text));
                if slug.is_empty() {
                    slug = "section".to_string();
                }
                let seen = used.entry(slug.clone()).or_insert(0);
                *seen += 1;
                if *seen > 1 {
                    slug = format!("{}-{}", slug, *seen - 1);
                }
                rebuilt.push_str(&format!(r#"<{tag} id="{slug}">{text}</{tag}>"#));
                remaining = &remaining[end + close_tag.len()..];
            } else {
                rebuilt.push_str(&open_tag);
            }
        }
        rebuilt.push_str(remaining);
        result = rebuilt;
    }
    result
}

/// Apply `f` to every chunk of `html` that is not inside a `<pre>` or
/// `<code>` element.
fn transform_outside_code(html: &str, f: fn(&str) -> String) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    loop {
        let next = ["<pre", "<code"]
            .iter()
            .filter_map(|t| rest.find(t).map(|i| (i, *t)))
            .min();
        match next {
            None => {
                out.push_str(&f(rest));
                break;
            }
            Some((start, tag)) => {
                out.push_str(&f(&rest[..start]));
                let close = if tag == "<pre" { "</pre>" } else { "</code>" };
                let tail = &rest[start..];
                match tail.find(close) {
                    Some(end) => {
                        let end = end + close.len();
                        out.push_str(&tail[..end]);
                        rest = &tail[end..];
                    }
                    None => {
                        out.push_str(tail);
                        break;
                    }
                }
            }
        }
    }
    out
}

fn mark_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"==([^=\n]+)==").unwrap())
}

fn sub_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"~([^~\s]+)~").unwrap())
}

fn sup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\^([^\^\s]+)\^").unwrap())
}

fn inline_extensions(text: &str) -> String {
    let text = mark_re().replace_all(text, "<mark>$1</mark>");
    let text = sub_re().replace_all(&text, "<sub>$1</sub>");
    sup_re().replace_all(&text, "<sup>$1</sup>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markdown: &str) -> String {
        MarkdownRenderer::new().render(markdown).unwrap()
    }

    #[test]
    fn renders_basic_markdown() {
        let html = render("# Title\n\nSome *text*.\n");
        assert!(html.contains(r#"<h1 id="title">Title</h1>"#));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn heading_ids_are_deterministic_and_deduplicated() {
        let html = render("# Same Name\n\n## Same Name\n");
        assert!(html.contains(r#"<h1 id="same-name">"#));
        assert!(html.contains(r#"<h2 id="same-name-1">"#));
        // Re-rendering the same text yields the same ids.
        assert_eq!(html, render("# Same Name\n\n## Same Name\n"));
    }

    #[test]
    fn admonition_container_expands() {
        let html = render(":::warning\nDo not.\n:::\n");
        assert!(html.contains(r#"<div class="custom-block warning">"#));
        assert!(html.contains(r#"custom-block-title"#));
        assert!(html.contains("<p>Do not.</p>"));
        assert!(html.contains("</div>"));
    }

    #[test]
    fn container_title_overrides_label() {
        let html = render(":::tip Pro move\nUse it.\n:::\n");
        assert!(html.contains("Pro move"));
        assert!(html.contains(r#"custom-block tip"#));
    }

    #[test]
    fn details_container_becomes_collapsible() {
        let html = render(":::details Spoilers\nHidden text.\n:::\n");
        assert!(html.contains(r#"<details class="collapsible"><summary>Spoilers</summary>"#));
        assert!(html.contains(r#"<div class="collapsible-body">"#));
        assert!(html.contains("</div></details>"));
    }

    #[test]
    fn tab_container_renders_panel() {
        let html = render(":::tab First\ncontent\n:::\n");
        assert!(html.contains(r#"<div class="tab-panel"><p class="tab-title">First</p>"#));
    }

    #[test]
    fn containers_nest() {
        let html = render(":::note\nouter\n\n:::details Inner\ninner\n:::\n\nstill outer\n:::\n");
        let note_pos = html.find("custom-block note").unwrap();
        let details_pos = html.find("<details").unwrap();
        assert!(note_pos < details_pos);
        assert!(html.contains("still outer"));
    }

    #[test]
    fn unterminated_container_is_an_error() {
        let err = MarkdownRenderer::new()
            .render(":::note\nnever closed\n")
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::UnterminatedContainer {
                name: "note".to_string(),
                line: 1
            }
        );
    }

    #[test]
    fn stray_closer_is_an_error() {
        let err = MarkdownRenderer::new().render("text\n:::\n").unwrap_err();
        assert_eq!(err, RenderError::UnmatchedCloser { line: 2 });
    }

    #[test]
    fn fenced_code_shields_container_syntax() {
        let html = render("```\n:::note\n```\n");
        assert!(html.contains(":::note"));
        assert!(!html.contains("custom-block"));
    }

    #[test]
    fn fenced_code_keeps_language_class() {
        let html = render("```rust\nfn main() {}\n```\n");
        assert!(html.contains(r#"<code class="language-rust">"#));
    }

    #[test]
    fn mark_sub_sup_outside_code() {
        let html = render("==bright== and H~2~O and x^2^\n");
        assert!(html.contains("<mark>bright</mark>"));
        assert!(html.contains("H<sub>2</sub>O"));
        assert!(html.contains("x<sup>2</sup>"));
    }

    #[test]
    fn mark_syntax_inside_code_is_literal() {
        let html = render("`==nope==`\n\n```\n==nope==\n```\n");
        assert!(!html.contains("<mark>"));
    }

    #[test]
    fn math_spans_are_emitted() {
        let html = render("Euler: $e^{i\\pi}$\n");
        assert!(html.contains("math-inline"));
    }

    #[test]
    fn bare_urls_are_autolinked() {
        let html = render("see https://example.com/a for details\n");
        assert!(html.contains(r#"<a href="https://example.com/a">"#));
    }

    #[test]
    fn urls_in_code_spans_stay_literal() {
        let html = render("`https://example.com/raw`\n");
        assert!(!html.contains("<a href"));
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_the_link() {
        let html = render("go to https://example.com.\n");
        assert!(html.contains(r#"<a href="https://example.com">"#));
    }

    #[test]
    fn urls_in_indented_code_stay_literal() {
        let html = render("    https://example.com/tool\n");
        assert!(html.contains("<code>https://example.com/tool"));
        assert!(!html.contains("&lt;"));
        assert!(!html.contains("<a href"));
    }

    #[test]
    fn urls_in_deeply_nested_list_items_are_still_autolinked() {
        let html = render("- outer\n    - see https://example.com/x\n");
        assert!(html.contains(r#"<a href="https://example.com/x">"#));
    }

    #[test]
    fn slugify_matches_expected_shape() {
        assert_eq!(slugify("Hello,  World!"), "hello-world");
        assert_eq!(slugify("Émigré café"), "émigré-café");
    }
}
