//! Per-render interactive widget bindings.
//!
//! Each render pass scans the converted HTML, wraps fenced code blocks with
//! a copy control keyed by `data-copy-id`, and records what the shell script
//! will bind. The registry is replaced wholesale on every render: bindings
//! from render N cannot survive into render N+1, which is what keeps the
//! copy-id lookups and the DOM in lockstep.

use crate::markdown::strip_html_tags;

const COPY_ICON: &str = concat!(
    r#"<svg class="icon-copy" viewBox="0 0 24 24" width="16" height="16">"#,
    r#"<path d="M16 1H4c-1.1 0-2 .9-2 2v14h2V3h12V1zm3 4H8c-1.1 0-2 .9-2 2v14c0 1.1.9 2 2 2h11c1.1 0 2-.9 2-2V7c0-1.1-.9-2-2-2zm0 16H8V7h11v14z"/>"#,
    r#"</svg>"#
);

const CHECK_ICON: &str = concat!(
    r#"<svg class="icon-check" viewBox="0 0 24 24" width="16" height="16">"#,
    r#"<path d="M9.5 18.5l-5.5-5.5l1.41-1.41l4.09 4.09l8.59-8.59l1.41 1.41L9.5 18.5z"/>"#,
    r#"</svg>"#
);

/// One copy control: the id carried by the button element and the exact
/// text a click puts on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTarget {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct WidgetBindings {
    copy_targets: Vec<CopyTarget>,
    collapsible_count: usize,
}

impl WidgetBindings {
    /// Scan a rendered chapter, wrapping code blocks with copy controls and
    /// recording every interactive element the shell will bind.
    pub fn scan(html: &str) -> (String, WidgetBindings) {
        let mut out = String::with_capacity(html.len() + 256);
        let mut bindings = WidgetBindings::default();
        let mut rest = html;

        while let Some(start) = rest.find("<pre") {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let Some(end) = tail.find("</pre>") else {
                // Malformed block; pass the remainder through untouched.
                out.push_str(tail);
                rest = "";
                break;
            };
            let end = end + "</pre>".len();
            let block = &tail[..end];

            if out.ends_with("</button>") {
                // Already wrapped by an earlier pass; keep the existing key.
                if let Some(id) = existing_copy_id(&out) {
                    bindings.copy_targets.push(CopyTarget {
                        id,
                        text: code_text(block),
                    });
                }
                out.push_str(block);
            } else {
                let id = format!("copy-{}", bindings.copy_targets.len());
                out.push_str(&format!(
                    r#"<div class="code-block-wrapper"><button class="clip-button" data-copy-id="{id}" aria-label="Copy to clipboard">{COPY_ICON}{CHECK_ICON}</button>{block}</div>"#
                ));
                bindings.copy_targets.push(CopyTarget {
                    id,
                    text: code_text(block),
                });
            }
            rest = &tail[end..];
        }
        out.push_str(rest);

        bindings.collapsible_count = out.matches(r#"<details class="collapsible""#).count();
        (out, bindings)
    }

    /// Exact clipboard payload for a copy control, if the id is live.
    pub fn copy_text(&self, id: &str) -> Option<&str> {
        self.copy_targets
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.text.as_str())
    }

    pub fn copy_targets(&self) -> &[CopyTarget] {
        &self.copy_targets
    }

    pub fn collapsible_count(&self) -> usize {
        self.collapsible_count
    }

    /// Total interactive elements this render pass registered; must match
    /// what the shell's teardown releases before the next render.
    pub fn binding_count(&self) -> usize {
        self.copy_targets.len() + self.collapsible_count
    }
}

fn existing_copy_id(out: &str) -> Option<String> {
    let marker = r#"data-copy-id=""#;
    let start = out.rfind(marker)? + marker.len();
    let end = out[start..].find('"')?;
    Some(out[start..start + end].to_string())
}

/// Text content of a `<pre>` block, entities unescaped so the clipboard
/// receives the literal code.
fn code_text(block: &str) -> String {
    let inner = match block.find("<code") {
        Some(code_start) => {
            let after = &block[code_start..];
            let open_end = after.find('>').map(|i| i + 1).unwrap_or(0);
            let body = &after[open_end..];
            match body.find("</code>") {
                Some(close) => &body[..close],
                None => body,
            }
        }
        None => block,
    };
    unescape_entities(&strip_html_tags(inner))
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BLOCKS: &str = concat!(
        r#"<p>a</p><pre><code class="language-rust">fn main() {}"#,
        "\n",
        r#"</code></pre><p>b</p><pre><code>hello</code></pre>"#
    );

    #[test]
    fn every_code_block_gets_a_copy_control() {
        let (html, bindings) = WidgetBindings::scan(TWO_BLOCKS);
        assert_eq!(bindings.copy_targets().len(), 2);
        assert_eq!(html.matches("code-block-wrapper").count(), 2);
        assert!(html.contains(r#"data-copy-id="copy-0""#));
        assert!(html.contains(r#"data-copy-id="copy-1""#));
    }

    #[test]
    fn copy_text_is_the_literal_code() {
        let (_, bindings) = WidgetBindings::scan(TWO_BLOCKS);
        assert_eq!(bindings.copy_text("copy-0"), Some("fn main() {}\n"));
        assert_eq!(bindings.copy_text("copy-1"), Some("hello"));
    }

    #[test]
    fn entities_are_unescaped_for_the_clipboard() {
        let (_, bindings) =
            WidgetBindings::scan("<pre><code>a &amp;&amp; b &lt; c</code></pre>");
        assert_eq!(bindings.copy_text("copy-0"), Some("a && b < c"));
    }

    #[test]
    fn rescan_produces_a_fresh_registry() {
        let (_, first) = WidgetBindings::scan(TWO_BLOCKS);
        assert_eq!(first.binding_count(), 2);

        // A new render replaces the registry; stale keys must be gone.
        let (_, second) = WidgetBindings::scan("<p>no code here</p>");
        assert_eq!(second.binding_count(), 0);
        assert_eq!(second.copy_text("copy-0"), None);
    }

    #[test]
    fn scan_is_idempotent_on_its_own_output() {
        let (once, first) = WidgetBindings::scan(TWO_BLOCKS);
        let (twice, second) = WidgetBindings::scan(&once);
        assert_eq!(once, twice);
        assert_eq!(first.binding_count(), second.binding_count());
    }

    #[test]
    fn collapsibles_are_counted_as_bindings() {
        let html = r#"<details class="collapsible"><summary>s</summary><div class="collapsible-body"><p>x</p></div></details>"#;
        let (_, bindings) = WidgetBindings::scan(html);
        assert_eq!(bindings.collapsible_count(), 1);
        assert_eq!(bindings.binding_count(), 1);
    }

    #[test]
    fn unknown_copy_id_yields_none() {
        let (_, bindings) = WidgetBindings::scan(TWO_BLOCKS);
        assert_eq!(bindings.copy_text("copy-9"), None);
    }
}
