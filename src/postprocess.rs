//! Post-conversion HTML transforms.
//!
//! Both transforms run on the converter's HTML output, before the content is
//! handed to the webview: image sources are rewritten onto the asset route,
//! and GitHub-style `[!TYPE]` blockquote callouts become styled blocks. They
//! are independent and can run in either order.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::paths;

fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(<img[^>]*?\ssrc=")([^"]*)(")"#).unwrap())
}

/// Rewrite every relative image source against the current chapter's
/// directory and point it at the asset route. Remote URLs and data URIs are
/// left alone; root-absolute paths are served from the book root.
pub fn rewrite_image_sources(html: &str, base_dir: &str) -> String {
    img_src_re()
        .replace_all(html, |caps: &Captures| {
            let src = &caps[2];
            if paths::is_remote(src) || src.starts_with(paths::ASSET_MOUNT) {
                return caps[0].to_string();
            }
            let resolved = paths::resolve_relative(base_dir, src);
            format!("{}{}{}", &caps[1], paths::asset_url(&resolved), &caps[3])
        })
        .into_owned()
}

const CALLOUTS: [(&str, &str); 6] = [
    ("NOTE", "ℹ️"),
    ("TIP", "💡"),
    ("IMPORTANT", "❗"),
    ("WARNING", "⚠️"),
    ("CAUTION", "🛑"),
    ("HINT", "💡"),
];

fn callout_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // <blockquote><p>[!TYPE] body...</p></blockquote>, where the body may
    // span paragraphs. Works on converter output, not raw markdown.
    RE.get_or_init(|| {
        Regex::new(r"(?s)<blockquote>\s*<p>\s*\[!([A-Za-z]+)\]\s*(.*?)</p>\s*</blockquote>")
            .unwrap()
    })
}

/// Replace `[!TYPE]`-tagged blockquotes with labeled callout blocks.
/// Tags match case-insensitively; unknown tags fall back to NOTE.
pub fn convert_callouts(html: &str) -> String {
    callout_re()
        .replace_all(html, |caps: &Captures| {
            let tag = caps[1].to_uppercase();
            let (label, icon) = CALLOUTS
                .iter()
                .find(|(name, _)| *name == tag)
                .copied()
                .unwrap_or(CALLOUTS[0]);

            let body = caps[2].trim();
            let body = if body.starts_with("<p>") {
                body.to_string()
            } else {
                format!("<p>{body}</p>")
            };

            format!(
                concat!(
                    r#"<div class="callout callout-{lc}">"#,
                    r#"<div class="callout-header">"#,
                    r#"<span class="callout-icon">{icon}</span>"#,
                    r#"<span class="callout-title">{label}</span>"#,
                    r#"</div>"#,
                    r#"<div class="callout-content">{body}</div>"#,
                    r#"</div>"#
                ),
                lc = label.to_lowercase(),
                icon = icon,
                label = label,
                body = body
            )
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_image_is_rewritten_onto_asset_route() {
        let html = r#"<p><img src="images/pic.png" alt="x" /></p>"#;
        let out = rewrite_image_sources(html, "guide");
        assert!(out.contains(&format!(r#"src="{}guide/images/pic.png""#, paths::ASSET_MOUNT)));
    }

    #[test]
    fn parent_relative_image_resolves_against_chapter_dir() {
        let html = r#"<img alt="x" src="../shared/logo.svg">"#;
        let out = rewrite_image_sources(html, "guide/deep");
        assert!(out.contains(&format!(r#"src="{}guide/shared/logo.svg""#, paths::ASSET_MOUNT)));
    }

    #[test]
    fn root_absolute_image_is_served_from_book_root() {
        let out = rewrite_image_sources(r#"<img src="/cover.png">"#, "guide");
        assert!(out.contains(&format!(r#"src="{}cover.png""#, paths::ASSET_MOUNT)));
    }

    #[test]
    fn remote_and_data_images_are_untouched() {
        let html = r#"<img src="https://example.com/a.png"><img src="data:image/png;base64,AA">"#;
        assert_eq!(rewrite_image_sources(html, "guide"), html);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let once = rewrite_image_sources(r#"<img src="a.png">"#, "guide");
        assert_eq!(rewrite_image_sources(&once, "guide"), once);
    }

    #[test]
    fn warning_callout_converts_with_label_and_class() {
        let html = "<blockquote>\n<p>[!WARNING] do not do X</p>\n</blockquote>";
        let out = convert_callouts(html);
        assert!(out.contains("callout-warning"));
        assert!(out.contains(r#"<span class="callout-title">WARNING</span>"#));
        assert!(out.contains("<p>do not do X</p>"));
        assert!(!out.contains("<blockquote>"));
    }

    #[test]
    fn callout_tag_is_case_insensitive() {
        let out = convert_callouts("<blockquote><p>[!warning] x</p></blockquote>");
        assert!(out.contains("callout-warning"));
    }

    #[test]
    fn unknown_tag_falls_back_to_note() {
        let out = convert_callouts("<blockquote><p>[!FOO] text</p></blockquote>");
        assert!(out.contains("callout-note"));
        assert!(out.contains(r#"<span class="callout-title">NOTE</span>"#));
        assert!(out.contains("<p>text</p>"));
    }

    #[test]
    fn multi_paragraph_body_stays_block_wrapped() {
        let html = "<blockquote>\n<p>[!TIP] first</p>\n<p>second</p>\n</blockquote>";
        let out = convert_callouts(html);
        assert!(out.contains("<p>first</p>"));
        assert!(out.contains("<p>second</p>"));
    }

    #[test]
    fn plain_blockquotes_survive() {
        let html = "<blockquote>\n<p>just a quote</p>\n</blockquote>";
        assert_eq!(convert_callouts(html), html);
    }
}
