//! The static HTML shell hosted by the webview.
//!
//! The shell is built once at startup: titlebar, TOC sidebar, content
//! region, CSS and the binding script. Subsequent chapters are pushed into
//! it through `evaluate_script` using the builders at the bottom of this
//! file; rendered HTML crosses the boundary base64-encoded so no JS string
//! escaping is needed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::book::TocItem;
use crate::markdown::html_escape;

/// Recursive TOC tree. Items with children start collapsed; the entry for
/// `current_path` carries the `active` class.
pub fn toc_html(items: &[TocItem], current_path: &str) -> String {
    if items.is_empty() {
        return r#"<p class="toc-empty">Table of Contents is empty or could not be loaded.</p>"#
            .to_string();
    }
    let mut out = String::from("<ul>");
    for item in items {
        push_toc_item(&mut out, item, current_path);
    }
    out.push_str("</ul>");
    out
}

fn push_toc_item(out: &mut String, item: &TocItem, current_path: &str) {
    let has_children = !item.children.is_empty();
    out.push_str(if has_children {
        r#"<li class="collapsed">"#
    } else {
        "<li>"
    });

    let indent = item.level * 15 + 10;
    out.push_str(&format!(
        r#"<div class="toc-item-row" style="padding-left:{indent}px">"#
    ));
    if has_children {
        out.push_str(
            r#"<button class="toc-toggle-button" aria-expanded="false" title="Expand">›</button>"#,
        );
    } else {
        out.push_str(r#"<span class="toc-toggle-placeholder"></span>"#);
    }

    if item.is_navigable() {
        let active = if item.path == current_path { " active" } else { "" };
        out.push_str(&format!(
            r##"<a href="#" class="toc-item-link{active}" data-path="{path}" title="{path}">{title}</a>"##,
            path = html_escape(&item.path),
            title = html_escape(&item.title),
        ));
    } else {
        out.push_str(&format!(
            r#"<span class="toc-item-header">{}</span>"#,
            html_escape(&item.title)
        ));
    }
    out.push_str("</div>");

    if has_children {
        out.push_str("<ul>");
        for child in &item.children {
            push_toc_item(out, child, current_path);
        }
        out.push_str("</ul>");
    }
    out.push_str("</li>");
}

/// Assemble the full shell page around the initially rendered chapter.
pub fn build_shell(
    title: &str,
    toc: &str,
    initial_content: &str,
    global_error: Option<&str>,
) -> String {
    let error_panel = match global_error {
        Some(msg) => format!(
            r#"<div class="error-indicator global-error"><h3>Failed to Load Book</h3><pre>{}</pre></div>"#,
            html_escape(msg)
        ),
        None => String::new(),
    };

    format!(
        r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.9.0/styles/github-dark.min.css">
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16.11/dist/katex.min.css">
    <style>{css}</style>
</head>
<body>
    <div class="title-bar" id="title-bar">
        <div class="title-bar-text">{title}</div>
        <div class="window-controls">
            <button id="minimize-button" class="window-button" aria-label="Minimize">&#x2013;</button>
            <button id="close-button" class="window-button" aria-label="Close">&#x2715;</button>
        </div>
    </div>
    <div class="main-layout">
        <nav class="toc-container" id="toc">{toc}</nav>
        <div class="content-view-wrapper" id="content-scroll">
            {error_panel}
            <div class="markdown-content" id="content">{content}</div>
        </div>
    </div>
    <script src="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.9.0/highlight.min.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/katex@0.16.11/dist/katex.min.js"></script>
    <script>{js}</script>
</body>
</html>"##,
        css = CSS,
        title = html_escape(title),
        toc = toc,
        error_panel = error_panel,
        content = initial_content,
        js = JS
    )
}

fn js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Script that swaps in a freshly rendered chapter: teardown, DOM update,
/// re-bind, scroll to top, TOC highlight, fade-in.
pub fn set_content_script(content_html: &str, path: &str) -> String {
    format!(
        "window.__setContent(\"{}\", {});",
        BASE64.encode(content_html),
        js_string(path)
    )
}

pub fn begin_fade_out_script(seq: u64) -> String {
    format!("window.__beginFadeOut({seq});")
}

pub fn copy_result_script(id: &str, ok: bool) -> String {
    format!("window.__copyResult({}, {});", js_string(id), ok)
}

const CSS: &str = r##"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

:root {
    --bg-primary: #0d1117;
    --bg-secondary: #161b22;
    --bg-tertiary: #21262d;
    --text-primary: #e6edf3;
    --text-secondary: #8b949e;
    --text-muted: #6e7681;
    --border-color: #30363d;
    --accent-color: #58a6ff;
    --code-bg: #161b22;
    --hl-green: #3fb950;
    --hl-red: #f85149;
    --ripple-color: rgba(168, 168, 168, 0.7);
    --titlebar-height: 34px;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif;
    background: var(--bg-primary);
    color: var(--text-primary);
    line-height: 1.6;
    overflow: hidden;
    font-size: 15px;
}

.title-bar {
    height: var(--titlebar-height);
    display: flex;
    align-items: center;
    justify-content: space-between;
    padding: 0 10px;
    background: var(--bg-secondary);
    border-bottom: 1px solid var(--border-color);
    user-select: none;
    -webkit-user-select: none;
}

.title-bar-text {
    font-size: 12px;
    color: var(--text-secondary);
}

.window-button {
    background: transparent;
    border: none;
    color: var(--text-muted);
    font-size: 12px;
    width: 28px;
    height: 24px;
    cursor: pointer;
    border-radius: 4px;
}

.window-button:hover {
    background: var(--bg-tertiary);
    color: var(--text-primary);
}

.main-layout {
    display: flex;
    height: calc(100vh - var(--titlebar-height));
}

.toc-container {
    width: 240px;
    min-width: 180px;
    background: var(--bg-secondary);
    border-right: 1px solid var(--border-color);
    overflow-y: auto;
    padding: 12px 0;
    font-size: 13px;
}

.toc-container ul {
    list-style: none;
}

.toc-container li.collapsed > ul {
    display: none;
}

.toc-item-row {
    display: flex;
    align-items: center;
    gap: 4px;
    padding-top: 3px;
    padding-bottom: 3px;
}

.toc-toggle-button {
    background: transparent;
    border: none;
    color: var(--text-muted);
    cursor: pointer;
    width: 16px;
    font-size: 12px;
    transition: transform 0.15s ease;
}

li:not(.collapsed) > .toc-item-row > .toc-toggle-button {
    transform: rotate(90deg);
}

.toc-toggle-placeholder {
    width: 16px;
    display: inline-block;
}

.toc-item-link {
    color: var(--text-secondary);
    text-decoration: none;
    flex: 1;
    overflow: hidden;
    text-overflow: ellipsis;
    white-space: nowrap;
}

.toc-item-link:hover {
    color: var(--text-primary);
}

.toc-item-link.active {
    color: var(--accent-color);
    font-weight: 600;
}

.toc-item-header {
    color: var(--text-primary);
    font-weight: 600;
}

.toc-empty {
    padding: 10px 14px;
    color: var(--text-muted);
}

.content-view-wrapper {
    flex: 1;
    overflow-y: auto;
    padding: 32px 48px;
}

.markdown-content {
    max-width: 860px;
    margin: 0 auto;
    transition: opacity 0.3s ease;
}

.markdown-content.faded {
    opacity: 0;
}

.markdown-content h1, .markdown-content h2, .markdown-content h3,
.markdown-content h4, .markdown-content h5, .markdown-content h6 {
    margin-top: 24px;
    margin-bottom: 16px;
    font-weight: 600;
    line-height: 1.25;
}

.markdown-content h1 { font-size: 2em; padding-bottom: 0.3em; border-bottom: 1px solid var(--border-color); }
.markdown-content h2 { font-size: 1.5em; padding-bottom: 0.3em; border-bottom: 1px solid var(--border-color); }
.markdown-content h3 { font-size: 1.25em; }

.markdown-content p { margin-bottom: 16px; }

.markdown-content a { color: var(--accent-color); text-decoration: none; }
.markdown-content a:hover { text-decoration: underline; }

.markdown-content img { max-width: 100%; }

.markdown-content code {
    padding: 0.2em 0.4em;
    font-size: 85%;
    background: var(--bg-tertiary);
    border-radius: 6px;
    font-family: ui-monospace, SFMono-Regular, "SF Mono", Menlo, Consolas, monospace;
}

.markdown-content pre {
    padding: 16px;
    overflow: auto;
    font-size: 85%;
    line-height: 1.45;
    background: var(--code-bg);
    border-radius: 6px;
}

.markdown-content pre code {
    padding: 0;
    background: transparent;
    font-size: 100%;
}

.markdown-content blockquote {
    padding: 0 1em;
    color: var(--text-secondary);
    border-left: 4px solid var(--border-color);
    margin-bottom: 16px;
}

.markdown-content ul, .markdown-content ol { padding-left: 2em; margin-bottom: 16px; }

.markdown-content table { border-collapse: collapse; margin-bottom: 16px; }
.markdown-content th, .markdown-content td { padding: 6px 13px; border: 1px solid var(--border-color); }
.markdown-content th { background: var(--bg-secondary); }

.markdown-content mark {
    background: #5c4d1a;
    color: var(--text-primary);
    border-radius: 2px;
    padding: 0 2px;
}

.code-block-wrapper {
    position: relative;
    margin-bottom: 16px;
}

.clip-button {
    position: absolute;
    top: 8px;
    right: 8px;
    z-index: 2;
    background: var(--bg-tertiary);
    border: 1px solid var(--border-color);
    border-radius: 6px;
    padding: 4px 6px;
    cursor: pointer;
    opacity: 0;
    transition: opacity 0.15s ease;
}

.code-block-wrapper:hover .clip-button {
    opacity: 1;
}

.clip-button svg { fill: var(--text-secondary); display: block; }
.clip-button:hover svg { fill: var(--text-primary); }
.clip-button .icon-check { display: none; }
.clip-button.copied .icon-copy { display: none; }
.clip-button.copied .icon-check { display: block; fill: var(--hl-green); }
.clip-button.copy-failed { border-color: var(--hl-red); }
.clip-button.copy-failed svg { fill: var(--hl-red); }

.callout, .custom-block {
    border-radius: 6px;
    border: 1px solid var(--border-color);
    border-left-width: 4px;
    margin-bottom: 16px;
    padding: 8px 16px;
    background: var(--bg-secondary);
}

.callout-header {
    display: flex;
    align-items: center;
    gap: 8px;
    font-weight: 600;
    margin-bottom: 4px;
}

.custom-block-title { font-weight: 600; margin-bottom: 4px; }

.callout-note, .custom-block.note, .custom-block.hint { border-left-color: var(--accent-color); }
.callout-tip, .custom-block.tip { border-left-color: var(--hl-green); }
.callout-important, .custom-block.important { border-left-color: #a371f7; }
.callout-warning, .custom-block.warning { border-left-color: #d29922; }
.callout-caution, .custom-block.caution { border-left-color: var(--hl-red); }

.tab-panel {
    border: 1px solid var(--border-color);
    border-radius: 6px;
    margin-bottom: 16px;
    padding: 8px 16px;
}

.tab-title {
    font-weight: 600;
    color: var(--text-secondary);
    border-bottom: 1px solid var(--border-color);
    padding-bottom: 4px;
    margin-bottom: 8px;
}

details.collapsible {
    border: 1px solid var(--border-color);
    border-radius: 6px;
    margin-bottom: 16px;
}

details.collapsible summary {
    cursor: pointer;
    padding: 8px 16px;
    font-weight: 600;
    list-style: none;
}

details.collapsible summary::-webkit-details-marker { display: none; }

details.collapsible summary::before {
    content: '›';
    display: inline-block;
    margin-right: 8px;
    transition: transform 0.15s ease;
}

details.collapsible[open] summary::before { transform: rotate(90deg); }

.collapsible-body {
    overflow: hidden;
    padding: 0 16px;
    transition: height 0.3s ease;
}

.error, .error-indicator {
    border: 1px solid var(--hl-red);
    border-radius: 6px;
    padding: 12px 16px;
    margin-bottom: 16px;
    color: var(--hl-red);
    background: rgba(248, 81, 73, 0.1);
}

.global-error pre {
    white-space: pre-wrap;
    color: var(--text-secondary);
    margin-top: 8px;
}

.ripple {
    position: fixed;
    width: 96px;
    height: 96px;
    pointer-events: none;
    z-index: 9999;
}

.ripple-circle {
    fill: var(--ripple-color);
    animation: ripple-radius 0.5s cubic-bezier(.52,.6,.25,.99) forwards,
               ripple-opacity 0.5s linear 0.1s forwards;
}

@keyframes ripple-radius { to { r: 12; } }
@keyframes ripple-opacity { to { opacity: 0; } }
"##;

const JS: &str = r##"
let boundListeners = [];
let copyTimers = {};
let pendingFragment = '';

function send(msg) {
    if (window.ipc) window.ipc.postMessage(JSON.stringify(msg));
}

function decodeContent(b64) {
    const bytes = atob(b64);
    const arr = new Uint8Array(bytes.length);
    for (let i = 0; i < bytes.length; i++) arr[i] = bytes.charCodeAt(i);
    return new TextDecoder('utf-8').decode(arr);
}

// --- Per-render bindings -------------------------------------------------
// Everything registered here is released by teardownContent() before the
// next chapter is inserted. Shell-lifetime listeners (link delegation, TOC,
// ripple, titlebar) are registered once on DOMContentLoaded and never touch
// this list.

function bindContent() {
    document.querySelectorAll('#content .clip-button').forEach((button) => {
        const handler = () => send({ cmd: 'copy', id: button.dataset.copyId });
        button.addEventListener('click', handler);
        boundListeners.push({ element: button, type: 'click', handler });
    });

    document.querySelectorAll('#content details.collapsible').forEach((details) => {
        const summary = details.querySelector('summary');
        const body = details.querySelector('.collapsible-body');
        if (!summary || !body) return;
        const handler = (e) => {
            e.preventDefault();
            toggleCollapsible(details, body);
        };
        summary.addEventListener('click', handler);
        boundListeners.push({ element: summary, type: 'click', handler });
    });
}

function teardownContent() {
    boundListeners.forEach(({ element, type, handler }) => {
        element.removeEventListener(type, handler);
    });
    boundListeners = [];
    Object.values(copyTimers).forEach(clearTimeout);
    copyTimers = {};
}

function toggleCollapsible(details, body) {
    if (details.classList.contains('animating')) return;
    details.classList.add('animating');
    const finish = (e) => {
        if (e.propertyName !== 'height') return;
        body.removeEventListener('transitionend', finish);
        if (closing) details.open = false;
        body.style.height = '';
        details.classList.remove('animating');
    };
    const closing = details.open;
    body.addEventListener('transitionend', finish);
    if (closing) {
        body.style.height = body.scrollHeight + 'px';
        requestAnimationFrame(() => { body.style.height = '0px'; });
    } else {
        details.open = true;
        const target = body.scrollHeight;
        body.style.height = '0px';
        requestAnimationFrame(() => { body.style.height = target + 'px'; });
    }
}

function enhanceContent(el) {
    if (window.katex) {
        el.querySelectorAll('.math').forEach((m) => {
            try {
                katex.render(m.textContent, m, {
                    displayMode: m.classList.contains('math-display'),
                    throwOnError: false
                });
            } catch (e) {
                m.classList.add('math-error');
            }
        });
    }
    if (window.hljs) {
        el.querySelectorAll('pre code').forEach((code) => hljs.highlightElement(code));
    }
}

// --- Entry points called from the backend --------------------------------

window.__setContent = function (b64, path) {
    const el = document.getElementById('content');
    teardownContent();
    el.innerHTML = decodeContent(b64);
    enhanceContent(el);
    bindContent();
    document.getElementById('content-scroll').scrollTop = 0;
    if (pendingFragment) {
        const anchor = document.getElementById(pendingFragment);
        if (anchor) anchor.scrollIntoView({ block: 'start' });
        pendingFragment = '';
    }
    document.querySelectorAll('.toc-item-link').forEach((a) => {
        a.classList.toggle('active', a.dataset.path === path);
    });
    el.classList.remove('faded');
};

window.__beginFadeOut = function (seq) {
    const el = document.getElementById('content');
    if (el.classList.contains('faded')) {
        send({ cmd: 'fadeOutDone', seq });
        return;
    }
    const done = (e) => {
        if (e.propertyName !== 'opacity') return;
        el.removeEventListener('transitionend', done);
        send({ cmd: 'fadeOutDone', seq });
    };
    el.addEventListener('transitionend', done);
    el.classList.add('faded');
};

window.__copyResult = function (id, ok) {
    const button = document.querySelector('.clip-button[data-copy-id="' + CSS.escape(id) + '"]');
    if (!button) return;
    button.classList.remove('copied', 'copy-failed');
    button.classList.add(ok ? 'copied' : 'copy-failed');
    button.setAttribute('aria-label', ok ? 'Copied!' : 'Copy failed!');
    if (copyTimers[id]) clearTimeout(copyTimers[id]);
    copyTimers[id] = setTimeout(() => {
        button.classList.remove('copied', 'copy-failed');
        button.setAttribute('aria-label', 'Copy to clipboard');
        delete copyTimers[id];
    }, 2000);
};

// --- Shell-lifetime listeners --------------------------------------------

function handleContentClick(e) {
    const link = e.target.closest('a');
    if (!link) return;
    const href = link.getAttribute('href');
    if (!href) return;

    if (href.startsWith('#')) {
        const target = document.getElementById(href.slice(1));
        if (target) {
            e.preventDefault();
            target.scrollIntoView({ behavior: 'smooth', block: 'start' });
        }
        return;
    }
    if (/^[a-zA-Z][a-zA-Z0-9+.-]*:/.test(href)) {
        e.preventDefault();
        send({ cmd: 'openExternal', url: href });
        return;
    }
    // A chapter link may carry a fragment (other.md#section); the path
    // alone is sent over IPC and the fragment is scrolled to after the
    // chapter commits.
    const hash = href.indexOf('#');
    const target = hash >= 0 ? href.slice(0, hash) : href;
    if (target.toLowerCase().endsWith('.md') || !target.startsWith('/')) {
        e.preventDefault();
        pendingFragment = hash >= 0 ? href.slice(hash + 1) : '';
        send({ cmd: 'navigate', href: target });
    }
}

function handleTocClick(e) {
    const toggle = e.target.closest('.toc-toggle-button');
    if (toggle) {
        const li = toggle.closest('li');
        const collapsed = li.classList.toggle('collapsed');
        toggle.setAttribute('aria-expanded', String(!collapsed));
        toggle.setAttribute('title', collapsed ? 'Expand' : 'Collapse');
        return;
    }
    const link = e.target.closest('.toc-item-link');
    if (link) {
        e.preventDefault();
        pendingFragment = '';
        send({ cmd: 'tocNavigate', path: link.dataset.path });
        return;
    }
    const header = e.target.closest('.toc-item-header');
    if (header) {
        const li = header.closest('li');
        if (li.querySelector('ul')) li.classList.toggle('collapsed');
    }
}

function handleRipple(e) {
    if (e.target.closest('button, a, input, select, textarea, summary')) return;
    const container = document.createElement('div');
    container.className = 'ripple';
    container.style.left = (e.clientX - 48) + 'px';
    container.style.top = (e.clientY - 48) + 'px';
    container.innerHTML = '<svg width="96" height="96" viewBox="0 0 24 24">'
        + '<circle cx="12" cy="12" r="0" class="ripple-circle"/></svg>';
    document.body.appendChild(container);
    setTimeout(() => {
        if (document.body.contains(container)) document.body.removeChild(container);
    }, 600);
}

document.addEventListener('DOMContentLoaded', function () {
    bindContent();
    enhanceContent(document.getElementById('content'));

    document.getElementById('content-scroll').addEventListener('click', handleContentClick);
    document.getElementById('toc').addEventListener('click', handleTocClick);
    document.addEventListener('click', handleRipple);

    document.getElementById('minimize-button').addEventListener('click', () => send({ cmd: 'minimize' }));
    document.getElementById('close-button').addEventListener('click', () => send({ cmd: 'close' }));
    document.getElementById('title-bar').addEventListener('mousedown', (e) => {
        if (e.button !== 0 || e.target.closest('button')) return;
        send({ cmd: 'dragWindow' });
    });
});
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toc() -> Vec<TocItem> {
        vec![
            TocItem {
                title: "Intro".into(),
                path: "intro.md".into(),
                level: 0,
                children: vec![],
            },
            TocItem {
                title: "Guide".into(),
                path: "guide/index.md".into(),
                level: 0,
                children: vec![TocItem {
                    title: "Setup".into(),
                    path: "guide/setup.md".into(),
                    level: 1,
                    children: vec![],
                }],
            },
            TocItem {
                title: "Appendix".into(),
                path: String::new(),
                level: 0,
                children: vec![],
            },
        ]
    }

    #[test]
    fn current_chapter_is_marked_active() {
        let html = toc_html(&sample_toc(), "guide/setup.md");
        assert!(html.contains(r#"class="toc-item-link active" data-path="guide/setup.md""#));
        assert!(!html.contains(r#"class="toc-item-link active" data-path="intro.md""#));
    }

    #[test]
    fn parents_start_collapsed_and_leaves_do_not() {
        let html = toc_html(&sample_toc(), "intro.md");
        assert_eq!(html.matches(r#"<li class="collapsed">"#).count(), 1);
        assert!(html.contains("toc-toggle-button"));
    }

    #[test]
    fn heading_only_items_render_as_headers() {
        let html = toc_html(&sample_toc(), "intro.md");
        assert!(html.contains(r#"<span class="toc-item-header">Appendix</span>"#));
    }

    #[test]
    fn titles_are_escaped() {
        let toc = vec![TocItem {
            title: "<script>".into(),
            path: "x.md".into(),
            level: 0,
            children: vec![],
        }];
        let html = toc_html(&toc, "");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn empty_toc_renders_placeholder() {
        assert!(toc_html(&[], "").contains("toc-empty"));
    }

    #[test]
    fn set_content_script_encodes_html_and_escapes_path() {
        let script = set_content_script("<p>hi</p>", "a\"b.md");
        assert!(script.starts_with("window.__setContent(\""));
        assert!(script.contains(&BASE64.encode("<p>hi</p>")));
        assert!(script.contains("a\\\"b.md"));
    }

    #[test]
    fn shell_contains_layout_anchors() {
        let page = build_shell("devo", "<ul></ul>", "<p>first</p>", None);
        for anchor in ["id=\"toc\"", "id=\"content\"", "id=\"content-scroll\"", "id=\"title-bar\""] {
            assert!(page.contains(anchor), "missing {anchor}");
        }
        assert!(page.contains("<p>first</p>"));
        assert!(!page.contains("global-error"));
    }

    #[test]
    fn shell_script_splits_fragments_off_chapter_links() {
        // other.md#section must navigate to other.md, then scroll to the
        // fragment once the chapter is in the DOM.
        assert!(JS.contains("const hash = href.indexOf('#');"));
        assert!(JS.contains("send({ cmd: 'navigate', href: target });"));
        assert!(JS.contains("if (pendingFragment) {"));
    }

    #[test]
    fn shell_surfaces_global_error_panel() {
        let page = build_shell("devo", "", "<p></p>", Some("SUMMARY.md is <gone>"));
        assert!(page.contains("global-error"));
        assert!(page.contains("SUMMARY.md is &lt;gone&gt;"));
    }
}
