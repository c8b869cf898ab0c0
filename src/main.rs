mod book;
mod config;
mod markdown;
mod nav;
mod paths;
mod postprocess;
mod shell;
mod widgets;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tao::{
    dpi::LogicalSize,
    event::{Event as TaoEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy},
    window::{Window, WindowBuilder},
};
use wry::http::{header::CONTENT_TYPE, Request, Response, StatusCode};
use wry::{WebView, WebViewBuilder};

use book::{BookSource, FsBook};
use config::AppConfig;
use markdown::MarkdownRenderer;
use nav::{Commit, NavEffect, Navigator};
use widgets::WidgetBindings;

#[derive(Debug, Parser)]
#[command(name = "devo", version, about = "Desktop mdbook viewer")]
struct Cli {
    /// Book directory containing SUMMARY.md (defaults to the last opened
    /// book, then to ./book)
    book: Option<PathBuf>,

    /// Window title
    #[arg(long)]
    title: Option<String>,
}

/// Messages the shell script posts over the IPC channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
enum IpcMessage {
    Navigate { href: String },
    TocNavigate { path: String },
    FadeOutDone { seq: u64 },
    Copy { id: String },
    OpenExternal { url: String },
    DragWindow,
    Minimize,
    Close,
}

#[derive(Debug)]
enum UserEvent {
    Ipc(IpcMessage),
    ChapterLoaded {
        seq: u64,
        path: String,
        result: Result<String, String>,
    },
    FileChanged(PathBuf),
}

/// Full render pipeline for one chapter: markdown to HTML, image source
/// rewriting relative to the chapter's directory, callout conversion, then
/// the widget scan that wraps code blocks and rebuilds the copy registry.
fn render_chapter(
    renderer: &MarkdownRenderer,
    markdown: &str,
    chapter_path: &str,
) -> (String, WidgetBindings) {
    let html = match renderer.render(markdown) {
        Ok(html) => html,
        Err(err) => format!(
            r#"<div class="error"><p>{}</p></div>"#,
            markdown::html_escape(&err.to_string())
        ),
    };
    let html = postprocess::rewrite_image_sources(&html, paths::parent_dir(chapter_path));
    let html = postprocess::convert_callouts(&html);
    WidgetBindings::scan(&html)
}

struct App {
    book: FsBook,
    book_dir: PathBuf,
    renderer: MarkdownRenderer,
    navigator: Navigator,
    bindings: WidgetBindings,
    window: Arc<Window>,
    webview: WebView,
    proxy: EventLoopProxy<UserEvent>,
    _watcher: Option<RecommendedWatcher>,
}

impl App {
    fn handle_ipc(&mut self, msg: IpcMessage, control_flow: &mut ControlFlow) {
        match msg {
            IpcMessage::Navigate { href } => {
                // In-content links resolve against the current chapter's
                // directory; the TOC always sends book-root-relative paths.
                let base = paths::parent_dir(self.navigator.current_path()).to_string();
                let resolved = paths::resolve_relative(&base, &href);
                let resolved = resolved.trim_start_matches('/').to_string();
                if let Some(effect) = self.navigator.navigate_to(&resolved) {
                    self.run_effect(effect);
                }
            }
            IpcMessage::TocNavigate { path } => {
                if let Some(effect) = self.navigator.navigate_to(&path) {
                    self.run_effect(effect);
                }
            }
            IpcMessage::FadeOutDone { seq } => {
                if let Some(effect) = self.navigator.fade_out_done(seq) {
                    self.run_effect(effect);
                }
            }
            IpcMessage::Copy { id } => {
                let ok = match self.bindings.copy_text(&id) {
                    Some(text) => set_clipboard(text),
                    None => {
                        warn!("copy request for unknown id: {id}");
                        false
                    }
                };
                self.eval(&shell::copy_result_script(&id, ok));
            }
            IpcMessage::OpenExternal { url } => open_external(&url),
            IpcMessage::DragWindow => {
                if let Err(err) = self.window.drag_window() {
                    debug!("window drag not available: {err}");
                }
            }
            IpcMessage::Minimize => self.window.set_minimized(true),
            IpcMessage::Close => {
                self.persist_config();
                *control_flow = ControlFlow::Exit;
            }
        }
    }

    fn run_effect(&mut self, effect: NavEffect) {
        match effect {
            NavEffect::BeginFadeOut { seq } => {
                self.eval(&shell::begin_fade_out_script(seq));
            }
            NavEffect::Fetch { seq, path } => {
                let book = self.book.clone();
                let proxy = self.proxy.clone();
                thread::spawn(move || {
                    let result = book.chapter(&path).map_err(|err| err.to_string());
                    let _ = proxy.send_event(UserEvent::ChapterLoaded { seq, path, result });
                });
            }
        }
    }

    fn chapter_loaded(&mut self, seq: u64, path: String, result: Result<String, String>) {
        let ok = result.is_ok();
        let markdown = match result {
            Ok(markdown) => markdown,
            Err(msg) => {
                warn!("chapter load failed for {path}: {msg}");
                book::error_document(&path, &msg)
            }
        };
        let Some(commit) = self.navigator.finish(seq, ok) else {
            debug!("dropping render for superseded navigation to {path}");
            return;
        };
        let committed = match &commit {
            Commit::Content { path } | Commit::Error { path } => path.clone(),
        };
        let (html, bindings) = render_chapter(&self.renderer, &markdown, &committed);
        self.bindings = bindings;
        self.eval(&shell::set_content_script(&html, self.navigator.current_path()));
    }

    fn file_changed(&mut self, changed: &Path) {
        let current = self.book.contained_path(self.navigator.current_path());
        if changed != current {
            return;
        }
        info!("chapter changed on disk, reloading: {}", current.display());
        if let Some(effect) = self.navigator.reload() {
            self.run_effect(effect);
        }
    }

    fn persist_config(&self) {
        let size = self
            .window
            .inner_size()
            .to_logical::<f64>(self.window.scale_factor());
        let cfg = AppConfig {
            width: size.width,
            height: size.height,
            book_dir: Some(self.book_dir.clone()),
        };
        if let Err(err) = cfg.save() {
            warn!("could not persist window config: {err}");
        }
    }

    fn eval(&self, script: &str) {
        if let Err(err) = self.webview.evaluate_script(script) {
            error!("script evaluation failed: {err}");
        }
    }
}

fn serve_asset(book: &FsBook, request: Request<Vec<u8>>) -> Response<Cow<'static, [u8]>> {
    let raw = request.uri().path();
    let decoded = urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string());
    let relative = decoded.trim_start_matches('/');
    debug!("asset request: {relative}");

    let (status, mime, body): (StatusCode, &str, Cow<'static, [u8]>) =
        match book.read_asset(relative) {
            Some(bytes) => (StatusCode::OK, mime_for(relative), Cow::Owned(bytes)),
            None => {
                warn!("asset not found: {relative}");
                (
                    StatusCode::NOT_FOUND,
                    "text/plain",
                    Cow::Borrowed(b"asset not found".as_slice()),
                )
            }
        };

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, mime)
        .body(body)
        .unwrap_or_else(|_| Response::new(Cow::Borrowed(b"".as_slice())))
}

fn mime_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "md" | "txt" => "text/plain",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn set_clipboard(text: &str) -> bool {
    match arboard::Clipboard::new().and_then(|mut clip| clip.set_text(text.to_string())) {
        Ok(()) => true,
        Err(err) => {
            warn!("clipboard write failed: {err}");
            false
        }
    }
}

fn open_external(url: &str) {
    info!("opening externally: {url}");
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open").arg(url).spawn();
    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn();
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let result = std::process::Command::new("xdg-open").arg(url).spawn();
    if let Err(err) = result {
        warn!("could not open {url}: {err}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let cfg = AppConfig::load();

    let book_dir = cli
        .book
        .clone()
        .or_else(|| cfg.book_dir.clone())
        .unwrap_or_else(|| PathBuf::from("book"));
    let book = FsBook::new(&book_dir);
    let data = book.book_data();

    let renderer = MarkdownRenderer::new();
    let (initial_html, bindings) =
        render_chapter(&renderer, &data.initial_markdown, &data.initial_path);
    let title = cli
        .title
        .clone()
        .unwrap_or_else(|| format!("devo - {}", book_dir.display()));
    let toc = shell::toc_html(&data.toc, &data.initial_path);
    let page = shell::build_shell(&title, &toc, &initial_html, data.error.as_deref());

    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    let proxy = event_loop.create_proxy();

    let window = WindowBuilder::new()
        .with_title(&title)
        .with_inner_size(LogicalSize::new(cfg.width, cfg.height))
        .with_decorations(false)
        .build(&event_loop)
        .context("creating window")?;
    let window = Arc::new(window);

    let ipc_proxy = proxy.clone();
    let asset_book = book.clone();
    let webview = WebViewBuilder::new()
        .with_html(page)
        .with_ipc_handler(move |req| match serde_json::from_str::<IpcMessage>(req.body()) {
            Ok(msg) => {
                let _ = ipc_proxy.send_event(UserEvent::Ipc(msg));
            }
            Err(err) => warn!("unparseable ipc message: {err}"),
        })
        .with_custom_protocol("book".into(), move |_id, request| {
            serve_asset(&asset_book, request)
        })
        .with_navigation_handler(|url| {
            if url.starts_with("about:")
                || url.starts_with("data:")
                || url.starts_with(paths::ASSET_MOUNT)
            {
                return true;
            }
            if url.starts_with("http://") || url.starts_with("https://") {
                open_external(&url);
                return false;
            }
            true
        })
        .build(&window)
        .context("creating webview")?;

    let watch_proxy = proxy.clone();
    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            for path in event.paths {
                let _ = watch_proxy.send_event(UserEvent::FileChanged(path));
            }
        }
    })
    .map_err(|err| warn!("live reload disabled: {err}"))
    .ok();
    let watcher = watcher.and_then(|mut w| match w.watch(book.root(), RecursiveMode::Recursive) {
        Ok(()) => Some(w),
        Err(err) => {
            warn!("live reload disabled: {err}");
            None
        }
    });

    let mut app = App {
        navigator: Navigator::new(data.initial_path.clone()),
        bindings,
        book,
        book_dir,
        renderer,
        window: Arc::clone(&window),
        webview,
        proxy,
        _watcher: watcher,
    };

    info!("book loaded, {} top-level TOC entries", data.toc.len());

    event_loop.run(move |event, _target, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            TaoEvent::UserEvent(UserEvent::Ipc(msg)) => app.handle_ipc(msg, control_flow),
            TaoEvent::UserEvent(UserEvent::ChapterLoaded { seq, path, result }) => {
                app.chapter_loaded(seq, path, result)
            }
            TaoEvent::UserEvent(UserEvent::FileChanged(path)) => app.file_changed(&path),
            TaoEvent::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                app.persist_config();
                *control_flow = ControlFlow::Exit;
            }
            _ => {}
        }
    });
}
