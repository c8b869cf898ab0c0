//! Chapter navigation state machine.
//!
//! Pure and effect-returning: callers feed it requests and completion
//! signals, it answers with the next side effect to run. Every accepted
//! navigation gets a fresh sequence token; completion signals carrying a
//! stale token are discarded, so a slow fetch can never overwrite the
//! content of a navigation that superseded it (last request wins).

use log::{debug, warn};

use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Fade-out is running; waiting for the shell's transition-end signal.
    Transitioning,
    Loading,
}

/// Side effect the caller must perform next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEffect {
    BeginFadeOut { seq: u64 },
    Fetch { seq: u64, path: String },
}

/// Outcome of a completed fetch, after the stale-token guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// Content for `path` should be rendered; `current_path` now points at it.
    Content { path: String },
    /// The fetch failed; an error document should be rendered. The current
    /// path is left at the previous chapter so the TOC keeps highlighting
    /// content that actually exists.
    Error { path: String },
}

#[derive(Debug)]
pub struct Navigator {
    current_path: String,
    target: Option<String>,
    phase: Phase,
    seq: u64,
}

impl Navigator {
    pub fn new(initial_path: impl Into<String>) -> Self {
        Self {
            current_path: initial_path.into(),
            target: None,
            phase: Phase::Idle,
            seq: 0,
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Request navigation to a chapter. Returns the fade-out effect for an
    /// accepted request, or `None` for rejected ones (wrong extension, or
    /// the chapter is already displayed). A request made while another is
    /// in flight supersedes it.
    pub fn navigate_to(&mut self, path: &str) -> Option<NavEffect> {
        if !paths::is_chapter_path(path) {
            warn!("refusing to load non-chapter path: {path}");
            return None;
        }
        if path == self.current_path {
            debug!("chapter already loaded: {path}");
            return None;
        }
        self.seq += 1;
        self.target = Some(path.to_string());
        self.phase = Phase::Transitioning;
        Some(NavEffect::BeginFadeOut { seq: self.seq })
    }

    /// The shell reported that the fade-out transition finished.
    pub fn fade_out_done(&mut self, seq: u64) -> Option<NavEffect> {
        if seq != self.seq || self.phase != Phase::Transitioning {
            debug!("ignoring stale fade-out signal (seq {seq})");
            return None;
        }
        self.phase = Phase::Loading;
        self.target
            .clone()
            .map(|path| NavEffect::Fetch { seq, path })
    }

    /// Re-fetch the current chapter in place (disk change), skipping the
    /// fade-out phase. Only an explicit `navigate_to` may supersede an
    /// in-flight navigation; a reload arriving mid-flight is dropped.
    pub fn reload(&mut self) -> Option<NavEffect> {
        if self.phase != Phase::Idle {
            debug!("skipping reload while a navigation is in flight");
            return None;
        }
        if self.current_path.is_empty() {
            return None;
        }
        self.seq += 1;
        self.target = Some(self.current_path.clone());
        self.phase = Phase::Loading;
        Some(NavEffect::Fetch {
            seq: self.seq,
            path: self.current_path.clone(),
        })
    }

    /// A fetch finished. Returns `None` when the result belongs to a
    /// superseded navigation and must be dropped.
    pub fn finish(&mut self, seq: u64, ok: bool) -> Option<Commit> {
        if seq != self.seq {
            debug!("dropping superseded fetch result (seq {seq}, current {})", self.seq);
            return None;
        }
        self.phase = Phase::Idle;
        let path = self.target.take()?;
        if ok {
            self.current_path = path.clone();
            Some(Commit::Content { path })
        } else {
            Some(Commit::Error { path })
        }
    }
}
