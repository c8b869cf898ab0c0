//! Pure path resolution for chapter links and image sources.
//!
//! Chapter paths are always book-relative, `/`-separated strings. Resolution
//! never touches the filesystem; the same fold is used for link targets and
//! image sources, only the output prefix differs (chapter route vs. asset
//! route).

/// URL prefix under which book-relative static files are served by the
/// custom protocol registered in `main`.
#[cfg(windows)]
pub const ASSET_MOUNT: &str = "http://book.localhost/";
#[cfg(not(windows))]
pub const ASSET_MOUNT: &str = "book://localhost/";

const CHAPTER_EXT: &str = ".md";

/// True for references that must be left alone: remote URLs and data URIs.
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("data:")
}

/// True if `path` addresses a chapter document.
pub fn is_chapter_path(path: &str) -> bool {
    path.len() > CHAPTER_EXT.len() && path.to_ascii_lowercase().ends_with(CHAPTER_EXT)
}

/// Directory portion of a chapter path, without a trailing slash.
/// `"guide/intro.md"` -> `"guide"`, `"intro.md"` -> `""`.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolve `reference` against `base_dir`, collapsing `.` and `..` segments.
///
/// Remote and root-absolute references are returned unchanged. `..` segments
/// that would climb above the (unknown) root are preserved literally rather
/// than clamped; the backend decides what to do with them.
pub fn resolve_relative(base_dir: &str, reference: &str) -> String {
    if is_remote(reference) || reference.starts_with('/') {
        return reference.to_string();
    }

    let combined = if base_dir.is_empty() {
        reference.to_string()
    } else {
        format!("{}/{}", base_dir.trim_end_matches('/'), reference)
    };

    let mut kept: Vec<&str> = Vec::new();
    for segment in combined.split('/') {
        match segment {
            "" | "." => {}
            ".." => match kept.last() {
                Some(&last) if last != ".." => {
                    kept.pop();
                }
                _ => kept.push(".."),
            },
            other => kept.push(other),
        }
    }
    kept.join("/")
}

/// Map a resolved book-relative reference onto the asset route.
pub fn asset_url(resolved: &str) -> String {
    format!("{}{}", ASSET_MOUNT, resolved.trim_start_matches('/'))
}
