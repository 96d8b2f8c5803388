//! Path helpers shared by route groups and the redirect fallbacks.

/// Returns the canonical form of `p`.
///
/// Rules, applied until nothing changes:
/// 1. Replace multiple slashes with a single slash.
/// 2. Eliminate each `.` path name element.
/// 3. Eliminate each inner `..` along with the non-`..` element before it.
/// 4. Eliminate `..` elements that begin a rooted path.
///
/// The result always starts with `/` and keeps a trailing slash if `p` had one.
pub fn clean_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_owned();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    let mut cleaned = String::with_capacity(p.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }

    if cleaned.is_empty() || (p.ends_with('/') && p.len() > 1) {
        cleaned.push('/');
    }
    cleaned
}

/// Joins a group prefix and a relative route path.
///
/// The result is cleaned; a trailing slash on `relative` is preserved.
pub fn join_paths(absolute: &str, relative: &str) -> String {
    if relative.is_empty() {
        return absolute.to_owned();
    }

    clean_path(&format!("{}/{}", absolute, relative))
}

/// `path` with its trailing slash added or removed. None for the root path.
pub(crate) fn toggle_trailing_slash(path: &str) -> Option<String> {
    match path.strip_suffix('/') {
        Some("") => None,
        Some(trimmed) => Some(trimmed.to_owned()),
        None => Some(format!("{}/", path)),
    }
}

/// Percent-encodes every segment of a decoded path so it can be sent back
/// in a `Location` header.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
