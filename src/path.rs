//! Stateless lexical path helpers.
//!
//! These resolve purely on the string, without touching the filesystem.
//! Both `/` and `\` count as separators on every platform.

/// Path separators recognized by the lexical helpers.
pub(crate) const DELIMS: [char; 2] = ['/', '\\'];

/// Compute the parent path of `path` lexically.
///
/// Strips one trailing run of separators, then one trailing component.
/// A trailing `.` component is skipped without consuming a level; a
/// trailing `..` consumes one extra ancestor level. Stripping past the
/// root yields `/`.
///
/// ```rust
/// use virtfs::parent_of;
///
/// assert_eq!(parent_of("/"), "/");
/// assert_eq!(parent_of("/a/b/"), "/a");
/// assert_eq!(parent_of("/a/./b"), "/a");
/// assert_eq!(parent_of("/a/../b"), "/");
/// ```
pub fn parent_of(path: &str) -> String {
    let mut result = path;
    let mut to_remove = 1usize;

    loop {
        result = result.trim_end_matches(DELIMS);
        if result.is_empty() {
            return "/".to_owned();
        }

        let elem = match result.rfind(DELIMS) {
            Some(at) => &result[at + 1..],
            // A bare component with no separator left is its own parent.
            None => break,
        };

        match elem {
            "." => {
                result = &result[..result.len() - 1];
            }
            ".." => {
                to_remove += 1;
                result = &result[..result.len() - 2];
            }
            _ => {
                if to_remove == 0 {
                    break;
                }
                to_remove -= 1;
                result = &result[..result.len() - elem.len()];
            }
        }
    }

    let result = result.trim_end_matches(DELIMS);
    if result.is_empty() {
        return "/".to_owned();
    }

    result.to_owned()
}

/// The final component of `path` (everything after the last separator).
pub(crate) fn file_name(path: &str) -> &str {
    match path.rfind(DELIMS) {
        Some(at) => &path[at + 1..],
        None => path,
    }
}

/// Join `base` and `more` with exactly one separator, collapsing any
/// trailing run on `base` and leading run on `more`.
pub fn path_append(base: &str, more: &str) -> String {
    let base = base.trim_end_matches(DELIMS);
    let more = more.trim_start_matches(DELIMS);

    format!("{base}/{more}")
}
