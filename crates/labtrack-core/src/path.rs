//! Storage path utilities.
//!
//! Pure string operations over `/`-delimited storage paths. None of these
//! functions fail: malformed input degrades to the closest safe value
//! (an empty string, the root, or the input's parent), because they run
//! before network calls where a panic or error would be worse than a
//! conservative answer.
//!
//! Folder paths carry a trailing delimiter, file paths never do.

/// The path delimiter shared by every backend.
pub const DELIMITER: char = '/';

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(DELIMITER).filter(|s| !s.is_empty())
}

/// Join a parent path and a child name with exactly one delimiter between them.
///
/// Empty parts are skipped, so `join("", "a")` is `"a"` and `join("/", "a")`
/// is `"/a"`.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return name.to_string();
    }
    if name.is_empty() {
        return parent.to_string();
    }
    format!(
        "{}{}{}",
        parent.trim_end_matches(DELIMITER),
        DELIMITER,
        name.trim_start_matches(DELIMITER)
    )
}

/// Remove traversal segments from a path.
///
/// `.` and `..` segments are dropped rather than resolved, repeated
/// delimiters collapse, and backslashes count as delimiters. A leading or
/// trailing delimiter is preserved. `None` yields an empty string.
pub fn clean(path: Option<&str>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    let path = path.replace('\\', "/");
    let leading = path.starts_with(DELIMITER);
    let trailing = path.ends_with(DELIMITER);

    let kept: Vec<&str> = segments(&path)
        .filter(|s| *s != "." && *s != "..")
        .collect();

    if kept.is_empty() {
        return if leading {
            DELIMITER.to_string()
        } else {
            String::new()
        };
    }

    let mut out = String::with_capacity(path.len());
    if leading {
        out.push(DELIMITER);
    }
    out.push_str(&kept.join("/"));
    if trailing {
        out.push(DELIMITER);
    }
    out
}

/// Give a path exactly one leading and one trailing delimiter.
///
/// Used for folder comparison. `normalize("")` is `"/"`.
pub fn normalize(path: &str) -> String {
    let inner: Vec<&str> = segments(path).collect();
    if inner.is_empty() {
        return DELIMITER.to_string();
    }
    format!("/{}/", inner.join("/"))
}

/// Case-insensitive, delimiter-normalized equality.
pub fn compare(a: &str, b: &str) -> bool {
    normalize(a).to_lowercase() == normalize(b).to_lowercase()
}

/// The parent folder of a path, with a trailing delimiter.
///
/// Top-level relative entries have an empty parent (the key-space root);
/// top-level absolute entries have `/`.
pub fn parent_of(path: &str) -> String {
    let leading = path.starts_with(DELIMITER);
    let parts: Vec<&str> = segments(path).collect();
    if parts.len() <= 1 {
        return if leading {
            DELIMITER.to_string()
        } else {
            String::new()
        };
    }
    let mut out = String::new();
    if leading {
        out.push(DELIMITER);
    }
    out.push_str(&parts[..parts.len() - 1].join("/"));
    out.push(DELIMITER);
    out
}

/// The last non-empty segment of a path (empty for the root).
pub fn name_of(path: &str) -> String {
    segments(path).last().unwrap_or_default().to_string()
}

/// Ensure a folder path ends with the delimiter. The empty root stays empty.
pub fn folder_path(path: &str) -> String {
    if path.is_empty() || path.ends_with(DELIMITER) {
        path.to_string()
    } else {
        format!("{path}{DELIMITER}")
    }
}

/// Strip trailing delimiters from a file path.
pub fn file_path(path: &str) -> String {
    path.trim_end_matches(DELIMITER).to_string()
}

/// Strip leading delimiters, turning an absolute path into a key.
pub fn strip_leading(path: &str) -> &str {
    path.trim_start_matches(DELIMITER)
}

/// Whether `path` equals `root` or lies underneath it.
pub fn is_within(root: &str, path: &str) -> bool {
    normalize(path).starts_with(&normalize(root))
}

/// The part of `path` below `root`, without a leading delimiter.
pub fn relative_to(root: &str, path: &str) -> Option<String> {
    let root = normalize(root);
    let path = normalize(path);
    path.strip_prefix(&root)
        .map(|rest| rest.trim_end_matches(DELIMITER).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "/",
        "//",
        "a",
        "/a",
        "a/",
        "/a/b/",
        "a//b///c",
        "../../etc/passwd",
        "/data/../../x/",
        "C:\\Users\\..\\x",
        "./a/./b",
        "Acme/ProjectX",
    ];

    #[test]
    fn test_join() {
        assert_eq!(join("/data", "Acme"), "/data/Acme");
        assert_eq!(join("/data/", "/Acme"), "/data/Acme");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("", "teamA"), "teamA");
        assert_eq!(join("teamA/", ""), "teamA/");
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(None), "");
        assert_eq!(clean(Some("../../etc/passwd")), "etc/passwd");
        assert_eq!(clean(Some("/a/../b/")), "/a/b/");
        assert_eq!(clean(Some("a//b")), "a/b");
        assert_eq!(clean(Some("..")), "");
        assert_eq!(clean(Some("/..")), "/");
        assert_eq!(clean(Some("..\\..\\secret")), "secret");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for p in SAMPLES {
            let once = normalize(p);
            assert_eq!(normalize(&once), once, "input {p:?}");
            assert!(once.starts_with('/') && once.ends_with('/'));
        }
    }

    #[test]
    fn test_clean_never_escapes_root() {
        for p in SAMPLES {
            let joined = normalize(&join("/data", &clean(Some(p))));
            assert!(joined.starts_with("/data/"), "input {p:?} escaped to {joined}");
        }
    }

    #[test]
    fn test_compare() {
        assert!(compare("/Data/Acme", "data/acme/"));
        assert!(compare("", "/"));
        assert!(!compare("/data/a", "/data/b"));
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent_of("/a/b/"), "/a/");
        assert_eq!(parent_of("a/b"), "a/");
        assert_eq!(parent_of("a"), "");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of(""), "");
        assert_eq!(name_of("/a/b/"), "b");
        assert_eq!(name_of("teamA/report.pdf"), "report.pdf");
        assert_eq!(name_of("/"), "");
    }

    #[test]
    fn test_folder_and_file_paths() {
        assert_eq!(folder_path("teamA"), "teamA/");
        assert_eq!(folder_path("teamA/"), "teamA/");
        assert_eq!(folder_path(""), "");
        assert_eq!(file_path("teamA/x.txt/"), "teamA/x.txt");
        assert_eq!(strip_leading("/teamA/"), "teamA/");
    }

    #[test]
    fn test_within_and_relative() {
        assert!(is_within("/data", "/data/Acme/"));
        assert!(is_within("/data", "/data"));
        assert!(!is_within("/data", "/database"));
        assert_eq!(relative_to("/data", "/data/Acme/X/").as_deref(), Some("Acme/X"));
        assert_eq!(relative_to("/data", "/data").as_deref(), Some(""));
        assert_eq!(relative_to("/data", "/other"), None);
    }
}
