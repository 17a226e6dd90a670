use std::path::{Component, Path, PathBuf};

/// Legacy Windows MAX_PATH. Sync clients still choke past it.
pub const MAX_PATH_CHARS: usize = 260;

/// Lexically resolves `path` to an absolute, `/`-separated form.
///
/// Relative inputs are anchored at the process working directory. `.` and `..`
/// are collapsed without touching the filesystem, so the target does not need
/// to exist. Backslashes are treated as separators on every platform, which
/// keeps `..\..\` style input from slipping past containment checks.
pub fn normalize_path(path: impl AsRef<Path>) -> String {
    let raw = path.as_ref().to_string_lossy().replace('\\', "/");
    let candidate = PathBuf::from(raw);
    let absolute = if candidate.is_absolute() {
        candidate
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(candidate),
            Err(_) => candidate,
        }
    };

    let mut prefix = String::new();
    let mut segments: Vec<String> = Vec::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(value) => {
                prefix = value.as_os_str().to_string_lossy().replace('\\', "/");
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                segments.pop();
            }
            Component::Normal(value) => segments.push(value.to_string_lossy().into_owned()),
        }
    }

    format!("{}/{}", prefix, segments.join("/"))
}

/// Case-insensitive containment check; the vault lives on a case-insensitive
/// filesystem.
pub fn is_within_root(path: impl AsRef<Path>, root: impl AsRef<Path>) -> bool {
    relative_to_root(path, root).is_some()
}

/// `/`-separated remainder of `path` below `root`, or `None` when the path is
/// outside. The root itself yields an empty string.
///
/// Matching is per component, so case folding that changes a segment's length
/// cannot shift the cut point.
pub fn relative_to_root(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Option<String> {
    let path = normalize_path(path);
    let root = normalize_path(root);
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    for expected in root.split('/').filter(|segment| !segment.is_empty()) {
        let actual = segments.next()?;
        if actual.to_lowercase() != expected.to_lowercase() {
            return None;
        }
    }
    Some(segments.collect::<Vec<_>>().join("/"))
}

pub fn check_path_length(path: impl AsRef<Path>) -> Option<String> {
    let normalized = normalize_path(path);
    let length = normalized.chars().count();
    if length <= MAX_PATH_CHARS {
        return None;
    }
    Some(format!(
        "Path is {} characters long (limit {}); the sync client may fail to upload it: {}",
        length, MAX_PATH_CHARS, normalized
    ))
}
