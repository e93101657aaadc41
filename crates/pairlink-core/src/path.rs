//! Request path resolution for the asset responder
//!
//! Maps the path component of an HTTP request target onto a file below the
//! asset root. Anything that could step outside the root is rejected before
//! the filesystem is touched.

use std::path::{Component, Path, PathBuf};

use crate::error::AssetError;
use crate::{INDEX_FILE, MAX_FILENAME_LEN, MAX_PATH_LEN};

/// Resolve a request target (e.g. `/viewer.html?x=1`) to a file below `root`.
///
/// The query string and fragment are dropped, percent escapes are decoded,
/// and `/` maps to the index file. Rejects:
/// 1. paths containing null bytes
/// 2. `..` components
/// 3. paths or filenames that are too long
pub fn resolve_request_path(root: &Path, target: &str) -> Result<PathBuf, AssetError> {
    let path = target
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let decoded = percent_decode(path)
        .ok_or_else(|| AssetError::PathRejected("invalid percent escape".into()))?;

    let relative = decoded.trim_start_matches('/');
    if relative.is_empty() {
        return Ok(root.join(INDEX_FILE));
    }

    safe_path(root, relative)
}

/// Join `relative` onto `base`, refusing anything that could escape `base`.
///
/// Works on paths that do not exist yet; nothing is canonicalized.
pub fn safe_path(base: &Path, relative: &str) -> Result<PathBuf, AssetError> {
    if relative.contains('\0') {
        return Err(AssetError::PathRejected("path contains null byte".into()));
    }

    if relative.len() > MAX_PATH_LEN {
        return Err(AssetError::PathRejected(format!(
            "path too long: {} bytes (max {})",
            relative.len(),
            MAX_PATH_LEN
        )));
    }

    let relative_path = Path::new(relative);
    if relative_path.is_absolute() {
        return Err(AssetError::PathRejected("absolute paths not allowed".into()));
    }

    let mut result = base.to_path_buf();

    for component in relative_path.components() {
        match component {
            Component::Normal(name) => {
                if name.len() > MAX_FILENAME_LEN {
                    return Err(AssetError::PathRejected(format!(
                        "filename too long: {} bytes (max {})",
                        name.len(),
                        MAX_FILENAME_LEN
                    )));
                }
                result.push(name);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(AssetError::PathRejected(
                    "parent directory (..) not allowed".into(),
                ));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(AssetError::PathRejected(
                    "absolute paths not allowed".into(),
                ));
            }
        }
    }

    if !result.starts_with(base) {
        return Err(AssetError::PathRejected("path escapes asset root".into()));
    }

    Ok(result)
}

/// Decode `%XX` escapes. Returns `None` on a truncated or non-hex escape or
/// when the decoded bytes are not UTF-8.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}
