//! URL → filesystem path normalisation.
//!
//! Remote coordinates (git repositories, helm chart repositories) are mapped
//! to deterministic path fragments of the form `<host>/<path>...` so the same
//! coordinate always resolves to the same on-disk slot, no matter how many
//! components reference it.

use std::path::PathBuf;

/// Converts a URL into a path-like fragment by stripping the scheme and
/// joining the remaining non-empty segments.
///
/// Strings without a `://` separator (local paths) pass through unchanged.
///
/// ```
/// use fabrikate::utils::urls::to_path;
/// use std::path::PathBuf;
///
/// assert_eq!(
///     to_path("https://github.com/org/repo"),
///     PathBuf::from("github.com/org/repo")
/// );
/// assert_eq!(to_path("./local/chart"), PathBuf::from("./local/chart"));
/// ```
pub fn to_path(url: &str) -> PathBuf {
    let Some((_, rest)) = url.split_once("://") else {
        return PathBuf::from(url);
    };

    // Drop the userinfo portion if present so tokens never end up in paths.
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);

    let mut path = PathBuf::new();
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}
