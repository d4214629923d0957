//! Naming rules for modules and their containers.
//!
//! Container names are handed to the container runtime as arguments, so anything derived from
//! free text goes through [`slugify`] first.

/// Maximum length of a derived slug.
const MAX_SLUG_LEN: usize = 63;

/// Name used when free text yields no usable characters.
const FALLBACK_SLUG: &str = "module";

/// Turns free text into a container runtime name token.
///
/// Lowercases ASCII alphanumerics, replaces every other run of characters with a single `-`,
/// trims dashes and truncates to 63 characters. The result is never empty and always has at least
/// two characters.
pub(crate) fn slugify<S: AsRef<str>>(input: S) -> String {
    let mut slug = String::with_capacity(input.as_ref().len());
    let mut pending_dash = false;

    for c in input.as_ref().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');

    match slug.len() {
        0 => FALLBACK_SLUG.to_string(),
        1 => format!("{}-{}", FALLBACK_SLUG, slug),
        _ => slug.to_string(),
    }
}

/// Checks that a name is accepted by the container runtime.
///
/// Mirrors the runtime rule `[a-zA-Z0-9][a-zA-Z0-9_.-]+`.
pub(crate) fn is_valid_container_name<S: AsRef<str>>(name: S) -> bool {
    let mut chars = name.as_ref().chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    let rest = chars.as_str();
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Extracts the repository name from a GitHub URL.
///
/// `https://github.com/acme/weather-module.git` yields `weather-module`. Returns `None` when the URL
/// has no path segment.
pub(crate) fn repository_name<S: AsRef<str>>(url: S) -> Option<String> {
    let trimmed = url.as_ref().trim().trim_end_matches('/');
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let (_, path) = without_scheme.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    let segment = segment.strip_suffix(".git").unwrap_or(segment);

    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Returns a short, time-ordered suffix that tells apart modules created from the same name.
pub(crate) fn unique_suffix() -> String {
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    to_base36(millis)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Derives the id of a brand-new module.
///
/// The id is the slug of the requested name (or the repository name) followed by a
/// [`unique_suffix`], so a retry after a failed attempt never collides with the leftover
/// container of that attempt. The container name equals the id.
///
/// `attempt` counts how many candidates were already taken. Any attempt after the first appends
/// its number to the suffix, so candidates differ even within the same millisecond.
pub(crate) fn new_module_id(name: Option<&str>, github_url: &str, attempt: u32) -> String {
    let base = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| repository_name(github_url))
        .unwrap_or_default();

    let mut slug = slugify(base);
    let mut suffix = unique_suffix();
    if attempt > 0 {
        suffix.push('-');
        suffix.push_str(&to_base36(u64::from(attempt)));
    }
    slug.truncate(MAX_SLUG_LEN - suffix.len() - 1);
    format!("{}-{}", slug.trim_end_matches('-'), suffix)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
