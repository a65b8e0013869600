//! Platform object naming
//!
//! Derived names are the idempotency key on the platform side: an object found
//! under its derived name counts as already synced, mapping record or not.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Suffix appended to every circle channel
pub const CIRCLE_CHANNEL_SUFFIX: &str = "-circle";

/// Lowercase, drop periods, whitespace to hyphens
#[must_use]
pub fn slugify(title: &str) -> String {
    title
        .trim()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Slug of a circle under `prefix`; also the prefix handed to its children
#[must_use]
pub fn circle_slug(prefix: Option<&str>, title: &str) -> String {
    let slug = slugify(title);
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}-{slug}"),
        None => slug,
    }
}

/// Channel name for a circle slug
#[must_use]
pub fn circle_channel_name(slug: &str) -> String {
    format!("{slug}{CIRCLE_CHANNEL_SUFFIX}")
}

/// Label name for a role: `{prefix}/{title}`, or the bare title
#[must_use]
pub fn label_name(prefix: Option<&str>, title: &str) -> String {
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{title}"),
        None => title.to_string(),
    }
}

/// Container name for a workspace
#[must_use]
pub fn container_name(display_name: &str, suffix: &str) -> String {
    format!("{display_name} {suffix}")
}

/// Plain-text channel topic from an HTML purpose field
#[must_use]
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.trim().to_string()
}
