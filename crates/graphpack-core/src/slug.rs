//! Folder identifiers and display names.
//!
//! A slug is the on-disk directory name of a group: the sanitized display name,
//! percent-encoded down to ASCII and lower-cased. Decoding a slug gives back the
//! (lower-cased) display text, which is how groups found in an archive without a
//! manifest get a readable name.

use crate::model::{Group, DEFAULT_GROUP_NAME, DEFAULT_GROUP_SLUG, DEFAULT_NEW_GROUP_NAME};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashSet;

/// Everything except ASCII alphanumerics and `- _ . ~` is escaped.
const SLUG_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const UNSAFE_PATH_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub fn sanitize_name(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut last_dash = false;
    for ch in trimmed.chars() {
        if ch.is_control() {
            continue;
        }
        let mapped = if ch.is_whitespace() || UNSAFE_PATH_CHARS.contains(&ch) {
            '-'
        } else {
            ch
        };
        if mapped == '-' {
            if last_dash {
                continue;
            }
            last_dash = true;
        } else {
            last_dash = false;
        }
        out.push(mapped);
    }
    let compact = out.trim_matches('.');
    if compact.is_empty() {
        fallback.to_string()
    } else {
        compact.to_string()
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SLUG_ESCAPE)
        .to_string()
        .to_ascii_lowercase()
}

fn default_name_slug() -> String {
    encode_segment(&sanitize_segment(DEFAULT_GROUP_NAME, DEFAULT_GROUP_SLUG))
}

/// Derive the slug for a display name.
///
/// NOTE: any name that lands on the default group's slug (the default display
/// name itself, "default", "DEFAULT", " Default ", ...) is folded INTO the
/// default group instead of being rejected or disambiguated. Archives written by
/// earlier releases depend on this, so keep it even though it surprises people.
/// `unique_name_and_slug` is the only caller that steers new groups away from it.
pub fn slugify(name: &str) -> String {
    let normalized = sanitize_name(name, DEFAULT_GROUP_NAME);
    if normalized == DEFAULT_GROUP_NAME {
        return DEFAULT_GROUP_SLUG.to_string();
    }
    let slug = encode_segment(&sanitize_segment(&normalized, DEFAULT_GROUP_SLUG));
    if slug == DEFAULT_GROUP_SLUG || slug == default_name_slug() {
        return DEFAULT_GROUP_SLUG.to_string();
    }
    slug
}

/// Percent-decode a path segment, keeping the raw text when it is not valid UTF-8.
pub fn decode_segment(segment: &str) -> String {
    match percent_decode_str(segment).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

/// Normalize a group directory name found on disk. Blank text and anything that
/// slugifies to the default slug collapses into the default group (see `slugify`).
pub fn normalize_slug(segment: &str) -> String {
    let decoded = decode_segment(segment);
    if decoded.trim().is_empty() {
        return DEFAULT_GROUP_SLUG.to_string();
    }
    slugify(&decoded)
}

/// Display name for a slug when nothing better is known: the percent-decoded slug
/// with its dashes kept, so `my-folder` and an encoded `新建-文件夹` read the same way.
/// Only a slug that does not decode to text has its `-`/`_` runs turned into spaces.
pub fn derive_group_name(slug: &str) -> String {
    if slug.is_empty() || slug == DEFAULT_GROUP_SLUG {
        return DEFAULT_GROUP_NAME.to_string();
    }
    if let Ok(decoded) = percent_decode_str(slug).decode_utf8() {
        if !decoded.trim().is_empty() {
            return decoded.into_owned();
        }
    }
    let spaced = slug
        .split(|c| c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if spaced.is_empty() {
        slug.to_string()
    } else {
        spaced
    }
}

/// First of `base`, `base-2`, `base-3`, ... that `taken` rejects and that is not the
/// default slug.
pub fn next_free_slug(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if base != DEFAULT_GROUP_SLUG && !taken(base) {
        return base.to_string();
    }
    // A trailing dash would double up and not survive a decode.
    let stem = base.trim_end_matches('-');
    let mut index = 2;
    loop {
        let candidate = format!("{stem}-{index}");
        if candidate != DEFAULT_GROUP_SLUG && !taken(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIdentity {
    pub group_name: String,
    pub group_slug: String,
}

/// Pick a display name and slug for a new group, unique among `scope` (the groups
/// of one top folder + category). Names compare by exact code points.
pub fn unique_name_and_slug<'a>(
    scope: impl IntoIterator<Item = &'a Group>,
    requested_name: &str,
) -> GroupIdentity {
    let mut names = HashSet::new();
    let mut slugs = HashSet::new();
    for group in scope {
        names.insert(group.group_name.as_str());
        slugs.insert(group.group_slug.as_str());
    }

    let base = sanitize_name(requested_name, DEFAULT_NEW_GROUP_NAME);
    let mut group_name = base.clone();
    let mut index = 2;
    while names.contains(group_name.as_str()) {
        group_name = format!("{base}-{index}");
        index += 1;
    }

    let group_slug = next_free_slug(&slugify(&group_name), |s| slugs.contains(s));
    GroupIdentity {
        group_name,
        group_slug,
    }
}

/// Graph names inside one group: `base`, `base_1`, `base_2`, ... when `keep_bare`,
/// otherwise starting at `base_1` (copies).
pub fn unique_graph_name(existing: &HashSet<&str>, base: &str, keep_bare: bool) -> String {
    if keep_bare && !existing.contains(base) {
        return base.to_string();
    }
    let mut index = 1;
    loop {
        let candidate = format!("{base}_{index}");
        if !existing.contains(candidate.as_str()) {
            return candidate;
        }
        index += 1;
    }
}
