use crate::category::CategoryRegistry;
use crate::model::{
    GraphId, Location, TopFolder, DEFAULT_GROUP_NAME, DEFAULT_GROUP_SLUG, GRAPH_FILE_EXTENSION,
};
use crate::slug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub location: Location,
    pub file_stem: String,
}

/// `{top}/{directory}/{slug}/{graphId}.json`
pub fn encode(location: &Location, graph_id: &GraphId) -> String {
    let id_fallback = if graph_id.0.is_empty() { "graph" } else { graph_id.as_str() };
    let safe_id = slug::sanitize_segment(graph_id.as_str(), id_fallback);
    let group_segment = if location.group_slug.is_empty() {
        DEFAULT_GROUP_SLUG
    } else {
        location.group_slug.as_str()
    };
    format!(
        "{}/{}/{}/{}{}",
        location.top_folder, location.category_directory, group_segment, safe_id, GRAPH_FILE_EXTENSION
    )
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn decode(categories: &CategoryRegistry, path: &str) -> Option<ParsedPath> {
    let normalized = normalize_separators(path);
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let [top_segment, category_segment, group_segment, file_name] = segments.as_slice() else {
        return None;
    };

    let top_folder = TopFolder::from_str(top_segment)?;
    let category = categories.by_directory(top_folder, category_segment)?;

    let file_name: &str = file_name;
    if file_name.len() <= GRAPH_FILE_EXTENSION.len() {
        return None;
    }
    let split = file_name.len() - GRAPH_FILE_EXTENSION.len();
    if !file_name.is_char_boundary(split)
        || !file_name[split..].eq_ignore_ascii_case(GRAPH_FILE_EXTENSION)
    {
        return None;
    }
    let file_stem = &file_name[..split];

    let group_slug = slug::normalize_slug(group_segment);
    let group_name = slug::derive_group_name(&group_slug);
    Some(ParsedPath {
        location: Location {
            top_folder,
            category_key: category.key.clone(),
            category_directory: category.directory.clone(),
            group_slug,
            group_name,
        },
        file_stem: file_stem.to_string(),
    })
}

/// Decode a group directory path (`{top}/{directory}/{slug}/`), as written for
/// empty groups.
pub fn decode_group_dir(categories: &CategoryRegistry, path: &str) -> Option<Location> {
    let normalized = normalize_separators(path);
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let [top_segment, category_segment, group_segment] = segments.as_slice() else {
        return None;
    };
    let top_folder = TopFolder::from_str(top_segment)?;
    let category = categories.by_directory(top_folder, category_segment)?;
    let group_slug = slug::normalize_slug(group_segment);
    let group_name = slug::derive_group_name(&group_slug);
    Some(Location {
        top_folder,
        category_key: category.key.clone(),
        category_directory: category.directory.clone(),
        group_slug,
        group_name,
    })
}

pub fn group_dir(location: &Location) -> String {
    format!(
        "{}/{}/{}/",
        location.top_folder, location.category_directory, location.group_slug
    )
}

/// Hints used when a path is missing or unreadable.
#[derive(Debug, Clone, Default)]
pub struct ResolveHints<'a> {
    pub preferred_top_folder: Option<TopFolder>,
    pub fallback_category_key: Option<&'a str>,
    pub group_name_hint: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub location: Location,
    pub normalized_path: String,
    /// Set when a path was given but could not be decoded.
    pub issue: Option<String>,
}

/// Where a graph lives: its decoded path, or a deterministic fallback built from the hints.
pub fn resolve(
    categories: &CategoryRegistry,
    graph_id: &GraphId,
    path: Option<&str>,
    hints: &ResolveHints<'_>,
) -> ResolvedLocation {
    let mut issue = None;
    if let Some(path) = path {
        if let Some(parsed) = decode(categories, path) {
            let normalized_path = encode(&parsed.location, graph_id);
            return ResolvedLocation {
                location: parsed.location,
                normalized_path,
                issue,
            };
        }
        issue = Some(format!("unrecognized graph path: {path}"));
    }

    let location = fallback_location(categories, hints);
    let normalized_path = encode(&location, graph_id);
    ResolvedLocation {
        location,
        normalized_path,
        issue,
    }
}

pub fn fallback_location(categories: &CategoryRegistry, hints: &ResolveHints<'_>) -> Location {
    let top_folder = hints.preferred_top_folder.unwrap_or(TopFolder::Server);
    let category = hints
        .fallback_category_key
        .and_then(|key| categories.resolve(top_folder, key))
        .unwrap_or_else(|| categories.fallback(top_folder));

    let group_name = slug::sanitize_name(hints.group_name_hint.unwrap_or(DEFAULT_GROUP_NAME), DEFAULT_GROUP_NAME);
    let group_slug = slug::slugify(&group_name);
    let group_name = if group_slug == DEFAULT_GROUP_SLUG {
        DEFAULT_GROUP_NAME.to_string()
    } else {
        group_name
    };
    Location {
        top_folder,
        category_key: category.key.clone(),
        category_directory: category.directory.clone(),
        group_slug,
        group_name,
    }
}
