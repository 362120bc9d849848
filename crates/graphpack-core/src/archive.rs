use crate::category::CategoryRegistry;
use crate::error::ProjectError;
use crate::manifest::{self, EntryDraft, ManifestStore};
use crate::model::{
    new_project_id, now_timestamp, GraphBody, GraphId, Group, Location, ProjectDocument, TopFolder,
    DEFAULT_PROJECT_NAME, GRAPH_FILE_EXTENSION, GRAPH_SCHEMA_VERSION, MANIFEST_FILE_NAME,
    PROJECT_MANIFEST_VERSION,
};
use crate::path_codec::{self, ResolveHints};
use crate::report::{ArchiveWarning, WarningKind};
use crate::slug;
use crate::validation;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub pretty: bool,
    /// Stamped on bodies without `updatedAt`. Defaults to now.
    pub timestamp: Option<String>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            pretty: true,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// App version recorded when the archive has no usable manifest.
    pub fallback_app_version: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            fallback_app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub document: ProjectDocument,
    pub warnings: Vec<ArchiveWarning>,
}

// ---- save ----

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<Vec<u8>, ProjectError> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    Ok(bytes)
}

/// Serialize a normalized copy of `document` into a zip archive.
pub fn save(
    categories: &CategoryRegistry,
    document: &ProjectDocument,
    options: &SaveOptions,
) -> Result<Vec<u8>, ProjectError> {
    let timestamp = options.timestamp.clone().unwrap_or_else(now_timestamp);
    let mut normalized = document.clone();
    let repairs = ManifestStore::new(categories, &mut normalized)
        .at(timestamp.clone())
        .normalize();
    if !repairs.is_empty() {
        debug!(count = repairs.len(), "document repaired before save");
    }

    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for group in &normalized.manifest.groups {
        let Some(category) = categories.resolve(group.top_folder, &group.category_key) else {
            continue;
        };
        let location = manifest::location_in(category, group);
        zip.add_directory(path_codec::group_dir(&location), file_options)?;
    }

    for entry in &normalized.manifest.graphs {
        let Some(body) = normalized.graphs.get(&entry.graph_id) else {
            continue;
        };
        let mut body = body.clone();
        body.schema_version = GRAPH_SCHEMA_VERSION;
        if body.updated_at.is_none() {
            body.updated_at = Some(timestamp.clone());
        }
        zip.start_file(entry.path.as_str(), file_options)?;
        zip.write_all(&to_json(&body, options.pretty)?)?;
    }

    zip.start_file(MANIFEST_FILE_NAME, file_options)?;
    zip.write_all(&to_json(&normalized.manifest, options.pretty)?)?;

    let cursor = zip.finish()?;
    info!(
        graphs = normalized.manifest.graphs.len(),
        groups = normalized.manifest.groups.len(),
        "saved project archive"
    );
    Ok(cursor.into_inner())
}

// ---- load ----

/// Manifest fields as read from an archive. Records are kept as raw JSON so one
/// malformed entry does not sink the rest.
#[derive(Debug, Default)]
struct RawManifest {
    manifest_version: Option<u32>,
    app_version: Option<String>,
    project_id: Option<String>,
    project_name: Option<String>,
    graphs: Vec<Value>,
    groups: Vec<Value>,
}

impl RawManifest {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        let project = map.get("project");
        let project_id = text(project.and_then(|p| p.get("id")));
        let project_name = text(project.and_then(|p| p.get("name")));
        let records = |v: Option<Value>| match v {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        Some(RawManifest {
            manifest_version: map
                .get("manifestVersion")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok()),
            app_version: text(map.get("appVersion")),
            project_id,
            project_name,
            graphs: records(map.remove("graphs")),
            groups: records(map.remove("groups")),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(default)]
    graph_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// A validated body file waiting to be claimed by a manifest entry.
struct PendingFile {
    body: GraphBody,
    location: Location,
    path: String,
}

fn read_manifest(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    warnings: &mut Vec<ArchiveWarning>,
) -> Option<RawManifest> {
    let mut file = match archive.by_name(MANIFEST_FILE_NAME) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => {
            warnings.push(ArchiveWarning::new(
                WarningKind::ManifestMissing,
                MANIFEST_FILE_NAME,
                "archive has no manifest; rebuilding it from the graph files",
            ));
            return None;
        }
        Err(e) => {
            warnings.push(ArchiveWarning::new(
                WarningKind::ManifestUnreadable,
                MANIFEST_FILE_NAME,
                format!("failed to open manifest: {e}"),
            ));
            return None;
        }
    };
    let mut content = String::new();
    if let Err(e) = file.read_to_string(&mut content) {
        warnings.push(ArchiveWarning::new(
            WarningKind::ManifestUnreadable,
            MANIFEST_FILE_NAME,
            format!("failed to read manifest: {e}"),
        ));
        return None;
    }
    let parsed = serde_json::from_str::<Value>(&content)
        .ok()
        .and_then(RawManifest::from_value);
    if parsed.is_none() {
        warnings.push(ArchiveWarning::new(
            WarningKind::ManifestUnreadable,
            MANIFEST_FILE_NAME,
            "manifest is not a JSON object; rebuilding it from the graph files",
        ));
    }
    parsed
}

fn is_graph_file(path: &str) -> bool {
    let in_partition = TopFolder::ALL
        .iter()
        .any(|top| path.strip_prefix(top.as_str()).is_some_and(|rest| rest.starts_with('/')));
    in_partition && path.to_ascii_lowercase().ends_with(GRAPH_FILE_EXTENSION)
}

fn graph_id_from(raw: &str) -> Option<GraphId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(GraphId(slug::sanitize_segment(trimmed, trimmed)))
}

/// Rebuild a project from archive bytes. Only an unreadable container is an error;
/// every other problem is reported as a warning and healed.
pub fn load(
    categories: &CategoryRegistry,
    bytes: &[u8],
    options: &LoadOptions,
) -> Result<LoadedProject, ProjectError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut warnings = Vec::new();

    let manifest = read_manifest(&mut archive, &mut warnings).unwrap_or_default();

    let mut order: Vec<GraphId> = Vec::new();
    let mut files: HashMap<GraphId, PendingFile> = HashMap::new();
    let mut group_dirs: Vec<Location> = Vec::new();

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warnings.push(ArchiveWarning::new(
                    WarningKind::UnreadableEntry,
                    format!("#{index}"),
                    format!("failed to open archive entry: {e}"),
                ));
                continue;
            }
        };
        let name = file.name().replace('\\', "/");
        let name = name.trim_start_matches('/').to_string();
        if file.is_dir() {
            if let Some(location) = path_codec::decode_group_dir(categories, &name) {
                group_dirs.push(location);
            }
            continue;
        }
        if name == MANIFEST_FILE_NAME || !is_graph_file(&name) {
            continue;
        }

        let mut content = String::new();
        if let Err(e) = file.read_to_string(&mut content) {
            warnings.push(ArchiveWarning::new(
                WarningKind::UnreadableEntry,
                name.as_str(),
                format!("failed to read file: {e}"),
            ));
            continue;
        }
        let body = match validation::parse_graph_body(&content) {
            Ok(body) => body,
            Err(e) => {
                warnings.push(ArchiveWarning::new(
                    WarningKind::InvalidGraphFile,
                    name.as_str(),
                    format!("skipped invalid graph file: {e}"),
                ));
                continue;
            }
        };

        let (mut graph_id, location) = match path_codec::decode(categories, &name)
            .and_then(|parsed| Some((graph_id_from(&parsed.file_stem)?, parsed.location)))
        {
            Some(found) => found,
            None => {
                let location = path_codec::fallback_location(categories, &ResolveHints::default());
                let graph_id = GraphId::generate();
                warnings.push(ArchiveWarning::new(
                    WarningKind::UnrecognizedPath,
                    name.as_str(),
                    format!(
                        "unrecognized path; moved to {}",
                        path_codec::encode(&location, &graph_id)
                    ),
                ));
                (graph_id, location)
            }
        };
        if files.contains_key(&graph_id) {
            let fresh = GraphId::generate();
            warnings.push(ArchiveWarning::new(
                WarningKind::DuplicateGraphId,
                name.as_str(),
                format!("graph id {graph_id} already used; assigned {fresh}"),
            ));
            graph_id = fresh;
        }
        debug!(file = %name, graph_id = %graph_id, "read graph file");
        let path = path_codec::encode(&location, &graph_id);
        order.push(graph_id.clone());
        files.insert(graph_id, PendingFile { body, location, path });
    }

    let mut document = ProjectDocument::bare(
        manifest
            .project_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_project_id),
        slug::sanitize_name(
            manifest.project_name.as_deref().unwrap_or_default(),
            DEFAULT_PROJECT_NAME,
        ),
        manifest
            .app_version
            .unwrap_or_else(|| options.fallback_app_version.clone()),
    );
    document.manifest.manifest_version = manifest.manifest_version.unwrap_or(PROJECT_MANIFEST_VERSION);

    for (index, value) in manifest.groups.into_iter().enumerate() {
        match serde_json::from_value::<Group>(value) {
            Ok(group) => document.manifest.groups.push(group),
            Err(e) => warnings.push(ArchiveWarning::new(
                WarningKind::ManifestRecordSkipped,
                format!("groups[{index}]"),
                format!("skipped malformed group record: {e}"),
            )),
        }
    }

    let mut store = ManifestStore::new(categories, &mut document);
    store.normalize_groups();
    for location in &group_dirs {
        store.adopt_group(location);
    }

    let mut claimed: HashSet<GraphId> = HashSet::new();
    for (index, value) in manifest.graphs.into_iter().enumerate() {
        let entry = match serde_json::from_value::<RawEntry>(value) {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(ArchiveWarning::new(
                    WarningKind::ManifestRecordSkipped,
                    format!("graphs[{index}]"),
                    format!("skipped malformed graph record: {e}"),
                ));
                continue;
            }
        };
        let graph_id = entry
            .graph_id
            .as_deref()
            .and_then(graph_id_from)
            .or_else(|| {
                let path = entry.path.as_deref()?;
                graph_id_from(&path_codec::decode(categories, path)?.file_stem)
            });
        let graph_id = match graph_id {
            Some(id) => id,
            None => {
                let fresh = GraphId::generate();
                warnings.push(ArchiveWarning::new(
                    WarningKind::MissingGraphId,
                    format!("graphs[{index}]"),
                    format!("manifest record has no graph id; assigned {fresh}"),
                ));
                fresh
            }
        };
        if claimed.contains(&graph_id) {
            warnings.push(ArchiveWarning::new(
                WarningKind::DuplicateManifestEntry,
                graph_id.as_str(),
                "graph listed twice in the manifest; later entry skipped",
            ));
            continue;
        }
        let Some(file) = files.remove(&graph_id) else {
            warnings.push(ArchiveWarning::new(
                WarningKind::MissingGraphFile,
                graph_id.as_str(),
                format!("manifest references graph {graph_id} but the archive has no file for it; skipped"),
            ));
            continue;
        };
        claimed.insert(graph_id.clone());
        let path = match entry.path {
            Some(path) if path_codec::decode(categories, &path).is_some() => path,
            Some(path) => {
                warnings.push(ArchiveWarning::new(
                    WarningKind::UnrecognizedPath,
                    graph_id.as_str(),
                    format!("manifest path {path} is not recognized; using the file location {}", file.path),
                ));
                file.path
            }
            None => file.path,
        };
        let draft = EntryDraft {
            name: entry.name,
            path: Some(path),
            group_name: entry.group_name.or(Some(file.location.group_name)),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        };
        store.attach_graph(graph_id, file.body, draft);
    }

    for graph_id in order {
        let Some(file) = files.remove(&graph_id) else {
            continue;
        };
        let draft = EntryDraft {
            path: Some(file.path),
            group_name: Some(file.location.group_name),
            ..Default::default()
        };
        store.attach_graph(graph_id, file.body, draft);
    }

    warnings.extend(store.normalize());

    info!(
        graphs = document.manifest.graphs.len(),
        groups = document.manifest.groups.len(),
        warnings = warnings.len(),
        "loaded project archive"
    );
    Ok(LoadedProject { document, warnings })
}
