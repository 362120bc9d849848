use crate::archive::{self, LoadOptions, LoadedProject, SaveOptions};
use crate::category::CategoryRegistry;
use crate::config::CoreConfig;
use crate::error::ProjectError;
use crate::manifest::{self, EntryDraft, GraphDescriptor, GroupDescriptor, ManifestStore};
use crate::model::{
    new_project_id, now_timestamp, GraphBody, GraphId, Location, ProjectDocument, TopFolder,
    DEFAULT_GROUP_SLUG, DEFAULT_NEW_GRAPH_NAME, DEFAULT_PROJECT_NAME, EXPORTED_GRAPH_NAME,
    GRAPH_FILE_EXTENSION, GRAPH_SCHEMA_VERSION,
};
use crate::path_codec;
use crate::report::ArchiveWarning;
use crate::slug::{self, GroupIdentity};
use crate::storage;
use crate::validation;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// A new document snapshot plus what the operation produced.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub document: ProjectDocument,
    pub value: T,
}

/// Bytes of an exported file plus the name to suggest when saving it.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Entry point for UI code. Holds no document: every call takes the caller's
/// snapshot and hands back a new one.
pub struct ProjectService {
    categories: CategoryRegistry,
    config: CoreConfig,
}

impl ProjectService {
    pub fn new(config: CoreConfig) -> Result<Self, ProjectError> {
        let categories = config.registry()?;
        Ok(ProjectService { categories, config })
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    fn apply<T>(
        &self,
        doc: &ProjectDocument,
        op: impl FnOnce(&mut ManifestStore<'_>) -> Option<T>,
    ) -> Option<Applied<T>> {
        let mut draft = doc.clone();
        let value = {
            let mut store = ManifestStore::new(&self.categories, &mut draft);
            op(&mut store)?
        };
        Some(Applied {
            document: draft,
            value,
        })
    }

    fn save_options(&self) -> SaveOptions {
        SaveOptions {
            pretty: self.config.pretty_json,
            timestamp: None,
        }
    }

    // ---- Documents ----

    pub fn new_document(&self, name: Option<&str>) -> ProjectDocument {
        let mut doc = ProjectDocument::bare(
            new_project_id(),
            slug::sanitize_name(name.unwrap_or_default(), DEFAULT_PROJECT_NAME),
            self.config.app_version.clone(),
        );
        ManifestStore::new(&self.categories, &mut doc).ensure_default_groups();
        info!(project = %doc.manifest.project.id, "created project");
        doc
    }

    pub fn load_archive(&self, bytes: &[u8]) -> Result<LoadedProject, ProjectError> {
        archive::load(
            &self.categories,
            bytes,
            &LoadOptions {
                fallback_app_version: self.config.app_version.clone(),
            },
        )
    }

    pub fn save_archive(&self, doc: &ProjectDocument) -> Result<Vec<u8>, ProjectError> {
        archive::save(&self.categories, doc, &self.save_options())
    }

    pub fn open_project(&self, path: &Path) -> Result<LoadedProject, ProjectError> {
        let bytes = storage::read_archive(path)?;
        self.load_archive(&bytes)
    }

    pub fn save_project(&self, path: &Path, doc: &ProjectDocument) -> Result<(), ProjectError> {
        let bytes = self.save_archive(doc)?;
        storage::write_archive(path, &bytes)
    }

    /// Archive holding only one group and its graphs, with a suggested file name.
    /// None when the group does not exist.
    pub fn export_group(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
    ) -> Result<Option<ExportedFile>, ProjectError> {
        let Some(category) = self.categories.resolve(top_folder, category_key) else {
            return Ok(None);
        };
        let Some(group) = doc.group(top_folder, category_key, group_slug) else {
            return Ok(None);
        };

        let mut subset = doc.clone();
        subset
            .manifest
            .groups
            .retain(|g| g.matches(top_folder, category_key, group_slug));
        subset.manifest.graphs.retain(|e| {
            manifest::entry_location(&self.categories, e).matches_group(top_folder, category_key, group_slug)
        });
        let kept: HashSet<GraphId> =
            subset.manifest.graphs.iter().map(|e| e.graph_id.clone()).collect();
        subset.graphs.retain(|id, _| kept.contains(id));

        let timestamp = now_timestamp();
        let bytes = archive::save(
            &self.categories,
            &subset,
            &SaveOptions {
                pretty: self.config.pretty_json,
                timestamp: Some(timestamp.clone()),
            },
        )?;
        let file_name = format!(
            "{}-{}-{}-{}.zip",
            slug::sanitize_segment(&group.group_name, &category.directory),
            category.directory,
            top_folder,
            timestamp.replace([':', '.'], "-"),
        );
        info!(file = %file_name, graphs = kept.len(), "exported group");
        Ok(Some(ExportedFile { bytes, file_name }))
    }

    /// One graph body as a standalone JSON file named `{graphName}-{graphId}.json`.
    pub fn export_graph(&self, doc: &ProjectDocument, graph_id: &GraphId) -> Result<ExportedFile, ProjectError> {
        let mut body = self.graph_body(doc, graph_id)?;
        body.schema_version = GRAPH_SCHEMA_VERSION;
        let bytes = if self.config.pretty_json {
            serde_json::to_vec_pretty(&body)?
        } else {
            serde_json::to_vec(&body)?
        };
        let name = doc.entry(graph_id).map_or(body.name.as_str(), |e| e.name.as_str());
        let file_name = format!(
            "{}-{}{}",
            slug::sanitize_segment(name, EXPORTED_GRAPH_NAME),
            graph_id,
            GRAPH_FILE_EXTENSION
        );
        info!(file = %file_name, "exported graph");
        Ok(ExportedFile { bytes, file_name })
    }

    /// Import one graph JSON file into a group. Invalid JSON is an error; a
    /// category outside `top_folder` yields Ok(None).
    pub fn import_graph(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
        file_name: &str,
        json: &str,
    ) -> Result<Option<Applied<GraphId>>, ProjectError> {
        let mut body = parse_body(json)?;
        let Some(category) = self.categories.resolve(top_folder, category_key) else {
            return Ok(None);
        };
        let group_slug = if group_slug.trim().is_empty() {
            DEFAULT_GROUP_SLUG.to_string()
        } else {
            slug::normalize_slug(group_slug)
        };
        let group_name = doc
            .group(top_folder, category_key, &group_slug)
            .map(|g| g.group_name.clone())
            .unwrap_or_else(|| slug::derive_group_name(&group_slug));

        let stem = strip_extension(file_name);
        let fallback_name = slug::sanitize_name(stem, DEFAULT_NEW_GRAPH_NAME);
        body.name = slug::sanitize_name(&body.name, &fallback_name);
        let timestamp = now_timestamp();
        if body.created_at.is_none() {
            body.created_at = Some(timestamp.clone());
        }
        if body.updated_at.is_none() {
            body.updated_at = Some(timestamp);
        }

        let graph_id = GraphId::generate();
        let location = Location {
            top_folder,
            category_key: category.key.clone(),
            category_directory: category.directory.clone(),
            group_slug,
            group_name: group_name.clone(),
        };
        let draft = EntryDraft {
            name: Some(body.name.clone()),
            path: Some(path_codec::encode(&location, &graph_id)),
            group_name: Some(group_name),
            created_at: body.created_at.clone(),
            updated_at: body.updated_at.clone(),
        };
        info!(file = file_name, graph_id = %graph_id, "imported graph");
        Ok(self.apply(doc, |store| {
            store.attach_graph(graph_id.clone(), body, draft);
            Some(graph_id)
        }))
    }

    pub fn set_project_name(&self, doc: &ProjectDocument, name: &str) -> Applied<String> {
        let mut document = doc.clone();
        let value = slug::sanitize_name(name, DEFAULT_PROJECT_NAME);
        document.manifest.project.name = value.clone();
        Applied { document, value }
    }

    pub fn graph_body(&self, doc: &ProjectDocument, graph_id: &GraphId) -> Result<GraphBody, ProjectError> {
        doc.graphs
            .get(graph_id)
            .cloned()
            .ok_or_else(|| ProjectError::GraphNotFound(graph_id.to_string()))
    }

    pub fn group_descriptors(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: Option<&str>,
    ) -> Vec<GroupDescriptor> {
        manifest::group_descriptors(&self.categories, doc, top_folder, category_key)
    }

    pub fn graph_descriptors(&self, doc: &ProjectDocument) -> Vec<GraphDescriptor> {
        manifest::graph_descriptors(&self.categories, doc)
    }

    pub fn normalize(&self, doc: &ProjectDocument) -> Applied<Vec<ArchiveWarning>> {
        let mut document = doc.clone();
        let value = ManifestStore::new(&self.categories, &mut document).normalize();
        Applied { document, value }
    }

    // ---- Groups ----

    pub fn create_group(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        requested_name: &str,
    ) -> Option<Applied<GroupIdentity>> {
        self.apply(doc, |store| store.create_group(top_folder, category_key, requested_name))
    }

    pub fn duplicate_group(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
    ) -> Option<Applied<String>> {
        self.apply(doc, |store| store.duplicate_group(top_folder, category_key, group_slug))
    }

    pub fn move_group(
        &self,
        doc: &ProjectDocument,
        group_slug: &str,
        from_category: &str,
        to_category: &str,
    ) -> Option<Applied<String>> {
        self.apply(doc, |store| store.move_group(group_slug, from_category, to_category))
    }

    pub fn delete_group(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
    ) -> Option<Applied<Vec<GraphId>>> {
        self.apply(doc, |store| store.delete_group(top_folder, category_key, group_slug))
    }

    pub fn rename_group(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
        new_name: &str,
    ) -> Option<Applied<String>> {
        self.apply(doc, |store| store.rename_group(top_folder, category_key, group_slug, new_name))
    }

    // ---- Graphs ----

    pub fn create_graph(
        &self,
        doc: &ProjectDocument,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
    ) -> Option<Applied<GraphId>> {
        self.apply(doc, |store| store.create_graph(top_folder, category_key, group_slug))
    }

    pub fn duplicate_graph(&self, doc: &ProjectDocument, graph_id: &GraphId) -> Option<Applied<GraphId>> {
        self.apply(doc, |store| store.duplicate_graph(graph_id))
    }

    pub fn duplicate_graph_into(
        &self,
        doc: &ProjectDocument,
        graph_id: &GraphId,
        category_key: &str,
        group_slug: &str,
    ) -> Option<Applied<GraphId>> {
        self.apply(doc, |store| store.duplicate_graph_into(graph_id, category_key, group_slug))
    }

    pub fn rename_graph(&self, doc: &ProjectDocument, graph_id: &GraphId, new_name: &str) -> Option<Applied<String>> {
        self.apply(doc, |store| store.rename_graph(graph_id, new_name))
    }

    pub fn update_graph_body(&self, doc: &ProjectDocument, graph_id: &GraphId, body: GraphBody) -> Option<Applied<()>> {
        self.apply(doc, |store| store.update_graph_body(graph_id, body).then_some(()))
    }

    pub fn delete_graph(&self, doc: &ProjectDocument, graph_id: &GraphId) -> Option<Applied<()>> {
        self.apply(doc, |store| store.detach_graph(graph_id).then_some(()))
    }
}

/// Validate a graph JSON payload at the import boundary.
pub fn parse_body(json: &str) -> Result<GraphBody, ProjectError> {
    validation::parse_graph_body(json).map_err(|e| ProjectError::InvalidGraph(e.to_string()))
}

fn strip_extension(file_name: &str) -> &str {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let split = base.len().saturating_sub(GRAPH_FILE_EXTENSION.len());
    match base.get(split..) {
        Some(ext) if ext.eq_ignore_ascii_case(GRAPH_FILE_EXTENSION) => &base[..split],
        _ => base,
    }
}
