use crate::config::CoreConfig;
use crate::error::ProjectError;
use crate::manifest::{GraphDescriptor, GroupDescriptor};
use crate::model::{GraphId, Location, ProjectDocument, TopFolder};
use crate::report::ArchiveWarning;
use crate::service::{self, Applied, ExportedFile, ProjectService};
use napi::bindgen_prelude::Buffer;
use std::path::Path;
use tracing::{debug, info};

// ---- DTO structs ----

#[napi(object)]
pub struct JsCategory {
    pub key: String,
    pub top_folder: String,
    pub directory: String,
    pub label: String,
}

#[napi(object)]
pub struct JsLocation {
    pub top_folder: String,
    pub category_key: String,
    pub category_directory: String,
    pub group_slug: String,
    pub group_name: String,
}

#[napi(object)]
pub struct JsGroup {
    pub top_folder: String,
    pub category_key: String,
    pub group_slug: String,
    pub group_name: String,
    pub graph_count: u32,
    pub is_default: bool,
}

#[napi(object)]
pub struct JsGroupIdentity {
    pub group_name: String,
    pub group_slug: String,
}

#[napi(object)]
pub struct JsGraphInfo {
    pub graph_id: String,
    pub name: String,
    pub location: JsLocation,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[napi(object)]
pub struct JsWarning {
    pub kind: String,
    pub subject: String,
    pub message: String,
}

#[napi(object)]
pub struct JsProjectInfo {
    pub id: String,
    pub name: String,
    pub app_version: String,
    pub graph_count: u32,
}

#[napi(object)]
pub struct JsExportedFile {
    pub bytes: Buffer,
    pub file_name: String,
}

// ---- Conversions ----

fn exported_to_js(exported: ExportedFile) -> JsExportedFile {
    JsExportedFile {
        bytes: exported.bytes.into(),
        file_name: exported.file_name,
    }
}

fn location_to_js(location: &Location) -> JsLocation {
    JsLocation {
        top_folder: location.top_folder.as_str().to_string(),
        category_key: location.category_key.clone(),
        category_directory: location.category_directory.clone(),
        group_slug: location.group_slug.clone(),
        group_name: location.group_name.clone(),
    }
}

fn group_to_js(descriptor: &GroupDescriptor) -> JsGroup {
    JsGroup {
        top_folder: descriptor.group.top_folder.as_str().to_string(),
        category_key: descriptor.group.category_key.clone(),
        group_slug: descriptor.group.group_slug.clone(),
        group_name: descriptor.group.group_name.clone(),
        graph_count: descriptor.graph_count,
        is_default: descriptor.is_default,
    }
}

fn graph_to_js(descriptor: &GraphDescriptor) -> JsGraphInfo {
    JsGraphInfo {
        graph_id: descriptor.graph_id.to_string(),
        name: descriptor.name.clone(),
        location: location_to_js(&descriptor.location),
        created_at: descriptor.created_at.clone(),
        updated_at: descriptor.updated_at.clone(),
    }
}

fn warning_to_js(warning: &ArchiveWarning) -> JsWarning {
    JsWarning {
        kind: warning.kind.as_str().to_string(),
        subject: warning.subject.clone(),
        message: warning.message.clone(),
    }
}

fn map_vec<T, U>(items: &[T], f: fn(&T) -> U) -> Vec<U> {
    items.iter().map(f).collect()
}

fn parse_top_folder(top_folder: &str) -> napi::Result<TopFolder> {
    TopFolder::from_str(top_folder)
        .ok_or_else(|| napi::Error::from_reason(format!("Unknown top folder: {top_folder}")))
}

// ---- JsProjectService ----

/// Holds the current project snapshot; each mutating call swaps it for the
/// snapshot the service returns.
#[napi]
pub struct JsProjectService {
    service: ProjectService,
    document: ProjectDocument,
}

#[napi]
impl JsProjectService {
    fn commit<T>(&mut self, applied: Option<Applied<T>>) -> Option<T> {
        let applied = applied?;
        self.document = applied.document;
        Some(applied.value)
    }

    /// `config_json` overrides the config otherwise read from `GRAPHPACK_CONFIG`.
    #[napi(factory)]
    pub fn create(config_json: Option<String>) -> napi::Result<Self> {
        crate::init_tracing();
        let config = match config_json {
            Some(json) => CoreConfig::from_json_str(&json),
            None => CoreConfig::from_env(),
        }
        .map_err(napi::Error::from)?;
        let service = ProjectService::new(config).map_err(napi::Error::from)?;
        let document = service.new_document(None);
        info!("ProjectService created");
        Ok(JsProjectService { service, document })
    }

    // ---- Project ----

    #[napi]
    pub fn new_project(&mut self, name: Option<String>) -> JsProjectInfo {
        info!("new_project");
        self.document = self.service.new_document(name.as_deref());
        self.project_info()
    }

    #[napi]
    pub fn project_info(&self) -> JsProjectInfo {
        let manifest = &self.document.manifest;
        JsProjectInfo {
            id: manifest.project.id.clone(),
            name: manifest.project.name.clone(),
            app_version: manifest.app_version.clone(),
            graph_count: manifest.graphs.len() as u32,
        }
    }

    #[napi]
    pub fn set_project_name(&mut self, name: String) -> String {
        info!(name = %name, "set_project_name");
        let applied = self.service.set_project_name(&self.document, &name);
        self.document = applied.document;
        applied.value
    }

    #[napi]
    pub fn load_archive(&mut self, bytes: Buffer) -> napi::Result<Vec<JsWarning>> {
        info!(bytes = bytes.len(), "load_archive");
        let loaded = self.service.load_archive(&bytes).map_err(napi::Error::from)?;
        self.document = loaded.document;
        Ok(map_vec(&loaded.warnings, warning_to_js))
    }

    #[napi]
    pub fn save_archive(&self) -> napi::Result<Buffer> {
        info!("save_archive");
        let bytes = self.service.save_archive(&self.document).map_err(napi::Error::from)?;
        Ok(bytes.into())
    }

    #[napi]
    pub fn open_file(&mut self, file_path: String) -> napi::Result<Vec<JsWarning>> {
        info!(path = %file_path, "open_file");
        let loaded = self
            .service
            .open_project(Path::new(&file_path))
            .map_err(napi::Error::from)?;
        self.document = loaded.document;
        Ok(map_vec(&loaded.warnings, warning_to_js))
    }

    #[napi]
    pub fn save_file(&self, file_path: String) -> napi::Result<()> {
        info!(path = %file_path, "save_file");
        self.service
            .save_project(Path::new(&file_path), &self.document)
            .map_err(napi::Error::from)
    }

    #[napi]
    pub fn normalize(&mut self) -> Vec<JsWarning> {
        debug!("normalize");
        let applied = self.service.normalize(&self.document);
        self.document = applied.document;
        map_vec(&applied.value, warning_to_js)
    }

    // ---- Read side ----

    #[napi]
    pub fn list_categories(&self) -> Vec<JsCategory> {
        self.service
            .categories()
            .iter()
            .map(|c| JsCategory {
                key: c.key.clone(),
                top_folder: c.top_folder.as_str().to_string(),
                directory: c.directory.clone(),
                label: c.label.clone(),
            })
            .collect()
    }

    #[napi]
    pub fn list_groups(&self, top_folder: String, category_key: Option<String>) -> napi::Result<Vec<JsGroup>> {
        debug!(top_folder = %top_folder, "list_groups");
        let top_folder = parse_top_folder(&top_folder)?;
        Ok(map_vec(
            &self
                .service
                .group_descriptors(&self.document, top_folder, category_key.as_deref()),
            group_to_js,
        ))
    }

    #[napi]
    pub fn list_graphs(&self) -> Vec<JsGraphInfo> {
        debug!("list_graphs");
        map_vec(&self.service.graph_descriptors(&self.document), graph_to_js)
    }

    /// Graph body as JSON text.
    #[napi]
    pub fn get_graph(&self, graph_id: String) -> napi::Result<String> {
        debug!(graph_id = %graph_id, "get_graph");
        let body = self
            .service
            .graph_body(&self.document, &GraphId(graph_id))
            .map_err(napi::Error::from)?;
        serde_json::to_string(&body).map_err(|e| napi::Error::from(ProjectError::from(e)))
    }

    #[napi]
    pub fn export_graph(&self, graph_id: String) -> napi::Result<JsExportedFile> {
        info!(graph_id = %graph_id, "export_graph");
        let exported = self
            .service
            .export_graph(&self.document, &GraphId(graph_id))
            .map_err(napi::Error::from)?;
        Ok(exported_to_js(exported))
    }

    // ---- Groups ----

    #[napi]
    pub fn create_group(
        &mut self,
        top_folder: String,
        category_key: String,
        name: Option<String>,
    ) -> napi::Result<Option<JsGroupIdentity>> {
        info!(top_folder = %top_folder, category_key = %category_key, "create_group");
        let top_folder = parse_top_folder(&top_folder)?;
        let requested = name.unwrap_or_default();
        let applied = self
            .service
            .create_group(&self.document, top_folder, &category_key, &requested);
        Ok(self.commit(applied).map(|identity| JsGroupIdentity {
            group_name: identity.group_name,
            group_slug: identity.group_slug,
        }))
    }

    #[napi]
    pub fn duplicate_group(
        &mut self,
        top_folder: String,
        category_key: String,
        group_slug: String,
    ) -> napi::Result<Option<String>> {
        info!(category_key = %category_key, group_slug = %group_slug, "duplicate_group");
        let top_folder = parse_top_folder(&top_folder)?;
        let applied = self
            .service
            .duplicate_group(&self.document, top_folder, &category_key, &group_slug);
        Ok(self.commit(applied))
    }

    #[napi]
    pub fn move_group(&mut self, group_slug: String, from_category: String, to_category: String) -> Option<String> {
        info!(group_slug = %group_slug, from = %from_category, to = %to_category, "move_group");
        let applied = self
            .service
            .move_group(&self.document, &group_slug, &from_category, &to_category);
        self.commit(applied)
    }

    /// Returns the ids of the deleted graphs, or None when nothing was deleted.
    #[napi]
    pub fn delete_group(
        &mut self,
        top_folder: String,
        category_key: String,
        group_slug: String,
    ) -> napi::Result<Option<Vec<String>>> {
        info!(category_key = %category_key, group_slug = %group_slug, "delete_group");
        let top_folder = parse_top_folder(&top_folder)?;
        let applied = self
            .service
            .delete_group(&self.document, top_folder, &category_key, &group_slug);
        Ok(self
            .commit(applied)
            .map(|ids| ids.into_iter().map(|id| id.0).collect()))
    }

    #[napi]
    pub fn rename_group(
        &mut self,
        top_folder: String,
        category_key: String,
        group_slug: String,
        new_name: String,
    ) -> napi::Result<Option<String>> {
        info!(group_slug = %group_slug, new_name = %new_name, "rename_group");
        let top_folder = parse_top_folder(&top_folder)?;
        let applied = self
            .service
            .rename_group(&self.document, top_folder, &category_key, &group_slug, &new_name);
        Ok(self.commit(applied))
    }

    #[napi]
    pub fn export_group(
        &self,
        top_folder: String,
        category_key: String,
        group_slug: String,
    ) -> napi::Result<Option<JsExportedFile>> {
        info!(category_key = %category_key, group_slug = %group_slug, "export_group");
        let top_folder = parse_top_folder(&top_folder)?;
        let exported = self
            .service
            .export_group(&self.document, top_folder, &category_key, &group_slug)
            .map_err(napi::Error::from)?;
        Ok(exported.map(exported_to_js))
    }

    // ---- Graphs ----

    #[napi]
    pub fn create_graph(
        &mut self,
        top_folder: String,
        category_key: String,
        group_slug: String,
    ) -> napi::Result<Option<String>> {
        info!(category_key = %category_key, group_slug = %group_slug, "create_graph");
        let top_folder = parse_top_folder(&top_folder)?;
        let applied = self
            .service
            .create_graph(&self.document, top_folder, &category_key, &group_slug);
        Ok(self.commit(applied).map(|id| id.0))
    }

    #[napi]
    pub fn import_graph(
        &mut self,
        top_folder: String,
        category_key: String,
        group_slug: String,
        file_name: String,
        json: String,
    ) -> napi::Result<Option<String>> {
        info!(file_name = %file_name, "import_graph");
        let top_folder = parse_top_folder(&top_folder)?;
        let applied = self
            .service
            .import_graph(&self.document, top_folder, &category_key, &group_slug, &file_name, &json)
            .map_err(napi::Error::from)?;
        Ok(self.commit(applied).map(|id| id.0))
    }

    #[napi]
    pub fn duplicate_graph(&mut self, graph_id: String) -> Option<String> {
        info!(graph_id = %graph_id, "duplicate_graph");
        let applied = self.service.duplicate_graph(&self.document, &GraphId(graph_id));
        self.commit(applied).map(|id| id.0)
    }

    #[napi]
    pub fn duplicate_graph_into(
        &mut self,
        graph_id: String,
        category_key: String,
        group_slug: String,
    ) -> Option<String> {
        info!(graph_id = %graph_id, category_key = %category_key, group_slug = %group_slug, "duplicate_graph_into");
        let applied = self
            .service
            .duplicate_graph_into(&self.document, &GraphId(graph_id), &category_key, &group_slug);
        self.commit(applied).map(|id| id.0)
    }

    #[napi]
    pub fn rename_graph(&mut self, graph_id: String, new_name: String) -> Option<String> {
        info!(graph_id = %graph_id, "rename_graph");
        let applied = self
            .service
            .rename_graph(&self.document, &GraphId(graph_id), &new_name);
        self.commit(applied)
    }

    /// Replace a graph body with editor JSON. False when the graph is unknown.
    #[napi]
    pub fn update_graph(&mut self, graph_id: String, json: String) -> napi::Result<bool> {
        debug!(graph_id = %graph_id, "update_graph");
        let body = service::parse_body(&json).map_err(napi::Error::from)?;
        let applied = self
            .service
            .update_graph_body(&self.document, &GraphId(graph_id), body);
        Ok(self.commit(applied).is_some())
    }

    #[napi]
    pub fn delete_graph(&mut self, graph_id: String) -> bool {
        info!(graph_id = %graph_id, "delete_graph");
        let applied = self.service.delete_graph(&self.document, &GraphId(graph_id));
        self.commit(applied).is_some()
    }
}
