use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved slug of the group every category always has.
pub const DEFAULT_GROUP_SLUG: &str = "default";
/// Display name of the default group.
pub const DEFAULT_GROUP_NAME: &str = "默认文件夹";
pub const DEFAULT_NEW_GROUP_NAME: &str = "新建文件夹";
pub const DEFAULT_NEW_GRAPH_NAME: &str = "新建节点图";
pub const DEFAULT_PROJECT_NAME: &str = "未命名项目";
pub const DEFAULT_GRAPH_NAME: &str = "未命名节点图";
pub const EXPORTED_GRAPH_NAME: &str = "节点图";
pub const DUPLICATE_GROUP_SUFFIX: &str = " 副本";

pub const GRAPH_FILE_EXTENSION: &str = ".json";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const PROJECT_MANIFEST_VERSION: u32 = 1;
pub const GRAPH_SCHEMA_VERSION: u8 = 2;

/// RFC 3339 UTC timestamp with millisecond precision, e.g. `2024-05-01T08:00:00.000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn generate() -> Self {
        GraphId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate `as_str()` and `from_str()` for a snake_case enum.
macro_rules! str_enum {
    ($T:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $T {
            pub fn as_str(&self) -> &str {
                match self { $( $T::$variant => $s, )+ }
            }
            pub fn from_str(s: &str) -> Option<$T> {
                match s { $( $s => Some($T::$variant), )+ _ => None }
            }
        }
        impl std::fmt::Display for $T {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopFolder {
    Server,
    Client,
}

str_enum!(TopFolder {
    Server => "server",
    Client => "client",
});

impl TopFolder {
    pub const ALL: [TopFolder; 2] = [TopFolder::Server, TopFolder::Client];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub top_folder: TopFolder,
    pub category_key: String,
    pub group_slug: String,
    pub group_name: String,
}

impl Group {
    pub fn default_for(top_folder: TopFolder, category_key: &str) -> Self {
        Group {
            top_folder,
            category_key: category_key.to_string(),
            group_slug: DEFAULT_GROUP_SLUG.to_string(),
            group_name: DEFAULT_GROUP_NAME.to_string(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.group_slug == DEFAULT_GROUP_SLUG
    }

    pub fn matches(&self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> bool {
        self.top_folder == top_folder
            && self.category_key == category_key
            && self.group_slug == group_slug
    }

    pub fn same_identity(&self, other: &Group) -> bool {
        self.matches(other.top_folder, &other.category_key, &other.group_slug)
    }

    pub fn in_scope(&self, top_folder: TopFolder, category_key: &str) -> bool {
        self.top_folder == top_folder && self.category_key == category_key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEntry {
    pub graph_id: GraphId,
    pub name: String,
    pub path: String,
    pub group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Decoded, structured form of a graph path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub top_folder: TopFolder,
    pub category_key: String,
    pub category_directory: String,
    pub group_slug: String,
    pub group_name: String,
}

impl Location {
    pub fn matches_group(&self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> bool {
        self.top_folder == top_folder
            && self.category_key == category_key
            && self.group_slug == group_slug
    }

    pub fn to_group(&self) -> Group {
        Group {
            top_folder: self.top_folder,
            category_key: self.category_key.clone(),
            group_slug: self.group_slug.clone(),
            group_name: self.group_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A node as the editor stores it. Fields this crate does not inspect ride along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NodeData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeEndpoint {
    pub node_id: String,
    pub port_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: EdgeEndpoint,
    pub target: EdgeEndpoint,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphComment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Graph payload. Only built by `validation::parse_graph_body` or by the core itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphBody {
    pub schema_version: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub comments: Vec<GraphComment>,
}

impl GraphBody {
    pub fn empty(name: &str, timestamp: &str) -> Self {
        GraphBody {
            schema_version: GRAPH_SCHEMA_VERSION,
            name: name.to_string(),
            created_at: Some(timestamp.to_string()),
            updated_at: Some(timestamp.to_string()),
            nodes: Vec::new(),
            edges: Vec::new(),
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub manifest_version: u32,
    pub app_version: String,
    pub project: ProjectInfo,
    pub graphs: Vec<GraphEntry>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub manifest: ProjectManifest,
    pub graphs: BTreeMap<GraphId, GraphBody>,
}

impl ProjectDocument {
    /// A document with no groups or graphs; callers run `ensure_default_groups` on it.
    pub fn bare(project_id: String, name: String, app_version: String) -> Self {
        ProjectDocument {
            manifest: ProjectManifest {
                manifest_version: PROJECT_MANIFEST_VERSION,
                app_version,
                project: ProjectInfo { id: project_id, name },
                graphs: Vec::new(),
                groups: Vec::new(),
            },
            graphs: BTreeMap::new(),
        }
    }

    pub fn entry(&self, graph_id: &GraphId) -> Option<&GraphEntry> {
        self.manifest.graphs.iter().find(|e| &e.graph_id == graph_id)
    }

    pub fn group(&self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> Option<&Group> {
        self.manifest
            .groups
            .iter()
            .find(|g| g.matches(top_folder, category_key, group_slug))
    }
}

pub fn new_project_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
