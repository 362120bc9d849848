use crate::model::{
    GraphBody, GraphComment, GraphEdge, GraphNode, Position, GRAPH_SCHEMA_VERSION,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const ACCEPTED_SCHEMA_VERSIONS: [u8; 2] = [1, 2];

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("malformed graph JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schemaVersion {0}")]
    SchemaVersion(u8),

    #[error("edge '{0}' has an empty port id")]
    EmptyPortId(String),

    #[error("comment #{0} is attached to neither a node nor a position")]
    DetachedComment(usize),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGraphBody {
    schema_version: u8,
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    nodes: Vec<GraphNode>,
    #[serde(default)]
    edges: Vec<GraphEdge>,
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComment {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    pinned: Option<bool>,
    #[serde(default)]
    collapsed: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

pub fn parse_graph_body(json: &str) -> Result<GraphBody, ValidationError> {
    let raw: RawGraphBody = serde_json::from_str(json)?;
    validate(raw)
}

pub fn parse_graph_value(value: Value) -> Result<GraphBody, ValidationError> {
    let raw: RawGraphBody = serde_json::from_value(value)?;
    validate(raw)
}

fn validate(raw: RawGraphBody) -> Result<GraphBody, ValidationError> {
    if !ACCEPTED_SCHEMA_VERSIONS.contains(&raw.schema_version) {
        return Err(ValidationError::SchemaVersion(raw.schema_version));
    }
    for edge in &raw.edges {
        if edge.source.port_id.is_empty() || edge.target.port_id.is_empty() {
            return Err(ValidationError::EmptyPortId(edge.id.clone()));
        }
    }

    let mut comments = Vec::with_capacity(raw.comments.len());
    for (index, comment) in raw.comments.into_iter().enumerate() {
        let node_id = comment
            .node_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if node_id.is_none() && comment.position.is_none() {
            return Err(ValidationError::DetachedComment(index));
        }
        let id = comment
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        comments.push(GraphComment {
            id,
            node_id,
            position: comment.position,
            text: comment.text.unwrap_or_default(),
            pinned: comment.pinned.unwrap_or(false),
            collapsed: comment.collapsed.unwrap_or(false),
            extra: comment.extra,
        });
    }

    Ok(GraphBody {
        schema_version: GRAPH_SCHEMA_VERSION,
        name: raw.name,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        nodes: raw.nodes,
        edges: raw.edges,
        comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "schemaVersion": 1,
            "name": "Spawn logic",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "nodes": [
                { "id": "n1", "type": "event.onSpawn", "position": { "x": 0, "y": 0 } },
                { "id": "n2", "type": "action.log", "position": { "x": 200, "y": 0 },
                  "label": "Log", "data": { "overrides": { "message": "hi" } } }
            ],
            "edges": [
                { "id": "e1", "source": { "nodeId": "n1", "portId": "out" },
                  "target": { "nodeId": "n2", "portId": "in" } }
            ],
            "comments": [
                { "nodeId": " n1 ", "text": "entry point" },
                { "id": "c2", "position": { "x": 10, "y": 10 }, "pinned": true }
            ]
        })
    }

    #[test]
    fn test_valid_body_is_upgraded() {
        let body = parse_graph_value(sample()).unwrap();
        assert_eq!(body.schema_version, GRAPH_SCHEMA_VERSION);
        assert_eq!(body.nodes.len(), 2);
        assert_eq!(body.edges[0].target.port_id, "in");
        assert_eq!(body.comments[0].node_id.as_deref(), Some("n1"));
        assert!(!body.comments[0].id.is_empty());
        assert_eq!(body.comments[1].id, "c2");
        assert!(body.comments[1].pinned);
        assert!(body.updated_at.is_none());
    }

    #[test]
    fn test_missing_arrays_default_to_empty() {
        let body = parse_graph_body(r#"{"schemaVersion":2,"name":"Empty"}"#).unwrap();
        assert!(body.nodes.is_empty());
        assert!(body.edges.is_empty());
        assert!(body.comments.is_empty());
    }

    #[test]
    fn test_rejects_unknown_schema_version() {
        let mut value = sample();
        value["schemaVersion"] = json!(3);
        assert!(matches!(parse_graph_value(value), Err(ValidationError::SchemaVersion(3))));
    }

    #[test]
    fn test_rejects_missing_name() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("name");
        assert!(matches!(parse_graph_value(value), Err(ValidationError::Json(_))));
    }

    #[test]
    fn test_rejects_empty_port() {
        let mut value = sample();
        value["edges"][0]["source"]["portId"] = json!("");
        assert!(matches!(parse_graph_value(value), Err(ValidationError::EmptyPortId(_))));
    }

    #[test]
    fn test_rejects_detached_comment() {
        let mut value = sample();
        value["comments"] = json!([{ "nodeId": "   ", "text": "lost" }]);
        assert!(matches!(parse_graph_value(value), Err(ValidationError::DetachedComment(0))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_graph_body("not json").is_err());
        assert!(parse_graph_body("[1,2]").is_err());
    }
}
