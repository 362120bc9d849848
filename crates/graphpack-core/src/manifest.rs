use crate::category::{Category, CategoryRegistry};
use crate::model::{
    now_timestamp, GraphBody, GraphEntry, GraphId, Group, Location, ProjectDocument, TopFolder,
    DEFAULT_GRAPH_NAME, DEFAULT_GROUP_NAME, DEFAULT_GROUP_SLUG, DEFAULT_NEW_GRAPH_NAME,
    DUPLICATE_GROUP_SUFFIX, GRAPH_SCHEMA_VERSION,
};
use crate::path_codec::{self, ResolveHints};
use crate::report::{ArchiveWarning, WarningKind};
use crate::slug::{self, GroupIdentity};
use std::collections::HashSet;
use tracing::debug;

/// Manifest fields as found in untrusted input, every one optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub name: Option<String>,
    pub path: Option<String>,
    pub group_name: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<GraphEntry> for EntryDraft {
    fn from(entry: GraphEntry) -> Self {
        EntryDraft {
            name: Some(entry.name),
            path: Some(entry.path),
            group_name: Some(entry.group_name),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub group: Group,
    pub graph_count: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDescriptor {
    pub graph_id: GraphId,
    pub name: String,
    pub location: Location,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Where an entry lives according to its path, falling back to its group name.
pub fn entry_location(categories: &CategoryRegistry, entry: &GraphEntry) -> Location {
    path_codec::resolve(
        categories,
        &entry.graph_id,
        Some(&entry.path),
        &ResolveHints {
            group_name_hint: Some(&entry.group_name),
            ..Default::default()
        },
    )
    .location
}

pub(crate) fn location_in(category: &Category, group: &Group) -> Location {
    Location {
        top_folder: category.top_folder,
        category_key: category.key.clone(),
        category_directory: category.directory.clone(),
        group_slug: group.group_slug.clone(),
        group_name: group.group_name.clone(),
    }
}

/// Re-derive a group's slug and name. Unknown categories yield None.
fn normalized_group(categories: &CategoryRegistry, group: &Group) -> Option<Group> {
    categories.resolve(group.top_folder, &group.category_key)?;
    let raw_slug = group.group_slug.trim();
    let group_slug = if raw_slug.is_empty() {
        DEFAULT_GROUP_SLUG.to_string()
    } else {
        slug::normalize_slug(raw_slug)
    };
    let group_name = slug::sanitize_name(&group.group_name, DEFAULT_GROUP_NAME);
    // Default name or slug folds into the default group, see `slug::slugify`.
    if group_slug == DEFAULT_GROUP_SLUG || group_name == DEFAULT_GROUP_NAME {
        return Some(Group::default_for(group.top_folder, &group.category_key));
    }
    Some(Group {
        top_folder: group.top_folder,
        category_key: group.category_key.clone(),
        group_slug,
        group_name,
    })
}

/// The group record implied by a decoded location, named after `name_hint` when usable.
fn backing_group(location: &Location, name_hint: Option<&str>) -> Group {
    let mut group = location.to_group();
    if group.is_default() {
        group.group_name = DEFAULT_GROUP_NAME.to_string();
        return group;
    }
    if let Some(hint) = name_hint {
        let name = slug::sanitize_name(hint, &location.group_name);
        if name != DEFAULT_GROUP_NAME {
            group.group_name = name;
        }
    }
    group
}

/// Invariant-preserving mutations over one draft document.
pub struct ManifestStore<'a> {
    categories: &'a CategoryRegistry,
    doc: &'a mut ProjectDocument,
    clock: Option<String>,
}

impl<'a> ManifestStore<'a> {
    pub fn new(categories: &'a CategoryRegistry, doc: &'a mut ProjectDocument) -> Self {
        ManifestStore {
            categories,
            doc,
            clock: None,
        }
    }

    /// Fill missing timestamps with `timestamp` instead of the current time.
    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        self.clock = Some(timestamp.into());
        self
    }

    fn now(&self) -> String {
        self.clock.clone().unwrap_or_else(now_timestamp)
    }

    pub fn document(&self) -> &ProjectDocument {
        &*self.doc
    }

    // ---- Groups ----

    pub fn ensure_default_groups(&mut self) {
        for category in self.categories.iter() {
            let present = self.doc.manifest.groups.iter().any(|g| {
                g.matches(category.top_folder, &category.key, DEFAULT_GROUP_SLUG)
            });
            if !present {
                self.doc
                    .manifest
                    .groups
                    .push(Group::default_for(category.top_folder, &category.key));
            }
        }
    }

    pub fn normalize_groups(&mut self) {
        let raw = std::mem::take(&mut self.doc.manifest.groups);
        let mut groups: Vec<Group> = Vec::with_capacity(raw.len());
        for group in &raw {
            let Some(normalized) = normalized_group(self.categories, group) else {
                debug!(top = %group.top_folder, category = %group.category_key, "dropping group of unknown category");
                continue;
            };
            if groups.iter().any(|g| g.same_identity(&normalized)) {
                continue;
            }
            groups.push(normalized);
        }
        self.doc.manifest.groups = groups;
        self.ensure_default_groups();
    }

    pub fn upsert_group(&mut self, group: Group) {
        match self
            .doc
            .manifest
            .groups
            .iter_mut()
            .find(|g| g.same_identity(&group))
        {
            Some(existing) => *existing = group,
            None => self.doc.manifest.groups.push(group),
        }
    }

    /// Drop a group record. The default group is never removed.
    pub fn remove_group(&mut self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> bool {
        if group_slug == DEFAULT_GROUP_SLUG {
            return false;
        }
        let before = self.doc.manifest.groups.len();
        self.doc
            .manifest
            .groups
            .retain(|g| !g.matches(top_folder, category_key, group_slug));
        self.ensure_default_groups();
        self.doc.manifest.groups.len() != before
    }

    /// Name of the group at `location`, inserting it first if it is missing.
    fn ensure_backing_group(&mut self, location: &Location, name_hint: Option<&str>) -> String {
        if let Some(existing) =
            self.doc
                .group(location.top_folder, &location.category_key, &location.group_slug)
        {
            return existing.group_name.clone();
        }
        let group = backing_group(location, name_hint);
        let name = group.group_name.clone();
        self.doc.manifest.groups.push(group);
        name
    }

    /// Register the group at `location` unless it is already known.
    pub fn adopt_group(&mut self, location: &Location) {
        self.ensure_backing_group(location, None);
    }

    // ---- Entries ----

    /// Build a normalized entry for the body already stored under `graph_id`.
    /// Missing timestamps are filled on both the entry and the body.
    fn bind_entry(&mut self, graph_id: &GraphId, draft: EntryDraft) -> GraphEntry {
        let resolved = path_codec::resolve(
            self.categories,
            graph_id,
            draft.path.as_deref(),
            &ResolveHints {
                group_name_hint: draft.group_name.as_deref(),
                ..Default::default()
            },
        );
        if let Some(issue) = &resolved.issue {
            debug!(graph_id = %graph_id, "{issue}");
        }
        let group_name = self.ensure_backing_group(&resolved.location, draft.group_name.as_deref());

        let now = self.now();
        let (body_name, created_at, updated_at) = match self.doc.graphs.get_mut(graph_id) {
            Some(body) => {
                let created = draft
                    .created_at
                    .or_else(|| body.created_at.clone())
                    .unwrap_or_else(|| now.clone());
                let updated = draft
                    .updated_at
                    .or_else(|| body.updated_at.clone())
                    .unwrap_or_else(|| created.clone());
                if body.created_at.is_none() {
                    body.created_at = Some(created.clone());
                }
                if body.updated_at.is_none() {
                    body.updated_at = Some(updated.clone());
                }
                (
                    slug::sanitize_name(&body.name, DEFAULT_GRAPH_NAME),
                    created,
                    updated,
                )
            }
            None => {
                let created = draft.created_at.unwrap_or_else(|| now.clone());
                let updated = draft.updated_at.unwrap_or_else(|| created.clone());
                (DEFAULT_GRAPH_NAME.to_string(), created, updated)
            }
        };
        let name = match draft.name {
            Some(name) => slug::sanitize_name(&name, &body_name),
            None => body_name,
        };

        GraphEntry {
            graph_id: graph_id.clone(),
            name,
            path: resolved.normalized_path,
            group_name,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        }
    }

    fn upsert_entry(&mut self, entry: GraphEntry) {
        match self
            .doc
            .manifest
            .graphs
            .iter_mut()
            .find(|e| e.graph_id == entry.graph_id)
        {
            Some(existing) => *existing = entry,
            None => self.doc.manifest.graphs.push(entry),
        }
    }

    /// Store a body and its entry together. The entry's path is re-derived and the
    /// group it points at is created if missing.
    pub fn attach_graph(&mut self, graph_id: GraphId, body: GraphBody, entry: impl Into<EntryDraft>) {
        self.doc.graphs.insert(graph_id.clone(), body);
        let entry = self.bind_entry(&graph_id, entry.into());
        debug!(graph_id = %graph_id, path = %entry.path, "attached graph");
        self.upsert_entry(entry);
    }

    /// Remove a body and its entry. Groups stay.
    pub fn detach_graph(&mut self, graph_id: &GraphId) -> bool {
        let had_body = self.doc.graphs.remove(graph_id).is_some();
        let before = self.doc.manifest.graphs.len();
        self.doc.manifest.graphs.retain(|e| &e.graph_id != graph_id);
        had_body || self.doc.manifest.graphs.len() != before
    }

    pub fn matching_graph_ids(&self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> Vec<GraphId> {
        self.doc
            .manifest
            .graphs
            .iter()
            .filter(|e| {
                entry_location(self.categories, e).matches_group(top_folder, category_key, group_slug)
            })
            .map(|e| e.graph_id.clone())
            .collect()
    }

    fn names_in_group(&self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> HashSet<String> {
        self.doc
            .manifest
            .graphs
            .iter()
            .filter(|e| {
                entry_location(self.categories, e).matches_group(top_folder, category_key, group_slug)
            })
            .map(|e| e.name.clone())
            .collect()
    }

    // ---- Group operations ----

    pub fn create_group(
        &mut self,
        top_folder: TopFolder,
        category_key: &str,
        requested_name: &str,
    ) -> Option<GroupIdentity> {
        let category = self.categories.resolve(top_folder, category_key)?;
        self.ensure_default_groups();
        let identity = slug::unique_name_and_slug(
            self.doc
                .manifest
                .groups
                .iter()
                .filter(|g| g.in_scope(top_folder, category_key)),
            requested_name,
        );
        self.upsert_group(Group {
            top_folder,
            category_key: category.key.clone(),
            group_slug: identity.group_slug.clone(),
            group_name: identity.group_name.clone(),
        });
        debug!(top = %top_folder, category = category_key, slug = %identity.group_slug, "created group");
        Some(identity)
    }

    /// Copy a group and every graph in it. Returns the new slug.
    pub fn duplicate_group(&mut self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> Option<String> {
        let categories = self.categories;
        let category = categories.resolve(top_folder, category_key)?;
        let source = self.doc.group(top_folder, category_key, group_slug)?.clone();

        let identity = slug::unique_name_and_slug(
            self.doc
                .manifest
                .groups
                .iter()
                .filter(|g| g.in_scope(top_folder, category_key)),
            &format!("{}{}", source.group_name, DUPLICATE_GROUP_SUFFIX),
        );
        let target = Group {
            top_folder,
            category_key: category.key.clone(),
            group_slug: identity.group_slug.clone(),
            group_name: identity.group_name.clone(),
        };
        let target_location = location_in(category, &target);
        self.upsert_group(target);

        let timestamp = self.now();
        let sources: Vec<GraphEntry> = self
            .doc
            .manifest
            .graphs
            .iter()
            .filter(|e| entry_location(categories, e).matches_group(top_folder, category_key, group_slug))
            .cloned()
            .collect();
        for entry in sources {
            let Some(body) = self.doc.graphs.get(&entry.graph_id) else {
                continue;
            };
            let mut copy = body.clone();
            copy.created_at = Some(timestamp.clone());
            copy.updated_at = Some(timestamp.clone());
            let graph_id = GraphId::generate();
            let draft = EntryDraft {
                name: Some(entry.name),
                path: Some(path_codec::encode(&target_location, &graph_id)),
                group_name: Some(identity.group_name.clone()),
                created_at: Some(timestamp.clone()),
                updated_at: Some(timestamp.clone()),
            };
            self.attach_graph(graph_id, copy, draft);
        }
        debug!(from = group_slug, to = %identity.group_slug, "duplicated group");
        Some(identity.group_slug)
    }

    /// Move a non-default group to another category of the same top folder.
    /// Returns the slug it ends up with.
    pub fn move_group(&mut self, group_slug: &str, from_category: &str, to_category: &str) -> Option<String> {
        if from_category == to_category {
            return Some(group_slug.to_string());
        }
        let categories = self.categories;
        let from = categories.by_key(from_category)?;
        let to = categories.by_key(to_category)?;
        if from.top_folder != to.top_folder || group_slug == DEFAULT_GROUP_SLUG {
            return None;
        }
        let top_folder = from.top_folder;
        let index = self
            .doc
            .manifest
            .groups
            .iter()
            .position(|g| g.matches(top_folder, &from.key, group_slug))?;

        let siblings: HashSet<String> = self
            .doc
            .manifest
            .groups
            .iter()
            .filter(|g| g.in_scope(top_folder, &to.key))
            .map(|g| g.group_slug.clone())
            .collect();
        let next_slug = slug::next_free_slug(group_slug, |s| siblings.contains(s));

        let moved = {
            let group = &mut self.doc.manifest.groups[index];
            group.category_key = to.key.clone();
            group.group_slug = next_slug.clone();
            group.clone()
        };
        let location = location_in(to, &moved);

        for entry in self.doc.manifest.graphs.iter_mut() {
            if entry_location(categories, entry).matches_group(top_folder, &from.key, group_slug) {
                entry.path = path_codec::encode(&location, &entry.graph_id);
                entry.group_name = moved.group_name.clone();
            }
        }
        debug!(from = from_category, to = to_category, slug = %next_slug, "moved group");
        Some(next_slug)
    }

    /// Delete a non-default group with its graphs. Returns the removed graph ids.
    pub fn delete_group(&mut self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> Option<Vec<GraphId>> {
        if group_slug == DEFAULT_GROUP_SLUG {
            return None;
        }
        self.doc.group(top_folder, category_key, group_slug)?;
        let removed = self.matching_graph_ids(top_folder, category_key, group_slug);
        for graph_id in &removed {
            self.detach_graph(graph_id);
        }
        self.remove_group(top_folder, category_key, group_slug);
        debug!(slug = group_slug, graphs = removed.len(), "deleted group");
        Some(removed)
    }

    /// Change a group's display name. The slug, and so every path, stays.
    pub fn rename_group(
        &mut self,
        top_folder: TopFolder,
        category_key: &str,
        group_slug: &str,
        new_name: &str,
    ) -> Option<String> {
        if group_slug == DEFAULT_GROUP_SLUG {
            return None;
        }
        let current = self.doc.group(top_folder, category_key, group_slug)?.group_name.clone();
        let base = slug::sanitize_name(new_name, &current);
        if base == DEFAULT_GROUP_NAME {
            return None;
        }
        let taken: HashSet<&str> = self
            .doc
            .manifest
            .groups
            .iter()
            .filter(|g| g.in_scope(top_folder, category_key) && g.group_slug != group_slug)
            .map(|g| g.group_name.as_str())
            .collect();
        let mut name = base.clone();
        let mut index = 2;
        while taken.contains(name.as_str()) {
            name = format!("{base}-{index}");
            index += 1;
        }

        let categories = self.categories;
        if let Some(group) = self
            .doc
            .manifest
            .groups
            .iter_mut()
            .find(|g| g.matches(top_folder, category_key, group_slug))
        {
            group.group_name = name.clone();
        }
        for entry in self.doc.manifest.graphs.iter_mut() {
            if entry_location(categories, entry).matches_group(top_folder, category_key, group_slug) {
                entry.group_name = name.clone();
            }
        }
        Some(name)
    }

    // ---- Graph operations ----

    pub fn create_graph(&mut self, top_folder: TopFolder, category_key: &str, group_slug: &str) -> Option<GraphId> {
        let category = self.categories.resolve(top_folder, category_key)?;
        let group = self.doc.group(top_folder, category_key, group_slug)?.clone();
        let names = self.names_in_group(top_folder, category_key, group_slug);
        let name = slug::unique_graph_name(
            &names.iter().map(String::as_str).collect(),
            DEFAULT_NEW_GRAPH_NAME,
            true,
        );

        let timestamp = self.now();
        let graph_id = GraphId::generate();
        let location = location_in(category, &group);
        let draft = EntryDraft {
            name: Some(name.clone()),
            path: Some(path_codec::encode(&location, &graph_id)),
            group_name: Some(group.group_name),
            created_at: Some(timestamp.clone()),
            updated_at: Some(timestamp.clone()),
        };
        self.attach_graph(graph_id.clone(), GraphBody::empty(&name, &timestamp), draft);
        Some(graph_id)
    }

    pub fn duplicate_graph(&mut self, graph_id: &GraphId) -> Option<GraphId> {
        let entry = self.doc.entry(graph_id)?;
        let location = entry_location(self.categories, entry);
        self.copy_graph_to(graph_id, location)
    }

    /// Paste a deep copy of a graph into another group of the same top folder.
    /// None when the source, the category or the target group is missing.
    pub fn duplicate_graph_into(
        &mut self,
        graph_id: &GraphId,
        category_key: &str,
        group_slug: &str,
    ) -> Option<GraphId> {
        let entry = self.doc.entry(graph_id)?;
        let top_folder = entry_location(self.categories, entry).top_folder;
        let category = self.categories.resolve(top_folder, category_key)?;
        let group = self.doc.group(top_folder, category_key, group_slug)?;
        let location = location_in(category, group);
        self.copy_graph_to(graph_id, location)
    }

    /// Copy named `{name}_N`, unique among the graphs already at `location`.
    fn copy_graph_to(&mut self, graph_id: &GraphId, location: Location) -> Option<GraphId> {
        let entry = self.doc.entry(graph_id)?.clone();
        let mut copy = self.doc.graphs.get(graph_id)?.clone();
        let names = self.names_in_group(location.top_folder, &location.category_key, &location.group_slug);
        let name = slug::unique_graph_name(&names.iter().map(String::as_str).collect(), &entry.name, false);

        let timestamp = self.now();
        let new_id = GraphId::generate();
        copy.name = name.clone();
        copy.created_at = Some(timestamp.clone());
        copy.updated_at = Some(timestamp.clone());
        let draft = EntryDraft {
            name: Some(name),
            path: Some(path_codec::encode(&location, &new_id)),
            group_name: Some(location.group_name),
            created_at: Some(timestamp.clone()),
            updated_at: Some(timestamp),
        };
        debug!(source = %graph_id, copy = %new_id, "duplicated graph");
        self.attach_graph(new_id.clone(), copy, draft);
        Some(new_id)
    }

    pub fn rename_graph(&mut self, graph_id: &GraphId, new_name: &str) -> Option<String> {
        let timestamp = self.now();
        let entry = self
            .doc
            .manifest
            .graphs
            .iter_mut()
            .find(|e| &e.graph_id == graph_id)?;
        let name = slug::sanitize_name(new_name, &entry.name);
        entry.name = name.clone();
        entry.updated_at = Some(timestamp.clone());
        if let Some(body) = self.doc.graphs.get_mut(graph_id) {
            body.name = name.clone();
            body.updated_at = Some(timestamp);
        }
        Some(name)
    }

    /// Replace the body of an existing graph, as the editor does on save.
    pub fn update_graph_body(&mut self, graph_id: &GraphId, mut body: GraphBody) -> bool {
        let timestamp = self.now();
        let Some(entry) = self
            .doc
            .manifest
            .graphs
            .iter_mut()
            .find(|e| &e.graph_id == graph_id)
        else {
            return false;
        };
        entry.updated_at = Some(timestamp.clone());
        body.schema_version = GRAPH_SCHEMA_VERSION;
        if body.created_at.is_none() {
            body.created_at = entry.created_at.clone();
        }
        body.updated_at = Some(timestamp);
        self.doc.graphs.insert(graph_id.clone(), body);
        true
    }

    // ---- Whole-document repair ----

    /// Bring the document back to a consistent state: groups normalized, one entry
    /// per body, every entry path re-derived.
    pub fn normalize(&mut self) -> Vec<ArchiveWarning> {
        let mut warnings = Vec::new();
        self.normalize_groups();

        let entries = std::mem::take(&mut self.doc.manifest.graphs);
        let mut seen: HashSet<GraphId> = HashSet::new();
        for entry in entries {
            if !self.doc.graphs.contains_key(&entry.graph_id) {
                warnings.push(ArchiveWarning::new(
                    WarningKind::MissingGraphBody,
                    entry.graph_id.as_str(),
                    "manifest entry has no graph body; dropped",
                ));
                continue;
            }
            if !seen.insert(entry.graph_id.clone()) {
                warnings.push(ArchiveWarning::new(
                    WarningKind::DuplicateManifestEntry,
                    entry.graph_id.as_str(),
                    "graph listed twice in the manifest; later entry dropped",
                ));
                continue;
            }
            let graph_id = entry.graph_id.clone();
            let bound = self.bind_entry(&graph_id, entry.into());
            self.doc.manifest.graphs.push(bound);
        }

        let orphans: Vec<GraphId> = self
            .doc
            .graphs
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for graph_id in orphans {
            warnings.push(ArchiveWarning::new(
                WarningKind::OrphanGraphBody,
                graph_id.as_str(),
                "graph body had no manifest entry; entry recreated",
            ));
            let bound = self.bind_entry(&graph_id, EntryDraft::default());
            self.doc.manifest.graphs.push(bound);
        }

        self.ensure_default_groups();
        warnings
    }

    // ---- Read side ----

    pub fn group_descriptors(&self, top_folder: TopFolder, category_key: Option<&str>) -> Vec<GroupDescriptor> {
        group_descriptors(self.categories, &*self.doc, top_folder, category_key)
    }

    pub fn graph_descriptors(&self) -> Vec<GraphDescriptor> {
        graph_descriptors(self.categories, &*self.doc)
    }
}

/// Groups of a top folder (optionally one category), sorted by display name in
/// code-point order, ties by slug.
pub fn group_descriptors(
    categories: &CategoryRegistry,
    doc: &ProjectDocument,
    top_folder: TopFolder,
    category_key: Option<&str>,
) -> Vec<GroupDescriptor> {
    let locations: Vec<Location> = doc
        .manifest
        .graphs
        .iter()
        .map(|e| entry_location(categories, e))
        .collect();
    let mut out: Vec<GroupDescriptor> = doc
        .manifest
        .groups
        .iter()
        .filter(|g| g.top_folder == top_folder)
        .filter(|g| category_key.map_or(true, |key| g.category_key == key))
        .map(|g| GroupDescriptor {
            graph_count: locations
                .iter()
                .filter(|l| l.matches_group(g.top_folder, &g.category_key, &g.group_slug))
                .count() as u32,
            is_default: g.is_default(),
            group: g.clone(),
        })
        .collect();
    out.sort_by(|a, b| {
        a.group
            .group_name
            .cmp(&b.group.group_name)
            .then_with(|| a.group.group_slug.cmp(&b.group.group_slug))
    });
    out
}

pub fn graph_descriptors(categories: &CategoryRegistry, doc: &ProjectDocument) -> Vec<GraphDescriptor> {
    doc.manifest
        .graphs
        .iter()
        .map(|e| GraphDescriptor {
            graph_id: e.graph_id.clone(),
            name: e.name.clone(),
            location: entry_location(categories, e),
            created_at: e.created_at.clone(),
            updated_at: e.updated_at.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeEndpoint, GraphComment, GraphEdge, GraphNode, Position, DEFAULT_NEW_GROUP_NAME};

    fn fresh() -> (CategoryRegistry, ProjectDocument) {
        let categories = CategoryRegistry::default();
        let mut doc = ProjectDocument::bare("p1".into(), "Test".into(), "0.0.0".into());
        ManifestStore::new(&categories, &mut doc).ensure_default_groups();
        (categories, doc)
    }

    fn body_with_node(name: &str) -> GraphBody {
        let mut body = GraphBody::empty(name, "2024-01-01T00:00:00.000Z");
        body.nodes.push(GraphNode {
            id: "n1".into(),
            node_type: "event.onSpawn".into(),
            position: Position { x: 1.0, y: 2.0 },
            label: None,
            data: None,
            extra: Default::default(),
        });
        body
    }

    fn wired_body(name: &str, node_type: &str) -> GraphBody {
        let mut body = body_with_node(name);
        body.nodes[0].node_type = node_type.into();
        body.nodes.push(GraphNode {
            id: "n2".into(),
            node_type: "action.log".into(),
            position: Position { x: 40.0, y: 2.5 },
            label: Some(format!("{name} log")),
            data: None,
            extra: Default::default(),
        });
        body.edges.push(GraphEdge {
            id: "e1".into(),
            source: EdgeEndpoint {
                node_id: "n1".into(),
                port_id: "out".into(),
            },
            target: EdgeEndpoint {
                node_id: "n2".into(),
                port_id: "in".into(),
            },
            extra: Default::default(),
        });
        body.comments.push(GraphComment {
            id: "c1".into(),
            node_id: Some("n2".into()),
            position: None,
            text: format!("note on {name}"),
            pinned: true,
            collapsed: false,
            extra: Default::default(),
        });
        body
    }

    fn default_count(doc: &ProjectDocument, top: TopFolder, key: &str) -> usize {
        doc.manifest
            .groups
            .iter()
            .filter(|g| g.matches(top, key, DEFAULT_GROUP_SLUG))
            .count()
    }

    #[test]
    fn test_ensure_default_groups_is_idempotent() {
        let (categories, mut doc) = fresh();
        let count = doc.manifest.groups.len();
        assert_eq!(count, categories.iter().count());
        ManifestStore::new(&categories, &mut doc).ensure_default_groups();
        assert_eq!(doc.manifest.groups.len(), count);
    }

    #[test]
    fn test_create_group_twice_with_same_name() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let first = store.create_group(TopFolder::Server, "entity", DEFAULT_NEW_GROUP_NAME).unwrap();
        let second = store.create_group(TopFolder::Server, "entity", DEFAULT_NEW_GROUP_NAME).unwrap();
        assert_eq!(first.group_name, "新建文件夹");
        assert_eq!(second.group_name, "新建文件夹-2");
        assert_ne!(first.group_slug, second.group_slug);
        assert!(first.group_slug.is_ascii() && second.group_slug.is_ascii());
    }

    #[test]
    fn test_create_group_rejects_foreign_category() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        assert!(store.create_group(TopFolder::Client, "entity", "x").is_none());
        assert!(store.create_group(TopFolder::Server, "nope", "x").is_none());
    }

    #[test]
    fn test_default_group_survives_everything() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        assert!(store.delete_group(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG).is_none());
        assert!(!store.remove_group(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG));
        assert!(store.move_group(DEFAULT_GROUP_SLUG, "entity", "status").is_none());
        assert!(store.rename_group(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG, "x").is_none());

        let a = store.create_group(TopFolder::Server, "entity", "A").unwrap();
        store.duplicate_group(TopFolder::Server, "entity", &a.group_slug).unwrap();
        store.move_group(&a.group_slug, "entity", "status").unwrap();
        store.duplicate_group(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG).unwrap();
        store.delete_group(TopFolder::Server, "status", &a.group_slug).unwrap();

        for key in ["entity", "status"] {
            assert_eq!(default_count(&doc, TopFolder::Server, key), 1);
        }
    }

    #[test]
    fn test_duplicate_group_deep_copies() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let source = store.create_group(TopFolder::Server, "item", "Loot").unwrap();
        let g1 = store.create_graph(TopFolder::Server, "item", &source.group_slug).unwrap();
        let g2 = store.create_graph(TopFolder::Server, "item", &source.group_slug).unwrap();
        assert!(store.update_graph_body(&g1, wired_body("drops", "event.onDeath")));
        assert!(store.update_graph_body(&g2, wired_body("chests", "event.onOpen")));

        let copy_slug = store.duplicate_group(TopFolder::Server, "item", &source.group_slug).unwrap();
        let copies = store.matching_graph_ids(TopFolder::Server, "item", &copy_slug);
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|id| id != &g1 && id != &g2));

        let doc = store.document();
        let copy_group = doc.group(TopFolder::Server, "item", &copy_slug).unwrap();
        assert_eq!(copy_group.group_name, "Loot 副本");
        for id in &copies {
            let entry = doc.entry(id).unwrap();
            let source_id = [&g1, &g2]
                .into_iter()
                .find(|s| doc.entry(s).unwrap().name == entry.name)
                .unwrap();
            let (body, original) = (&doc.graphs[id], &doc.graphs[source_id]);
            assert_eq!(body.nodes, original.nodes);
            assert_eq!(body.edges, original.edges);
            assert_eq!(body.comments, original.comments);
            assert_eq!(entry.group_name, "Loot 副本");
            assert_eq!(entry.created_at, body.created_at);
        }
        let copied_types: HashSet<_> = copies.iter().map(|id| doc.graphs[id].nodes[0].node_type.as_str()).collect();
        assert_eq!(copied_types, HashSet::from(["event.onDeath", "event.onOpen"]));
        assert_ne!(doc.graphs[&copies[0]].created_at.as_deref(), Some("2024-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_duplicate_absent_group() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        assert!(store.duplicate_group(TopFolder::Server, "item", "ghost").is_none());
    }

    #[test]
    fn test_move_group_preserves_ids_and_bodies() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let group = store.create_group(TopFolder::Server, "entity", "Bosses").unwrap();
        let id = store.create_graph(TopFolder::Server, "entity", &group.group_slug).unwrap();
        let body_before = store.document().graphs[&id].clone();

        let slug = store.move_group(&group.group_slug, "entity", "class").unwrap();
        assert_eq!(slug, group.group_slug);
        let doc = store.document();
        assert_eq!(doc.graphs[&id], body_before);
        let entry = doc.entry(&id).unwrap();
        assert_eq!(entry.path, format!("server/class/{slug}/{id}.json"));
        assert!(doc.group(TopFolder::Server, "entity", &slug).is_none());
        assert!(doc.group(TopFolder::Server, "class", &slug).is_some());
    }

    #[test]
    fn test_move_group_resolves_collision() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let a = store.create_group(TopFolder::Server, "entity", "Shared").unwrap();
        store.create_group(TopFolder::Server, "status", "Shared").unwrap();
        let moved = store.move_group(&a.group_slug, "entity", "status").unwrap();
        assert_eq!(moved, format!("{}-2", a.group_slug));
    }

    #[test]
    fn test_move_group_refusals() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let a = store.create_group(TopFolder::Server, "entity", "A").unwrap();
        assert_eq!(store.move_group(&a.group_slug, "entity", "entity"), Some(a.group_slug.clone()));
        assert!(store.move_group(&a.group_slug, "entity", "skill").is_none());
        assert!(store.move_group(&a.group_slug, "entity", "missing").is_none());
        assert!(store.move_group("ghost", "entity", "status").is_none());
    }

    #[test]
    fn test_delete_group_removes_graphs() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let a = store.create_group(TopFolder::Client, "skill", "Fire").unwrap();
        let id = store.create_graph(TopFolder::Client, "skill", &a.group_slug).unwrap();
        let kept = store.create_graph(TopFolder::Client, "skill", DEFAULT_GROUP_SLUG).unwrap();

        let removed = store.delete_group(TopFolder::Client, "skill", &a.group_slug).unwrap();
        assert_eq!(removed, vec![id.clone()]);
        let doc = store.document();
        assert!(!doc.graphs.contains_key(&id));
        assert!(doc.entry(&id).is_none());
        assert!(doc.entry(&kept).is_some());
        assert!(doc.group(TopFolder::Client, "skill", &a.group_slug).is_none());
        assert!(store.delete_group(TopFolder::Client, "skill", &a.group_slug).is_none());
    }

    #[test]
    fn test_rename_group_keeps_slug() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let a = store.create_group(TopFolder::Server, "entity", "Old").unwrap();
        store.create_group(TopFolder::Server, "entity", "Taken").unwrap();
        let id = store.create_graph(TopFolder::Server, "entity", &a.group_slug).unwrap();

        let name = store.rename_group(TopFolder::Server, "entity", &a.group_slug, " Taken ").unwrap();
        assert_eq!(name, "Taken-2");
        let doc = store.document();
        assert_eq!(doc.entry(&id).unwrap().group_name, "Taken-2");
        assert!(doc.entry(&id).unwrap().path.contains(&a.group_slug));
        assert!(store.rename_group(TopFolder::Server, "entity", &a.group_slug, DEFAULT_GROUP_NAME).is_none());
    }

    #[test]
    fn test_create_and_duplicate_graph_names() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let first = store.create_graph(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG).unwrap();
        let second = store.create_graph(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG).unwrap();
        let copy = store.duplicate_graph(&first).unwrap();

        let doc = store.document();
        assert_eq!(doc.entry(&first).unwrap().name, "新建节点图");
        assert_eq!(doc.entry(&second).unwrap().name, "新建节点图_1");
        assert_eq!(doc.entry(&copy).unwrap().name, "新建节点图_2");
        assert_eq!(doc.graphs[&copy].name, "新建节点图_2");
        assert!(store.create_graph(TopFolder::Server, "entity", "ghost").is_none());
    }

    #[test]
    fn test_duplicate_graph_into_other_group() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let loot = store.create_group(TopFolder::Server, "item", "Loot").unwrap();
        let source = store.create_graph(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG).unwrap();
        assert!(store.update_graph_body(&source, wired_body("Boss", "event.onSpawn")));
        store.rename_graph(&source, "Boss").unwrap();

        let first = store.duplicate_graph_into(&source, "item", &loot.group_slug).unwrap();
        let second = store.duplicate_graph_into(&source, "item", &loot.group_slug).unwrap();
        assert!(store.duplicate_graph_into(&source, "skill", DEFAULT_GROUP_SLUG).is_none());
        assert!(store.duplicate_graph_into(&source, "item", "ghost").is_none());
        assert!(store.duplicate_graph_into(&GraphId("ghost".into()), "item", &loot.group_slug).is_none());

        let doc = store.document();
        let entry = doc.entry(&first).unwrap();
        assert_eq!(entry.name, "Boss_1");
        assert_eq!(entry.group_name, "Loot");
        assert_eq!(entry.path, format!("server/item/{}/{first}.json", loot.group_slug));
        assert_eq!(doc.entry(&second).unwrap().name, "Boss_2");
        let (copy, original) = (&doc.graphs[&first], &doc.graphs[&source]);
        assert_eq!(copy.name, "Boss_1");
        assert_eq!(copy.nodes, original.nodes);
        assert_eq!(copy.edges, original.edges);
        assert_eq!(copy.comments, original.comments);
        assert_eq!(doc.entry(&source).unwrap().path, format!("server/entity/default/{source}.json"));
    }

    #[test]
    fn test_rename_graph_updates_both_records() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let id = store.create_graph(TopFolder::Client, "skill", DEFAULT_GROUP_SLUG).unwrap();
        assert_eq!(store.rename_graph(&id, "  Fireball "), Some("Fireball".to_string()));
        assert_eq!(store.rename_graph(&id, "   "), Some("Fireball".to_string()));
        assert_eq!(store.document().graphs[&id].name, "Fireball");
        assert!(store.rename_graph(&GraphId("ghost".into()), "x").is_none());
    }

    #[test]
    fn test_update_graph_body_requires_entry() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        assert!(!store.update_graph_body(&GraphId("ghost".into()), body_with_node("x")));
        assert!(store.document().graphs.is_empty());
    }

    #[test]
    fn test_attach_graph_creates_implied_group() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let id = GraphId("g1".into());
        store.attach_graph(
            id.clone(),
            body_with_node("Main"),
            EntryDraft {
                path: Some("server\\status\\Buffs\\g1.json".into()),
                group_name: Some("Buffs & Debuffs".into()),
                ..Default::default()
            },
        );
        let doc = store.document();
        let entry = doc.entry(&id).unwrap();
        assert_eq!(entry.path, "server/status/buffs/g1.json");
        assert_eq!(entry.name, "Main");
        assert_eq!(entry.group_name, "Buffs & Debuffs");
        assert_eq!(doc.group(TopFolder::Server, "status", "buffs").unwrap().group_name, "Buffs & Debuffs");
    }

    #[test]
    fn test_detach_graph() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let id = store.create_graph(TopFolder::Server, "entity", DEFAULT_GROUP_SLUG).unwrap();
        let groups = store.document().manifest.groups.len();
        assert!(store.detach_graph(&id));
        assert!(!store.detach_graph(&id));
        assert_eq!(store.document().manifest.groups.len(), groups);
    }

    #[test]
    fn test_normalize_groups_repairs_untrusted_input() {
        let (categories, mut doc) = fresh();
        doc.manifest.groups.extend([
            Group {
                top_folder: TopFolder::Server,
                category_key: "entity".into(),
                group_slug: "My Folder".into(),
                group_name: " My Folder ".into(),
            },
            Group {
                top_folder: TopFolder::Server,
                category_key: "entity".into(),
                group_slug: "my-folder".into(),
                group_name: "Duplicate".into(),
            },
            Group {
                top_folder: TopFolder::Client,
                category_key: "entity".into(),
                group_slug: "x".into(),
                group_name: "Wrong top".into(),
            },
        ]);
        let before = categories.iter().count();
        ManifestStore::new(&categories, &mut doc).normalize_groups();
        assert_eq!(doc.manifest.groups.len(), before + 1);
        let group = doc.group(TopFolder::Server, "entity", "my-folder").unwrap();
        assert_eq!(group.group_name, "My Folder");
    }

    #[test]
    fn test_normalize_heals_entries_and_bodies() {
        let (categories, mut doc) = fresh();
        let orphan = GraphId("orphan".into());
        doc.graphs.insert(orphan.clone(), body_with_node("Lonely"));
        doc.manifest.graphs.push(GraphEntry {
            graph_id: GraphId("ghost".into()),
            name: "Ghost".into(),
            path: "server/entity/default/ghost.json".into(),
            group_name: DEFAULT_GROUP_NAME.into(),
            created_at: None,
            updated_at: None,
        });

        let warnings = ManifestStore::new(&categories, &mut doc).normalize();
        let kinds: Vec<_> = warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::MissingGraphBody, WarningKind::OrphanGraphBody]);
        assert_eq!(doc.manifest.graphs.len(), 1);
        let entry = doc.entry(&orphan).unwrap();
        assert_eq!(entry.name, "Lonely");
        assert_eq!(entry.path, "server/entity/default/orphan.json");

        let snapshot = doc.clone();
        assert!(ManifestStore::new(&categories, &mut doc).normalize().is_empty());
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn test_group_descriptors_sorted_with_counts() {
        let (categories, mut doc) = fresh();
        let mut store = ManifestStore::new(&categories, &mut doc);
        let b = store.create_group(TopFolder::Server, "entity", "b").unwrap();
        store.create_group(TopFolder::Server, "entity", "A").unwrap();
        store.create_graph(TopFolder::Server, "entity", &b.group_slug).unwrap();
        store.create_graph(TopFolder::Server, "entity", &b.group_slug).unwrap();

        let descriptors = store.group_descriptors(TopFolder::Server, Some("entity"));
        let names: Vec<_> = descriptors.iter().map(|d| d.group.group_name.as_str()).collect();
        assert_eq!(names, vec!["A", "b", DEFAULT_GROUP_NAME]);
        assert_eq!(descriptors[1].graph_count, 2);
        assert!(descriptors[2].is_default);
        assert_eq!(store.group_descriptors(TopFolder::Client, None).len(), 3);
        assert_eq!(store.graph_descriptors().len(), 2);
    }
}
