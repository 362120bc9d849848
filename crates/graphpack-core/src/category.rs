use crate::error::ProjectError;
use crate::model::TopFolder;
use crate::slug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A fixed subdivision of a top folder. Static configuration, never user data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub key: String,
    pub top_folder: TopFolder,
    pub directory: String,
    pub label: String,
}

impl Category {
    fn new(key: &str, top_folder: TopFolder, directory: &str, label: &str) -> Self {
        Category {
            key: key.to_string(),
            top_folder,
            directory: directory.to_string(),
            label: label.to_string(),
        }
    }
}

/// The category table for one process. Order is significant: the first category of
/// each top folder is where graphs with unreadable paths end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<Category>) -> Result<Self, ProjectError> {
        let mut keys = HashSet::new();
        let mut directories = HashSet::new();
        for category in &categories {
            if category.key.trim().is_empty() {
                return Err(ProjectError::InvalidConfig("category key is empty".to_string()));
            }
            if !keys.insert(category.key.as_str()) {
                return Err(ProjectError::InvalidConfig(format!(
                    "duplicate category key '{}'",
                    category.key
                )));
            }
            if slug::sanitize_segment(&category.directory, "") != category.directory {
                return Err(ProjectError::InvalidConfig(format!(
                    "category directory '{}' is not a safe path segment",
                    category.directory
                )));
            }
            if !directories.insert((category.top_folder, category.directory.as_str())) {
                return Err(ProjectError::InvalidConfig(format!(
                    "duplicate directory '{}' under {}",
                    category.directory, category.top_folder
                )));
            }
        }
        for top in TopFolder::ALL {
            if !categories.iter().any(|c| c.top_folder == top) {
                return Err(ProjectError::InvalidConfig(format!(
                    "no categories registered for {top}"
                )));
            }
        }
        Ok(CategoryRegistry { categories })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn in_top(&self, top_folder: TopFolder) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(move |c| c.top_folder == top_folder)
    }

    pub fn by_key(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn by_directory(&self, top_folder: TopFolder, directory: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.top_folder == top_folder && c.directory == directory)
    }

    /// The category with `key`, provided it belongs to `top_folder`.
    pub fn resolve(&self, top_folder: TopFolder, key: &str) -> Option<&Category> {
        self.by_key(key).filter(|c| c.top_folder == top_folder)
    }

    pub fn fallback(&self, top_folder: TopFolder) -> &Category {
        // `new` guarantees every top folder has at least one category.
        self.in_top(top_folder)
            .next()
            .unwrap_or(&self.categories[0])
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        CategoryRegistry {
            categories: vec![
                Category::new("entity", TopFolder::Server, "entity", "实体节点图"),
                Category::new("status", TopFolder::Server, "status", "状态节点图"),
                Category::new("class", TopFolder::Server, "class", "职业节点图"),
                Category::new("item", TopFolder::Server, "item", "道具节点图"),
                Category::new("skill", TopFolder::Client, "skill", "技能节点图"),
                Category::new("boolean_filter", TopFolder::Client, "boolean_filter", "布尔过滤器节点图"),
                Category::new("integer_filter", TopFolder::Client, "integer_filter", "整数过滤器节点图"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid() {
        let registry = CategoryRegistry::default();
        let rebuilt = CategoryRegistry::new(registry.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt, registry);
        assert_eq!(registry.fallback(TopFolder::Server).key, "entity");
        assert_eq!(registry.fallback(TopFolder::Client).key, "skill");
    }

    #[test]
    fn test_resolve_checks_top_folder() {
        let registry = CategoryRegistry::default();
        assert!(registry.resolve(TopFolder::Server, "entity").is_some());
        assert!(registry.resolve(TopFolder::Client, "entity").is_none());
        assert!(registry.resolve(TopFolder::Server, "missing").is_none());
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let result = CategoryRegistry::new(vec![
            Category::new("a", TopFolder::Server, "a", "A"),
            Category::new("a", TopFolder::Client, "b", "B"),
        ]);
        assert!(matches!(result, Err(ProjectError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unsafe_directory() {
        let result = CategoryRegistry::new(vec![
            Category::new("a", TopFolder::Server, "a/b", "A"),
            Category::new("b", TopFolder::Client, "b", "B"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_missing_top_folder() {
        let result = CategoryRegistry::new(vec![Category::new("a", TopFolder::Server, "a", "A")]);
        assert!(result.is_err());
    }
}
