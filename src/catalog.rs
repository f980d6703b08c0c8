use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub type ItemId = i64;

pub const ALL_LABEL: &str = "All";

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog: duplicate item id {0}")]
    DuplicateId(ItemId),
    #[error("catalog: no items found in {0}")]
    Empty(PathBuf),
    #[error("catalog: item {0} is not in the current view")]
    UnknownItem(ItemId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: ItemId,
    #[serde(rename = "src")]
    pub source: String,
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "Uncategorized".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[default]
    All,
    Named(String),
}

impl Category {
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label.eq_ignore_ascii_case(ALL_LABEL) {
            Category::All
        } else {
            Category::Named(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Category::All => ALL_LABEL,
            Category::Named(name) => name,
        }
    }

    pub fn matches(&self, item: &MediaItem) -> bool {
        match self {
            Category::All => true,
            Category::Named(name) => item.category == *name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Catalog order.
    #[default]
    Recent,
    /// Descending like count; ties keep catalog order.
    Popular,
}

impl SortMode {
    pub fn label(self) -> &'static str {
        match self {
            SortMode::Recent => "Recent",
            SortMode::Popular => "Popular",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortMode::Recent => SortMode::Popular,
            SortMode::Popular => SortMode::Recent,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Arc<Vec<MediaItem>>,
}

impl Catalog {
    pub fn new(items: Vec<MediaItem>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.id) {
                return Err(CatalogError::DuplicateId(item.id));
            }
        }
        Ok(Self {
            items: Arc::new(items),
        })
    }

    /// Loads a YAML manifest, or scans a directory tree when `path` is a directory.
    pub fn load(path: &Path) -> Result<Self> {
        let items = if path.is_dir() {
            scan_directory(path)?
        } else {
            read_manifest(path)?
        };
        if items.is_empty() {
            return Err(CatalogError::Empty(path.to_path_buf()).into());
        }
        Ok(Self::new(items)?)
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&MediaItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// `All` followed by each distinct category in first-appearance order.
    pub fn categories(&self) -> Vec<Category> {
        let mut seen = HashSet::new();
        let mut categories = vec![Category::All];
        for item in self.items.iter() {
            if seen.insert(item.category.as_str()) {
                categories.push(Category::Named(item.category.clone()));
            }
        }
        categories
    }

    pub fn view(
        &self,
        category: &Category,
        sort: SortMode,
        likes: &HashMap<ItemId, u64>,
    ) -> CatalogView {
        let filtered = filter(&self.items, category);
        let order = sort_indices(&self.items, filtered, sort, likes);
        CatalogView {
            items: Arc::clone(&self.items),
            order,
        }
    }
}

/// Indices of the items matching `category`, in catalog order.
pub fn filter(items: &[MediaItem], category: &Category) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| category.matches(item))
        .map(|(idx, _)| idx)
        .collect()
}

pub fn sort_indices(
    items: &[MediaItem],
    mut indices: Vec<usize>,
    sort: SortMode,
    likes: &HashMap<ItemId, u64>,
) -> Vec<usize> {
    if sort == SortMode::Popular {
        // sort_by_key is stable, equal counts stay in catalog order
        indices.sort_by_key(|idx| Reverse(likes.get(&items[*idx].id).copied().unwrap_or(0)));
    }
    indices
}

/// Derived, ordered projection of the catalog. Recomputed from its inputs, never mutated.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    items: Arc<Vec<MediaItem>>,
    order: Vec<usize>,
}

impl CatalogView {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.order.get(index).map(|idx| &self.items[*idx])
    }

    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.order.iter().position(|idx| self.items[*idx].id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> + '_ {
        self.order.iter().map(move |idx| &self.items[*idx])
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.iter().map(|item| item.id).collect()
    }
}

fn read_manifest(path: &Path) -> Result<Vec<MediaItem>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("catalog: read manifest {}", path.display()))?;
    let mut items: Vec<MediaItem> = serde_yaml::from_str(&data)
        .with_context(|| format!("catalog: parse manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for item in &mut items {
        item.source = resolve_source(base, &item.source);
    }
    Ok(items)
}

fn resolve_source(base: &Path, source: &str) -> String {
    if source.contains("://") || Path::new(source).is_absolute() {
        return source.to_string();
    }
    base.join(source).display().to_string()
}

fn scan_directory(root: &Path) -> Result<Vec<MediaItem>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("catalog: scan {}", root.display()))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    let items = paths
        .into_iter()
        .enumerate()
        .map(|(idx, path)| {
            let category = path
                .parent()
                .filter(|parent| *parent != root)
                .and_then(|parent| parent.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(default_category);
            let title = path
                .file_stem()
                .map(|stem| humanize(&stem.to_string_lossy()))
                .unwrap_or_default();
            MediaItem {
                id: idx as ItemId + 1,
                source: path.display().to_string(),
                title,
                category,
            }
        })
        .collect();
    Ok(items)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn humanize(stem: &str) -> String {
    stem.split(|ch: char| ch == '_' || ch == '-' || ch.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
