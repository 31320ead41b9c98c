use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CatalogError;

pub const ID_COLUMN: &str = "id";
pub const NAME_COLUMN: &str = "name";
pub const CATEGORY_COLUMN: &str = "category";
pub const IMAGE_PATH_COLUMN: &str = "image_path";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Students,
    Villains,
    Heroes,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Students,
        Category::Villains,
        Category::Heroes,
        Category::Other,
    ];

    /// Key used by the character API payload.
    pub fn key(self) -> &'static str {
        match self {
            Category::Students => "students",
            Category::Villains => "villains",
            Category::Heroes => "heroes",
            Category::Other => "other",
        }
    }

    /// Canonical spelling written to the store.
    pub fn label(self) -> &'static str {
        match self {
            Category::Students => "Students",
            Category::Villains => "Villains",
            Category::Heroes => "Heroes",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Category {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.key() == normalized)
            .ok_or_else(|| CatalogError::RecordInvalid {
                id: String::new(),
                reason: format!("unknown category '{}'", value.trim()),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRecord {
    id: String,
    name: String,
    category: String,
    image_path: String,
    fields: BTreeMap<String, String>,
}

impl CharacterRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        fields: BTreeMap<String, String>,
        image_dir: &Utf8Path,
    ) -> Self {
        let id = id.into();
        let image_path = image_path_for(image_dir, id.trim());
        Self {
            id,
            name: name.into(),
            category: category.into(),
            image_path,
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    /// The id as used for asset file names.
    pub fn asset_key(&self) -> &str {
        self.id.trim()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn value(&self, column: &str) -> &str {
        match column {
            ID_COLUMN => &self.id,
            NAME_COLUMN => &self.name,
            CATEGORY_COLUMN => &self.category,
            IMAGE_PATH_COLUMN => &self.image_path,
            other => self.fields.get(other).map(String::as_str).unwrap_or(""),
        }
    }

    pub fn category_kind(&self) -> Option<Category> {
        self.category.parse().ok()
    }

    /// Checks whether the record can take part in asset processing.
    pub fn asset_category(&self) -> Result<Category, CatalogError> {
        let invalid = |reason: String| CatalogError::RecordInvalid {
            id: self.id.clone(),
            reason,
        };
        let category = self
            .category_kind()
            .ok_or_else(|| invalid(format!("unknown category '{}'", self.category)))?;
        if self.asset_key().is_empty() || self.name.trim().is_empty() {
            return Err(invalid("missing id or name".to_string()));
        }
        validate_asset_id(self.asset_key()).map_err(invalid)?;
        Ok(category)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterTable {
    pub columns: Vec<String>,
    pub records: Vec<CharacterRecord>,
}

impl CharacterTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn asset_file_name(id: &str) -> String {
    format!("character_{id}.png")
}

pub fn asset_path(image_dir: &Utf8Path, id: &str) -> Utf8PathBuf {
    image_dir.join(asset_file_name(id))
}

pub fn image_path_for(image_dir: &Utf8Path, id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    asset_path(image_dir, id).to_string()
}

/// The id becomes part of a file name, so it must stay a single path component.
pub fn validate_asset_id(id: &str) -> Result<(), String> {
    if id == "." || id == ".." {
        return Err(format!("id '{id}' is not a valid file name component"));
    }
    if id
        .chars()
        .any(|ch| ch == '/' || ch == '\\' || ch.is_control())
    {
        return Err(format!("id '{}' contains path separators", id.escape_debug()));
    }
    Ok(())
}
