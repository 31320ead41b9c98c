use std::collections::{BTreeMap, BTreeSet, HashSet};

use camino::Utf8PathBuf;
use serde_json::{Map, Value};

use crate::domain::{
    CATEGORY_COLUMN, Category, CharacterRecord, CharacterTable, ID_COLUMN, IMAGE_PATH_COLUMN,
    NAME_COLUMN,
};
use crate::error::CatalogError;

pub const PREFERRED_COLUMNS: [&str; 16] = [
    "id",
    "name",
    "category",
    "name_japanese",
    "hero_name",
    "hero_name_japanese",
    "other_names",
    "quirk",
    "quirk_japanese",
    "quirk_description",
    "hero_school",
    "class",
    "affiliation",
    "civilian_description",
    "type",
    "image_path",
];

#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: CharacterTable,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    image_dir: Utf8PathBuf,
}

impl RecordNormalizer {
    pub fn new(image_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    pub fn normalize(&self, payload: &Value) -> Result<Normalized, CatalogError> {
        let object = payload.as_object().ok_or_else(|| {
            CatalogError::Parse(format!(
                "expected a JSON object keyed by category, got {}",
                json_kind(payload)
            ))
        })?;

        let mut warnings = Vec::new();
        let mut entries: Vec<(Category, &Map<String, Value>)> = Vec::new();

        for key in object.keys() {
            if key.parse::<Category>().is_err() {
                report(
                    &mut warnings,
                    format!("ignoring unrecognized category key '{key}'"),
                );
            }
        }

        for category in Category::ALL {
            let mut found = false;
            for (key, value) in object {
                if key.parse::<Category>().ok() != Some(category) {
                    continue;
                }
                found = true;
                let Some(items) = value.as_array() else {
                    report(
                        &mut warnings,
                        format!(
                            "expected a list for category '{key}', got {}",
                            json_kind(value)
                        ),
                    );
                    continue;
                };
                for (position, item) in items.iter().enumerate() {
                    match item.as_object() {
                        Some(entry) => entries.push((category, entry)),
                        None => report(
                            &mut warnings,
                            format!(
                                "expected an object in '{key}' at position {position}, got {}: {item}",
                                json_kind(item)
                            ),
                        ),
                    }
                }
            }
            if !found {
                report(
                    &mut warnings,
                    format!("category '{}' not found in payload", category.key()),
                );
            }
        }

        let mut keys = BTreeSet::from([CATEGORY_COLUMN.to_string(), IMAGE_PATH_COLUMN.to_string()]);
        for (_, entry) in &entries {
            keys.extend(entry.keys().cloned());
        }
        let columns = order_columns(&keys);

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(entries.len());
        for (index, (category, entry)) in entries.into_iter().enumerate() {
            let id = entry.get(ID_COLUMN).map(cell_text).unwrap_or_default();
            let name = entry.get(NAME_COLUMN).map(cell_text).unwrap_or_default();
            if id.trim().is_empty() {
                report(
                    &mut warnings,
                    format!("character at index {} is missing 'id'", index + 1),
                );
            } else if !seen.insert(id.trim().to_string()) {
                report(
                    &mut warnings,
                    format!("duplicate id '{id}' for character '{name}'"),
                );
            }

            let fields: BTreeMap<String, String> = entry
                .iter()
                .filter(|(key, _)| {
                    !matches!(
                        key.as_str(),
                        ID_COLUMN | NAME_COLUMN | CATEGORY_COLUMN | IMAGE_PATH_COLUMN
                    )
                })
                .map(|(key, value)| (key.clone(), cell_text(value)))
                .collect();

            records.push(CharacterRecord::new(
                id,
                name,
                category.label(),
                fields,
                &self.image_dir,
            ));
        }

        tracing::info!(records = records.len(), "normalized character payload");
        Ok(Normalized {
            table: CharacterTable { columns, records },
            warnings,
        })
    }
}

pub fn order_columns(keys: &BTreeSet<String>) -> Vec<String> {
    let mut columns: Vec<String> = PREFERRED_COLUMNS
        .iter()
        .filter(|column| keys.contains(**column))
        .map(|column| column.to_string())
        .collect();
    columns.extend(
        keys.iter()
            .filter(|key| !PREFERRED_COLUMNS.contains(&key.as_str()))
            .cloned(),
    );
    columns
}

/// Flattens a loosely typed JSON value into the text stored in a cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn report(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{message}");
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cell_text_keeps_strings_verbatim() {
        assert_eq!(cell_text(&json!("007")), "007");
        assert_eq!(cell_text(&json!(7)), "7");
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn preferred_columns_come_first() {
        let keys = BTreeSet::from(
            ["zeta", "quirk", "id", "alpha", "image_path", "name"].map(String::from),
        );
        assert_eq!(
            order_columns(&keys),
            vec!["id", "name", "quirk", "image_path", "alpha", "zeta"]
        );
    }
}
