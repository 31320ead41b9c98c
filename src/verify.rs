use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{CharacterTable, asset_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAsset {
    pub id: String,
    pub name: String,
    pub expected_path: Utf8PathBuf,
    /// Set when the record has no id or name. Such records are listed whether or not
    /// a file exists at `expected_path`.
    pub anomaly: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub missing: Vec<MissingAsset>,
}

impl VerifyReport {
    pub fn is_synced(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AssetVerifier {
    image_dir: Utf8PathBuf,
}

impl AssetVerifier {
    pub fn new(image_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    pub fn image_dir(&self) -> &Utf8Path {
        &self.image_dir
    }

    pub fn verify(&self, table: &CharacterTable) -> VerifyReport {
        let mut missing = Vec::new();
        for record in &table.records {
            let id = record.asset_key();
            let name = record.name().trim();
            let expected_path = asset_path(&self.image_dir, id);
            // a file at the expected path cannot belong to a record without id or name
            let anomaly = id.is_empty() || name.is_empty();
            if anomaly {
                tracing::warn!(id, character = name, "record without id or name has no asset");
            } else if expected_path.as_std_path().is_file() {
                continue;
            } else {
                tracing::info!(id, character = name, path = %expected_path, "asset missing");
            }
            missing.push(MissingAsset {
                id: id.to_string(),
                name: name.to_string(),
                expected_path,
                anomaly,
            });
        }
        VerifyReport {
            checked: table.len(),
            missing,
        }
    }
}
