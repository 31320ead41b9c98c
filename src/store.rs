use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{
    CATEGORY_COLUMN, CharacterRecord, CharacterTable, ID_COLUMN, IMAGE_PATH_COLUMN, NAME_COLUMN,
};
use crate::error::CatalogError;
use crate::fs_util::write_bytes_atomic;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Flat CSV file holding the latest ingested character set.
///
/// Every cell is text: ids such as `007` survive a write/read cycle unchanged.
/// `image_path` is recomputed from `id` on read rather than trusted from disk.
#[derive(Debug, Clone)]
pub struct CanonicalStore {
    image_dir: Utf8PathBuf,
}

impl CanonicalStore {
    pub fn new(image_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    pub fn write(&self, table: &CharacterTable, path: &Utf8Path) -> Result<(), CatalogError> {
        let content = serialize(table)?;
        write_bytes_atomic(path, &content)?;
        tracing::info!(path = %path, records = table.len(), "canonical store written");
        Ok(())
    }

    pub fn read(&self, path: &Utf8Path) -> Result<CharacterTable, CatalogError> {
        let content = fs::read(path.as_std_path()).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CatalogError::StoreNotFound(path.to_path_buf()),
            _ => CatalogError::Filesystem(format!("read {path}: {err}")),
        })?;
        self.parse(&content)
    }

    pub fn parse(&self, content: &[u8]) -> Result<CharacterTable, CatalogError> {
        let content = content.strip_prefix(BOM).unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content);

        let columns: Vec<String> = reader
            .headers()
            .map_err(store_parse)?
            .iter()
            .map(String::from)
            .collect();
        if columns.iter().all(String::is_empty) {
            return Err(CatalogError::StoreParse("missing header row".to_string()));
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(store_parse)?;
            let mut id = String::new();
            let mut name = String::new();
            let mut category = String::new();
            let mut fields = BTreeMap::new();
            for (column, value) in columns.iter().zip(row.iter()) {
                match column.as_str() {
                    ID_COLUMN => id = value.to_string(),
                    NAME_COLUMN => name = value.to_string(),
                    CATEGORY_COLUMN => category = value.to_string(),
                    IMAGE_PATH_COLUMN => {}
                    other => {
                        fields.insert(other.to_string(), value.to_string());
                    }
                }
            }
            records.push(CharacterRecord::new(
                id,
                name,
                category,
                fields,
                &self.image_dir,
            ));
        }

        Ok(CharacterTable { columns, records })
    }
}

pub fn serialize(table: &CharacterTable) -> Result<Vec<u8>, CatalogError> {
    let mut buffer = BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buffer);
        writer.write_record(&table.columns).map_err(store_write)?;
        for record in &table.records {
            writer
                .write_record(table.columns.iter().map(|column| record.value(column)))
                .map_err(store_write)?;
        }
        writer.flush().map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    }
    Ok(buffer)
}

fn store_parse(err: csv::Error) -> CatalogError {
    CatalogError::StoreParse(err.to_string())
}

fn store_write(err: csv::Error) -> CatalogError {
    CatalogError::Filesystem(format!("serialize store: {err}"))
}
