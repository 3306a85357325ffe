use crate::error::ExportError;
use crate::model::ColumnRecord;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Row in the JSON input vocabulary, so an export loads back unchanged.
#[derive(Serialize)]
struct ExportedColumn<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    shape: &'static str,
    level: &'a str,
    height: f64,
    material: &'a str,
}

pub fn export_json<'a, I, P>(records: I, path: P) -> Result<(), ExportError>
where
    I: IntoIterator<Item = &'a ColumnRecord>,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let rows: Vec<ExportedColumn<'a>> = records
        .into_iter()
        .map(|record| ExportedColumn {
            id: record.id(),
            name: record.name(),
            shape: record.shape().source_label(),
            level: record.level(),
            height: record.height(),
            material: record.material(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&rows)?;

    let mut file = File::create(path_ref).map_err(|source| ExportError::FileCreate {
        path: path_ref.to_path_buf(),
        source,
    })?;

    file.write_all(json.as_bytes())
        .map_err(|e| ExportError::WriteError {
            message: e.to_string(),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, Format};
    use pretty_assertions::assert_eq;

    #[test]
    fn export_reloads_to_same_records() {
        let payload = r#"[
            {"id":"C-1","name":"Колонна 300x300","type":"Прямоугольная","level":"Уровень 1","height":3500,"material":"Бетон B25"},
            {"id":"C-2","name":"Колонна Ø350","type":"round","height":"3.2 m"},
            {"id":"C-3","name":"HEB 300","type":"Двутавр","level":"Уровень 2","height":3000}
        ]"#;
        let original = parse(payload.as_bytes(), Format::Json).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("columns.json");

        export_json(&original.records, &path).unwrap();

        let reloaded = parse(&std::fs::read(&path).unwrap(), Format::Json).unwrap();
        assert_eq!(reloaded.records, original.records);
        assert!(reloaded.warnings.is_empty());
    }
}
