use crate::error::ExportError;
use crate::model::ColumnRecord;
use std::fs::File;
use std::path::Path;

/// Writes one row per record, heights in millimetres.
pub fn export_csv<'a, I, P>(records: I, path: P) -> Result<(), ExportError>
where
    I: IntoIterator<Item = &'a ColumnRecord>,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let file = File::create(path_ref).map_err(|source| ExportError::FileCreate {
        path: path_ref.to_path_buf(),
        source,
    })?;

    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(["ID", "Name", "Type", "Level", "Height (mm)", "Material"])?;

    for record in records {
        let height = record.height().to_string();
        writer.write_record([
            record.id(),
            record.name(),
            record.shape().source_label(),
            record.level(),
            height.as_str(),
            record.material(),
        ])?;
    }

    writer.flush().map_err(|e| ExportError::WriteError {
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
    fn writes_header_and_rows() {
        let outcome = parse(
            r#"[{"id":"C-1","name":"Колонна, 300x300","type":"Прямоугольная","level":"Уровень 1","height":3500,"material":"Бетон B25"}]"#.as_bytes(),
            Format::Json,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("columns.csv");

        export_csv(&outcome.records, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "ID,Name,Type,Level,Height (mm),Material\n\
             C-1,\"Колонна, 300x300\",Прямоугольная,Уровень 1,3500,Бетон B25\n"
        );
    }
}
