use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

use super::{RawRecord, SourceClient};

/// Lab-awards CSV client. The source file is a newest-mtime glob match
/// under a directory (the award system exports a fresh, timestamped file
/// per run and leaves old ones in place); values are tolerant of blank
/// cells and currency formatting (`"$1,234.56"`, `""`).
pub struct CsvAwardsClient {
    dir: PathBuf,
    file_prefix: &'static str,
}

impl CsvAwardsClient {
    pub fn new(dir: impl Into<PathBuf>, file_prefix: &'static str) -> Self {
        Self {
            dir: dir.into(),
            file_prefix,
        }
    }

    fn newest_matching_file(&self) -> AppResult<PathBuf> {
        let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_match = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(self.file_prefix) && n.ends_with(".csv"))
                .unwrap_or(false);
            if !is_match {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if best.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                best = Some((modified, path));
            }
        }
        best.map(|(_, path)| path).ok_or_else(|| {
            AppError::Message(format!(
                "no CSV file matching prefix '{}' found in {}",
                self.file_prefix,
                self.dir.display()
            ))
        })
    }

    /// Blank, whitespace-only, and currency-formatted cells all parse to a
    /// plain JSON value; everything else passes through as a trimmed
    /// string. Downstream projectors do their own type coercion.
    fn cell_to_value(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Some(numeric) = strip_currency_formatting(trimmed) {
            if let Ok(n) = numeric.parse::<f64>() {
                if let Some(number) = serde_json::Number::from_f64(n) {
                    return Value::Number(number);
                }
            }
        }
        Value::String(trimmed.to_string())
    }

    fn row_to_record(headers: &[String], row: &csv::StringRecord) -> AppResult<RawRecord> {
        let mut map = Map::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            map.insert(header.clone(), Self::cell_to_value(cell));
        }

        // Composite external_id: AwardID-PersonUniqname-PersonApptDeptID.
        let award_id = row_field(&map, "AwardID")?;
        let uniqname = row_field(&map, "PersonUniqname")?;
        let dept_id = row_field(&map, "PersonApptDeptID")?;
        let external_id = format!("{award_id}-{uniqname}-{dept_id}");

        Ok(RawRecord {
            external_id,
            modified_at: None,
            data: Value::Object(map),
        })
    }
}

fn row_field(map: &Map<String, Value>, field: &str) -> AppResult<String> {
    map.get(field)
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| AppError::Projection(format!("lab award row missing {field}")))
}

fn strip_currency_formatting(value: &str) -> Option<String> {
    if !value.starts_with('$') && !value.contains(',') {
        return None;
    }
    let stripped: String = value.chars().filter(|c| *c != '$' && *c != ',').collect();
    Some(stripped)
}

#[async_trait]
impl SourceClient for CsvAwardsClient {
    async fn fetch_candidates(
        &self,
        _since: Option<DateTime<Utc>>,
        _full_sync: bool,
    ) -> AppResult<Vec<RawRecord>> {
        let path = self.newest_matching_file()?;
        read_csv_file(&path)
    }
}

fn read_csv_file(path: &Path) -> AppResult<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut out = Vec::new();
    for result in reader.records() {
        let row = result?;
        out.push(CsvAwardsClient::row_to_record(&headers, &row)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_cells_parse_to_numbers() {
        assert_eq!(
            CsvAwardsClient::cell_to_value("$1,234.56"),
            Value::Number(serde_json::Number::from_f64(1234.56).unwrap())
        );
    }

    #[test]
    fn blank_cells_become_null() {
        assert_eq!(CsvAwardsClient::cell_to_value("   "), Value::Null);
        assert_eq!(CsvAwardsClient::cell_to_value(""), Value::Null);
    }

    #[test]
    fn plain_text_cells_pass_through_trimmed() {
        assert_eq!(
            CsvAwardsClient::cell_to_value("  Chemistry  "),
            Value::String("Chemistry".to_string())
        );
    }

    #[test]
    fn newest_file_wins_among_prefix_matches() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("lab_awards_2024-01-01.csv");
        let newer = dir.path().join("lab_awards_2024-06-01.csv");
        fs::write(&older, "AwardID,PersonUniqname,PersonApptDeptID\n1,abc,100\n").unwrap();
        fs::write(&newer, "AwardID,PersonUniqname,PersonApptDeptID\n2,xyz,200\n").unwrap();

        let now = std::time::SystemTime::now();
        filetime_set(&older, now - std::time::Duration::from_secs(120));
        filetime_set(&newer, now);

        let client = CsvAwardsClient::new(dir.path(), "lab_awards_");
        let picked = client.newest_matching_file().unwrap();
        assert_eq!(picked, newer);
    }

    fn filetime_set(path: &Path, time: std::time::SystemTime) {
        let file = fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn composite_external_id_joins_three_fields() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lab_awards_only.csv");
        fs::write(
            &file,
            "AwardID,PersonUniqname,PersonApptDeptID,Amount\n42,jdoe,7001,$500.00\n",
        )
        .unwrap();

        let records = read_csv_file(&file).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_id, "42-jdoe-7001");
    }
}
