//! CSV export of end-of-day tables

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregation::session::SessionExporter;
use crate::types::{DailyRow, MinuteRow};

pub const MINUTE_FILE: &str = "minute.csv";
pub const DAILY_FILE: &str = "daily.csv";

const MINUTE_HEADER: [&str; 7] = ["time", "symbol", "open", "high", "low", "close", "volume"];
const DAILY_HEADER: [&str; 7] = ["date", "symbol", "open", "high", "low", "close", "volume"];

/// Writes `minute.csv` and `daily.csv` into a directory, replacing any
/// previous file
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The header is written up front so an empty table still has one
    fn write_rows<T: Serialize>(&self, file_name: &str, header: &[&str], rows: &[T]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create export dir: {:?}", self.dir))?;
        let path = self.dir.join(file_name);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .with_context(|| format!("Failed to open export file: {:?}", path))?;
        writer
            .write_record(header)
            .with_context(|| format!("Failed to write header to {:?}", path))?;
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to write row to {:?}", path))?;
        }
        writer.flush()?;
        info!("Wrote {} rows to {:?}", rows.len(), path);
        Ok(())
    }
}

impl SessionExporter for CsvExporter {
    fn export_minute(&mut self, rows: &[MinuteRow]) -> Result<()> {
        self.write_rows(MINUTE_FILE, &MINUTE_HEADER, rows)
    }

    fn export_daily(&mut self, rows: &[DailyRow]) -> Result<()> {
        self.write_rows(DAILY_FILE, &DAILY_HEADER, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    #[test]
    fn test_writes_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CsvExporter::new(dir.path().join("data"));

        let minute = vec![MinuteRow {
            time: DateTime::from_timestamp(60, 0).unwrap(),
            symbol: "AAA".to_string(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        }];
        let daily = vec![DailyRow {
            date: NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
            symbol: "AAA".to_string(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        }];
        exporter.export_minute(&minute).unwrap();
        exporter.export_daily(&daily).unwrap();

        let minute_csv = std::fs::read_to_string(exporter.dir().join(MINUTE_FILE)).unwrap();
        let mut lines = minute_csv.lines();
        assert_eq!(lines.next(), Some("time,symbol,open,high,low,close,volume"));
        assert!(lines.next().unwrap().contains(",AAA,1.0,2.0,0.5,1.5,10.0"));

        let mut reader = csv::Reader::from_path(exporter.dir().join(DAILY_FILE)).unwrap();
        let rows: Vec<DailyRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, daily);
    }

    #[test]
    fn test_empty_table_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CsvExporter::new(dir.path());
        exporter.export_minute(&[]).unwrap();
        exporter.export_daily(&[]).unwrap();

        let minute = std::fs::read_to_string(dir.path().join(MINUTE_FILE)).unwrap();
        assert_eq!(minute, "time,symbol,open,high,low,close,volume\n");
        let daily = std::fs::read_to_string(dir.path().join(DAILY_FILE)).unwrap();
        assert_eq!(daily, "date,symbol,open,high,low,close,volume\n");

        let mut reader = csv::Reader::from_path(dir.path().join(DAILY_FILE)).unwrap();
        assert_eq!(reader.deserialize::<DailyRow>().count(), 0);
    }
}
