//! Append-only CSV price history.
//!
//! One row per successful extraction; prior rows are never mutated. Older
//! files written with fewer columns are rewritten once with the missing
//! columns defaulted to empty.

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Result;

pub const COLUMNS: [&str; 6] = ["timestamp", "name", "price", "url", "image", "oos"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub name: String,
    #[serde(with = "two_decimal")]
    pub price: f64,
    pub url: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, with = "oos_flag")]
    pub oos: bool,
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod two_decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(price: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{:.2}", price))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
        let s = String::deserialize(d)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

mod oos_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(oos: &bool, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(if *oos { "1" } else { "" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
        let s = String::deserialize(d)?;
        Ok(!s.is_empty() && s != "0")
    }
}

pub struct PriceStore {
    path: PathBuf,
}

impl PriceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PriceStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the log with its header, or rewrites an older narrower
    /// layout with missing columns defaulted to empty.
    pub fn ensure_schema(&self) -> Result<()> {
        if !self.path.exists() {
            let mut wtr = WriterBuilder::new().from_path(&self.path)?;
            wtr.write_record(COLUMNS)?;
            wtr.flush()?;
            return Ok(());
        }

        let mut rdr = ReaderBuilder::new().from_path(&self.path)?;
        let headers = rdr.headers()?.clone();
        if headers.iter().eq(COLUMNS) {
            return Ok(());
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row = COLUMNS
                .iter()
                .map(|col| {
                    headers
                        .iter()
                        .position(|h| h == *col)
                        .and_then(|i| record.get(i))
                        .unwrap_or("")
                        .to_string()
                })
                .collect();
            rows.push(row);
        }

        let mut wtr = WriterBuilder::new().from_path(&self.path)?;
        wtr.write_record(COLUMNS)?;
        for row in &rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        info!("migrated {} to the {}-column layout", self.path.display(), COLUMNS.len());
        Ok(())
    }

    pub fn append(&self, row: &PriceRow) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.serialize(row)?;
        wtr.flush()?;
        Ok(())
    }

    pub fn rows_for(&self, name: &str) -> Result<Vec<PriceRow>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.name == name)
            .collect())
    }

    pub fn last_price(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.rows_for(name)?.last().map(|r| r.price))
    }

    /// Most recent price at or before `cutoff` (inclusive boundary).
    pub fn price_at_or_before(&self, name: &str, cutoff: NaiveDateTime) -> Result<Option<f64>> {
        Ok(self
            .rows_for(name)?
            .into_iter()
            .filter(|r| r.timestamp <= cutoff)
            .next_back()
            .map(|r| r.price))
    }

    pub fn last_timestamp(&self, name: &str) -> Result<Option<NaiveDateTime>> {
        Ok(self.rows_for(name)?.last().map(|r| r.timestamp))
    }

    fn read_all(&self) -> Result<Vec<PriceRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = ReaderBuilder::new().from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in rdr.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn row(name: &str, when: NaiveDateTime, price: f64) -> PriceRow {
        PriceRow {
            timestamp: when,
            name: name.to_string(),
            price,
            url: "https://shop.example.com/p".to_string(),
            image: String::new(),
            oos: false,
        }
    }

    #[test]
    fn test_append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("log.csv"));
        store.ensure_schema().unwrap();

        let mut r = row("Widget - StoreA", ts(2026, 8, 1, 10), 349.0);
        r.image = "https://cdn.example.com/img.jpg".to_string();
        r.oos = true;
        store.append(&r).unwrap();

        let rows = store.rows_for("Widget - StoreA").unwrap();
        assert_eq!(rows, vec![r]);

        // Two-decimal formatting on disk.
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("349.00"));
        assert!(raw.starts_with("timestamp,name,price,url,image,oos\n"));
    }

    #[test]
    fn test_last_price_per_product() {
        let dir = tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("log.csv"));
        store.ensure_schema().unwrap();

        store.append(&row("A", ts(2026, 8, 1, 10), 100.0)).unwrap();
        store.append(&row("B", ts(2026, 8, 1, 11), 50.0)).unwrap();
        store.append(&row("A", ts(2026, 8, 2, 10), 90.0)).unwrap();

        assert_eq!(store.last_price("A").unwrap(), Some(90.0));
        assert_eq!(store.last_price("B").unwrap(), Some(50.0));
        assert_eq!(store.last_price("C").unwrap(), None);
    }

    #[test]
    fn test_price_at_or_before_inclusive_boundary() {
        let dir = tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("log.csv"));
        store.ensure_schema().unwrap();

        store.append(&row("A", ts(2026, 7, 30, 12), 100.0)).unwrap();
        store.append(&row("A", ts(2026, 8, 6, 12), 90.0)).unwrap();

        // A row exactly at the cutoff counts.
        let cutoff = ts(2026, 8, 6, 12);
        assert_eq!(store.price_at_or_before("A", cutoff).unwrap(), Some(90.0));

        // One second earlier and only the older row qualifies.
        let cutoff = ts(2026, 8, 6, 12) - chrono::Duration::seconds(1);
        assert_eq!(store.price_at_or_before("A", cutoff).unwrap(), Some(100.0));

        // Before everything.
        let cutoff = ts(2026, 7, 1, 0);
        assert_eq!(store.price_at_or_before("A", cutoff).unwrap(), None);
    }

    #[test]
    fn test_migration_from_narrower_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(
            &path,
            "timestamp,name,price,url\n2026-08-01 10:00:00,Widget - StoreA,399.00,https://shop.example.com/p\n",
        )
        .unwrap();

        let store = PriceStore::new(&path);
        store.ensure_schema().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("timestamp,name,price,url,image,oos\n"));

        let rows = store.rows_for("Widget - StoreA").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 399.0);
        assert_eq!(rows[0].image, "");
        assert!(!rows[0].oos);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("absent.csv"));
        assert_eq!(store.last_price("A").unwrap(), None);
        assert!(store.rows_for("A").unwrap().is_empty());
        assert_eq!(store.last_timestamp("A").unwrap(), None);
    }
}
