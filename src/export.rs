//! Summary exporter
//!
//! Packages derived fields plus provenance metadata into a persisted
//! artifact so presentation-layer consumers never recompute or even see
//! raw ensemble data. An artifact is a directory holding one Parquet file
//! per field table plus an `attrs.json` manifest; consumers key on field
//! names and attribute strings only. Year-range attributes use the
//! inclusive hyphenated form (`"2025-2034"`); that string is the wire
//! format, not a display nicety.
//!
//! Writing is deterministic given identical inputs, and a write/read
//! round trip is bit-exact for values and string-exact for attributes.

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Free-text provenance attributes recorded on every artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactAttrs {
    /// Inclusive year range of the "before" window, e.g. `"2025-2034"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_year_range: Option<String>,

    /// Inclusive year range of the "after" window, e.g. `"2035-2044"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_year_range: Option<String>,

    /// Thresholds (days/year) used for crossing fractions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Vec<f64>>,

    /// Shared symmetric value range for diverging-scale difference panels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symmetric_range: Option<f64>,

    /// Display ordering of realizations in example artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realization_order: Option<Vec<i64>>,
}

/// One named table of derived fields sharing a coordinate set.
#[derive(Debug, Clone)]
pub struct ArtifactTable {
    pub name: String,
    pub frame: DataFrame,
}

/// A derived summary dataset ready for persistence: named field tables
/// (axes a subset of realization/location/threshold) plus attributes.
#[derive(Debug, Clone)]
pub struct SummaryArtifact {
    pub name: String,
    pub attrs: ArtifactAttrs,
    pub tables: Vec<ArtifactTable>,
}

/// On-disk manifest: attributes plus the table list, so a reader can
/// discover the Parquet files without globbing.
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactManifest {
    attrs: ArtifactAttrs,
    tables: Vec<String>,
}

impl SummaryArtifact {
    /// Single-table artifact (the common case).
    pub fn single(name: impl Into<String>, attrs: ArtifactAttrs, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            attrs,
            tables: vec![ArtifactTable {
                name: "fields".to_string(),
                frame,
            }],
        }
    }

    pub fn table(&self, name: &str) -> Option<&DataFrame> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.frame)
    }

    /// The single-table frame, for artifacts built with [`Self::single`].
    pub fn fields(&self) -> Result<&DataFrame> {
        self.table("fields")
            .with_context(|| format!("artifact '{}' has no 'fields' table", self.name))
    }

    /// Persist under `dir/<artifact name>/`: one Parquet file per table
    /// plus `attrs.json`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        if self.tables.is_empty() {
            bail!("artifact '{}' has no tables to write", self.name);
        }
        let artifact_dir = dir.join(&self.name);
        fs::create_dir_all(&artifact_dir)
            .with_context(|| format!("Failed to create artifact dir {:?}", artifact_dir))?;

        for table in &self.tables {
            let path = artifact_dir.join(format!("{}.parquet", table.name));
            let file = fs::File::create(&path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(&mut table.frame.clone())
                .with_context(|| format!("Failed to write {:?}", path))?;
        }

        let manifest = ArtifactManifest {
            attrs: self.attrs.clone(),
            tables: self.tables.iter().map(|t| t.name.clone()).collect(),
        };
        let manifest_path = artifact_dir.join("attrs.json");
        let json = serde_json::to_string_pretty(&manifest)
            .with_context(|| format!("Failed to serialize attrs for '{}'", self.name))?;
        fs::write(&manifest_path, json)
            .with_context(|| format!("Failed to write {:?}", manifest_path))?;

        Ok(artifact_dir)
    }

    /// Read an artifact previously written with [`Self::write`].
    pub fn read(dir: &Path, name: &str) -> Result<Self> {
        let artifact_dir = dir.join(name);
        let manifest_path = artifact_dir.join("attrs.json");
        let json = fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {:?}", manifest_path))?;
        let manifest: ArtifactManifest = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {:?}", manifest_path))?;

        let mut tables = Vec::with_capacity(manifest.tables.len());
        for table_name in &manifest.tables {
            let path = artifact_dir.join(format!("{}.parquet", table_name));
            let file = fs::File::open(&path)
                .with_context(|| format!("Failed to open {:?}", path))?;
            let frame = ParquetReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read {:?}", path))?;
            tables.push(ArtifactTable {
                name: table_name.clone(),
                frame,
            });
        }

        Ok(Self {
            name: name.to_string(),
            attrs: manifest.attrs,
            tables,
        })
    }
}

/// Inclusive hyphenated year-range string (`"2025-2034"` for 2025..=2034).
pub fn year_range_attr(years: &[i32]) -> Result<String> {
    match (years.iter().min(), years.iter().max()) {
        (Some(first), Some(last)) => Ok(format!("{}-{}", first, last)),
        _ => bail!("cannot format an empty year range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range_attr_inclusive_form() {
        let years: Vec<i32> = (2025..2035).collect();
        assert_eq!(year_range_attr(&years).unwrap(), "2025-2034");
        assert_eq!(year_range_attr(&[2040]).unwrap(), "2040-2040");
        assert!(year_range_attr(&[]).is_err());
    }

    #[test]
    fn test_write_read_round_trip_is_exact() {
        let frame = df![
            "location" => &["Miami", "Lagos"],
            "before" => &[10.0, 200.125],
            "without_intervention_minus_before" => &[2.0, -0.0625],
        ]
        .unwrap();
        let attrs = ArtifactAttrs {
            before_year_range: Some("2025-2034".to_string()),
            after_year_range: Some("2035-2044".to_string()),
            thresholds: Some(vec![1.0, 15.0, 30.0]),
            symmetric_range: Some(2.0),
            realization_order: None,
        };
        let artifact = SummaryArtifact::single("mean_summary", attrs.clone(), frame.clone());

        let dir = tempfile::tempdir().unwrap();
        artifact.write(dir.path()).unwrap();
        let restored = SummaryArtifact::read(dir.path(), "mean_summary").unwrap();

        assert_eq!(restored.attrs, attrs);
        assert_eq!(
            restored.attrs.before_year_range.as_deref(),
            Some("2025-2034")
        );
        assert!(restored.fields().unwrap().equals(&frame));
    }

    #[test]
    fn test_multi_table_round_trip() {
        let before = df!["year" => &[2025i32], "before" => &[1.5]].unwrap();
        let after = df!["year" => &[2035i32], "after" => &[3.5]].unwrap();
        let artifact = SummaryArtifact {
            name: "location_series".to_string(),
            attrs: ArtifactAttrs::default(),
            tables: vec![
                ArtifactTable {
                    name: "before".to_string(),
                    frame: before.clone(),
                },
                ArtifactTable {
                    name: "after".to_string(),
                    frame: after.clone(),
                },
            ],
        };

        let dir = tempfile::tempdir().unwrap();
        artifact.write(dir.path()).unwrap();
        let restored = SummaryArtifact::read(dir.path(), "location_series").unwrap();
        assert!(restored.table("before").unwrap().equals(&before));
        assert!(restored.table("after").unwrap().equals(&after));
    }

    #[test]
    fn test_write_is_deterministic() {
        let frame = df!["x" => &[1.0, 2.0]].unwrap();
        let artifact =
            SummaryArtifact::single("repeat", ArtifactAttrs::default(), frame);

        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        artifact.write(dir_a.path()).unwrap();
        artifact.write(dir_b.path()).unwrap();

        let bytes_a = fs::read(dir_a.path().join("repeat/fields.parquet")).unwrap();
        let bytes_b = fs::read(dir_b.path().join("repeat/fields.parquet")).unwrap();
        assert_eq!(bytes_a, bytes_b);
    }
}
