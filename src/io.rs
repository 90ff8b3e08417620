//! Input artifact loading
//!
//! Reads persisted simulation output: a directory of per-realization,
//! per-year Parquet chunk files, each exposing at minimum `time`,
//! `realization`, spatial axes, `portion_suitable` and a `member_id`
//! label per realization. Chunks are scanned lazily as one glob and
//! materialized once; required columns are validated up front so a
//! malformed directory fails with `MissingField` naming the dataset,
//! never as an empty frame.

use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::dataset::{
    EnsembleDataset, NamedLocation, COL_LAT, COL_LOCATION, COL_LON, COL_REALIZATION, COL_TIME,
    COL_YEAR, FIELD_SUITABILITY,
};
use crate::error::EngineError;
use crate::utils::materialize_with_columns;
use crate::utils::time::year_of_epoch_day;

const COL_MEMBER_ID: &str = "member_id";

/// Load an ensemble dataset from a directory of Parquet chunks.
pub fn load_ensemble(dir: &Path, name: &str) -> Result<EnsembleDataset> {
    println!("Loading ensemble '{}' from {:?}...", name, dir);

    let glob = dir.join("*.parquet");
    let lazy = LazyFrame::scan_parquet(&glob, Default::default())
        .with_context(|| format!("Failed to scan parquet chunks in {:?}", dir))?;
    let frame = lazy
        .collect()
        .with_context(|| format!("Failed to materialize ensemble '{}'", name))?;

    let frame = prepare_frame(frame, name)?;
    let (frame, member_ids) = split_member_ids(frame, name)?;

    let dataset = EnsembleDataset::new(name, frame, member_ids)?;
    println!(
        "  {}: {} realizations x {} timestamps x {} locations",
        name,
        dataset.realizations()?.len(),
        dataset.times()?.len(),
        dataset.n_locations()?
    );
    Ok(dataset)
}

/// Validate required columns, normalize the time dtype and derive `year`.
fn prepare_frame(frame: DataFrame, name: &str) -> Result<DataFrame> {
    for required in [COL_TIME, COL_REALIZATION, FIELD_SUITABILITY, COL_MEMBER_ID] {
        if frame.column(required).is_err() {
            return Err(EngineError::missing_field(name, required).into());
        }
    }
    let has_grid = frame.column(COL_LAT).is_ok() && frame.column(COL_LON).is_ok();
    if !has_grid && frame.column(COL_LOCATION).is_err() {
        return Err(EngineError::missing_field(name, "lat/lon or location").into());
    }

    // Project to exactly the engine columns; chunk files may carry extras
    let mut columns = vec![COL_TIME, COL_REALIZATION];
    if has_grid {
        columns.extend([COL_LAT, COL_LON]);
    } else {
        columns.push(COL_LOCATION);
    }
    columns.extend([FIELD_SUITABILITY, COL_MEMBER_ID]);

    // Chunk files may store time as Date (days since epoch, Int32) or Int64
    let frame = materialize_with_columns(&frame.lazy(), &columns, name)?
        .lazy()
        .with_column(col(COL_TIME).cast(DataType::Int64).alias(COL_TIME))
        .with_column(col(COL_REALIZATION).cast(DataType::Int64).alias(COL_REALIZATION))
        .collect()
        .with_context(|| format!("{}: normalizing axis dtypes", name))?;

    // Derive the calendar-year coordinate used for window selection
    let times = frame.column(COL_TIME)?.i64()?;
    let years: Vec<i32> = times
        .into_iter()
        .map(|opt| opt.map(year_of_epoch_day).unwrap_or(0))
        .collect();
    let mut frame = frame;
    frame.with_column(Series::new(COL_YEAR.into(), years))?;
    Ok(frame)
}

/// Pull the `member_id` coordinate off into the side map; labels are
/// display/provenance only and must never ride along through reductions.
fn split_member_ids(mut frame: DataFrame, name: &str) -> Result<(DataFrame, FxHashMap<i64, String>)> {
    let mut member_ids = FxHashMap::default();
    {
        let realizations = frame
            .column(COL_REALIZATION)
            .with_context(|| format!("{}: realization column", name))?
            .i64()?;
        let labels = frame
            .column(COL_MEMBER_ID)
            .with_context(|| format!("{}: member_id column", name))?
            .str()?;
        for idx in 0..frame.height() {
            if let (Some(r), Some(label)) = (realizations.get(idx), labels.get(idx)) {
                member_ids.insert(r, label.to_string());
            }
        }
    }

    frame.drop_in_place(COL_MEMBER_ID)?;
    Ok((frame, member_ids))
}

/// Load a named-location list from CSV (`location`, `lat`, `lon` columns).
pub fn load_location_list(path: &Path) -> Result<Vec<NamedLocation>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load location list: {:?}", path))?;

    let names = df
        .column(COL_LOCATION)
        .with_context(|| format!("{:?}: missing 'location' column", path))?
        .str()?
        .clone();
    let lats = df
        .column(COL_LAT)
        .with_context(|| format!("{:?}: missing 'lat' column", path))?
        .f64()?
        .clone();
    let lons = df
        .column(COL_LON)
        .with_context(|| format!("{:?}: missing 'lon' column", path))?
        .f64()?
        .clone();

    let mut locations = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        if let (Some(name), Some(lat), Some(lon)) = (names.get(idx), lats.get(idx), lons.get(idx)) {
            locations.push(NamedLocation {
                name: name.to_string(),
                lat,
                lon,
            });
        }
    }
    Ok(locations)
}
