// src/raster/mod.rs
//
// GMGSI raster feed: product identifiers, per-file frames, and the daily
// concatenation into one time-indexed gridded dataset.

pub mod decode;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{ArrayRef, FixedSizeListArray, Float32Array, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::instrument;

use crate::error::{Error, Result};

/// CONUS MRMS bounds (W, E, S, N), the rectangle the feature feed covers.
pub const MRMS_BOUNDS: (f64, f64, f64, f64) = (-130.0, -60.0, 20.0, 55.0);

/// A GMGSI product variant. Each maps to exactly one remote path prefix and
/// one on-disk store subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    LongWave,
    ShortWave,
    WaterVapor,
    Visible,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::LongWave,
        Product::ShortWave,
        Product::WaterVapor,
        Product::Visible,
    ];

    /// Path prefix inside the GMGSI bucket, also the canonical name of the
    /// data variable after the transform.
    pub fn remote_prefix(&self) -> &'static str {
        match self {
            Product::LongWave => "GMGSI_LW",
            Product::ShortWave => "GMGSI_SW",
            Product::WaterVapor => "GMGSI_WV",
            Product::Visible => "GMGSI_VIS",
        }
    }

    /// Store subdirectory. Products are nested inside the store root because
    /// their time axes conflict.
    pub fn store_dir(&self) -> &'static str {
        match self {
            Product::LongWave => "LONGWAVE",
            Product::ShortWave => "SHORTWAVE",
            Product::WaterVapor => "WATERVAPOR",
            Product::Visible => "VISIBLE",
        }
    }
}

impl FromStr for Product {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Product::ALL
            .into_iter()
            .find(|p| p.remote_prefix() == s)
            .ok_or_else(|| Error::InvalidConfiguration(format!("unknown product `{s}`")))
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_prefix())
    }
}

/// One fetched payload: a numeric grid plus its coordinate arrays and the
/// acquisition timestamp parsed from the source file name.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    pub time: DateTime<Utc>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Row-major ny x nx grid values.
    pub values: Vec<f32>,
}

/// One day's frames concatenated along time, with lat/lon reduced to the
/// single shared coordinate vector each.
#[derive(Debug, Clone)]
pub struct RasterDataset {
    pub product: Product,
    pub times: Vec<DateTime<Utc>>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Time-major nt x ny x nx values.
    pub values: Vec<f32>,
}

/// Concatenate a day's frames along a new time axis, in the order the
/// catalog yielded them (chronological by construction). The combined lat
/// and lon arrays reduce to their unique sorted values: all frames share an
/// identical grid, so the reduction recovers the shared coordinate vector.
#[instrument(level = "info", skip(frames))]
pub fn transform<I>(frames: I, product: Product) -> Result<RasterDataset>
where
    I: IntoIterator<Item = RasterFrame>,
{
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut lat: Vec<f64> = Vec::new();
    let mut lon: Vec<f64> = Vec::new();
    let mut values: Vec<f32> = Vec::new();
    let mut cells: Option<usize> = None;

    for frame in frames {
        if let Some(&last) = times.last() {
            if frame.time <= last {
                return Err(Error::Parse(format!(
                    "frame at {} breaks the strictly increasing time axis",
                    frame.time
                )));
            }
        }
        match cells {
            None => cells = Some(frame.values.len()),
            Some(n) if n != frame.values.len() => {
                return Err(Error::Parse(format!(
                    "frame at {} has {} cells, expected {}",
                    frame.time,
                    frame.values.len(),
                    n
                )));
            }
            Some(_) => {}
        }
        times.push(frame.time);
        lat.extend(frame.lat);
        lon.extend(frame.lon);
        values.extend(frame.values);
    }

    if times.is_empty() {
        return Err(Error::EmptyDay);
    }

    Ok(RasterDataset {
        product,
        times,
        lat: unique_sorted(lat),
        lon: unique_sorted(lon),
        values,
    })
}

fn unique_sorted(mut v: Vec<f64>) -> Vec<f64> {
    v.sort_by(|a, b| a.total_cmp(b));
    v.dedup();
    v
}

impl RasterDataset {
    /// Grid cells per time step.
    pub fn cells(&self) -> usize {
        self.values.len() / self.times.len()
    }

    /// One record batch: a `time` column plus the grid flattened into a
    /// fixed-size list column named after the product.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        let cells = self.cells();
        let item = Arc::new(Field::new("item", DataType::Float32, true));
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                crate::store::TIME_COLUMN,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new(
                self.product.remote_prefix(),
                DataType::FixedSizeList(item.clone(), cells as i32),
                false,
            ),
        ]));

        let times = TimestampMicrosecondArray::from(
            self.times
                .iter()
                .map(|t| t.timestamp_micros())
                .collect::<Vec<_>>(),
        );
        let flat = Float32Array::from(self.values.clone());
        let grid = FixedSizeListArray::new(item, cells as i32, Arc::new(flat) as ArrayRef, None);

        RecordBatch::try_new(schema, vec![Arc::new(times), Arc::new(grid)]).map_err(Into::into)
    }

    /// Coordinate vectors as store metadata, persisted once at first write.
    pub fn coords_json(&self) -> serde_json::Value {
        json!({ "lat": self.lat, "lon": self.lon })
    }

    /// Restrict the grid to cells inside a (W, E, S, N) bounds rectangle,
    /// exclusive on all four edges.
    pub fn constrain_bounds(&self, w: f64, e: f64, s: f64, n: f64) -> Result<RasterDataset> {
        let (ny, nx) = (self.lat.len(), self.lon.len());
        if self.cells() != ny * nx {
            return Err(Error::Parse(
                "grid is not shaped as lat x lon, cannot constrain bounds".into(),
            ));
        }

        let lat_idx: Vec<usize> = (0..ny).filter(|&i| self.lat[i] > s && self.lat[i] < n).collect();
        let lon_idx: Vec<usize> = (0..nx).filter(|&j| self.lon[j] > w && self.lon[j] < e).collect();

        let mut values = Vec::with_capacity(self.times.len() * lat_idx.len() * lon_idx.len());
        for t in 0..self.times.len() {
            let base = t * ny * nx;
            for &i in &lat_idx {
                for &j in &lon_idx {
                    values.push(self.values[base + i * nx + j]);
                }
            }
        }

        Ok(RasterDataset {
            product: self.product,
            times: self.times.clone(),
            lat: lat_idx.iter().map(|&i| self.lat[i]).collect(),
            lon: lon_idx.iter().map(|&j| self.lon[j]).collect(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn frame(hour: u32, values: Vec<f32>) -> RasterFrame {
        RasterFrame {
            time: Utc.with_ymd_and_hms(2021, 1, 1, hour, 0, 0).unwrap(),
            lat: vec![20.0, 10.0, 20.0, 10.0],
            lon: vec![100.0, 100.0, 110.0, 110.0],
            values,
        }
    }

    #[test]
    fn concat_reduces_coords_to_unique_sorted() -> Result<()> {
        let frames = vec![
            frame(0, vec![1.0, 2.0, 3.0, 4.0]),
            frame(1, vec![5.0, 6.0, 7.0, 8.0]),
            frame(2, vec![9.0, 10.0, 11.0, 12.0]),
        ];
        let ds = transform(frames, Product::LongWave)?;
        assert_eq!(ds.times.len(), 3);
        assert_eq!(ds.lat, vec![10.0, 20.0]);
        assert_eq!(ds.lon, vec![100.0, 110.0]);
        assert_eq!(ds.values.len(), 12);
        assert_eq!(ds.cells(), 4);
        Ok(())
    }

    #[test]
    fn empty_day_is_distinguishable() {
        let err = transform(Vec::new(), Product::Visible).unwrap_err();
        assert!(matches!(err, Error::EmptyDay));
    }

    #[test]
    fn out_of_order_frames_are_rejected() {
        let frames = vec![frame(2, vec![0.0; 4]), frame(1, vec![0.0; 4])];
        let err = transform(frames, Product::LongWave).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn duplicate_timestamps_are_rejected() {
        let frames = vec![frame(1, vec![0.0; 4]), frame(1, vec![0.0; 4])];
        assert!(transform(frames, Product::LongWave).is_err());
    }

    #[test]
    fn batch_names_data_after_product() -> Result<()> {
        let ds = transform(vec![frame(0, vec![1.0; 4])], Product::WaterVapor)?;
        let batch = ds.to_batch()?;
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column_by_name("GMGSI_WV").is_some());
        assert!(batch.column_by_name(crate::store::TIME_COLUMN).is_some());
        Ok(())
    }

    #[test]
    fn constrain_bounds_selects_inner_cells() -> Result<()> {
        let ds = transform(
            vec![frame(0, vec![1.0, 2.0, 3.0, 4.0])],
            Product::LongWave,
        )?;
        // lat [10, 20], lon [100, 110]; keep lat > 15, lon < 105
        let inner = ds.constrain_bounds(90.0, 105.0, 15.0, 55.0)?;
        assert_eq!(inner.lat, vec![20.0]);
        assert_eq!(inner.lon, vec![100.0]);
        assert_eq!(inner.values.len(), 1);
        Ok(())
    }

    #[test]
    fn product_round_trips_through_from_str() {
        for p in Product::ALL {
            assert_eq!(p.remote_prefix().parse::<Product>().unwrap(), p);
        }
        assert!(matches!(
            "GMGSI_XX".parse::<Product>(),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
