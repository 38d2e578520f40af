// src/probsevere/mod.rs
//
// ProbSevere feature feed: JSON payload decode, geometry wrangling, and the
// cast into a fixed-width columnar table indexed by time.

pub mod schema;

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float32Builder, Int32Builder, TimestampMicrosecondBuilder, UInt32Builder,
    UInt8Builder,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime, Utc};
use geo::{BoundingRect, InteriorPoint};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::{Error, Result};
use self::schema::{Bucket, ColumnSchema};

/// One fetched payload: a single valid-time snapshot of storm features.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "validTime")]
    pub valid_time: String,
    pub features: Vec<Feature>,
}

/// One storm feature: a polygon and the declared scalar properties.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub geometry: geojson::Geometry,
    pub properties: serde_json::Map<String, Value>,
}

/// Parse a `validTime` against the fixed `%Y%m%d_%H%M%S %Z` template.
/// chrono cannot consume `%Z` on input, so the zone suffix is matched by
/// hand and must be UTC.
pub fn parse_valid_time(raw: &str) -> Result<DateTime<Utc>> {
    let bad = || Error::Parse(format!("validTime `{raw}` does not match `{}`", schema::VALIDTIME_TEMPLATE));
    let (stamp, zone) = raw.split_once(' ').ok_or_else(bad)?;
    if zone != "UTC" {
        return Err(bad());
    }
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| bad())
}

/// Row-per-feature union of one day's collections, ordered by time.
#[derive(Debug, Default)]
pub struct FeatureTable {
    rows: Vec<Row>,
}

#[derive(Debug)]
struct Row {
    time: DateTime<Utc>,
    /// Envelope of the geometry as (minx, miny, maxx, maxy).
    bbox: Option<(f64, f64, f64, f64)>,
    /// Representative interior point. Guaranteed inside the polygon, which
    /// a centroid is not for concave shapes.
    point: Option<(f64, f64)>,
    /// Raw numeric values in declared-column order, before the bucket cast.
    values: Vec<Option<f64>>,
}

/// Build one table from a day's collections: one row per feature, restricted
/// to the declared property columns, timed by the collection's `validTime`,
/// with envelope and representative-point columns derived from the geometry.
/// The geometry itself is not persisted. Rows are explicitly sorted by time
/// so the result satisfies the store's append invariant.
#[instrument(level = "info", skip(collections, schema))]
pub fn transform<I>(collections: I, schema: &ColumnSchema) -> Result<FeatureTable>
where
    I: IntoIterator<Item = FeatureCollection>,
{
    let mut rows = Vec::new();
    for fc in collections {
        let time = parse_valid_time(&fc.valid_time)?;
        for feature in &fc.features {
            rows.push(build_row(time, feature, schema)?);
        }
    }
    if rows.is_empty() {
        return Err(Error::EmptyDay);
    }
    rows.sort_by_key(|row| row.time);
    Ok(FeatureTable { rows })
}

fn build_row(time: DateTime<Utc>, feature: &Feature, schema: &ColumnSchema) -> Result<Row> {
    let geometry = geo::Geometry::<f64>::try_from(feature.geometry.clone())
        .map_err(|e| Error::Parse(format!("bad feature geometry: {e}")))?;

    let bbox = geometry
        .bounding_rect()
        .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y));
    let point = geometry.interior_point().map(|p| (p.x(), p.y()));

    let values = schema
        .properties()
        .map(|(name, _)| feature.properties.get(name).and_then(as_number))
        .collect();

    Ok(Row {
        time,
        bbox,
        point,
        values,
    })
}

/// The feed reports property values as JSON strings as often as numbers.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|row| row.time).collect()
    }

    /// Cast the rows into one record batch. Each declared column lands in
    /// its bucket's fixed-width type; missing values stay null rather than
    /// changing the column dtype. Floats truncate on the narrowing casts.
    pub fn to_batch(&self, schema: &ColumnSchema) -> Result<RecordBatch> {
        let arrow_schema = schema.arrow_schema();
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(arrow_schema.fields().len());

        let mut time = TimestampMicrosecondBuilder::with_capacity(self.rows.len());
        for row in &self.rows {
            time.append_value(row.time.timestamp_micros());
        }
        columns.push(Arc::new(time.finish()));

        for (idx, (_, bucket)) in schema.properties().enumerate() {
            let cells = self.rows.iter().map(|row| row.values[idx]);
            columns.push(match bucket {
                Bucket::Float32 => {
                    let mut b = Float32Builder::with_capacity(self.rows.len());
                    for v in cells {
                        b.append_option(v.map(|v| v as f32));
                    }
                    Arc::new(b.finish()) as ArrayRef
                }
                Bucket::Int32 => {
                    let mut b = Int32Builder::with_capacity(self.rows.len());
                    for v in cells {
                        b.append_option(v.map(|v| v as i32));
                    }
                    Arc::new(b.finish()) as ArrayRef
                }
                Bucket::UInt32 => {
                    let mut b = UInt32Builder::with_capacity(self.rows.len());
                    for v in cells {
                        b.append_option(v.map(|v| v as u32));
                    }
                    Arc::new(b.finish()) as ArrayRef
                }
                Bucket::UInt8 => {
                    let mut b = UInt8Builder::with_capacity(self.rows.len());
                    for v in cells {
                        b.append_option(v.map(|v| v as u8));
                    }
                    Arc::new(b.finish()) as ArrayRef
                }
            });
        }

        let bbox_cells: [fn(&Row) -> Option<f64>; 4] = [
            |r| r.bbox.map(|b| b.0),
            |r| r.bbox.map(|b| b.1),
            |r| r.bbox.map(|b| b.2),
            |r| r.bbox.map(|b| b.3),
        ];
        for pick in bbox_cells {
            let mut b = Float32Builder::with_capacity(self.rows.len());
            for row in &self.rows {
                b.append_option(pick(row).map(|v| v as f32));
            }
            columns.push(Arc::new(b.finish()));
        }
        for pick in [
            (|r: &Row| r.point.map(|p| p.0)) as fn(&Row) -> Option<f64>,
            |r| r.point.map(|p| p.1),
        ] {
            let mut b = Float32Builder::with_capacity(self.rows.len());
            for row in &self.rows {
                b.append_option(pick(row).map(|v| v as f32));
            }
            columns.push(Arc::new(b.finish()));
        }

        RecordBatch::try_new(arrow_schema, columns).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float32Array, Int32Array, UInt32Array, UInt8Array};
    use chrono::TimeZone;
    use geo::{Contains, LineString, Point, Polygon};
    use serde_json::json;

    // An L-shaped (concave) footprint whose centroid sits near the notch.
    const L_SHELL: [(f64, f64); 7] = [
        (0.0, 0.0),
        (4.0, 0.0),
        (4.0, 1.0),
        (1.0, 1.0),
        (1.0, 4.0),
        (0.0, 4.0),
        (0.0, 0.0),
    ];

    fn collection(valid_time: &str, properties: Value) -> FeatureCollection {
        let coordinates: Vec<[f64; 2]> = L_SHELL.iter().map(|&(x, y)| [x, y]).collect();
        serde_json::from_value(json!({
            "validTime": valid_time,
            "features": [{
                "geometry": { "type": "Polygon", "coordinates": [coordinates] },
                "properties": properties
            }]
        }))
        .unwrap()
    }

    fn full_properties() -> Value {
        let mut map = serde_json::Map::new();
        for (i, name) in schema::DECLARED.iter().enumerate() {
            map.insert(name.to_string(), json!(i.to_string()));
        }
        Value::Object(map)
    }

    #[test]
    fn valid_time_parses_against_the_template() -> Result<()> {
        let t = parse_valid_time("20210101_001240 UTC")?;
        assert_eq!(t, Utc.with_ymd_and_hms(2021, 1, 1, 0, 12, 40).unwrap());
        Ok(())
    }

    #[test]
    fn malformed_valid_time_is_a_parse_error() {
        for raw in ["20210101_001240", "2021-01-01 UTC", "20210101_001240 GMT"] {
            assert!(matches!(parse_valid_time(raw), Err(Error::Parse(_))));
        }
    }

    #[test]
    fn empty_day_is_distinguishable() {
        let schema = ColumnSchema::declared().unwrap();
        let err = transform(Vec::new(), &schema).unwrap_err();
        assert!(matches!(err, Error::EmptyDay));
    }

    #[test]
    fn representative_point_lies_inside_the_polygon() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        let table = transform(
            vec![collection("20210101_000040 UTC", full_properties())],
            &schema,
        )?;
        let batch = table.to_batch(&schema)?;

        let x = column::<Float32Array>(&batch, "x").value(0) as f64;
        let y = column::<Float32Array>(&batch, "y").value(0) as f64;
        let polygon = Polygon::new(LineString::from(L_SHELL.to_vec()), vec![]);
        assert!(polygon.contains(&Point::new(x, y)));
        Ok(())
    }

    #[test]
    fn envelope_columns_match_the_bounds() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        let table = transform(
            vec![collection("20210101_000040 UTC", full_properties())],
            &schema,
        )?;
        let batch = table.to_batch(&schema)?;

        for (name, expected) in [
            ("minx", 0.0f32),
            ("miny", 0.0),
            ("maxx", 4.0),
            ("maxy", 4.0),
        ] {
            assert_eq!(column::<Float32Array>(&batch, name).value(0), expected);
        }
        Ok(())
    }

    #[test]
    fn negative_int_property_survives_the_cast_exactly() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        let mut properties = full_properties();
        properties["MLCIN"] = json!("-7");
        properties["PS"] = json!(83);

        let table = transform(vec![collection("20210101_000040 UTC", properties)], &schema)?;
        let batch = table.to_batch(&schema)?;

        assert_eq!(column::<Int32Array>(&batch, "MLCIN").value(0), -7);
        assert_eq!(column::<UInt8Array>(&batch, "PS").value(0), 83);
        Ok(())
    }

    #[test]
    fn missing_property_stays_null_without_changing_dtype() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        let mut properties = full_properties();
        properties.as_object_mut().unwrap().remove("MLCIN");

        let table = transform(vec![collection("20210101_000040 UTC", properties)], &schema)?;
        let batch = table.to_batch(&schema)?;

        let mlcin = column::<Int32Array>(&batch, "MLCIN");
        assert!(mlcin.is_null(0));
        Ok(())
    }

    #[test]
    fn rows_are_sorted_by_time() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        let table = transform(
            vec![
                collection("20210101_001240 UTC", full_properties()),
                collection("20210101_000040 UTC", full_properties()),
            ],
            &schema,
        )?;
        let times = table.times();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        Ok(())
    }

    #[test]
    fn cast_is_idempotent_for_already_typed_values() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        let mut properties = full_properties();
        properties["EBSHEAR"] = json!("10.5");
        properties["MLCIN"] = json!(-7);
        properties["MUCAPE"] = json!(1000);
        properties["PS"] = json!(83);

        let first = transform(vec![collection("20210101_000040 UTC", properties)], &schema)?
            .to_batch(&schema)?;

        // feed the already-cast values back through the transform; a second
        // pass over bucket-exact values must reproduce the batch bit for bit
        let mut recast = serde_json::Map::new();
        for (name, bucket) in schema.properties() {
            let value = match bucket {
                Bucket::Float32 => json!(column::<Float32Array>(&first, name).value(0) as f64),
                Bucket::Int32 => json!(column::<Int32Array>(&first, name).value(0)),
                Bucket::UInt32 => json!(column::<UInt32Array>(&first, name).value(0)),
                Bucket::UInt8 => json!(column::<UInt8Array>(&first, name).value(0)),
            };
            recast.insert(name.to_string(), value);
        }
        let second = transform(
            vec![collection("20210101_000040 UTC", Value::Object(recast))],
            &schema,
        )?
        .to_batch(&schema)?;

        assert_eq!(first, second);
        Ok(())
    }

    fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<T>()
            .unwrap()
    }
}
