// src/probsevere/schema.rs
//
// The static ProbSevere property schema: column names grouped into four
// fixed-width dtype buckets. Built once at startup as a plain immutable
// value and passed by reference to whatever needs it.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, TimeUnit};

use crate::error::{Error, Result};
use crate::store::TIME_COLUMN;

/// Template the archive uses for `validTime` values, e.g.
/// `20210101_001240 UTC`.
pub const VALIDTIME_TEMPLATE: &str = "%Y%m%d_%H%M%S %Z";

/// Fixed-width numeric bucket a column is cast into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Float32,
    Int32,
    UInt32,
    UInt8,
}

impl Bucket {
    pub fn data_type(&self) -> DataType {
        match self {
            Bucket::Float32 => DataType::Float32,
            Bucket::Int32 => DataType::Int32,
            Bucket::UInt32 => DataType::UInt32,
            Bucket::UInt8 => DataType::UInt8,
        }
    }
}

/// Every property the feed declares. The four buckets below must partition
/// this set exactly.
pub const DECLARED: &[&str] = &[
    "EBSHEAR",
    "MEANWIND_1-3kmAGL",
    "MESH",
    "VIL_DENSITY",
    "FLASH_DENSITY",
    "MOTION_EAST",
    "MOTION_SOUTH",
    "MAXLLAZ",
    "P98LLAZ",
    "P98MLAZ",
    "WETBULB_0C_HGT",
    "PWAT",
    "LJA",
    "MLCIN",
    "MUCAPE",
    "MLCAPE",
    "SRH01KM",
    "FLASH_RATE",
    "CAPE_M10M30",
    "SIZE",
    "ID",
    "PS",
];

pub const FLOAT32: &[&str] = &[
    "EBSHEAR",
    "MEANWIND_1-3kmAGL",
    "MESH",
    "VIL_DENSITY",
    "FLASH_DENSITY",
    "MOTION_EAST",
    "MOTION_SOUTH",
    "MAXLLAZ",
    "P98LLAZ",
    "P98MLAZ",
    "WETBULB_0C_HGT",
    "PWAT",
    "LJA",
];
pub const INT32: &[&str] = &["MLCIN"];
pub const UINT32: &[&str] = &[
    "MUCAPE",
    "MLCAPE",
    "SRH01KM",
    "FLASH_RATE",
    "CAPE_M10M30",
    "SIZE",
    "ID",
];
pub const UINT8: &[&str] = &["PS"];

/// Geometry-derived columns: the envelope scalars and the representative
/// point, stored as float32 alongside the declared floats. Lowercase by
/// convention, distinct from the uppercase feed properties.
pub const BBOX: &[&str] = &["minx", "miny", "maxx", "maxy"];
pub const POINT: &[&str] = &["x", "y"];

/// The declared property columns paired with their buckets, in stable
/// output order.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    columns: Vec<(&'static str, Bucket)>,
}

impl ColumnSchema {
    /// Build the declared schema, checking that the buckets partition the
    /// declared property set: no name in two buckets, none omitted.
    pub fn declared() -> Result<Self> {
        let buckets: [(&[&str], Bucket); 4] = [
            (FLOAT32, Bucket::Float32),
            (INT32, Bucket::Int32),
            (UINT32, Bucket::UInt32),
            (UINT8, Bucket::UInt8),
        ];

        let mut columns = Vec::new();
        let mut seen = BTreeSet::new();
        for (names, bucket) in buckets {
            for &name in names {
                if !seen.insert(name) {
                    return Err(Error::InvalidConfiguration(format!(
                        "column `{name}` appears in two dtype buckets"
                    )));
                }
                columns.push((name, bucket));
            }
        }

        let declared: BTreeSet<&str> = DECLARED.iter().copied().collect();
        if seen != declared {
            let missing: Vec<&&str> = declared.difference(&seen).collect();
            let extra: Vec<&&str> = seen.difference(&declared).collect();
            return Err(Error::InvalidConfiguration(format!(
                "dtype buckets do not partition the declared schema (missing {missing:?}, extra {extra:?})"
            )));
        }

        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn properties(&self) -> impl Iterator<Item = (&'static str, Bucket)> + '_ {
        self.columns.iter().copied()
    }

    /// Arrow schema of the output table: time index, declared properties in
    /// bucket dtypes, then the six geometry-derived float columns.
    pub fn arrow_schema(&self) -> Arc<ArrowSchema> {
        let mut fields = Vec::with_capacity(1 + self.columns.len() + BBOX.len() + POINT.len());
        fields.push(Field::new(
            TIME_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ));
        for (name, bucket) in &self.columns {
            fields.push(Field::new(*name, bucket.data_type(), true));
        }
        for name in BBOX.iter().chain(POINT) {
            fields.push(Field::new(*name, DataType::Float32, true));
        }
        Arc::new(ArrowSchema::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_partition_the_declared_set() -> Result<()> {
        let schema = ColumnSchema::declared()?;
        assert_eq!(schema.len(), DECLARED.len());
        let names: Vec<&str> = schema.properties().map(|(n, _)| n).collect();
        for name in DECLARED {
            assert!(names.contains(name), "`{name}` missing from schema");
        }
        Ok(())
    }

    #[test]
    fn arrow_schema_has_time_properties_and_geometry_columns() -> Result<()> {
        let schema = ColumnSchema::declared()?.arrow_schema();
        assert_eq!(schema.fields().len(), 1 + DECLARED.len() + 6);
        assert_eq!(schema.field(0).name(), TIME_COLUMN);
        assert_eq!(
            schema.field_with_name("MLCIN")?.data_type(),
            &DataType::Int32
        );
        assert_eq!(schema.field_with_name("PS")?.data_type(), &DataType::UInt8);
        assert_eq!(
            schema.field_with_name("minx")?.data_type(),
            &DataType::Float32
        );
        Ok(())
    }
}
