// src/raster/decode.rs
//
// NetCDF decode for GMGSI payloads. The files are self-describing; we only
// pull out the `data` grid and the `lat`/`lon` coordinate variables.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::RasterFrame;
use crate::error::{Error, Result};

/// Decode one staged GMGSI payload into a frame. The acquisition timestamp
/// is not read from the file; it comes from the source locator.
pub fn decode_frame(path: &Path, time: DateTime<Utc>) -> Result<RasterFrame> {
    let file = netcdf::open(path)?;

    let values = grid_variable(&file, path, "data")?.get_values::<f32, _>(..)?;
    let lat = grid_variable(&file, path, "lat")?.get_values::<f64, _>(..)?;
    let lon = grid_variable(&file, path, "lon")?.get_values::<f64, _>(..)?;

    Ok(RasterFrame {
        time,
        lat,
        lon,
        values,
    })
}

fn grid_variable<'f>(
    file: &'f netcdf::File,
    path: &Path,
    name: &str,
) -> Result<netcdf::Variable<'f>> {
    file.variable(name).ok_or_else(|| {
        Error::Parse(format!(
            "{}: missing expected variable `{}`",
            path.display(),
            name
        ))
    })
}

/// Parse the acquisition timestamp embedded in a locator's file name: the
/// first run of ten or more digits, read as `YYYYMMDDHH`.
pub fn time_from_locator(locator: &str) -> Result<DateTime<Utc>> {
    let name = locator.rsplit('/').next().unwrap_or(locator);

    let bytes = name.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if bytes[start].is_ascii_digit() {
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end - start >= 10 {
                let stamp = format!("{}0000", &name[start..start + 10]);
                return NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M%S")
                    .map(|naive| naive.and_utc())
                    .map_err(|_| {
                        Error::Parse(format!("locator `{locator}` has an unparseable timestamp"))
                    });
            }
            start = end;
        } else {
            start += 1;
        }
    }

    Err(Error::Parse(format!(
        "locator `{locator}` carries no acquisition timestamp"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn locator_timestamp_is_parsed_from_file_name() -> Result<()> {
        let t = time_from_locator("GMGSI_LW/2021/01/02/03/GLOBCOMPLIR_nc.2021010203.nc")?;
        assert_eq!(t, Utc.with_ymd_and_hms(2021, 1, 2, 3, 0, 0).unwrap());
        Ok(())
    }

    #[test]
    fn short_digit_runs_are_skipped() -> Result<()> {
        let t = time_from_locator("v1/GLOBCOMPSSR_v2.20240630110000.nc")?;
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 6, 30, 11, 0, 0).unwrap());
        Ok(())
    }

    #[test]
    fn locator_without_timestamp_is_an_error() {
        assert!(matches!(
            time_from_locator("GMGSI_LW/readme.txt"),
            Err(Error::Parse(_))
        ));
    }
}
