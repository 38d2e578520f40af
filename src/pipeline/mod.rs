// src/pipeline/mod.rs
//
// Per-day extract -> transform -> load drivers for both feeds. One cycle
// per calendar day, ascending; day-scoped failures are skipped, anything
// unexpected halts the remaining range. Resume by re-invoking with a
// narrowed range.

use std::path::Path;

use chrono::NaiveDate;
use object_store::ObjectStore;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fetch::{catalog, payloads};
use crate::probsevere::{self, schema::ColumnSchema};
use crate::raster::{self, Product};
use crate::store::Store;

/// Inclusive daily date range, ascending.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(Error::InvalidConfiguration(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok(())
}

/// Backfill one GMGSI product over an inclusive date range. The product's
/// dataset is nested under its own subdirectory of `store_root` because the
/// products' time axes conflict.
pub async fn run_gmgsi(
    start: NaiveDate,
    end: NaiveDate,
    product: Product,
    store_root: &Path,
) -> Result<()> {
    check_range(start, end)?;
    if store_root.as_os_str().is_empty() {
        return Err(Error::InvalidConfiguration("empty store root".into()));
    }

    let store = Store::new(store_root.join(product.store_dir()));
    let remote = catalog::gmgsi_store()?;

    for date in date_range(start, end) {
        match load_gmgsi_day(&remote, product, date, &store).await {
            Ok(frames) => info!(%date, %product, frames, "day appended"),
            Err(Error::EmptyDay) => debug!(%date, %product, "no data for this day"),
            Err(err @ Error::CatalogUnavailable { .. }) => {
                warn!(%date, %product, %err, "skipping day");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// One raster cycle: list, fetch what we can, concatenate, append.
async fn load_gmgsi_day(
    remote: &dyn ObjectStore,
    product: Product,
    date: NaiveDate,
    store: &Store,
) -> Result<usize> {
    let locators = catalog::gmgsi_locators(remote, product, date).await?;
    let frames = payloads::fetch_raster_batch(remote, &locators).await?;
    let dataset = raster::transform(frames, product)?;

    let first_write = !store.exists();
    store.append(&dataset.to_batch()?)?;
    if first_write {
        // the coordinate vectors are shared by every part, persisted once
        store.put_meta("coords", &dataset.coords_json())?;
    }
    Ok(dataset.times.len())
}

/// Backfill the ProbSevere feature store over an inclusive date range.
pub async fn run_probsevere(
    start: NaiveDate,
    end: NaiveDate,
    archive_root: &str,
    store_dir: &Path,
) -> Result<()> {
    check_range(start, end)?;
    if store_dir.as_os_str().is_empty() {
        return Err(Error::InvalidConfiguration("empty store path".into()));
    }

    let schema = ColumnSchema::declared()?;
    let client = Client::new();
    let store = Store::new(store_dir);

    for date in date_range(start, end) {
        match load_probsevere_day(&client, archive_root, date, &schema, &store).await {
            Ok(rows) => info!(%date, rows, "day appended"),
            Err(Error::EmptyDay) => debug!(%date, "no data for this day"),
            Err(err @ Error::CatalogUnavailable { .. }) => {
                warn!(%date, %err, "skipping day");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// One feature cycle: list the archive index, fetch what we can, build the
/// table, append.
async fn load_probsevere_day(
    client: &Client,
    archive_root: &str,
    date: NaiveDate,
    schema: &ColumnSchema,
    store: &Store,
) -> Result<usize> {
    let locators = catalog::probsevere_locators(client, archive_root, date).await?;
    let collections = payloads::fetch_feature_batch(client, &locators).await?;
    let table = probsevere::transform(collections, schema)?;
    store.append(&table.to_batch(schema)?)?;
    Ok(table.len())
}
