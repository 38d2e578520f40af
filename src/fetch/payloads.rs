// src/fetch/payloads.rs
//
// Per-locator fetches for both feeds. One reusable connection per day; a
// failed download is logged and skipped so the batch proceeds with whatever
// subset succeeded. Single attempt per locator, no retry.

use std::io::Write;

use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use reqwest::Client;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Error, Result};
use crate::probsevere::FeatureCollection;
use crate::raster::{decode, RasterFrame};

/// Fetch and decode one raster payload. The bytes are staged to a temp file
/// for the NetCDF reader; the timestamp comes from the locator itself.
pub async fn fetch_raster(store: &dyn ObjectStore, locator: &ObjectPath) -> Result<RasterFrame> {
    let time = decode::time_from_locator(locator.as_ref())?;

    let payload = match store.get(locator).await {
        Ok(result) => result.bytes().await,
        Err(e) => Err(e),
    }
    .map_err(|e| Error::Fetch {
        locator: locator.to_string(),
        reason: e.to_string(),
    })?;

    let mut staged = NamedTempFile::new()?;
    staged.write_all(&payload)?;
    decode::decode_frame(staged.path(), time)
}

/// Fetch a day's frames in catalog order, skipping locators that fail to
/// download. Decode failures are schema violations and still halt the day.
pub async fn fetch_raster_batch(
    store: &dyn ObjectStore,
    locators: &[ObjectPath],
) -> Result<Vec<RasterFrame>> {
    let mut frames = Vec::with_capacity(locators.len());
    for locator in locators {
        match fetch_raster(store, locator).await {
            Ok(frame) => frames.push(frame),
            Err(Error::Fetch { locator, reason }) => {
                warn!(%locator, %reason, "skipping raster payload");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(frames)
}

/// Fetch one feature payload and decode it from JSON.
pub async fn fetch_features(client: &Client, locator: &str) -> Result<FeatureCollection> {
    let bytes = async {
        client
            .get(locator)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }
    .await
    .map_err(|e: reqwest::Error| Error::Fetch {
        locator: locator.to_string(),
        reason: e.to_string(),
    })?;

    serde_json::from_slice(&bytes).map_err(Into::into)
}

/// Fetch a day's feature collections, skipping locators that fail to
/// download.
pub async fn fetch_feature_batch(
    client: &Client,
    locators: &[String],
) -> Result<Vec<FeatureCollection>> {
    let mut collections = Vec::with_capacity(locators.len());
    for locator in locators {
        match fetch_features(client, locator).await {
            Ok(fc) => collections.push(fc),
            Err(Error::Fetch { locator, reason }) => {
                warn!(%locator, %reason, "skipping feature payload");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(collections)
}
