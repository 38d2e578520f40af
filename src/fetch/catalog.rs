// src/fetch/catalog.rs
//
// Remote discovery of one day's source files for each feed. The raster
// catalog is an anonymous S3 listing expanded one directory level (hours);
// the feature catalog is a scraped HTML directory index.

use chrono::NaiveDate;
use object_store::aws::AmazonS3;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::raster::Product;

pub const GMGSI_BUCKET: &str = "noaa-gmgsi-pds";
pub const PROBSEVERE_ARCHIVE_ROOT: &str = "https://mtarchive.geol.iastate.edu";

static JSON_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href$=".json"]"#).expect("CSS selector should be valid"));

/// Anonymous client for the public GMGSI bucket.
pub fn gmgsi_store() -> Result<AmazonS3> {
    let store = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(GMGSI_BUCKET)
        .with_region("us-east-1")
        .with_skip_signature(true)
        .build()?;
    Ok(store)
}

/// One day's raster prefix: `{product}/{YYYY}/{MM}/{DD}`.
pub fn gmgsi_prefix(product: Product, date: NaiveDate) -> ObjectPath {
    ObjectPath::from(format!(
        "{}/{}",
        product.remote_prefix(),
        date.format("%Y/%m/%d")
    ))
}

/// List one day's raster files. The day prefix holds per-hour directories,
/// each holding the files themselves; lexical order of the returned paths is
/// chronological because the timestamp is embedded in the path.
pub async fn gmgsi_locators(
    store: &dyn ObjectStore,
    product: Product,
    date: NaiveDate,
) -> Result<Vec<ObjectPath>> {
    let prefix = gmgsi_prefix(product, date);
    let day = store
        .list_with_delimiter(Some(&prefix))
        .await
        .map_err(|e| Error::CatalogUnavailable {
            url: prefix.to_string(),
            reason: e.to_string(),
        })?;

    let mut paths = Vec::new();
    for hour in &day.common_prefixes {
        let listing = store.list_with_delimiter(Some(hour)).await.map_err(|e| {
            Error::CatalogUnavailable {
                url: hour.to_string(),
                reason: e.to_string(),
            }
        })?;
        paths.extend(listing.objects.into_iter().map(|meta| meta.location));
    }
    paths.sort_unstable();
    debug!(prefix = %prefix, files = paths.len(), "listed raster day");
    Ok(paths)
}

/// The directory index URL for one day of ProbSevere files.
pub fn probsevere_index_url(archive_root: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}/mrms/ncep/ProbSevere/",
        archive_root.trim_end_matches('/'),
        date.format("%Y/%m/%d")
    )
}

/// Fetch one day's feature-file locators from the archive's HTML index.
/// A non-success listing response is day-scoped, not fatal to the run.
pub async fn probsevere_locators(
    client: &Client,
    archive_root: &str,
    date: NaiveDate,
) -> Result<Vec<String>> {
    let url = probsevere_index_url(archive_root, date);
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::CatalogUnavailable {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    if !resp.status().is_success() {
        return Err(Error::CatalogUnavailable {
            reason: format!("HTTP {}", resp.status()),
            url,
        });
    }
    let html = resp.text().await.map_err(|e| Error::CatalogUnavailable {
        url: url.clone(),
        reason: e.to_string(),
    })?;
    let locators = parse_index(&html, &url)?;
    debug!(%url, files = locators.len(), "listed feature day");
    Ok(locators)
}

/// Pull the `.json` entries with non-empty names out of a directory listing
/// page, resolved against the page URL.
pub fn parse_index(html: &str, base: &str) -> Result<Vec<String>> {
    let base = Url::parse(base).map_err(|e| Error::Parse(format!("bad index url `{base}`: {e}")))?;
    let doc = Html::parse_document(html);
    let mut locators: Vec<String> = doc
        .select(&JSON_LINK)
        .filter_map(|e| e.value().attr("href"))
        .filter(|href| !href.is_empty())
        .filter_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .collect();
    // file names embed the valid time, so lexical order is chronological
    locators.sort_unstable();
    Ok(locators)
}
