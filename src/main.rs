use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use stormscraper::fetch::catalog::PROBSEVERE_ARCHIVE_ROOT;
use stormscraper::pipeline;
use stormscraper::raster::Product;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: stormscraper <gmgsi|probsevere> <start> <end> [product] [store]";

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) parse the feed and date range ────────────────────────────
    let mut args = std::env::args().skip(1);
    let feed = args.next().context(USAGE)?;
    let start: NaiveDate = args.next().context(USAGE)?.parse().context("bad start date")?;
    let end: NaiveDate = args.next().context(USAGE)?.parse().context("bad end date")?;
    info!(%feed, %start, %end, "startup");

    // ─── 3) drive the pipeline ───────────────────────────────────────
    match feed.as_str() {
        "gmgsi" => {
            let product: Product = args.next().as_deref().unwrap_or("GMGSI_LW").parse()?;
            let store = PathBuf::from(args.next().unwrap_or_else(|| "data/GMGSI".into()));
            pipeline::run_gmgsi(start, end, product, &store).await?;
        }
        "probsevere" => {
            let store = PathBuf::from(args.next().unwrap_or_else(|| "data/PROBSEVERE".into()));
            pipeline::run_probsevere(start, end, PROBSEVERE_ARCHIVE_ROOT, &store).await?;
        }
        other => bail!("unknown feed `{other}`; {USAGE}"),
    }

    info!("all done");
    Ok(())
}
