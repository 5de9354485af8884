use anyhow::{Context, Result};
use clap::Parser;
use oads_fetch::catalog::{self, EoCatalogue, FoundProduct};
use oads_fetch::config::{self, Config};
use oads_fetch::context::RunContext;
use oads_fetch::download_plan::{DownloadPlan, DownloadPolicy, DownloadSummary};
use oads_fetch::logging;
use oads_fetch::selection::{self, SearchCriteria};
use std::path::PathBuf;
use tracing::info;

/// Search the EarthCARE catalogue and download products from the OADS
/// dissemination servers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Product types, e.g. ATL_NOM_1B, ATL-NOM-1B, ANOM. Append `:XX` to pick a baseline
    #[arg(required_unless_present = "from_plan", num_args = 1..)]
    product_type: Vec<String>,

    /// Folder under which files are stored (default: config file, then current folder)
    #[arg(short = 'd', long = "data_directory")]
    data_directory: Option<PathBuf>,

    /// Orbit numbers
    #[arg(short = 'o', long = "orbit_number", num_args = 1..)]
    orbit_number: Vec<i64>,

    #[arg(long = "start_orbit_number", visible_alias = "so")]
    start_orbit_number: Option<i64>,

    #[arg(long = "end_orbit_number", visible_alias = "eo")]
    end_orbit_number: Option<i64>,

    /// Frame letters A-H
    #[arg(short = 'f', long = "frame_id", num_args = 1..)]
    frame_id: Vec<String>,

    /// Orbit and frame tokens, e.g. 01234E
    #[arg(long = "orbit_and_frame", visible_alias = "oaf", num_args = 1..)]
    orbit_and_frame: Vec<String>,

    #[arg(long = "start_orbit_and_frame", visible_alias = "soaf")]
    start_orbit_and_frame: Option<String>,

    #[arg(long = "end_orbit_and_frame", visible_alias = "eoaf")]
    end_orbit_and_frame: Option<String>,

    /// Timestamps that must lie within the sensing time of the product
    #[arg(short = 't', long = "time", num_args = 1..)]
    time: Vec<String>,

    #[arg(long = "start_time", visible_alias = "st")]
    start_time: Option<String>,

    #[arg(long = "end_time", visible_alias = "et")]
    end_time: Option<String>,

    /// Radius search: RADIUS_M LAT LON
    #[arg(short = 'r', long = "radius_search", num_args = 3, allow_negative_numbers = true)]
    radius_search: Option<Vec<f64>>,

    /// Bounding box: LAT_SOUTH LON_WEST LAT_NORTH LON_EAST
    #[arg(long = "bounding_box", visible_alias = "bbox", num_args = 4, allow_negative_numbers = true)]
    bounding_box: Option<Vec<f64>>,

    /// Baseline for all product types ('latest' or two letters, e.g. AC)
    #[arg(long = "product_version", visible_alias = "pv")]
    product_version: Option<String>,

    /// Replace existing local files
    #[arg(long = "overwrite", visible_alias = "override")]
    overwrite: bool,

    /// List matching files without downloading
    #[arg(long = "no_download")]
    no_download: bool,

    #[arg(long = "no_unzip")]
    no_unzip: bool,

    /// Keep archives after extraction
    #[arg(long = "no_delete")]
    no_delete: bool,

    /// Store all files directly in the data directory
    #[arg(long = "no_subdirs")]
    no_subdirs: bool,

    /// 1-based index into the found files; negative counts from the end
    #[arg(short = 'i', long = "select_file_at_index", allow_negative_numbers = true)]
    select_file_at_index: Option<i64>,

    #[arg(short = 'c', long = "path_to_config")]
    path_to_config: Option<PathBuf>,

    /// Save the download plan as JSON
    #[arg(long = "write_plan")]
    write_plan: Option<PathBuf>,

    /// Download a saved plan instead of searching
    #[arg(long = "from_plan", conflicts_with = "write_plan")]
    from_plan: Option<PathBuf>,

    /// Also log to daily files in this folder
    #[arg(long = "log_file", visible_alias = "log-file")]
    log_file: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

impl Args {
    fn criteria(self: &Self) -> SearchCriteria {
        SearchCriteria {
            product_types: self.product_type.clone(),
            product_version: self.product_version.clone(),
            timestamps: self.time.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
            orbit_numbers: self.orbit_number.clone(),
            start_orbit_number: self.start_orbit_number,
            end_orbit_number: self.end_orbit_number,
            frame_ids: self.frame_id.clone(),
            orbit_and_frames: self.orbit_and_frame.clone(),
            start_orbit_and_frame: self.start_orbit_and_frame.clone(),
            end_orbit_and_frame: self.end_orbit_and_frame.clone(),
            radius_search: self.radius_search.as_deref().and_then(|v| v.try_into().ok()),
            bounding_box: self.bounding_box.as_deref().and_then(|v| v.try_into().ok()),
        }
    }

    fn policy(self: &Self) -> DownloadPolicy {
        DownloadPolicy {
            overwrite: self.overwrite,
            unzip: !self.no_unzip,
            delete_after_unzip: !self.no_delete,
        }
    }
}

async fn search(args: &Args, ctx: &RunContext) -> Result<Vec<FoundProduct>> {
    let requests = args.criteria().plan(&ctx.limits)?;
    let catalogue = EoCatalogue::new(reqwest::Client::new(), &ctx.osdd_url);
    let found = catalog::execute(&catalogue, requests, ctx).await?;

    info!("Files found: {}", found.len());
    let width = found.len().to_string().len();
    for (i, product) in found.iter().enumerate() {
        info!(" {:>width$}  {}", i + 1, product.identifier);
    }

    match args.select_file_at_index {
        Some(index) => {
            let position = selection::select_index(found.len(), index)?;
            info!("Selected file #{}: {}", position + 1, found[position].identifier);
            Ok(vec![found[position].clone()])
        }
        None => Ok(found),
    }
}

fn log_summary(summary: &DownloadSummary) {
    info!(
        "Downloaded: {}, extracted: {}, skipped: {}, failed: {}",
        summary.downloaded, summary.extracted, summary.skipped, summary.failed
    );
    if let Some(speed) = summary.mean_speed() {
        info!(
            "Transferred {:.2} MB at a mean speed of {:.2} MB/s",
            summary.bytes as f64 / 1e6,
            speed / 1e6
        );
    }
    info!("Total time: {:.1} s", summary.elapsed.as_secs_f64());
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = logging::init(logging::level(args.debug), args.log_file.as_deref())?;

    let config_path = args.path_to_config.clone().unwrap_or_else(config::default_path);
    let config = Config::read(&config_path)
        .with_context(|| format!("cannot load configuration from {}", config_path.display()))?;
    let data_directory = config::resolve_data_directory(args.data_directory.clone(), &config)?;
    let ctx = RunContext::new(&config);

    let plan = match &args.from_plan {
        Some(path) => DownloadPlan::read(path)
            .with_context(|| format!("cannot read download plan {}", path.display()))?,
        None => {
            let found = search(&args, &ctx).await?;
            if args.no_download {
                info!("Downloads skipped (--no_download)");
                return Ok(());
            }
            DownloadPlan::from_products(&found, &data_directory, !args.no_subdirs)?
        }
    };

    if let Some(path) = &args.write_plan {
        plan.write(path)?;
        info!("Download plan written to {}", path.display());
    }
    if plan.tasks().is_empty() {
        info!("Nothing to download");
        return Ok(());
    }

    let summary = plan.execute(&ctx, args.policy()).await;
    log_summary(&summary);
    Ok(())
}
