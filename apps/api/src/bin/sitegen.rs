//! Build CLI: reconciles the static-file adapter pair and regenerates the
//! listing splice plus one detail page per proposal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::sync::sitegen::{run, SiteBuild};

#[derive(Parser)]
#[command(
    name = "sitegen",
    about = "Reconcile proposal data files and regenerate static pages"
)]
struct Args {
    /// Directory holding proposals.json and proposals.js
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Directory holding the listing page and generated detail pages
    #[arg(long, env = "SITE_DIR", default_value = "./site")]
    site_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let summary = run(&SiteBuild {
        data_dir: args.data_dir,
        site_dir: args.site_dir,
    })
    .await;

    info!(
        "Wrote {} pages for {} proposals",
        summary.pages_written, summary.records
    );

    if summary.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        for failure in &summary.failures {
            eprintln!("sitegen: {failure}");
        }
        ExitCode::FAILURE
    }
}
