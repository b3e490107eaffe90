use anyhow::Result;
use clap::Parser;
use dredge_browser::WebDriverSession;
use dredge_captcha::Solver;
use dredge_common::observability::{init_logging, LogConfig};
use dredge_config::DredgeConfigLoader;
use dredge_http::ApiClient;
use dredge_scraper::Controller;
use dredge_store::Store;
use repl::Repl;
use std::path::PathBuf;
use tracing::warn;

mod command;
mod repl;

/// Interactive web scraping CLI with automatic CAPTCHA handling.
#[derive(Parser)]
#[command(name = "dredge", version)]
struct Args {
    /// Configuration file (YAML); missing file falls back to defaults +
    /// DREDGE_* environment variables.
    #[arg(long, default_value = "dredge.yaml")]
    config: PathBuf,

    /// Run the browser with a visible window.
    #[arg(long)]
    headed: bool,

    /// Duplicate log events to stderr.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DredgeConfigLoader::new().with_file(&args.config).load()?;
    if args.headed {
        config.browser.headless = false;
    }

    init_logging(LogConfig {
        emit_stderr: args.verbose,
        ..LogConfig::default()
    })?;

    let session = WebDriverSession::connect(&config.browser).await?;
    let solver = Solver::new(config.captcha.clone());
    let controller = Controller::new(session, solver, config.captcha.clone());
    let api = ApiClient::new()?;
    let store = Store::open(&config.store.database_path).await?;

    let mut repl = Repl::new(controller, api, store, config);
    let outcome = repl.run().await;

    if let Err(e) = repl.into_controller().into_session().close().await {
        warn!(error = %e, "browser close failed");
    }
    outcome
}
