//! cdx-export - deduplicated Common Crawl index exports through Athena.

mod cli;
mod handlers;

use cdx_export::logging;
use cli::Cli;
use tracing::error;

#[tokio::main]
async fn main() {
    // AWS credentials may come from a local .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = handlers::run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}
