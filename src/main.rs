use anyhow::Result;
use clap::Parser;
use tracing::info;

use pricewatch::config::AppConfig;
use pricewatch::mailer::Mailer;
use pricewatch::runner::Runner;

#[derive(Parser, Debug)]
#[command(name = "pricewatch", version, about = "Retailer price tracking with drop alerts")]
struct Cli {
    /// Send the weekly summary email after the scrape pass
    #[arg(long)]
    weekly: bool,

    /// Send a canned sample alert and exit without scraping
    #[arg(long)]
    test: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pricewatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Nothing meaningful can run without configuration; failures here are fatal.
    let config = AppConfig::load()?;

    if cli.test {
        Mailer::new(config.email.clone()).send_drop_alerts(&[Mailer::sample_event()])?;
        info!("Test email sent.");
        return Ok(());
    }

    Runner::new(config)?.run(cli.weekly).await?;
    Ok(())
}
