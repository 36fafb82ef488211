use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mea-cli")]
#[command(about = "Macroeconomic indicator pipeline command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full extract-transform-load-rank pipeline once.
    Run,
    /// Apply the indicator_info schema migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = mea_pipeline::run_pipeline_from_env().await?;
            println!(
                "pipeline complete: run_id={} csv_rows={} local={} remote={} loaded={} failed={} ranked={}",
                summary.run_id,
                summary.csv_rows,
                summary.local_records,
                summary.remote_records,
                summary.rows_loaded,
                summary.load_failures,
                summary.rows_ranked
            );
        }
        Commands::Migrate => {
            let config = mea_pipeline::PipelineConfig::from_env();
            let pool = mea_store::connect(&config.database_url).await?;
            let outcome = mea_store::run_migrations(&pool).await;
            pool.close().await;
            outcome?;
            println!("migrations applied");
        }
    }

    Ok(())
}
