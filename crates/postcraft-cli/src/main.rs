mod config;
mod renderer;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use postcraft::pipeline::Pipeline;
use postcraft::roles::DEFAULT_MODEL;
use tracing_subscriber::EnvFilter;

use session::Session;

#[derive(Parser)]
#[command(author, version, about = "Turn a topic into a short social post", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// OpenAI API key (can also be set via OPENAI_API_KEY environment variable)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// OpenAI-compatible host (can also be set via OPENAI_HOST environment variable)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Search API key (can also be set via PERPLEXITY_API_KEY environment variable)
    #[arg(long, global = true)]
    search_api_key: Option<String>,

    /// Model used by every role
    #[arg(short, long, default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Render the finished post as markdown instead of streaming it
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write one post about a topic and exit
    Generate {
        /// What the post should be about
        topic: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let pipeline = Pipeline::from_configs(
        config::provider_config(cli.api_key.as_deref(), cli.host.as_deref())?,
        config::search_config(cli.search_api_key.as_deref())?,
        &cli.model,
    )?;
    let mut session = Session::new(pipeline, cli.pretty);

    match cli.command {
        Some(Command::Generate { topic }) => session.headless_start(&topic).await,
        None => session.start().await,
    }
}
