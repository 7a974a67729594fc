use anyhow::{Context, Result};
use business_assistant::assistant::BusinessAssistant;
use business_assistant::config::AssistantConfig;
use business_assistant::data::Dataset;
use business_assistant::llm::{complete_lossy, CompletionRequest, LlmClient};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "business-assistant")]
#[command(about = "Answer business questions about merchant payment transactions")]
struct Args {
    /// Transactions CSV (or set ASSISTANT_DATA_PATH)
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    /// Model id (or set ASSISTANT_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question about one merchant's transactions
    Ask {
        #[arg(short, long)]
        merchant: String,

        question: String,
    },
    /// Print the dashboard cards for one merchant
    Summary {
        #[arg(short, long)]
        merchant: String,
    },
    /// Send one raw prompt to the model
    Complete {
        prompt: String,

        #[arg(long, default_value = "You are a helpful assistant.")]
        system: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AssistantConfig::from_env().context("invalid configuration")?;
    if let Some(path) = args.data_path {
        config.data_path = path;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    let config = config.validate()?;

    match args.command {
        Command::Ask { merchant, question } => {
            let assistant = BusinessAssistant::from_config(config)?;
            let response = assistant.handle_query(&question, &merchant).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Summary { merchant } => {
            info!("Summarizing merchant '{}' from {}", merchant, config.data_path.display());
            let summary = Dataset::load(&config.data_path)?
                .filter_by_merchant(&merchant)?
                .summary()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Complete { prompt, system } => {
            let client = LlmClient::from_config(&config)?;
            let request = CompletionRequest::new(system, prompt, &config.model);
            println!("{}", complete_lossy(&client, &request).await);
        }
    }

    Ok(())
}
