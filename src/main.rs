use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use titanic_agent::agent_service::AgentService;
use titanic_agent::config::Config;
use titanic_agent::llm::LlmClient;
use titanic_agent::render::PlottersRenderer;
use titanic_agent::table::TabularStore;
use tracing::info;

#[derive(Parser)]
#[command(name = "titanic-agent")]
#[command(about = "Question answering agent for the Titanic passenger dataset")]
struct Args {
    /// The question in natural language
    question: String,

    /// Path to the passenger CSV (default: data/titanic.csv)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// API key for the LLM fallback (or set GROQ_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(data) = args.data {
        config.data_path = data;
    }
    if let Some(api_key) = args.api_key {
        config.api_key = api_key;
    }

    info!("Titanic agent starting...");
    info!("Question: {}", args.question);

    let store = Arc::new(TabularStore::load(&config.data_path)?);
    let service = AgentService::new(
        store,
        Arc::new(PlottersRenderer::default()),
        Arc::new(LlmClient::from_config(&config)),
    );

    let reply = service.run(&args.question).await?;

    println!("\n=== Answer ===");
    println!("{}", reply.answer);

    if let Some(chart) = reply.chart {
        let bytes = STANDARD.decode(chart.as_bytes())?;
        std::fs::write("chart.png", bytes)?;
        println!("Chart written to chart.png");
    }

    Ok(())
}
