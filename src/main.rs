//! Scholar Agent - command line entry point
//!
//! Answers one question, streaming each reasoning and tool step to stdout.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use scholar_agent::agent::{build_system_prompt, AgentController, AgentUpdate};
use scholar_agent::config::Config;
use scholar_agent::llm::OpenAiCompatibleClient;
use scholar_agent::tools::{GraphClient, ToolRegistry};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "scholar-agent", version, about = "Ask the research agent a question")]
struct Cli {
    /// Question to answer
    question: String,

    /// Conversation id; defaults to a fresh UUID
    #[arg(long)]
    run_id: Option<String>,

    /// Print updates as JSON lines instead of text
    #[arg(long)]
    json: bool,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Wall-clock budget in seconds
    #[arg(long)]
    max_execution_time: Option<f64>,

    /// Per-attempt tool timeout in seconds (0 disables it)
    #[arg(long)]
    tool_timeout: Option<f64>,

    #[arg(long)]
    max_tool_retries: Option<u32>,

    #[arg(long)]
    max_workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for answers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scholar_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Loaded configuration: model={}", config.default_model);

    let mut agent_config = config.agent.clone();
    if let Some(n) = cli.max_iterations {
        agent_config = agent_config.with_max_iterations(n);
    }
    if let Some(secs) = cli.max_execution_time {
        agent_config = agent_config.with_max_execution_time(secs);
    }
    if let Some(secs) = cli.tool_timeout {
        agent_config = agent_config.with_tool_execution_timeout(secs);
    }
    if let Some(n) = cli.max_tool_retries {
        agent_config = agent_config.with_max_tool_retries(n);
    }
    if let Some(n) = cli.max_workers {
        agent_config = agent_config.with_max_workers(n);
    }

    let mut tools = ToolRegistry::with_arithmetic();
    let graph = match &config.graph {
        Some(graph_config) => {
            let client = Arc::new(GraphClient::new(
                &graph_config.uri,
                graph_config.username.clone(),
                graph_config.password.clone(),
                &graph_config.database,
            ));
            client.verify_connectivity().await?;
            info!("Connected to graph database at {}", graph_config.uri);
            tools.register_graph_tools(client.clone());
            Some(client)
        }
        None => {
            info!("NEO4J_URI not set; graph tools disabled");
            None
        }
    };

    if agent_config.system_message.is_none() {
        agent_config = agent_config.with_system_message(build_system_prompt(&tools));
    }

    let llm = Arc::new(OpenAiCompatibleClient::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.default_model.clone(),
    ));
    let agent = AgentController::new(llm, tools, agent_config)?;

    let run_id = cli
        .run_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = print_run(&agent, &cli.question, &run_id, cli.json).await;

    agent.shutdown().await;
    if let Some(graph) = graph {
        graph.close();
    }

    result
}

async fn print_run(
    agent: &AgentController,
    question: &str,
    run_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let mut stream = Box::pin(agent.stream(question, run_id));

    while let Some(update) = stream.next().await {
        let update: AgentUpdate = update?;
        if json {
            writeln!(stdout, "{}", serde_json::to_string(&update)?)?;
        } else {
            write!(stdout, "{}", update.render())?;
        }
        stdout.flush()?;
    }

    Ok(())
}
