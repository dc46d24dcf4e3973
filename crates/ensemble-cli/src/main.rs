use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ensemble_core::orchestrator::{CollaborationEvent, CollaborationRequest};
use ensemble_core::{AgentFactory, ConfigLoader, Ensemble, EnsembleConfig};
use futures_util::StreamExt;
use log::LevelFilter;
use std::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Parser, Debug)]
#[clap(name = "ensemble", author, version = "0.1.0", about = "Multi-agent collaboration runner")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, default_value = "ensemble.yaml", help = "Path to the ensemble configuration")]
    config: String,

    #[clap(long, short, help = "Log level; overrides logging.level from the configuration")]
    log_level: Option<String>,

    #[clap(long, short, help = "Task for the agents to collaborate on")]
    task: Option<String>,

    #[clap(long, short, help = "Number of rounds; defaults to collaboration.max_rounds")]
    rounds: Option<usize>,

    #[clap(long, help = "Name of the coordinating agent; defaults to the first agent")]
    coordinator: Option<String>,

    #[clap(long, help = "Comma-separated agent names to include; defaults to all agents")]
    agents: Option<String>,

    #[clap(long, help = "Print events as they happen instead of after the run")]
    stream: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration, then list its agents
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    init_logging(&cli, &config)?;
    log::info!("Loaded configuration from {}", cli.config);

    match cli.command {
        Some(Commands::Validate) => validate(&config),
        None => run(&cli, &config).await,
    }
}

fn init_logging(cli: &Cli, config: &EnsembleConfig) -> Result<()> {
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let level_filter = level.parse().unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_filter);

    if let Some(path) = &config.logging.file {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn validate(config: &EnsembleConfig) -> Result<()> {
    println!("Configuration is valid ({} agents)", config.agents.len());
    for agent in &config.agents {
        if agent.description.is_empty() {
            println!("  - {}", agent.name);
        } else {
            println!("  - {}: {}", agent.name, agent.description);
        }
    }
    for server in config.enabled_mcp_servers() {
        println!("  mcp: {} ({})", server.name, server.command.run);
    }
    Ok(())
}

async fn run(cli: &Cli, config: &EnsembleConfig) -> Result<()> {
    let task = cli
        .task
        .clone()
        .ok_or_else(|| anyhow!("--task is required to run a collaboration"))?;

    let ensemble = AgentFactory::create_from_config(config).await?;
    let request = match build_request(cli, &ensemble, task).await {
        Ok(request) => request,
        Err(e) => {
            ensemble.shutdown().await;
            return Err(e);
        }
    };

    let mut stdout = tokio::io::stdout();
    execute(ensemble, request, cli.stream, &mut stdout).await
}

async fn build_request(
    cli: &Cli,
    ensemble: &Ensemble,
    task: String,
) -> Result<CollaborationRequest> {
    let participants = match &cli.agents {
        Some(names) => {
            let mut ids = Vec::new();
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let handle = ensemble
                    .registry
                    .find_by_name(name)
                    .await
                    .ok_or_else(|| anyhow!("No agent named '{}' in the configuration", name))?;
                ids.push(handle.id);
            }
            ids
        }
        None => ensemble.registry.ids().await,
    };

    let mut request = CollaborationRequest::new(participants, task);
    if let Some(name) = &cli.coordinator {
        let handle = ensemble
            .registry
            .find_by_name(name)
            .await
            .ok_or_else(|| anyhow!("No agent named '{}' to coordinate", name))?;
        request = request.with_coordinator(handle.id);
    }
    if let Some(rounds) = cli.rounds {
        request = request.with_max_rounds(rounds);
    }
    Ok(request)
}

/// Run the collaboration, write its events as JSON lines, then shut the ensemble down.
async fn execute<W>(
    ensemble: Ensemble,
    request: CollaborationRequest,
    stream: bool,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let outcome = emit_events(&ensemble, request, stream, out).await;
    ensemble.shutdown().await;
    outcome
}

async fn emit_events<W>(
    ensemble: &Ensemble,
    request: CollaborationRequest,
    stream: bool,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if stream {
        let mut events = ensemble
            .orchestrator
            .collaborate_stream(request)
            .await
            .map_err(|e| anyhow!("Collaboration failed: {}", e))?;
        while let Some(item) = events.next().await {
            let event = item.map_err(|e| anyhow!("Collaboration failed: {}", e))?;
            write_event(out, &event).await?;
        }
    } else {
        let events = ensemble
            .orchestrator
            .collaborate(request)
            .await
            .map_err(|e| anyhow!("Collaboration failed: {}", e))?;
        for event in &events {
            write_event(out, event).await?;
        }
    }
    Ok(())
}

async fn write_event<W>(out: &mut W, event: &CollaborationEvent) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ensemble_core::core_types::{LLMResponse, Message};
    use ensemble_core::llm::{ToolMetadata, LLM};
    use ensemble_core::EnsembleError;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    struct EchoLLM;

    #[async_trait]
    impl LLM for EchoLLM {
        async fn generate(
            &self,
            _messages: Vec<Message>,
            _tools: Option<Vec<ToolMetadata>>,
        ) -> Result<LLMResponse, EnsembleError> {
            Ok(LLMResponse::text("done"))
        }
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    const CONFIG: &str = r#"
agents:
  - name: Lead
  - name: Coder
"#;

    async fn ensemble() -> Ensemble {
        let config = ConfigLoader::from_str(CONFIG).unwrap();
        AgentFactory::create_with_llm(&config, Arc::new(EchoLLM))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_writes_one_json_line_per_event() {
        let ensemble = ensemble().await;
        let request = CollaborationRequest::new(ensemble.registry.ids().await, "Ship it")
            .with_max_rounds(1);

        let mut out = Vec::new();
        execute(ensemble, request, false, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 2 + 1 + 1);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["role"], "system");
    }

    #[tokio::test]
    async fn test_write_failure_still_shuts_down() {
        for stream in [false, true] {
            let ensemble = ensemble().await;
            let registry = ensemble.registry.clone();
            let request = CollaborationRequest::new(registry.ids().await, "Ship it")
                .with_max_rounds(1);

            let result = execute(ensemble, request, stream, &mut BrokenPipe).await;
            assert!(result.is_err());
            assert!(registry.is_empty().await);
        }
    }
}
