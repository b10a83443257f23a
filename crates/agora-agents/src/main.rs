use std::path::{Path, PathBuf};
use std::sync::Arc;

use agora_coordination::{
    AgentRegistry, DiscussionCoordinator, EventBus, ExportFormat, GameEngine, SessionConfig, SessionEvent,
    SessionExport,
};
use agora_agents::{check_endpoint, ClientConfig, OllamaClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "agora", about = "Run multi-agent discussions and Mafia games against an Ollama model")]
struct Cli {
    /// TOML session config. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the finished session as json, text, or html.
    #[arg(long, global = true)]
    export: Option<ExportFormat>,

    /// Directory for exports.
    #[arg(long, global = true, default_value = ".")]
    out: PathBuf,

    #[arg(long, global = true)]
    unrestricted: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discuss a topic until the configured number of summaries is accepted.
    Discuss {
        #[arg(long)]
        topic: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long)]
        exchange_rounds: Option<u32>,
        /// Agent ids to enable, e.g. network1,network3. Defaults to the roster's.
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
        /// Extra instructions for the synthesizer.
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Play one Mafia game.
    Mafia {
        #[arg(long)]
        players: Option<usize>,
        #[arg(long)]
        mafia: Option<usize>,
        #[arg(long)]
        doctor: Option<usize>,
        #[arg(long)]
        sheriff: Option<usize>,
        #[arg(long)]
        detective: Option<usize>,
        /// Discussion rounds per day.
        #[arg(long)]
        rounds: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::MessageAppended {
            display_name,
            content,
            fallback,
            timestamp,
            ..
        } => {
            let time = timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
            let marker = if *fallback { " (fallback)" } else { "" };
            println!("[{}] {}{}: {}\n", time, display_name, marker, content);
        }
        SessionEvent::PhaseChanged { from, to, reason, .. } => {
            println!("── {} → {} ({}) ──\n", from, to, reason);
        }
        SessionEvent::SummaryAccepted { iteration, forced, .. } => {
            let how = if *forced { "force-accepted" } else { "accepted" };
            println!("** Summary for iteration {} {} **\n", iteration, how);
        }
        SessionEvent::SummaryRejected { iteration, rejections, .. } => {
            println!("** Summary for iteration {} rejected ({} in a row) **\n", iteration, rejections);
        }
        SessionEvent::PlayerEliminated { .. } | SessionEvent::GameOver { .. } => {}
    }
}

fn write_export(export: &SessionExport, format: Option<ExportFormat>, out: &Path) -> Result<()> {
    let Some(format) = format else {
        return Ok(());
    };
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let path = export
        .write_to(out, format)
        .context("Failed to write session export")?;
    info!(path = %path.display(), "Session exported");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config.unrestricted_mode |= cli.unrestricted;

    let client_config = ClientConfig::default();
    info!(url = %client_config.url, model = %client_config.model, "agora starting");
    if !check_endpoint(&client_config.url).await {
        warn!(url = %client_config.url, "Ollama endpoint not reachable; turns will use fallback text");
    }
    let client = Arc::new(OllamaClient::new(client_config).context("Failed to build Ollama client")?);

    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match cli.command {
        Command::Discuss {
            topic,
            description,
            iterations,
            exchange_rounds,
            agents,
            instructions,
        } => {
            config.discussion.topic_name = topic;
            config.discussion.topic_description = description;
            if let Some(n) = iterations {
                config.discussion.max_iterations = n;
            }
            if let Some(n) = exchange_rounds {
                config.discussion.exchange_rounds = n;
            }
            if let Some(text) = instructions {
                config.discussion.synthesizer_instructions = text;
            }

            let mut registry = AgentRegistry::with_default_roster();
            if !agents.is_empty() {
                let ids: Vec<String> = registry
                    .discussion_order()
                    .iter()
                    .map(|a| a.id.clone())
                    .collect();
                for id in ids {
                    registry.set_enabled(&id, false)?;
                }
                for id in &agents {
                    registry
                        .set_enabled(id, true)
                        .with_context(|| format!("Cannot enable agent {}", id))?;
                }
            }

            let mut coordinator = DiscussionCoordinator::new(&config, registry, client)
                .context("Invalid discussion configuration")?
                .with_events(Arc::clone(&bus));
            coordinator.run().await.context("Discussion failed")?;

            if let Some(output) = coordinator.final_output() {
                println!("==== Final Output ====\n{}", output);
            }
            write_export(&coordinator.export(), cli.export, &cli.out)?;
        }
        Command::Mafia {
            players,
            mafia,
            doctor,
            sheriff,
            detective,
            rounds,
            seed,
        } => {
            let game = &mut config.game;
            game.player_count = players.unwrap_or(game.player_count);
            game.mafia_count = mafia.unwrap_or(game.mafia_count);
            game.doctor_count = doctor.unwrap_or(game.doctor_count);
            game.sheriff_count = sheriff.unwrap_or(game.sheriff_count);
            game.detective_count = detective.unwrap_or(game.detective_count);
            game.discussion_rounds = rounds.unwrap_or(game.discussion_rounds);
            if seed.is_some() {
                game.seed = seed;
            }

            let mut engine = GameEngine::new(&config, client)
                .context("Invalid game configuration")?
                .with_events(Arc::clone(&bus));
            let message = engine.run().await.context("Game failed")?.message.clone();
            println!("==== {} ====", message);
            write_export(&engine.export(), cli.export, &cli.out)?;
        }
    }

    drop(bus);
    printer.await.context("Event printer task panicked")?;
    Ok(())
}
