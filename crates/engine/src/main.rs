//! Chasm Engine - Main entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chasm_domain::{AccountName, CharacterName, Coords, ItemName};
use chasm_engine::infrastructure::config::AppConfig;
use chasm_engine::stores::{NarrativeRange, PlaceDeletePolicy};
use chasm_engine::use_cases::SchedulerError;
use chasm_engine::App;

#[derive(Parser)]
#[command(
    name = "chasm",
    about = "Chasm - a persistent, simulated text world",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: server.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by the per-entity commands.
#[derive(clap::Args)]
struct EditArgs {
    /// Delete the entity
    #[arg(long, conflicts_with = "from")]
    delete: bool,

    /// Replace the entity with the JSON in FILE
    #[arg(long, value_name = "FILE")]
    from: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulation until interrupted
    Serve,

    /// List account names
    Accounts,

    /// List character names
    Characters,

    /// Show, replace or delete an account
    Account {
        name: String,
        #[command(flatten)]
        edit: EditArgs,
    },

    /// Show, replace or delete a character
    Character {
        name: String,
        #[command(flatten)]
        edit: EditArgs,
    },

    /// Show, replace or delete an item
    Item {
        name: String,
        #[command(flatten)]
        edit: EditArgs,
    },

    /// Show, replace or delete a place
    #[command(allow_negative_numbers = true)]
    Place {
        x: i64,
        y: i64,
        #[command(flatten)]
        edit: EditArgs,

        /// When deleting, move occupants to X,Y instead of refusing
        #[arg(long, value_name = "X,Y", requires = "delete")]
        relocate_to: Option<Coords>,
    },

    /// Print a character's narrative
    Narrative {
        name: String,

        /// Only the newest N entries
        #[arg(short, long)]
        last: Option<u64>,
    },

    /// Describe what is at X Y
    #[command(allow_negative_numbers = true)]
    Look { x: i64, y: i64 },

    /// Print one configuration value
    Config { param: String },

    /// Queue player input for a character's next turn
    Input {
        name: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Append an operator note to a character's narrative
    Note {
        name: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

fn main() -> ExitCode {
    load_dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chasm_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<SchedulerError>().is_some() {
                tracing::error!(error = %e, "Simulation stopped on a fatal storage error");
            }
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    if let Command::Config { param } = &cli.command {
        let value = config
            .get(param)
            .with_context(|| format!("unknown config parameter '{param}'"))?;
        println!("{value}");
        return Ok(());
    }

    let app = App::from_config(config).await?;
    let editor = &app.editor;

    match cli.command {
        Command::Serve => serve(&app).await?,
        Command::Accounts => {
            for name in editor.accounts().await? {
                println!("{name}");
            }
        }
        Command::Characters => {
            for name in editor.characters().await? {
                println!("{name}");
            }
        }
        Command::Account { name, edit } => {
            let name = AccountName::new(name)?;
            if edit.delete {
                editor.delete_account(&name).await?;
            } else if let Some(path) = edit.from {
                editor.replace_account(&name, &read_json(&path)?).await?;
            } else {
                println!("{}", editor.show_account(&name).await?);
            }
        }
        Command::Character { name, edit } => {
            let name = CharacterName::new(name)?;
            if edit.delete {
                editor.delete_character(&name).await?;
            } else if let Some(path) = edit.from {
                editor.replace_character(&name, &read_json(&path)?).await?;
            } else {
                println!("{}", editor.show_character(&name).await?);
            }
        }
        Command::Item { name, edit } => {
            let name = ItemName::new(name)?;
            if edit.delete {
                editor.delete_item(&name).await?;
            } else if let Some(path) = edit.from {
                editor.replace_item(&name, &read_json(&path)?).await?;
            } else {
                println!("{}", editor.show_item(&name).await?);
            }
        }
        Command::Place {
            x,
            y,
            edit,
            relocate_to,
        } => {
            let coords = Coords::new(x, y);
            if edit.delete {
                let policy = match relocate_to {
                    Some(to) => PlaceDeletePolicy::RelocateTo(to),
                    None => PlaceDeletePolicy::Reject,
                };
                editor.delete_place(coords, policy).await?;
            } else if let Some(path) = edit.from {
                editor.replace_place(coords, &read_json(&path)?).await?;
            } else {
                println!("{}", editor.show_place(coords).await?);
            }
        }
        Command::Narrative { name, last } => {
            let name = CharacterName::new(name)?;
            let range = match last {
                Some(n) => NarrativeRange::Last(n),
                None => NarrativeRange::All,
            };
            let transcript = editor.narrative(&name, range).await?;
            if !transcript.is_empty() {
                println!("{transcript}");
            }
        }
        Command::Look { x, y } => {
            println!("{}", editor.look(Coords::new(x, y)).await?);
        }
        Command::Input { name, text } => {
            let name = CharacterName::new(name)?;
            editor.submit_input(&name, &text.join(" ")).await?;
        }
        Command::Note { name, text } => {
            let name = CharacterName::new(name)?;
            editor.annotate(&name, &text.join(" ")).await?;
        }
        Command::Config { .. } => {}
    }

    Ok(())
}

async fn serve(app: &App) -> Result<(), SchedulerError> {
    tracing::info!(
        storage = ?app.config.storage,
        behavior = ?app.config.behavior,
        "Starting Chasm Engine"
    );

    let scheduler = app.scheduler();
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    scheduler.run(cancel).await?;
    tracing::info!("Shut down cleanly");
    Ok(())
}

/// Cancel on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown requested; finishing the current tick");
    cancel.cancel();
}

fn read_json(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Prefer local overrides, then `.env`.
fn load_dotenv() {
    for filename in [".env.local", ".env"] {
        let _ = dotenvy::from_filename(filename);
    }
}
