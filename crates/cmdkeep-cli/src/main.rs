//! cmdkeep CLI - keep a searchable collection of shell commands
//!
//! Commands are stored in a local libSQL file and synced through a private
//! GitHub gist.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;
mod prompt;


use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, CommandEdits};
use crate::commands::export::run_export;
use crate::commands::favorite::run_favorite;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::sync::{
    run_sync, run_sync_conflicts, run_sync_link, run_sync_status, run_sync_unlink,
};
use crate::commands::use_command::run_use;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(error) if error.is_cancelled() => {
            eprintln!("Cancelled.");
        }
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cmdkeep=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Some(Commands::Add {
            command,
            prompt,
            description,
            tags,
        }) => {
            run_add(
                &command,
                prompt.as_deref(),
                description.as_deref(),
                &tags,
                &db_path,
            )
            .await?;
        }
        Some(Commands::List {
            limit,
            favorites,
            json,
        }) => run_list(limit, favorites, json, &db_path).await?,
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &db_path).await?;
        }
        Some(Commands::Edit {
            id,
            command,
            prompt,
            description,
            tags,
        }) => {
            let edits = CommandEdits {
                command,
                prompt,
                description,
                tags: (!tags.is_empty()).then_some(tags),
            };
            run_edit(&id, edits, &db_path).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Favorite { id }) => run_favorite(&id, &db_path).await?,
        Some(Commands::Use { id }) => run_use(&id, &db_path).await?,
        Some(Commands::Export { output }) => run_export(output.as_deref(), &db_path).await?,
        Some(Commands::Import { path, mode }) => {
            run_import(path.as_deref(), mode, &db_path).await?;
        }
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Sync { command, policy }) => match command {
            None => run_sync(policy.as_deref(), profile, &db_path).await?,
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, profile, &db_path).await?;
            }
            Some(SyncCommands::Status) => run_sync_status(profile, &db_path).await?,
            Some(SyncCommands::Link) => run_sync_link(profile, &db_path).await?,
            Some(SyncCommands::Unlink) => run_sync_unlink(profile, &db_path).await?,
        },
        Some(Commands::Config { command }) => run_config(command, profile)?,
        Some(Commands::Auth { command }) => run_auth(command, profile)?,
        None => {
            // Quick capture mode: cmdkeep git log --oneline
            if cli.quick.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.quick, None, None, &[], &db_path).await?;
            }
        }
    }

    Ok(())
}
