//! Quick Memo CLI - categorized notes from the terminal
//!
//! Quick capture with minimal friction, plus sign-in and reconciliation with
//! a shared remote store.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::arrange::{run_copy, run_move, run_reorder};
use crate::commands::auth_cmd::run_auth;
use crate::commands::category::run_category;
use crate::commands::common::Context;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_done, run_edit};
use crate::commands::export::{run_export, run_import};
use crate::commands::list::{run_list, ListOptions};
use crate::commands::sync::run_sync;
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "memo=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .map(|filter| match DEFAULT_LOG_DIRECTIVE.parse::<Directive>() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell, output }) = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let ctx = Context::resolve(cli.db_path, cli.remote_path)?;

    match cli.command {
        Some(Commands::Add { category, text }) => run_add(&text, &category, &ctx).await?,
        Some(Commands::List {
            sort,
            category,
            hide_completed,
            show_completed,
            json,
        }) => run_list(
            ListOptions {
                sort: sort.map(Into::into),
                category,
                hide_completed,
                show_completed,
                as_json: json,
            },
            &ctx,
        )?,
        Some(Commands::Edit { id, text }) => run_edit(&id, &text, &ctx).await?,
        Some(Commands::Done { id }) => run_done(&id, &ctx).await?,
        Some(Commands::Delete { id }) => run_delete(&id, &ctx).await?,
        Some(Commands::Move { id, category }) => run_move(&id, &category, &ctx).await?,
        Some(Commands::Copy { id, category }) => run_copy(&id, &category, &ctx).await?,
        Some(Commands::Reorder { id, position }) => run_reorder(&id, position, &ctx).await?,
        Some(Commands::Category { command }) => run_category(command, &ctx).await?,
        Some(Commands::Export { format, output }) => {
            run_export(format, output.as_deref(), &ctx)?;
        }
        Some(Commands::Import { path }) => run_import(&path, &ctx).await?,
        Some(Commands::Sync { command, volume }) => run_sync(command, volume, &ctx).await?,
        Some(Commands::Config { command }) => run_config(command, &ctx)?,
        Some(Commands::Auth { command }) => run_auth(command, &ctx).await?,
        Some(Commands::Completions { .. }) => {}
        None => {
            // Quick capture mode: memo "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, &cli.category, &ctx).await?;
            }
        }
    }

    Ok(())
}
