#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use diamond_core::version::version_string;
use diamond_core::{Config, InstallOptions};
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "diamond")]
#[command(author, version, about = "A package manager for stylesheet libraries", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Install packages (or everything in package.json when none are given)
    #[command(visible_alias = "i")]
    Install {
        /// Package specifiers, e.g. `bourbon`, `npm:bootstrap@4.x`, `owner/repo#ref`
        specs: Vec<String>,

        /// Do not record installed packages in package.json
        #[arg(long)]
        no_save: bool,

        /// Bypass the package cache
        #[arg(long)]
        no_cache: bool,

        /// Install from the package cache only
        #[arg(long)]
        offline: bool,
    },

    /// Compile a stylesheet with installed packages on the load path
    #[command(visible_alias = "c")]
    Compile {
        /// Entry stylesheet
        file: PathBuf,

        /// Emit compressed CSS
        #[arg(short, long)]
        minify: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => {
            println!("{}", version_string());
            Ok(())
        }
        Some(Commands::Install {
            specs,
            no_save,
            no_cache,
            offline,
        }) => {
            let span = tracing::info_span!("install", cmd = "install", cwd = %config.cwd.display());
            let _guard = span.enter();
            let action = commands::install::InstallAction {
                cwd: config.cwd.clone(),
                specs,
                options: InstallOptions {
                    cache: !no_cache,
                    offline,
                    save: !no_save,
                },
            };
            commands::install::run(action, cli.json)
        }
        Some(Commands::Compile { file, minify }) => {
            let span = tracing::info_span!("compile", cmd = "compile", cwd = %config.cwd.display());
            let _guard = span.enter();
            let action = commands::compile::CompileAction {
                cwd: config.cwd.clone(),
                file,
                minify,
            };
            commands::compile::run(action, cli.json)
        }
    }
}
