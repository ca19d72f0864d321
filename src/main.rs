//! Binary entry point for mountstore.
//!
//! Runs item, property and access-control commands against one configured
//! repository mount.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command dispatch
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use mountstore::cli::Runner;
use mountstore::models::{ItemId, PropertyType};
use mountstore::observability::{self, LogFormat};
use mountstore::{MountConfig, connect};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

/// Mountstore - uniform access to WebDAV, git, `SQLite` and index repositories.
#[derive(Parser)]
#[command(name = "mountstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the mount configuration file.
    #[arg(short, long, global = true, env = "MOUNTSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format (pretty or json).
    #[arg(long, global = true, default_value = "pretty", value_parser = parse_log_format)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the content of a leaf.
    Get {
        /// Item path.
        id: ItemId,
    },

    /// Write a leaf from a file or stdin.
    Put {
        /// Item path.
        id: ItemId,

        /// Read content from this file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the children of a collection.
    Ls {
        /// Collection path.
        #[arg(default_value = "/")]
        id: ItemId,
    },

    /// Create a collection.
    Mkdir {
        /// Collection path.
        id: ItemId,

        /// Create missing parent collections.
        #[arg(short, long)]
        parents: bool,
    },

    /// Delete an item and its subtree.
    Rm {
        /// Item path.
        id: ItemId,
    },

    /// Move an item.
    Mv {
        /// Source path.
        from: ItemId,
        /// Destination path.
        to: ItemId,
    },

    /// Copy an item.
    Cp {
        /// Source path.
        from: ItemId,
        /// Destination path.
        to: ItemId,
    },

    /// Show the properties of an item.
    Props {
        /// Item path.
        id: ItemId,

        /// Properties to show (all when omitted).
        names: Vec<String>,
    },

    /// Store a property.
    SetProp {
        /// Item path.
        id: ItemId,
        /// Property identifier.
        name: String,
        /// Property value.
        value: String,

        /// Value type; inferred when omitted.
        #[arg(short = 't', long = "type", value_parser = parse_property_type)]
        ty: Option<PropertyType>,
    },

    /// Remove properties.
    DelProp {
        /// Item path.
        id: ItemId,

        /// Properties to remove.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Search items by property conditions.
    Search {
        /// Conditions: `p=v`, `p~text`, `p*=pattern`, `p>=v`, `p<=v`.
        #[arg(required = true)]
        conditions: Vec<String>,

        /// Match any condition instead of all of them.
        #[arg(long)]
        any: bool,
    },

    /// Show or edit the access-control list of an item.
    Acl {
        /// Item path.
        id: ItemId,

        /// Grant privileges, e.g. `user:alice=read,write`.
        #[arg(long)]
        grant: Vec<String>,

        /// Deny privileges, e.g. `all=write`.
        #[arg(long)]
        deny: Vec<String>,

        /// Replace the list instead of editing it.
        #[arg(long)]
        clear: bool,
    },
}

fn parse_log_format(s: &str) -> std::result::Result<LogFormat, String> {
    LogFormat::parse(s).ok_or_else(|| format!("unknown log format '{s}' (expected pretty or json)"))
}

fn parse_property_type(s: &str) -> std::result::Result<PropertyType, String> {
    PropertyType::parse(s).ok_or_else(|| format!("unknown property type '{s}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = observability::init(cli.verbose, cli.log_format) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads the mount configuration from the given path or the default location.
fn load_config(path: Option<PathBuf>) -> Result<MountConfig> {
    let path = path
        .or_else(MountConfig::default_path)
        .context("no configuration file given and no default location available")?;
    let config = MountConfig::load_from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(config.with_env_overrides())
}

/// Connects the mount and runs the selected command.
fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config)?;
    let mount = connect(&config).with_context(|| format!("failed to mount '{}'", config.name))?;
    let runner = Runner::new(&mount);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Get { id } => runner.items().get(&id, &mut out)?,
        Commands::Put { id, file } => {
            let mut input: Box<dyn Read> = match file {
                Some(path) => Box::new(
                    std::fs::File::open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))?,
                ),
                None => Box::new(std::io::stdin().lock()),
            };
            runner.items().put(&id, &mut input)?;
        },
        Commands::Ls { id } => runner.items().ls(&id, &mut out)?,
        Commands::Mkdir { id, parents } => runner.items().mkdir(&id, parents)?,
        Commands::Rm { id } => runner.items().rm(&id)?,
        Commands::Mv { from, to } => runner.items().mv(&from, &to)?,
        Commands::Cp { from, to } => runner.items().cp(&from, &to)?,
        Commands::Props { id, names } => runner.props().props(&id, &names, &mut out)?,
        Commands::SetProp {
            id,
            name,
            value,
            ty,
        } => runner.props().set_prop(&id, &name, &value, ty)?,
        Commands::DelProp { id, names } => runner.props().del_prop(&id, &names)?,
        Commands::Search { conditions, any } => {
            runner.props().search(&conditions, any, &mut out)?;
        },
        Commands::Acl {
            id,
            grant,
            deny,
            clear,
        } => {
            if grant.is_empty() && deny.is_empty() && !clear {
                runner.acl().show(&id, &mut out)?;
            } else {
                runner.acl().edit(&id, &grant, &deny, clear)?;
            }
        },
    }

    mount.disconnect();
    Ok(())
}
