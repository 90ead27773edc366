#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use noderef_core::config::{InstallSource, RefreshConfig};
use noderef_core::Config;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "noderef")]
#[command(author, version, about = "Refresh the local n8n node registry cache", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the run summary as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(flatten)]
    refresh: RefreshArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug, Default)]
struct RefreshArgs {
    /// Directory the cache artifacts are written to
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Official node catalog endpoint
    #[arg(long, value_name = "URL")]
    official_url: Option<String>,

    /// Community node catalog endpoint
    #[arg(long, value_name = "URL")]
    community_url: Option<String>,

    /// Records requested per official catalog page
    #[arg(long, value_name = "N")]
    page_size: Option<u32>,

    /// Use an existing node_modules directory instead of installing
    #[arg(long, value_name = "DIR", conflicts_with = "npm_install")]
    packages_dir: Option<PathBuf>,

    /// Install plugin packages with npm (dependencies included)
    #[arg(long)]
    npm_install: bool,

    /// Never load node files; read versions from source text only
    #[arg(long)]
    no_dynamic: bool,

    /// Node binary used for dynamic probing
    #[arg(long, value_name = "PATH")]
    node: Option<PathBuf>,
}

impl RefreshArgs {
    /// Flags win over the config file and environment.
    fn apply(self, config: &mut RefreshConfig, cwd: &Path) {
        if let Some(out) = self.out {
            config.out_dir = cwd.join(out);
        }
        if let Some(url) = self.official_url {
            config.official_url = url;
        }
        if let Some(url) = self.community_url {
            config.community_url = url;
        }
        if let Some(size) = self.page_size {
            config.page_size = size;
        }
        if let Some(dir) = self.packages_dir {
            config.install = InstallSource::Existing(cwd.join(dir));
        } else if self.npm_install {
            config.install = InstallSource::Npm;
        }
        if self.no_dynamic {
            config.dynamic = false;
        }
        if let Some(node) = self.node {
            config.node_binary = Some(cwd.join(node));
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    if matches!(cli.command, Some(Commands::Version)) {
        return commands::version::run();
    }

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json_logs);
    logging::init(config.verbosity, config.json_logs);

    let mut refresh = RefreshConfig::load(&config.cwd).into_diagnostic()?;
    cli.refresh.apply(&mut refresh, &config.cwd);

    commands::refresh::run(&config, &refresh, cli.json)
}
