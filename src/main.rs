use anyhow::Result;
use clap::Parser;
use cloudmod::{
    application::SessionContext,
    backend::{BackendKind, InstallScope},
    commands::{
        self,
        config::{Config, ConfigOverrides},
        services::{build_context, build_shell},
    },
    runtime::{RealRuntime, Runtime},
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// cloudmod - keep cloud administration PowerShell modules current
///
/// Lists, updates and prunes the PowerShell modules used to administer
/// Microsoft 365 and Azure, through PowerShellGet or PSResourceGet,
/// whichever is installed.
///
/// Examples:
///   cloudmod list            # Compare installed modules with the gallery
///   sudo cloudmod update     # Update outdated modules, remove old versions
#[derive(Parser, Debug)]
#[command(author, version = env!("CLOUDMOD_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Module catalog file (overrides defaults; also via CLOUDMOD_CATALOG)
    #[arg(long, env = "CLOUDMOD_CATALOG", value_name = "PATH", global = true)]
    pub catalog: Option<PathBuf>,

    /// Package tooling to use instead of probing (legacy or modern)
    #[arg(long, value_name = "KIND", global = true)]
    pub backend: Option<BackendKind>,

    /// Install scope for new installs (current-user or all-users)
    #[arg(long, value_name = "SCOPE", global = true)]
    pub scope: Option<InstallScope>,

    /// Consider prerelease versions
    #[arg(long = "pre", global = true)]
    pub prerelease: bool,

    /// Do not ask for confirmation
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Show installed catalog modules and whether they are outdated
    List(ListArgs),

    /// Update outdated modules and remove the versions they replace
    Update,

    /// Remove all but the newest version of each installed module
    Clean,

    /// Choose interactively which modules to install or remove
    Select(SelectArgs),

    /// Print the module catalog
    Catalog,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Also list catalog modules that are not installed
    #[arg(long)]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct SelectArgs {
    /// Number of grid columns
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub columns: usize,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            catalog: self.catalog.clone(),
            backend: self.backend,
            scope: self.scope,
            prerelease: self.prerelease,
            assume_yes: self.yes,
        }
    }

    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let runtime: Arc<dyn Runtime> = Arc::new(RealRuntime);
    let config = Config::load(runtime.as_ref(), cli.overrides())?;
    let mut stdout = io::stdout();

    match cli.command {
        Commands::Catalog => commands::catalog(&config.catalog, &mut stdout)?,
        Commands::List(args) => {
            let ctx = connect(runtime, config).await?;
            commands::list(&ctx, args.all, &mut stdout).await?
        }
        Commands::Update => commands::update(&connect(runtime, config).await?, &mut stdout).await?,
        Commands::Clean => commands::clean(&connect(runtime, config).await?, &mut stdout).await?,
        Commands::Select(args) => {
            let ctx = connect(runtime, config).await?;
            commands::select(&ctx, args.columns, &mut stdout).await?
        }
    }
    Ok(())
}

/// Locate PowerShell and pick the package backend.
async fn connect(runtime: Arc<dyn Runtime>, config: Config) -> Result<SessionContext> {
    let shell = build_shell()?;
    Ok(build_context(runtime, shell, config).await)
}
