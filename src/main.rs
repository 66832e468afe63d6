use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use rolesync::commands::{self, SyncArgs, SyncOutcome};
use rolesync::config::{self, ConfigInput};
use rolesync::constants::{CONFIG_FILENAME, EXIT_CHANGES_PENDING};
use rolesync::error::exit_code_for;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct SyncCliArgs {
    /// Show what would be changed without changing anything
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Dry run, exiting with status 2 when changes are pending
    #[arg(long, short = 'C')]
    check: bool,

    #[command(flatten)]
    postgres_args: config::PostgresArgs,

    #[command(flatten)]
    directory_args: config::DirectoryArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize roles and privileges with the sync map
    Sync(SyncCliArgs),

    /// Print the managed roles and grants of the cluster as JSON
    Inspect {
        #[command(flatten)]
        postgres_args: config::PostgresArgs,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);

    let code = match run_main(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn" // default level
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_main(cli: Cli) -> Result<i32> {
    let (file_config, config_dir) = config::load_config(&cli.config_file)?;

    match cli.command {
        Commands::Sync(args) => {
            let cli_config = ConfigInput {
                postgres: Some(args.postgres_args.into()),
                directory: Some(args.directory_args.into()),
                ..Default::default()
            };

            let config = config::ConfigBuilder::new()
                .with_file(file_config, &config_dir)
                .with_cli_args(cli_config)
                .resolve()?;

            let sync_args = SyncArgs {
                dry_run: args.dry_run,
                check: args.check,
            };

            info!("Starting synchronization");
            match commands::cmd_sync(&config, sync_args).await? {
                SyncOutcome::Pending(_) if args.check => Ok(EXIT_CHANGES_PENDING),
                _ => Ok(0),
            }
        }
        Commands::Inspect { postgres_args } => {
            let cli_config = ConfigInput {
                postgres: Some(postgres_args.into()),
                ..Default::default()
            };

            let config = config::ConfigBuilder::new()
                .with_file(file_config, &config_dir)
                .with_cli_args(cli_config)
                .resolve()?;

            commands::cmd_inspect(&config).await?;
            Ok(0)
        }
    }
}
