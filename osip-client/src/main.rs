use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use osip_client::{CommandContext, InspectArgs, InvalidateArgs, OutputFormat, UpdateArgs, commands};

#[derive(Parser)]
#[command(
    name = "osip",
    about = "Manage the OSIP descriptor table and OS images on a raw block device",
    version,
    long_about = "A command-line tool for the OSIP (OS Image Profile) partition-descriptor \
                  table: dump and back up the table, restore it after a failed update, \
                  invalidate entries, and flash stitched OS images."
)]
struct Cli {
    /// Set the logging level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Block device to manage (defaults to the platform device node)
    #[arg(short, long, global = true)]
    device: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print both descriptor tables without touching the device
    Check,

    /// Copy the primary table into the backup region
    Backup,

    /// Restore the primary table from the backup region
    Restore,

    /// Flash a stitched image into a slot and/or patch descriptor fields
    Update(UpdateArgs),

    /// Invalidate descriptors by attribute tag (requires a prior backup)
    Invalidate(InvalidateArgs),

    /// Hexdump the head of a slot's payload region
    Inspect(InspectArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    let ctx = CommandContext {
        device: cli.device,
        format: cli.format,
    };

    // Handle commands
    match cli.command {
        Commands::Check => commands::table::check(&ctx)?,
        Commands::Backup => commands::table::backup(&ctx)?,
        Commands::Restore => commands::table::restore(&ctx)?,
        Commands::Update(args) => commands::update::handle(&args, &ctx)?,
        Commands::Invalidate(args) => commands::table::invalidate(&args, &ctx)?,
        Commands::Inspect(args) => commands::inspect::handle(&args, &ctx)?,
    }

    Ok(())
}
