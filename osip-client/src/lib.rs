//! OSIP client library
//!
//! This library provides the core functionality for the `osip` CLI tool.

pub mod commands;
pub mod output;

use clap::Args;
use std::path::PathBuf;

// Re-export command handlers
pub use crate::commands::{
    inspect::handle as handle_inspect, table::check as handle_check,
    update::handle as handle_update,
};

/// Arguments for `osip update`.
///
/// A stitched image flash and explicit descriptor fields can be combined;
/// the image is flashed first, then the field patch is applied.
#[derive(Args)]
pub struct UpdateArgs {
    /// Descriptor slot to update (0 = payload OS, 1 = provisioning OS)
    pub slot: usize,

    /// Stitched image to flash (*.bin)
    #[arg(short = 'g', long)]
    pub image: Option<PathBuf>,

    /// OS revision, major part
    #[arg(short = 'm', long)]
    pub rev_major: Option<u16>,

    /// OS revision, minor part
    #[arg(short = 'n', long)]
    pub rev_minor: Option<u16>,

    /// Logical start block of the image
    #[arg(short = 'l', long)]
    pub lba: Option<u32>,

    /// DDR load address
    #[arg(short = 'a', long)]
    pub addr: Option<u32>,

    /// Entry point
    #[arg(short = 'e', long)]
    pub entry: Option<u32>,

    /// Image size in device pages
    #[arg(short = 's', long)]
    pub size: Option<u32>,

    /// Attribute tag
    #[arg(short = 't', long)]
    pub attrib: Option<u8>,
}

/// Arguments for `osip invalidate`.
#[derive(Args)]
pub struct InvalidateArgs {
    /// Attribute tag of a descriptor to invalidate (repeatable)
    #[arg(short = 'i', long = "attribute", required = true)]
    pub attributes: Vec<u8>,

    /// Back up the primary table first; invalidation refuses to run
    /// without a backup taken in the same invocation
    #[arg(short, long)]
    pub backup_first: bool,
}

/// Arguments for `osip inspect`.
#[derive(Args)]
pub struct InspectArgs {
    /// Descriptor slot whose payload region to dump
    pub slot: usize,

    /// Number of bytes to dump from the head of the region
    #[arg(long, default_value_t = 256)]
    pub length: usize,
}

/// Output format options for the CLI
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

/// Context for command execution
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// Block device override; the platform default when unset
    pub device: Option<PathBuf>,
    /// Output format
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_debug() {
        assert_eq!(format!("{:?}", OutputFormat::Text), "Text");
        assert_eq!(format!("{:?}", OutputFormat::Json), "Json");
        assert_eq!(format!("{:?}", OutputFormat::JsonPretty), "JsonPretty");
    }
}
