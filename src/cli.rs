//! CLI argument parsing

use crate::backends;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the MTD argument
fn mtd_help() -> String {
    format!(
        "MTD backend to mount [available: {}]",
        backends::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "rftl")]
#[command(
    author,
    version,
    about = "NAND flash translation layer block device tool",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Backend selection shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct MtdArgs {
    /// MTD backend, e.g. "dummy:erase_blocks=16,bad=3" or "linux_mtd:dev=0"
    #[arg(short, long, help = mtd_help())]
    pub mtd: String,

    /// Block device minor number
    #[arg(long, default_value_t = 0)]
    pub minor: u32,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show block device geometry and bad-block summary
    Info {
        #[command(flatten)]
        mtd: MtdArgs,
    },

    /// Show the logical to physical erase block map
    Map {
        #[command(flatten)]
        mtd: MtdArgs,
    },

    /// Read logical sectors to a file
    Read {
        #[command(flatten)]
        mtd: MtdArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// First logical sector (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        start: u32,

        /// Number of sectors (defaults to every mapped sector from --start)
        #[arg(long, value_parser = parse_hex_u32)]
        count: Option<u32>,
    },

    /// Write a file to logical sectors
    Write {
        #[command(flatten)]
        mtd: MtdArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// First logical sector (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        start: u32,

        /// Read the sectors back and compare after writing
        #[arg(long)]
        verify: bool,
    },

    /// Erase every good block of the medium
    EraseAll {
        #[command(flatten)]
        mtd: MtdArgs,
    },

    /// List available MTD backends
    ListBackends,

    /// List MTD devices known to the kernel
    #[cfg(feature = "linux-mtd")]
    ListMtds,
}
