//! rftl - NAND flash translation layer block device tool
//!
//! Mounts the flash translation layer on an MTD backend and exposes the
//! result as a sector-addressed block device:
//! - **dummy** - in-memory NAND emulator, optionally backed by an image
//!   file so contents survive between invocations
//! - **linux_mtd** - a raw NAND partition through `/dev/mtdN`
//!
//! Bad erase blocks found at mount time are skipped by remapping; sector
//! writes become read-erase-modify-write cycles on whole erase blocks.

mod backends;
mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, MtdArgs};
use commands::Device;
use rftl_core::blockdev::{BlockDriver, FtlBlockDevice};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Info { mtd } => with_device(&mtd, commands::run_info),
        Commands::Map { mtd } => with_device(&mtd, |dev| {
            commands::run_map(dev);
            Ok(())
        }),
        Commands::Read {
            mtd,
            output,
            start,
            count,
        } => with_device(&mtd, |dev| commands::run_read(dev, &output, start, count)),
        Commands::Write {
            mtd,
            input,
            start,
            verify,
        } => with_device(&mtd, |dev| commands::run_write(dev, &input, start, verify)),
        Commands::EraseAll { mtd } => with_device(&mtd, commands::run_erase_all),
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
        #[cfg(feature = "linux-mtd")]
        Commands::ListMtds => commands::list_mtds(),
    }
}

/// Mount the block device, run `f` between open and close
fn with_device<F>(args: &MtdArgs, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut Device) -> Result<(), Box<dyn std::error::Error>>,
{
    let mtd = backends::open_mtd(&args.mtd)?;
    let mut dev = FtlBlockDevice::new(args.minor, mtd)?;

    dev.open()?;
    let result = f(&mut dev);
    dev.close()?;
    result
}
