//! rftl-linux-mtd - Linux MTD (Memory Technology Device) backend
//!
//! This crate lets the flash translation layer run on a raw NAND
//! partition exposed by the Linux MTD subsystem at `/dev/mtdN`. The kernel
//! driver handles ECC, timing and the bad-block markers; the translation
//! layer on top remaps bad blocks and turns sector writes into
//! read-erase-modify-write cycles.
//!
//! # Example
//!
//! ```ignore
//! use rftl_linux_mtd::{LinuxMtd, LinuxMtdConfig};
//! use rftl_core::blockdev::{BlockDriver, FtlBlockDevice};
//!
//! let mtd = LinuxMtd::open(&LinuxMtdConfig::new(0))?;
//! let mut dev = FtlBlockDevice::new(0, mtd)?;
//!
//! let geo = dev.geometry();
//! println!("{} sectors of {} bytes", geo.sector_count, geo.sector_size);
//! ```
//!
//! # Usage with the rftl CLI
//!
//! ```bash
//! # Show the bad-block map of MTD device 3
//! rftl map -m linux_mtd:dev=3
//!
//! # Read logical sectors without allowing writes
//! rftl read -m linux_mtd:dev=3,ro --start 0 --count 64 -o head.bin
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with MTD support (`CONFIG_MTD`) and a NAND driver
//! - Read/write access to `/dev/mtdN` (may require root or udev rules)
//!
//! # Device Discovery
//!
//! ```bash
//! cat /proc/mtd
//! cat /sys/class/mtd/mtd0/type       # should be "nand"
//! cat /sys/class/mtd/mtd0/writesize  # page size, used as the sector size
//! ```

pub mod device;
pub mod error;

// Re-exports
pub use device::{list_devices, parse_options, LinuxMtd, LinuxMtdConfig, MtdInfo};
pub use error::{LinuxMtdError, Result};

/// Open a Linux MTD device and return a boxed MTD
///
/// This is a convenience function for use in the CLI backend dispatch.
///
/// # Example Options
///
/// - `dev=0` - Required: MTD device number
/// - `ro` - Open read-only
pub fn open_linux_mtd(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn rftl_core::mtd::Mtd + Send>, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let mtd = LinuxMtd::open(&config)?;
    Ok(Box::new(mtd))
}
