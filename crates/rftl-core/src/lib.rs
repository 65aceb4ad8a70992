//! rftl-core - NAND flash translation layer core
//!
//! This crate turns a NAND-style Memory Technology Device (MTD), which can
//! only be erased in large fixed-size units, into a sector-addressed block
//! device. It provides:
//!
//! - A bad-block map built once at mount time, giving a dense logical
//!   address space over the good physical erase blocks
//! - A read path that forwards each sector to its physical location
//! - A write path that performs read-erase-modify-write cycles for partial
//!   erase blocks and direct erase+write for whole ones
//! - A block-device adapter with open/close/geometry/control entry points
//!
//! The crate is `no_std` and needs `alloc` for the map and the staging
//! buffer.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for the error type
//!
//! # Example
//!
//! ```ignore
//! use rftl_core::blockdev::{BlockDriver, FtlBlockDevice};
//!
//! fn mount<M: rftl_core::mtd::Mtd>(mtd: M) -> rftl_core::Result<()> {
//!     let mut dev = FtlBlockDevice::new(0, mtd)?;
//!     dev.open()?;
//!     let geo = dev.geometry();
//!     let mut sector = vec![0u8; geo.sector_size as usize];
//!     dev.read(0, 1, &mut sector)?;
//!     dev.close()
//! }
//! ```
//!
//! # Limitations
//!
//! There is no wear leveling, garbage collection, journaling or power-loss
//! atomicity. Physical block identity is fixed once the map is built.

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod blockdev;
pub mod error;
pub mod ftl;
pub mod mtd;

pub use error::{Error, IoFailure, Result};
