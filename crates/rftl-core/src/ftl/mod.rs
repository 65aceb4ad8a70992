//! Flash translation layer
//!
//! This module provides the pieces that sit between a sector-addressed
//! consumer and an MTD:
//!
//! - [`BlockMap`]: logical to physical erase-block map, built once by
//!   scanning for bad blocks
//! - [`translate`]: sector index to physical erase block and offset
//! - [`FtlDevice`]: read path and read-erase-modify-write engine

mod device;
mod map;
#[cfg(test)]
pub(crate) mod mock;
mod translate;

pub use device::{FtlDevice, FtlStats};
pub use map::{BlockMap, MapEntry};
pub use translate::{translate, SectorAddress};
