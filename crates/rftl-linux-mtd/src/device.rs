//! Linux MTD device implementation

use crate::error::{LinuxMtdError, Result};
use log::{debug, info, trace, warn};
use rftl_core::error::{Error as FtlError, IoFailure, Result as FtlResult};
use rftl_core::mtd::{cmd, Mtd, MtdFlags, MtdGeometry};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Sysfs root for MTD devices
const MTD_SYSFS_ROOT: &str = "/sys/class/mtd";

/// Device root
const DEV_ROOT: &str = "/dev";

/// MTD flags from kernel headers
mod mtd_flags {
    /// MTD device is writable
    pub const MTD_WRITEABLE: u64 = 0x400;
}

/// Device types the translation layer can run on
const NAND_TYPES: &[&str] = &["nand", "mlc-nand"];

/// Configuration for opening a Linux MTD device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxMtdConfig {
    /// MTD device number (e.g., 0 for /dev/mtd0)
    pub dev_num: u32,
    /// Open read-only even if the device is writable
    pub read_only: bool,
}

impl LinuxMtdConfig {
    /// Create a new configuration for the specified device number
    pub fn new(dev_num: u32) -> Self {
        Self {
            dev_num,
            read_only: false,
        }
    }
}

/// Information about an MTD device read from sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtdInfo {
    /// Device name from sysfs
    pub name: String,
    /// Device type from sysfs ("nand", "nor", ...)
    pub mtd_type: String,
    /// Total size in bytes
    pub total_size: u64,
    /// Erase block size in bytes
    pub erase_size: u64,
    /// Minimum write unit (NAND page) in bytes
    pub write_size: u64,
    /// Number of erase regions (must be 0 for uniform erase)
    pub num_erase_regions: u64,
    /// Whether the device is writable
    pub is_writable: bool,
}

impl MtdInfo {
    /// Whether this is a NAND device
    pub fn is_nand(&self) -> bool {
        NAND_TYPES.contains(&self.mtd_type.as_str())
    }

    /// Geometry as seen by the translation layer
    ///
    /// One sector is one NAND page.
    pub fn geometry(&self) -> Result<MtdGeometry> {
        if !self.erase_size.is_power_of_two() {
            return Err(LinuxMtdError::InvalidEraseSize(self.erase_size));
        }
        if self.write_size == 0 || self.erase_size % self.write_size != 0 {
            return Err(LinuxMtdError::InvalidWriteSize {
                write_size: self.write_size,
                erase_size: self.erase_size,
            });
        }
        if self.num_erase_regions != 0 {
            return Err(LinuxMtdError::NonUniformEraseRegions(
                self.num_erase_regions,
            ));
        }

        let out_of_range = |name: &'static str, value: u64| LinuxMtdError::InvalidParameter {
            name,
            message: format!("{} does not fit in 32 bits", value),
        };
        let erase_blocks = self.total_size / self.erase_size;

        Ok(MtdGeometry {
            block_size: u32::try_from(self.write_size)
                .map_err(|_| out_of_range("writesize", self.write_size))?,
            erase_size: u32::try_from(self.erase_size)
                .map_err(|_| out_of_range("erasesize", self.erase_size))?,
            erase_block_count: u32::try_from(erase_blocks)
                .map_err(|_| out_of_range("size", self.total_size))?,
        })
    }
}

/// Linux MTD device handle
///
/// Wraps `/dev/mtdN` and implements [`Mtd`]. Sector `n` is the NAND page
/// at byte offset `n * writesize`. Bad blocks are reported by the kernel
/// through `MEMGETBADBLOCK`; this type never skips them itself.
///
/// # Example
///
/// ```ignore
/// use rftl_linux_mtd::{LinuxMtd, LinuxMtdConfig};
/// use rftl_core::ftl::FtlDevice;
///
/// let mtd = LinuxMtd::open(&LinuxMtdConfig::new(0))?;
/// let mut ftl = FtlDevice::new(mtd)?;
///
/// let mut sector = vec![0u8; ftl.geometry().block_size as usize];
/// ftl.read(0, 1, &mut sector)?;
/// ```
pub struct LinuxMtd {
    /// Device file handle
    file: File,
    /// Device information
    info: MtdInfo,
    /// Geometry derived from `info`
    geometry: MtdGeometry,
    /// Whether writes and erases are allowed
    writable: bool,
}

impl LinuxMtd {
    /// Open an MTD device by device number
    ///
    /// # Errors
    /// Returns an error if:
    /// - The device doesn't exist
    /// - The device is not a NAND flash device
    /// - The geometry cannot be expressed in sectors and erase blocks
    /// - The device cannot be opened
    pub fn open(config: &LinuxMtdConfig) -> Result<Self> {
        let dev_num = config.dev_num;
        let sysfs_path = PathBuf::from(format!("{}/mtd{}", MTD_SYSFS_ROOT, dev_num));

        if !sysfs_path.exists() {
            return Err(LinuxMtdError::DeviceNotFound(format!(
                "MTD device {} not found ({})",
                dev_num,
                sysfs_path.display()
            )));
        }

        let info = read_mtd_info(&sysfs_path)?;
        if !info.is_nand() {
            return Err(LinuxMtdError::NotNandFlash(format!(
                "MTD device {} type is '{}', expected one of {:?}",
                dev_num, info.mtd_type, NAND_TYPES
            )));
        }
        let geometry = info.geometry()?;

        debug!(
            "MTD{}: name='{}', size={}, erase_size={}, write_size={}, writable={}",
            dev_num, info.name, info.total_size, info.erase_size, info.write_size, info.is_writable
        );

        if info.total_size % info.erase_size != 0 {
            warn!(
                "MTD size {} is not a multiple of the erase size, ignoring the tail",
                info.total_size
            );
        }

        let writable = info.is_writable && !config.read_only;
        if !info.is_writable && !config.read_only {
            warn!("MTD{} is not writable, opening read-only", dev_num);
        }

        let dev_path = format!("{}/mtd{}", DEV_ROOT, dev_num);
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&dev_path)
            .map_err(|e| LinuxMtdError::Open {
                path: dev_path.clone(),
                source: e,
            })?;

        info!(
            "Opened {} (name='{}', {} erase blocks of {} bytes, page {} bytes{})",
            dev_path,
            info.name,
            geometry.erase_block_count,
            info.erase_size,
            info.write_size,
            if writable { "" } else { ", read-only" }
        );

        Ok(Self {
            file,
            info,
            geometry,
            writable,
        })
    }

    fn sector_offset(&self, sector: u32) -> u64 {
        sector as u64 * self.geometry.block_size as u64
    }

    fn sector_span(&self, count: u32) -> usize {
        count as usize * self.geometry.block_size as usize
    }

    fn erase_one(&mut self, block: u32) -> FtlResult<()> {
        let failure = FtlError::IoError(IoFailure::Erase { block });
        let start = u32::try_from(block as u64 * self.geometry.erase_size as u64)
            .map_err(|_| failure)?;
        let erase_info = EraseInfo {
            start,
            length: self.geometry.erase_size,
        };

        // SAFETY: We're calling an ioctl with a valid file descriptor and
        // a properly initialized EraseInfo struct
        unsafe {
            memerase(self.file.as_raw_fd(), &erase_info).map_err(|e| {
                debug!("MEMERASE of block {} failed: {}", block, e);
                failure
            })?;
        }
        Ok(())
    }
}

/// List MTD devices present in sysfs
///
/// Read-only aliases (`mtdNro`) are skipped. Devices whose attributes
/// cannot be read are logged and skipped.
pub fn list_devices() -> Result<Vec<(u32, MtdInfo)>> {
    list_devices_in(Path::new(MTD_SYSFS_ROOT))
}

fn list_devices_in(root: &Path) -> Result<Vec<(u32, MtdInfo)>> {
    let mut devices = Vec::new();
    if !root.exists() {
        return Ok(devices);
    }

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(num) = name
            .to_str()
            .and_then(|n| n.strip_prefix("mtd"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };

        match read_mtd_info(&entry.path()) {
            Ok(info) => devices.push((num, info)),
            Err(e) => warn!("Skipping mtd{}: {}", num, e),
        }
    }

    devices.sort_by_key(|(num, _)| *num);
    Ok(devices)
}

/// Read a string from a sysfs file and sanitize it
fn read_sysfs_string(sysfs_path: &Path, filename: &str) -> Result<String> {
    let path = sysfs_path.join(filename);
    let content = std::fs::read_to_string(&path).map_err(|e| LinuxMtdError::SysfsRead {
        path: path.display().to_string(),
        source: e,
    })?;

    // Sanitize: remove non-printable characters and trailing whitespace
    let sanitized: String = content
        .chars()
        .take_while(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();
    Ok(sanitized.trim_end().to_string())
}

/// Read an integer from a sysfs file
fn read_sysfs_int(sysfs_path: &Path, filename: &str) -> Result<u64> {
    let value_str = read_sysfs_string(sysfs_path, filename)?;

    // Support hex (0x...) and decimal
    let value = match value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value_str.parse::<u64>(),
    };

    value.map_err(|_| LinuxMtdError::SysfsParse {
        path: sysfs_path.join(filename).display().to_string(),
        value: value_str,
    })
}

/// Read MTD device information from sysfs
fn read_mtd_info(sysfs_path: &Path) -> Result<MtdInfo> {
    let flags = read_sysfs_int(sysfs_path, "flags")?;

    Ok(MtdInfo {
        name: read_sysfs_string(sysfs_path, "name")?,
        mtd_type: read_sysfs_string(sysfs_path, "type")?,
        total_size: read_sysfs_int(sysfs_path, "size")?,
        erase_size: read_sysfs_int(sysfs_path, "erasesize")?,
        write_size: read_sysfs_int(sysfs_path, "writesize")?,
        num_erase_regions: read_sysfs_int(sysfs_path, "numeraseregions")?,
        is_writable: (flags & mtd_flags::MTD_WRITEABLE) != 0,
    })
}

/// MEMERASE ioctl argument structure
/// Matches struct erase_info_user from mtd/mtd-user.h
#[repr(C)]
struct EraseInfo {
    start: u32,
    length: u32,
}

// MEMERASE = _IOW('M', 2, struct erase_info_user)
nix::ioctl_write_ptr!(memerase, b'M', 2, EraseInfo);
// MEMGETBADBLOCK = _IOW('M', 11, __kernel_loff_t)
nix::ioctl_write_ptr!(memgetbadblock, b'M', 11, libc::loff_t);

impl Mtd for LinuxMtd {
    fn geometry(&mut self) -> FtlResult<MtdGeometry> {
        Ok(self.geometry)
    }

    fn flags(&self) -> MtdFlags {
        if self.writable {
            MtdFlags::WRITEABLE | MtdFlags::BAD_BLOCKS
        } else {
            MtdFlags::BAD_BLOCKS
        }
    }

    fn is_bad(&mut self, block: u32) -> bool {
        let offset = block as libc::loff_t * self.geometry.erase_size as libc::loff_t;

        // SAFETY: valid file descriptor and a live loff_t for the duration
        // of the call
        match unsafe { memgetbadblock(self.file.as_raw_fd(), &offset) } {
            Ok(0) => false,
            Ok(_) => true,
            Err(nix::errno::Errno::EOPNOTSUPP) => false,
            Err(e) => {
                // An unreadable marker is treated as bad so it never gets mapped
                warn!("MEMGETBADBLOCK for block {} failed: {}", block, e);
                true
            }
        }
    }

    fn read(&mut self, sector: u32, count: u32, buf: &mut [u8]) -> FtlResult<u32> {
        let failure = FtlError::IoError(IoFailure::Read { sector });
        let len = self.sector_span(count);
        if buf.len() < len {
            return Err(FtlError::InvalidArgument);
        }
        trace!("mtd: read {} sectors at {}", count, sector);

        self.file
            .seek(SeekFrom::Start(self.sector_offset(sector)))
            .map_err(|_| failure)?;

        let mut done = 0;
        while done < len {
            match self.file.read(&mut buf[done..len]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("read at sector {} failed: {}", sector, e);
                    return Err(failure);
                }
            }
        }

        Ok((done / self.geometry.block_size as usize) as u32)
    }

    fn write(&mut self, sector: u32, count: u32, buf: &[u8]) -> FtlResult<u32> {
        if !self.writable {
            return Err(FtlError::WriteProtected);
        }
        let failure = FtlError::IoError(IoFailure::Write { sector });
        let len = self.sector_span(count);
        if buf.len() < len {
            return Err(FtlError::InvalidArgument);
        }
        trace!("mtd: write {} sectors at {}", count, sector);

        self.file
            .seek(SeekFrom::Start(self.sector_offset(sector)))
            .map_err(|_| failure)?;
        self.file.write_all(&buf[..len]).map_err(|e| {
            debug!("write at sector {} failed: {}", sector, e);
            failure
        })?;
        self.file.flush().map_err(|_| failure)?;

        Ok(count)
    }

    fn erase(&mut self, block: u32, count: u32) -> FtlResult<()> {
        if !self.writable {
            return Err(FtlError::WriteProtected);
        }
        for b in block..block.saturating_add(count) {
            trace!("mtd: erase block {}", b);
            self.erase_one(b)?;
        }
        Ok(())
    }

    fn control(&mut self, command: u32, _arg: Option<&mut u64>) -> FtlResult<()> {
        match command {
            cmd::MTD_BULK_ERASE => {
                if !self.writable {
                    return Err(FtlError::WriteProtected);
                }
                info!("Erasing all good blocks of {}", self.info.name);
                for block in 0..self.geometry.erase_block_count {
                    if self.is_bad(block) {
                        debug!("Skipping bad block {}", block);
                        continue;
                    }
                    self.erase_one(block)?;
                }
                Ok(())
            }
            // The kernel does not expose a memory-mapped base for NAND
            _ => Err(FtlError::NotSupported),
        }
    }
}

/// Parse backend options from key-value pairs
///
/// # Supported options
/// - `dev=N` - MTD device number (required)
/// - `ro` / `ro=1` - open read-only
///
/// # Example
/// ```ignore
/// let options = &[("dev", "0")];
/// let config = parse_options(options)?;
/// ```
pub fn parse_options(options: &[(&str, &str)]) -> Result<LinuxMtdConfig> {
    let mut dev_num: Option<u32> = None;
    let mut read_only = false;

    for (key, value) in options {
        match *key {
            "dev" => {
                dev_num = Some(value.parse().map_err(|_| LinuxMtdError::InvalidParameter {
                    name: "dev",
                    message: format!("'{}' is not a valid device number", value),
                })?);
            }
            "ro" => {
                read_only = !matches!(*value, "0" | "false" | "no");
            }
            _ => {
                warn!("Unknown linux_mtd option: {}={}", key, value);
            }
        }
    }

    let dev_num = dev_num.ok_or(LinuxMtdError::MissingParameter("dev"))?;

    Ok(LinuxMtdConfig { dev_num, read_only })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rftl-mtd-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_attrs(dir: &Path, attrs: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        for (name, value) in attrs {
            fs::write(dir.join(name), format!("{}\n", value)).unwrap();
        }
    }

    fn nand_attrs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("name", "rootfs"),
            ("type", "nand"),
            ("size", "134217728"),
            ("erasesize", "131072"),
            ("writesize", "2048"),
            ("numeraseregions", "0"),
            ("flags", "0x400"),
        ]
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "2")]).unwrap();
        assert_eq!(config, LinuxMtdConfig::new(2));

        let config = parse_options(&[("dev", "0"), ("ro", "")]).unwrap();
        assert!(config.read_only);

        assert!(matches!(
            parse_options(&[]),
            Err(LinuxMtdError::MissingParameter("dev"))
        ));
        assert!(matches!(
            parse_options(&[("dev", "zero")]),
            Err(LinuxMtdError::InvalidParameter { name: "dev", .. })
        ));
    }

    #[test]
    fn test_read_mtd_info() {
        let dir = temp_dir("info");
        write_attrs(&dir, &nand_attrs());

        let info = read_mtd_info(&dir).unwrap();
        assert_eq!(info.name, "rootfs");
        assert!(info.is_nand());
        assert!(info.is_writable);
        assert_eq!(info.write_size, 2048);

        let geo = info.geometry().unwrap();
        assert_eq!(geo.block_size, 2048);
        assert_eq!(geo.erase_size, 131072);
        assert_eq!(geo.erase_block_count, 1024);
        assert_eq!(geo.validate(), Ok(64));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_sysfs_parse_error() {
        let dir = temp_dir("parse");
        let mut attrs = nand_attrs();
        attrs[2] = ("size", "big");
        write_attrs(&dir, &attrs);

        assert!(matches!(
            read_mtd_info(&dir),
            Err(LinuxMtdError::SysfsParse { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_geometry_rejects_odd_sizes() {
        let mut info = MtdInfo {
            name: "x".into(),
            mtd_type: "nand".into(),
            total_size: 1 << 20,
            erase_size: 16384,
            write_size: 512,
            num_erase_regions: 0,
            is_writable: false,
        };
        assert!(info.geometry().is_ok());

        info.write_size = 3000;
        assert!(matches!(
            info.geometry(),
            Err(LinuxMtdError::InvalidWriteSize { .. })
        ));

        info.write_size = 512;
        info.erase_size = 24576;
        assert!(matches!(
            info.geometry(),
            Err(LinuxMtdError::InvalidEraseSize(24576))
        ));

        info.erase_size = 16384;
        info.mtd_type = "nor".into();
        assert!(!info.is_nand());
    }

    #[test]
    fn test_list_devices() {
        let root = temp_dir("list");
        write_attrs(&root.join("mtd1"), &nand_attrs());
        write_attrs(&root.join("mtd0"), &nand_attrs());
        write_attrs(&root.join("mtd0ro"), &nand_attrs());
        write_attrs(&root.join("mtd2"), &[("name", "broken")]);

        let devices = list_devices_in(&root).unwrap();
        let nums: Vec<u32> = devices.iter().map(|(n, _)| *n).collect();
        assert_eq!(nums, vec![0, 1]);

        fs::remove_dir_all(&root).unwrap();
    }
}
