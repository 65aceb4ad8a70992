//! Dummy NAND configuration and image files
//!
//! Configuration can come from a TOML file:
//!
//! ```toml
//! [geometry]
//! block_size = 512
//! erase_size = "16 KiB"
//! erase_blocks = 64
//!
//! [medium]
//! bad_blocks = [3, 7]
//! writable = true
//! xip_base = 0x08000000
//! image = "nand.img"
//! ```
//!
//! or from backend options (`dummy:erase_blocks=64,bad=3+7`), which
//! override values loaded with `config=<path>`.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::{DummyConfig, DummyNand};

/// Dummy backend errors
#[derive(Debug, Error)]
pub enum DummyError {
    /// I/O error on the configuration or image file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML parse error
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// Existing image file does not match the configured geometry
    #[error("image {path} is {actual} bytes, geometry needs {expected}")]
    ImageSizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// A dummy NAND configuration plus its optional backing image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummySetup {
    /// Medium configuration
    pub config: DummyConfig,
    /// Backing image file, created erased if missing
    pub image: Option<PathBuf>,
}

/// TOML configuration file structure
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDummyFile {
    #[serde(default)]
    geometry: TomlGeometry,
    #[serde(default)]
    medium: TomlMedium,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGeometry {
    #[serde(default, deserialize_with = "deserialize_size")]
    block_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_size")]
    erase_size: Option<u32>,
    erase_blocks: Option<u32>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlMedium {
    #[serde(default)]
    bad_blocks: Vec<u32>,
    writable: Option<bool>,
    xip_base: Option<u64>,
    image: Option<PathBuf>,
}

/// Deserialize a size that can be an integer or a string like "16 KiB"
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeOrInt {
        Int(u32),
        Str(String),
    }

    match Option::<SizeOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(SizeOrInt::Int(n)) => Ok(Some(n)),
        Some(SizeOrInt::Str(s)) => parse_size(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number<T>(s: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let s = s.trim();
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))?
    } else {
        s.parse::<u64>()
            .map_err(|e| format!("invalid number: {}", e))?
    };
    T::try_from(value).map_err(|_| format!("value out of range: {}", s))
}

/// Parse a size string like "16 KiB", "2MiB", "0x800" or "4096"
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = lower.strip_suffix('b').filter(|n| !n.starts_with("0x")) {
        (n.trim(), 1)
    } else {
        (lower.as_str(), 1)
    };

    let n: u32 = parse_number(num_str).map_err(|_| format!("invalid size: {}", s))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

impl DummySetup {
    /// Parse a TOML configuration string
    pub fn from_toml_str(content: &str) -> Result<Self, DummyError> {
        let file: TomlDummyFile = toml::from_str(content)?;
        let mut setup = DummySetup::default();

        if let Some(v) = file.geometry.block_size {
            setup.config.block_size = v;
        }
        if let Some(v) = file.geometry.erase_size {
            setup.config.erase_size = v;
        }
        if let Some(v) = file.geometry.erase_blocks {
            setup.config.erase_blocks = v;
        }
        setup.config.bad_blocks = file.medium.bad_blocks;
        if let Some(v) = file.medium.writable {
            setup.config.writable = v;
        }
        setup.config.xip_base = file.medium.xip_base;
        setup.image = file.medium.image;

        Ok(setup)
    }

    /// Load a TOML configuration file
    ///
    /// A relative `image` path is resolved against the file's directory.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, DummyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut setup = Self::from_toml_str(&content)?;

        if let (Some(image), Some(dir)) = (setup.image.as_ref(), path.parent()) {
            if image.is_relative() {
                setup.image = Some(dir.join(image));
            }
        }
        Ok(setup)
    }

    /// Build the emulator, opening or creating the image file if one is set
    pub fn build(self) -> Result<DummyNand, DummyError> {
        match self.image {
            Some(path) => DummyNand::open_image(self.config, path),
            None => Ok(DummyNand::new(self.config)),
        }
    }
}

impl DummyNand {
    /// Create a dummy NAND backed by an image file
    ///
    /// An existing image is loaded and must match the configured size. A
    /// missing image is created fully erased. Every write and erase is
    /// written through to the file.
    pub fn open_image(config: DummyConfig, path: impl AsRef<Path>) -> Result<Self, DummyError> {
        let path = path.as_ref();
        let expected = config.size();
        let mut nand = DummyNand::new(config);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let actual = file.metadata()?.len() as usize;
        if actual == 0 {
            file.write_all(nand.data())?;
            info!("Created erased NAND image {} ({} bytes)", path.display(), expected);
        } else if actual != expected {
            return Err(DummyError::ImageSizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        } else {
            file.read_exact(nand.data_mut())?;
            info!("Loaded NAND image {} ({} bytes)", path.display(), actual);
        }

        nand.image = Some(file);
        Ok(nand)
    }
}

fn invalid(name: &'static str, value: &str) -> DummyError {
    DummyError::InvalidParameter {
        name,
        message: format!("'{}' is not a valid value", value),
    }
}

/// Parse backend options from key-value pairs
///
/// # Supported options
/// - `config=PATH` - TOML configuration file (applied first)
/// - `block_size=N`, `erase_size=N` - sizes, e.g. `512` or `16KiB`
/// - `erase_blocks=N` - number of erase blocks
/// - `bad=A+B+...` - factory bad blocks
/// - `ro` / `ro=1` - read-only medium
/// - `xip_base=ADDR` - execute-in-place base address
/// - `image=PATH` - backing image file
///
/// # Example
/// ```ignore
/// let setup = parse_options(&[("erase_blocks", "16"), ("bad", "3+7")])?;
/// let nand = setup.build()?;
/// ```
pub fn parse_options(options: &[(&str, &str)]) -> Result<DummySetup, DummyError> {
    let mut setup = match options.iter().find(|(key, _)| *key == "config") {
        Some((_, path)) => DummySetup::from_toml_file(path)?,
        None => DummySetup::default(),
    };

    for (key, value) in options {
        match *key {
            "config" => {}
            "block_size" => {
                setup.config.block_size =
                    parse_size(value).map_err(|_| invalid("block_size", value))?;
            }
            "erase_size" => {
                setup.config.erase_size =
                    parse_size(value).map_err(|_| invalid("erase_size", value))?;
            }
            "erase_blocks" => {
                setup.config.erase_blocks =
                    parse_number(value).map_err(|_| invalid("erase_blocks", value))?;
            }
            "bad" => {
                setup.config.bad_blocks = value
                    .split('+')
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_number(s).map_err(|_| invalid("bad", value)))
                    .collect::<Result<_, _>>()?;
            }
            "ro" => {
                setup.config.writable = matches!(*value, "0" | "false" | "no");
            }
            "xip_base" => {
                setup.config.xip_base =
                    Some(parse_number(value).map_err(|_| invalid("xip_base", value))?);
            }
            "image" => {
                setup.image = Some(PathBuf::from(value));
            }
            _ => {
                warn!("Unknown dummy option: {}={}", key, value);
            }
        }
    }

    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rftl_core::mtd::Mtd;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x800"), Ok(2048));
        assert_eq!(parse_size("16 KiB"), Ok(16 * 1024));
        assert_eq!(parse_size("2MiB"), Ok(2 * 1024 * 1024));
        assert_eq!(parse_size("512 B"), Ok(512));
        assert_eq!(parse_size("0xab"), Ok(0xab));
        assert!(parse_size("lots").is_err());
        assert!(parse_size("8192 MiB").is_err());
    }

    #[test]
    fn test_toml_config() {
        let setup = DummySetup::from_toml_str(
            r#"
            [geometry]
            block_size = 512
            erase_size = "2 KiB"
            erase_blocks = 4

            [medium]
            bad_blocks = [1]
            writable = false
            xip_base = 134217728
            image = "nand.img"
            "#,
        )
        .unwrap();

        assert_eq!(setup.config.block_size, 512);
        assert_eq!(setup.config.erase_size, 2048);
        assert_eq!(setup.config.erase_blocks, 4);
        assert_eq!(setup.config.bad_blocks, vec![1]);
        assert!(!setup.config.writable);
        assert_eq!(setup.config.xip_base, Some(0x0800_0000));
        assert_eq!(setup.image, Some(PathBuf::from("nand.img")));
    }

    #[test]
    fn test_toml_defaults() {
        let setup = DummySetup::from_toml_str("").unwrap();
        assert_eq!(setup.config, DummyConfig::default());
        assert_eq!(setup.image, None);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        assert!(DummySetup::from_toml_str("[geometry]\npage_size = 4096\n").is_err());
    }

    #[test]
    fn test_parse_options() {
        let setup = parse_options(&[
            ("erase_blocks", "16"),
            ("erase_size", "2KiB"),
            ("bad", "3+7"),
            ("ro", ""),
            ("xip_base", "0x1000"),
        ])
        .unwrap();

        assert_eq!(setup.config.erase_blocks, 16);
        assert_eq!(setup.config.erase_size, 2048);
        assert_eq!(setup.config.bad_blocks, vec![3, 7]);
        assert!(!setup.config.writable);
        assert_eq!(setup.config.xip_base, Some(0x1000));
    }

    #[test]
    fn test_parse_options_invalid() {
        assert!(matches!(
            parse_options(&[("erase_blocks", "many")]),
            Err(DummyError::InvalidParameter {
                name: "erase_blocks",
                ..
            })
        ));
        assert!(parse_options(&[("bad", "1+x")]).is_err());
    }

    #[test]
    fn test_image_round_trip() {
        let dir = std::env::temp_dir().join(format!("rftl-dummy-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("image.bin");
        let _ = fs::remove_file(&path);

        let config = DummyConfig {
            block_size: 512,
            erase_size: 2048,
            erase_blocks: 2,
            ..Default::default()
        };

        let mut nand = DummyNand::open_image(config.clone(), &path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
        nand.erase(1, 1).unwrap();
        nand.write(4, 1, &[0x42u8; 512]).unwrap();
        drop(nand);

        let reopened = DummyNand::open_image(config, &path).unwrap();
        assert!(reopened.block(1)[..512].iter().all(|&b| b == 0x42));
        assert!(reopened.block(1)[512..].iter().all(|&b| b == 0xFF));

        let small = DummyConfig {
            erase_blocks: 1,
            ..reopened.config().clone()
        };
        assert!(matches!(
            DummyNand::open_image(small, &path),
            Err(DummyError::ImageSizeMismatch { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
