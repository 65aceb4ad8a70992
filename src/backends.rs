//! MTD backend registration and dispatch
//!
//! This module provides a centralized registry for all MTD backends, with
//! support for feature-gated inclusion and dynamic help text generation.

use rftl_core::mtd::Mtd;

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory NAND emulator (config=<toml>,erase_blocks=<n>,bad=<a+b>,image=<file>,ro)",
    });

    #[cfg(feature = "linux-mtd")]
    backends.push(BackendInfo {
        name: "linux_mtd",
        aliases: &["linux-mtd", "mtd"],
        description: "Linux MTD NAND partition (dev=<n>,ro)",
    });

    backends
}

/// Comma-separated list of backend names for help text
pub fn backend_names_short() -> String {
    let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
    if names.is_empty() {
        "none (enable a backend feature)".to_string()
    } else {
        names.join(", ")
    }
}

/// Parsed backend parameters
#[derive(Debug, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name as given
    pub name: String,
    /// Key-value parameters, in command-line order
    pub params: Vec<(String, String)>,
}

impl BackendParams {
    /// Parameters as borrowed pairs, the form backend crates accept
    pub fn options(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a backend string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2,..."; a bare key is a flag with
/// an empty value.
///
/// # Example
/// ```ignore
/// let params = parse_backend_params("linux_mtd:dev=1,ro")?;
/// assert_eq!(params.name, "linux_mtd");
/// ```
pub fn parse_backend_params(s: &str) -> Result<BackendParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));
    if name.is_empty() {
        return Err(format!("Missing backend name in '{}'", s).into());
    }

    let mut params = Vec::new();
    for opt in opts_str.split(',').filter(|o| !o.is_empty()) {
        let (key, value) = opt.split_once('=').unwrap_or((opt, ""));
        if key.is_empty() {
            return Err(format!("Invalid parameter format: '{}' (expected key=value)", opt).into());
        }
        params.push((key.to_string(), value.to_string()));
    }

    Ok(BackendParams {
        name: name.to_string(),
        params,
    })
}

/// Open an MTD backend from its command-line specification
///
/// # Example
/// ```ignore
/// let mtd = open_mtd("dummy:erase_blocks=16,bad=3")?;
/// let dev = FtlBlockDevice::new(0, mtd)?;
/// ```
pub fn open_mtd(spec: &str) -> Result<Box<dyn Mtd + Send>, Box<dyn std::error::Error>> {
    let params = parse_backend_params(spec)?;
    let options = params.options();

    log::debug!("Opening backend '{}' with {:?}", params.name, options);

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let nand = rftl_dummy::parse_options(&options)?.build()?;
            Ok(Box::new(nand))
        }

        #[cfg(feature = "linux-mtd")]
        "linux_mtd" | "linux-mtd" | "mtd" => rftl_linux_mtd::open_linux_mtd(&options),

        _ => Err(format!("Unknown MTD backend: {}", params.name).into()),
    }
}
