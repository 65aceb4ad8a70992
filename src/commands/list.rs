//! List commands implementation

use crate::backends;

/// List all compiled-in MTD backends
pub fn list_backends() {
    println!("Available MTD backends:");
    println!();
    for backend in backends::available_backends() {
        let name = if backend.aliases.is_empty() {
            backend.name.to_string()
        } else {
            format!("{} ({})", backend.name, backend.aliases.join(", "))
        };
        println!("  {:<28} - {}", name, backend.description);
    }
}

/// List MTD devices from sysfs
#[cfg(feature = "linux-mtd")]
pub fn list_mtds() -> Result<(), Box<dyn std::error::Error>> {
    let devices = rftl_linux_mtd::list_devices()?;
    if devices.is_empty() {
        println!("No MTD devices found");
        return Ok(());
    }

    println!(
        "{:<6} {:<16} {:<9} {:>10} {:>10} {:>8} {:>3}",
        "Dev", "Name", "Type", "Size", "Erase", "Page", "RW"
    );
    println!("{}", "-".repeat(68));
    for (num, info) in devices {
        println!(
            "{:<6} {:<16} {:<9} {:>10} {:>10} {:>8} {:>3}",
            format!("mtd{}", num),
            info.name,
            info.mtd_type,
            super::format_size(info.total_size),
            super::format_size(info.erase_size),
            info.write_size,
            if info.is_writable { "yes" } else { "no" }
        );
    }
    Ok(())
}
