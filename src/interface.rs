use std::fs;
use std::io::Write;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tempfile::NamedTempFile;

use crate::activation::parse_bound_ip;
use crate::command::{Shell, Tool};
use crate::error::{Result, WifiError};

const SYS_CLASS_NET: &str = "/sys/class/net";

lazy_static! {
    // Kernel names are at most 15 bytes. A leading '-' would be read as a flag.
    static ref INTERFACE_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]{0,14}$").expect("interface name pattern");
}

#[derive(Debug, Clone)]
pub struct WifiInterface {
    pub name: String,
    pub state: String,
    pub is_usb: bool,
}

/// List all wireless interfaces on the system
pub fn list_wifi_interfaces() -> Result<Vec<WifiInterface>> {
    wifi_interfaces_in(Path::new(SYS_CLASS_NET))
}

fn wifi_interfaces_in(class_dir: &Path) -> Result<Vec<WifiInterface>> {
    let entries = fs::read_dir(class_dir).map_err(|e| WifiError::file(class_dir, e))?;
    let mut interfaces = Vec::new();

    for entry in entries.flatten() {
        let device_dir = entry.path();
        if !device_dir.join("wireless").exists() && !device_dir.join("phy80211").exists() {
            continue;
        }

        let state = fs::read_to_string(device_dir.join("operstate"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        interfaces.push(WifiInterface {
            name: entry.file_name().to_string_lossy().into_owned(),
            state,
            is_usb: sits_on_usb_bus(&device_dir),
        });
    }

    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(interfaces)
}

/// `device` links into the bus hierarchy; USB adapters have a `usbN` hop.
fn sits_on_usb_bus(device_dir: &Path) -> bool {
    fs::canonicalize(device_dir.join("device")).is_ok_and(|bus_path| {
        bus_path
            .components()
            .any(|hop| hop.as_os_str().to_string_lossy().starts_with("usb"))
    })
}

/// Rejects names that cannot be a kernel interface, before they reach a
/// tool's argument list.
pub fn validate_interface_name(interface: &str) -> Result<()> {
    if INTERFACE_NAME.is_match(interface) {
        Ok(())
    } else {
        Err(WifiError::InvalidRequest(format!("'{}' is not an interface name", interface)))
    }
}

/// Resolve interface: explicit name, then the configured default, then the
/// first wireless interface found
pub fn resolve_interface(explicit: Option<&str>, default: Option<&str>) -> Result<String> {
    if let Some(name) = explicit.or(default) {
        return Ok(name.to_string());
    }

    list_wifi_interfaces()?
        .into_iter()
        .next()
        .map(|i| i.name)
        .ok_or(WifiError::NoWirelessInterface)
}

/// Whether the interface's radio is up.
///
/// The scan tool refuses to scan a downed interface with "Network is down";
/// any other outcome counts as enabled.
pub fn is_enabled(shell: &Shell<'_>, interface: &str) -> Result<bool> {
    let output = shell.run(Tool::Scan, &[interface, "scan"])?;
    if output.success {
        return Ok(true);
    }
    Ok(!output.output.to_lowercase().contains("network is down"))
}

/// The IPv4 address bound to the interface, if any.
pub fn interface_ip(shell: &Shell<'_>, interface: &str) -> Result<Option<String>> {
    let status = shell.run_checked(Tool::Status, interface, &[interface])?;
    Ok(parse_bound_ip(&status))
}

/// Whether the interface holds an IPv4 address.
pub fn is_connected(shell: &Shell<'_>, interface: &str) -> Result<bool> {
    Ok(interface_ip(shell, interface)?.is_some())
}

/// Brings the link up without any wireless profile, so the radio can scan.
///
/// `ifup` is pointed at a throwaway interfaces file holding only a bare
/// `inet dhcp` stanza, leaving the real file untouched.
pub fn enable_interface(shell: &Shell<'_>, interface: &str) -> Result<()> {
    let mut bare = NamedTempFile::new().map_err(|e| WifiError::file(std::env::temp_dir(), e))?;
    write!(bare, "auto {0}\niface {0} inet dhcp\n", interface)
        .and_then(|()| bare.flush())
        .map_err(|e| WifiError::file(bare.path(), e))?;

    let bare_path = bare.path().to_string_lossy().into_owned();
    tracing::info!(interface, "enabling interface");
    shell.run_checked(Tool::Up, interface, &["--force", "--interfaces", &bare_path, interface])?;
    Ok(())
}

/// Takes the link down regardless of what ifupdown thinks its state is.
pub fn disable_interface(shell: &Shell<'_>, interface: &str) -> Result<()> {
    tracing::info!(interface, "disabling interface");
    shell.run_checked(Tool::Down, interface, &["--force", interface])?;
    Ok(())
}
