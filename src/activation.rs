//! Bringing an interface up on a saved profile.
//!
//! Activation drives `ifdown`, `ifup` and `ifconfig` in sequence. The
//! bring-up tool reports nothing useful about authentication, so the only
//! sign that the key was wrong is an interface that came up without an IPv4
//! address. That inference can misfire when DHCP is merely slow.
//!
//! # Requirements
//!
//! - ifupdown (`ifup`/`ifdown`) with its wireless and WPA hooks installed
//! - net-tools `ifconfig` printing addresses as `inet addr:<ip>`
//! - Permission to edit the interfaces file and reconfigure the interface
//!
//! # Example
//!
//! ```no_run
//! use ifupdown_wifi::activation::activate;
//! use ifupdown_wifi::command::{Shell, SystemRunner, Tools};
//! use ifupdown_wifi::interfaces_file::InterfacesFile;
//! use ifupdown_wifi::scheme::Scheme;
//!
//! let tools = Tools::default();
//! let shell = Shell::new(&SystemRunner, &tools);
//! let file = InterfacesFile::default();
//!
//! let scheme = Scheme::for_interface(&file, "wlan0")
//!     .expect("Read failed")
//!     .expect("No profile for wlan0");
//! let connection = activate(&shell, &file, &scheme).expect("Activation failed");
//! println!("IP: {}", connection.ip_address);
//! ```
//!
//! Interrupting an activation part way leaves the interface in whatever
//! state the last tool put it in.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::command::{Shell, Tool};
use crate::error::{Result, WifiError};
use crate::interfaces_file::InterfacesFile;
use crate::scheme::Scheme;

lazy_static! {
    static ref BOUND_IP: Regex =
        Regex::new(r"(?m)^\s+inet addr:(?P<ip_address>\S+)").expect("valid inet addr pattern");
}

/// A scheme that was brought up, and the address the interface got.
#[derive(Debug, Clone)]
pub struct Connection {
    pub scheme: Scheme,
    pub ip_address: String,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection(interface = \"{}\", ssid = \"{}\", IP = {})",
            self.scheme.interface(),
            self.scheme.ssid(),
            self.ip_address
        )
    }
}

/// Brings the scheme's interface down, saves the scheme, brings the
/// interface back up with the scheme's options and reads back its address.
///
/// # Returns
/// - `Ok(Connection)` when the interface has an IPv4 address afterwards
/// - `Err(WifiError::Interface)` if `ifdown`, `ifup` or `ifconfig` exits
///   non-zero
/// - `Err(WifiError::Authentication)` if `ifup` succeeded but no address was
///   bound
///
/// # Commands Executed
/// ```bash
/// ifdown <interface>
/// ifup <interface> -o wpa-ssid="<ssid>" -o wpa-psk="<psk>" -o wireless-channel=auto
/// ifconfig <interface>
/// ```
pub fn activate(shell: &Shell<'_>, file: &InterfacesFile, scheme: &Scheme) -> Result<Connection> {
    let interface = scheme.interface();
    tracing::info!(interface, ssid = scheme.ssid(), "activating scheme");

    shell.run_checked(Tool::Down, interface, &[interface])?;

    scheme.save(file, true)?;

    let args = scheme.ifup_args();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    shell.run_checked(Tool::Up, interface, &args)?;

    let status = shell.run_checked(Tool::Status, interface, &[interface])?;

    match parse_bound_ip(&status) {
        Some(ip_address) => {
            let connection = Connection {
                scheme: scheme.clone(),
                ip_address,
            };
            tracing::info!(%connection, "interface connected");
            Ok(connection)
        }
        None => {
            tracing::warn!(interface, ssid = scheme.ssid(), "no address bound after ifup");
            Err(WifiError::Authentication {
                interface: interface.to_string(),
                ssid: scheme.ssid().to_string(),
            })
        }
    }
}

/// Extracts the IPv4 address from `ifconfig` output.
pub fn parse_bound_ip(output: &str) -> Option<String> {
    BOUND_IP
        .captures(output)
        .map(|captures| captures["ip_address"].to_string())
}

/// Displays a connection in a human-readable format.
///
/// # Output Format
/// ```text
/// Interface: wlan0
/// SSID:      HomeNet
/// Security:  wpa
/// IP:        192.168.1.42
/// ```
pub fn display_connection(connection: &Connection) {
    println!("Interface: {}", connection.scheme.interface());
    println!("SSID:      {}", connection.scheme.ssid());
    println!("Security:  {}", connection.scheme.encryption_type());
    println!("IP:        {}", connection.ip_address);
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFCONFIG_UP: &str = "\
wlan0     Link encap:Ethernet  HWaddr 00:0c:29:3e:5c:7a
          inet addr:192.168.1.42  Bcast:192.168.1.255  Mask:255.255.255.0
          UP BROADCAST RUNNING MULTICAST  MTU:1500  Metric:1
";

    const IFCONFIG_NO_ADDRESS: &str = "\
wlan0     Link encap:Ethernet  HWaddr 00:0c:29:3e:5c:7a
          UP BROADCAST MULTICAST  MTU:1500  Metric:1
";

    #[test]
    fn extracts_bound_address() {
        assert_eq!(parse_bound_ip(IFCONFIG_UP).as_deref(), Some("192.168.1.42"));
    }

    #[test]
    fn no_address_without_inet_line() {
        assert_eq!(parse_bound_ip(IFCONFIG_NO_ADDRESS), None);
    }

    #[test]
    fn inet_line_must_be_indented() {
        assert_eq!(parse_bound_ip("inet addr:10.0.0.1\n"), None);
        assert_eq!(parse_bound_ip("          INET ADDR:10.0.0.1\n"), None);
    }
}
