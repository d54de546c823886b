//! Wifi Profile Management for ifupdown Systems
//!
//! This library manages wireless connection profiles stored in the Debian
//! style `/etc/network/interfaces` file and drives the classic net tools
//! (`iwlist`, `ifup`, `ifdown`, `ifconfig`) to bring an interface onto the
//! network a caller asks for.
//!
//! # Modules
//!
//! - [`activation`] - Bringing an interface up on a profile and reading back its address
//! - [`command`] - Process execution seam and tool paths
//! - [`config`] - Configuration file for tool paths and defaults
//! - [`error`] - Custom error types for the library
//! - [`interface`] - Wireless interface discovery and link-state probes
//! - [`interfaces_file`] - Atomic whole-file access to the interfaces file
//! - [`manager`] - Reconciling an interface with a desired wifi state
//! - [`psk`] - WPA pre-shared key derivation
//! - [`scan`] - Parsing scan results into network cells
//! - [`scheme`] - Saved connection profiles
//! - [`server`] - JSON API over the manager
//! - [`stanza`] - Line-level parsing and editing of interface stanzas
//!
//! # Example Usage
//!
//! ```no_run
//! use ifupdown_wifi::{DesiredState, InterfacesFile, SystemRunner, Tools, WifiManager};
//!
//! let manager = WifiManager::new(SystemRunner, Tools::default(), InterfacesFile::default());
//!
//! // Ask what reaching the desired state would take
//! let desired = DesiredState::connect("HomeNet", "secret123");
//! let plan = manager.needs_change("wlan0", &desired).expect("Probe failed");
//! println!("Needs connect: {}", plan.flags.needs_connect);
//!
//! // Then do it
//! let response = manager.apply("wlan0", &desired);
//! println!("Succeeded: {}, IP: {}", response.result.succeeded, response.ip_address);
//! ```

pub mod activation;

/// Process execution for the OS network tools, behind a mockable trait.
pub mod command;

/// Configuration module for tool paths and application settings.
/// Handles reading/writing the TOML config file.
pub mod config;

/// Error module defining custom error types for the library.
/// Uses `thiserror` for ergonomic error handling.
pub mod error;

/// Interface module for wireless adapter discovery and link control.
pub mod interface;

pub mod interfaces_file;

pub mod manager;

pub mod psk;

/// Scan module for discovering visible wifi networks.
pub mod scan;

pub mod scheme;

/// Server module exposing the manager as a JSON API over Axum.
pub mod server;

pub mod stanza;

pub use activation::{activate, Connection};

pub use command::{CommandOutput, CommandRunner, SystemRunner, Tools};

// Re-export the main error type for library users
pub use error::{Result, WifiError};

pub use interface::{list_wifi_interfaces, resolve_interface, WifiInterface};

pub use interfaces_file::InterfacesFile;

pub use manager::{ApplyResponse, DesiredState, NeedsChangeResponse, WifiManager, WifiSettings};

pub use scan::{Cell, EncryptionType};

pub use scheme::Scheme;
