//! Reconciling an interface's wifi state with a requested one.
//!
//! [`WifiManager`] answers three questions for the caller: what the interface
//! looks like now ([`WifiManager::current_settings`]), what would have to
//! happen to reach a desired state ([`WifiManager::needs_change`]), and the
//! outcome of actually getting there ([`WifiManager::apply`]). Nothing is
//! cached; the state is probed from the OS tools and the interfaces file on
//! every call.
//!
//! Calls that touch the same interface are serialized through a per-interface
//! lock, so two reconciliations never edit the interfaces file or drive the
//! link at the same time. Calls for different interfaces run independently.
//!
//! # Example
//!
//! ```no_run
//! use ifupdown_wifi::command::{SystemRunner, Tools};
//! use ifupdown_wifi::interfaces_file::InterfacesFile;
//! use ifupdown_wifi::manager::{DesiredState, WifiManager};
//!
//! let manager = WifiManager::new(SystemRunner, Tools::default(), InterfacesFile::default());
//! let desired = DesiredState::connect("HomeNet", "secret123");
//!
//! let response = manager.apply("wlan0", &desired);
//! if response.result.succeeded {
//!     println!("connected with {}", response.ip_address);
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::activation::activate;
use crate::command::{CommandRunner, Shell, Tools};
use crate::error::{Result, WifiError};
use crate::interface::{
    disable_interface, enable_interface, interface_ip, is_connected, is_enabled, validate_interface_name,
};
use crate::interfaces_file::InterfacesFile;
use crate::scan::{find_cell, scan_visible, Cell};
use crate::scheme::Scheme;
use crate::stanza::is_managed_interface;

fn default_true() -> bool {
    true
}

/// What the caller wants the interface to be doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    /// Required. A request without it is invalid.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// False means "radio on, no network": handled like a disable.
    #[serde(default = "default_true")]
    pub ssid_selected: bool,
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub passkey: String,
}

impl DesiredState {
    pub fn connect(ssid: impl Into<String>, passkey: impl Into<String>) -> Self {
        DesiredState {
            enabled: Some(true),
            ssid_selected: true,
            ssid: ssid.into(),
            passkey: passkey.into(),
        }
    }

    pub fn disabled() -> Self {
        DesiredState {
            enabled: Some(false),
            ssid_selected: false,
            ssid: String::new(),
            passkey: String::new(),
        }
    }

    /// Validates the request and reduces it to what should happen.
    pub fn intent(&self) -> Result<Intent<'_>> {
        match self.enabled {
            None => Err(WifiError::InvalidRequest("enabled is required".to_string())),
            Some(true) if self.ssid_selected && self.ssid.is_empty() => Err(WifiError::InvalidRequest(
                "an SSID is required when one is selected".to_string(),
            )),
            Some(true) if self.ssid_selected => Ok(Intent::Connect {
                ssid: &self.ssid,
                passkey: &self.passkey,
            }),
            Some(_) => Ok(Intent::Disable),
        }
    }

    /// Like [`DesiredState::intent`], also refusing to store a profile for an
    /// interface whose stanza could never be found again.
    pub fn intent_for(&self, interface: &str) -> Result<Intent<'_>> {
        let intent = self.intent()?;
        if matches!(intent, Intent::Connect { .. }) && !is_managed_interface(interface) {
            return Err(WifiError::InvalidRequest(format!(
                "profiles can only be stored for wlan interfaces, not '{}'",
                interface
            )));
        }
        Ok(intent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent<'a> {
    /// Forget the stored profile and take the link down.
    Disable,
    Connect { ssid: &'a str, passkey: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleSsid {
    pub id: u32,
    pub name: String,
}

impl From<Cell> for VisibleSsid {
    fn from(cell: Cell) -> Self {
        VisibleSsid {
            id: cell.id,
            name: cell.ssid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiSettings {
    pub interface: String,
    pub enabled: bool,
    pub ssid_selected: bool,
    pub selected_ssid: String,
    pub passkey: String,
    pub ip_address: String,
    /// Empty while the interface is disabled.
    pub visible_ssids: Vec<VisibleSsid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsEnabledResponse {
    pub interface: String,
    pub ip_address: String,
    pub needs_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFlags {
    pub needs_disable: bool,
    pub needs_connect: bool,
    pub needs_switch: bool,
}

impl ChangeFlags {
    pub fn is_empty(&self) -> bool {
        !(self.needs_disable || self.needs_connect || self.needs_switch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsChangeResponse {
    pub interface: String,
    pub ip_address: String,
    pub valid_request: bool,
    pub flags: ChangeFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledResponse {
    pub interface: String,
    pub enabled: bool,
    pub ip_address: String,
}

/// How an [`WifiManager::apply`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Carries the address the interface holds afterwards, empty when it was
    /// taken down.
    Succeeded(String),
    InvalidRequest,
    AuthenticateFailed,
    SsidNotFound,
    OsFailure,
}

impl ApplyOutcome {
    fn from_error(err: &WifiError) -> Self {
        match err {
            WifiError::Authentication { .. } => ApplyOutcome::AuthenticateFailed,
            WifiError::SsidNotFound(_) => ApplyOutcome::SsidNotFound,
            WifiError::InvalidRequest(_) => ApplyOutcome::InvalidRequest,
            WifiError::Interface { .. }
            | WifiError::CommandSpawn { .. }
            | WifiError::File { .. }
            | WifiError::UnsupportedEncryption(_)
            | WifiError::NoWirelessInterface => ApplyOutcome::OsFailure,
        }
    }

    pub fn flags(&self) -> ResultFlags {
        ResultFlags {
            succeeded: matches!(self, ApplyOutcome::Succeeded(_)),
            invalid_request: *self == ApplyOutcome::InvalidRequest,
            authenticate_failed: *self == ApplyOutcome::AuthenticateFailed,
            ssid_not_found: *self == ApplyOutcome::SsidNotFound,
            os_failure: *self == ApplyOutcome::OsFailure,
        }
    }
}

/// Exactly one field is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFlags {
    pub succeeded: bool,
    pub invalid_request: bool,
    pub authenticate_failed: bool,
    pub ssid_not_found: bool,
    pub os_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub interface: String,
    pub enabled: bool,
    pub ip_address: String,
    pub result: ResultFlags,
}

pub struct WifiManager<R> {
    runner: R,
    tools: Tools,
    file: InterfacesFile,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: CommandRunner> WifiManager<R> {
    pub fn new(runner: R, tools: Tools, file: InterfacesFile) -> Self {
        WifiManager {
            runner,
            tools,
            file,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn shell(&self) -> Shell<'_> {
        Shell::new(&self.runner, &self.tools)
    }

    fn interface_lock(&self, interface: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table holds an idle lock, so the table stays as small as
        // the number of interfaces currently in use.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(interface.to_string()).or_default().clone()
    }

    /// Networks currently visible on `interface`, one per SSID.
    pub fn scan(&self, interface: &str) -> Result<Vec<Cell>> {
        validate_interface_name(interface)?;
        scan_visible(&self.shell(), interface)
    }

    pub fn current_settings(&self, interface: &str) -> Result<WifiSettings> {
        validate_interface_name(interface)?;
        let shell = self.shell();
        let scheme = Scheme::for_interface(&self.file, interface)?;
        let enabled = is_enabled(&shell, interface)?;

        let visible_ssids = if enabled {
            scan_visible(&shell, interface)?
                .into_iter()
                .map(VisibleSsid::from)
                .collect()
        } else {
            Vec::new()
        };

        Ok(WifiSettings {
            interface: interface.to_string(),
            enabled,
            ssid_selected: scheme.is_some(),
            selected_ssid: scheme.as_ref().map(|s| s.ssid().to_string()).unwrap_or_default(),
            passkey: scheme.as_ref().map(|s| s.passkey().to_string()).unwrap_or_default(),
            ip_address: interface_ip(&shell, interface)?.unwrap_or_default(),
            visible_ssids,
        })
    }

    /// Whether turning the radio on is needed to honor `enabled`.
    pub fn needs_enabled(&self, interface: &str, enabled: bool) -> Result<NeedsEnabledResponse> {
        validate_interface_name(interface)?;
        let shell = self.shell();
        let needs_enabled = enabled && !is_enabled(&shell, interface)?;

        Ok(NeedsEnabledResponse {
            interface: interface.to_string(),
            ip_address: interface_ip(&shell, interface)?.unwrap_or_default(),
            needs_enabled,
        })
    }

    /// Works out which actions [`WifiManager::apply`] would take, without
    /// taking any.
    pub fn needs_change(&self, interface: &str, desired: &DesiredState) -> Result<NeedsChangeResponse> {
        if let Err(err) = validate_interface_name(interface) {
            tracing::debug!(%err, "rejecting interface");
            return Ok(NeedsChangeResponse {
                interface: interface.to_string(),
                ip_address: String::new(),
                valid_request: false,
                flags: ChangeFlags::default(),
            });
        }

        let lock = self.interface_lock(interface);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let shell = self.shell();
        let mut flags = ChangeFlags::default();
        let mut valid_request = true;

        match desired.intent_for(interface) {
            Err(err) => {
                tracing::debug!(interface, %err, "rejecting desired state");
                valid_request = false;
            }
            Ok(Intent::Disable) => {
                flags.needs_disable = is_enabled(&shell, interface)?;
            }
            Ok(Intent::Connect { ssid, passkey }) => {
                if !is_enabled(&shell, interface)? {
                    flags.needs_connect = true;
                } else if !self.scheme_matches(&shell, interface, ssid, passkey)? {
                    if is_connected(&shell, interface)? {
                        flags.needs_switch = true;
                    } else {
                        flags.needs_connect = true;
                    }
                }
            }
        }

        tracing::debug!(interface, valid_request, ?flags, "computed needed changes");

        Ok(NeedsChangeResponse {
            interface: interface.to_string(),
            ip_address: interface_ip(&shell, interface)?.unwrap_or_default(),
            valid_request,
            flags,
        })
    }

    fn scheme_matches(&self, shell: &Shell<'_>, interface: &str, ssid: &str, passkey: &str) -> Result<bool> {
        let Some(scheme) = Scheme::for_interface(&self.file, interface)? else {
            return Ok(false);
        };
        let live_cell = find_cell(shell, interface, ssid)?;
        Ok(scheme.matches(interface, ssid, passkey, live_cell.as_ref()))
    }

    /// Turns the radio on or off, leaving the stored profile alone.
    pub fn set_enabled(&self, interface: &str, enabled: bool) -> Result<EnabledResponse> {
        validate_interface_name(interface)?;
        let lock = self.interface_lock(interface);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let shell = self.shell();
        if enabled != is_enabled(&shell, interface)? {
            if enabled {
                enable_interface(&shell, interface)?;
            } else {
                disable_interface(&shell, interface)?;
            }
        }

        Ok(EnabledResponse {
            interface: interface.to_string(),
            enabled: is_enabled(&shell, interface)?,
            ip_address: interface_ip(&shell, interface)?.unwrap_or_default(),
        })
    }

    /// Drives `interface` to `desired`.
    ///
    /// Failures are reported through [`ApplyResponse::result`], never as an
    /// error.
    pub fn apply(&self, interface: &str, desired: &DesiredState) -> ApplyResponse {
        if let Err(err) = validate_interface_name(interface) {
            tracing::warn!(%err, "apply rejected");
            return ApplyResponse {
                interface: interface.to_string(),
                enabled: false,
                ip_address: String::new(),
                result: ApplyOutcome::InvalidRequest.flags(),
            };
        }

        let lock = self.interface_lock(interface);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let shell = self.shell();
        let outcome = match self.reconcile(&shell, interface, desired) {
            Ok(ip_address) => ApplyOutcome::Succeeded(ip_address),
            Err(err) => {
                tracing::warn!(interface, %err, "apply failed");
                ApplyOutcome::from_error(&err)
            }
        };

        let ip_address = match &outcome {
            ApplyOutcome::Succeeded(ip_address) => ip_address.clone(),
            ApplyOutcome::AuthenticateFailed => String::new(),
            _ => self.probe_ip(&shell, interface),
        };

        let enabled = is_enabled(&shell, interface).unwrap_or_else(|err| {
            tracing::warn!(interface, %err, "could not probe link state");
            false
        });

        ApplyResponse {
            interface: interface.to_string(),
            enabled,
            ip_address,
            result: outcome.flags(),
        }
    }

    fn reconcile(&self, shell: &Shell<'_>, interface: &str, desired: &DesiredState) -> Result<String> {
        match desired.intent_for(interface)? {
            Intent::Disable => {
                if let Some(scheme) = Scheme::for_interface(&self.file, interface)? {
                    scheme.delete(&self.file)?;
                }
                if is_enabled(shell, interface)? {
                    disable_interface(shell, interface)?;
                }
                Ok(String::new())
            }
            Intent::Connect { ssid, passkey } => {
                if !is_enabled(shell, interface)? {
                    enable_interface(shell, interface)?;
                }

                let cell = find_cell(shell, interface, ssid)?
                    .ok_or_else(|| WifiError::SsidNotFound(ssid.to_string()))?;
                let scheme = Scheme::for_cell(interface, &cell, passkey)?;

                let connection = activate(shell, &self.file, &scheme)?;
                Ok(connection.ip_address)
            }
        }
    }

    fn probe_ip(&self, shell: &Shell<'_>, interface: &str) -> String {
        match interface_ip(shell, interface) {
            Ok(ip_address) => ip_address.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(interface, %err, "could not probe address");
                String::new()
            }
        }
    }
}

/// Displays current settings in a human-readable format.
///
/// # Output Format
/// ```text
/// Interface: wlan0
/// Enabled:   yes
/// Network:   HomeNet
/// IP:        192.168.1.42
///
/// Visible networks:
///   [1] HomeNet
///   [2] CoffeeShop
/// ```
pub fn display_settings(settings: &WifiSettings) {
    println!("Interface: {}", settings.interface);
    println!("Enabled:   {}", if settings.enabled { "yes" } else { "no" });
    if settings.ssid_selected {
        println!("Network:   {}", settings.selected_ssid);
    } else {
        println!("Network:   (none)");
    }
    if settings.ip_address.is_empty() {
        println!("IP:        -");
    } else {
        println!("IP:        {}", settings.ip_address);
    }

    if !settings.visible_ssids.is_empty() {
        println!();
        println!("Visible networks:");
        for ssid in &settings.visible_ssids {
            println!("  [{}] {}", ssid.id, ssid.name);
        }
    }
}
