//! Saved connection profiles.
//!
//! A [`Scheme`] is the wireless part of one interface stanza: which network to
//! join and with what key. Schemes are read from and written to the
//! interfaces file; the human-readable passphrase is what gets stored, and the
//! WPA key is derived from it only when the interface is brought up.

use std::fmt;

use crate::error::{Result, WifiError};
use crate::interfaces_file::InterfacesFile;
use crate::psk::derive_psk;
use crate::scan::{Cell, EncryptionType};
use crate::stanza::{self, Options, Stanza, WIRELESS_ESSID, WPA_SSID};

pub const WPA_PSK: &str = "wpa-psk";
pub const WIRELESS_KEY: &str = "wireless-key";
pub const WIRELESS_CHANNEL: &str = "wireless-channel";

/// Connection profile for one interface.
///
/// The SSID and every option value are held without surrounding quotes;
/// quoting is applied when the scheme is rendered or handed to `ifup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    interface: String,
    ssid: String,
    options: Options,
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

impl Scheme {
    pub fn new(interface: impl Into<String>, ssid: &str, options: Options) -> Self {
        let options = options
            .into_iter()
            .map(|(key, value)| {
                let value = unquote(&value).to_string();
                (key, value)
            })
            .collect();

        Scheme {
            interface: interface.into(),
            ssid: unquote(ssid).to_string(),
            options,
        }
    }

    pub fn from_stanza(stanza: &Stanza) -> Self {
        Scheme::new(stanza.interface.clone(), &stanza.ssid, stanza.options.clone())
    }

    /// Builds the profile needed to join `cell`, with `passkey` if non-empty.
    ///
    /// # Errors
    /// `WifiError::UnsupportedEncryption` for an encrypted cell whose type
    /// could not be determined.
    pub fn for_cell(interface: impl Into<String>, cell: &Cell, passkey: &str) -> Result<Self> {
        let ssid_key = match (cell.encrypted, cell.encryption_type) {
            (false, _) => WIRELESS_ESSID,
            (true, EncryptionType::Wpa | EncryptionType::Wpa2) => WPA_SSID,
            (true, EncryptionType::Wep) => WIRELESS_ESSID,
            (true, EncryptionType::Unknown) => {
                return Err(WifiError::UnsupportedEncryption(cell.ssid.clone()));
            }
        };

        let mut options = Options::new();
        options.insert(ssid_key.to_string(), cell.ssid.clone());

        let mut scheme = Scheme::new(interface, &cell.ssid, options);
        if !passkey.is_empty() {
            scheme.set_passkey(passkey);
        }
        Ok(scheme)
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Security family implied by which options are present.
    ///
    /// Only `Wpa`, `Wep` and `Unknown` are produced; a profile does not record
    /// WPA versions.
    pub fn encryption_type(&self) -> EncryptionType {
        if self.options.contains_key(WPA_SSID) || self.options.contains_key(WPA_PSK) {
            EncryptionType::Wpa
        } else if self.options.contains_key(WIRELESS_KEY) {
            EncryptionType::Wep
        } else {
            EncryptionType::Unknown
        }
    }

    pub fn ssid_option_key(&self) -> &'static str {
        if self.encryption_type() == EncryptionType::Wpa {
            WPA_SSID
        } else {
            WIRELESS_ESSID
        }
    }

    pub fn passkey_option_key(&self) -> &'static str {
        if self.encryption_type() == EncryptionType::Wpa {
            WPA_PSK
        } else {
            WIRELESS_KEY
        }
    }

    /// The stored passphrase, or "" when the profile has none.
    pub fn passkey(&self) -> &str {
        self.options
            .get(self.passkey_option_key())
            .map_or("", String::as_str)
    }

    /// Stores `value` as the passphrase; an empty value removes it.
    pub fn set_passkey(&mut self, value: &str) {
        let key = self.passkey_option_key();
        if value.is_empty() {
            self.options.shift_remove(key);
        } else {
            self.options.insert(key.to_string(), unquote(value).to_string());
        }
    }

    /// Key material for the interface: the derived PSK for WPA, the
    /// passphrase as-is otherwise.
    pub fn psk(&self) -> String {
        let passkey = self.passkey();
        if !passkey.is_empty() && self.encryption_type() == EncryptionType::Wpa {
            derive_psk(passkey, &self.ssid)
        } else {
            passkey.to_string()
        }
    }

    /// Whether this profile already is what the caller asked for.
    ///
    /// An empty requested `passkey` only matches a profile without one. When
    /// `live_cell` is the scanned network and it announces WPA, a non-WPA
    /// profile does not match even if everything else does.
    pub fn matches(&self, interface: &str, ssid: &str, passkey: &str, live_cell: Option<&Cell>) -> bool {
        if interface != self.interface || ssid != self.ssid {
            return false;
        }

        if unquote(passkey) != self.passkey() {
            return false;
        }

        if let Some(cell) = live_cell {
            if cell.encryption_type.is_wpa() && self.encryption_type() != EncryptionType::Wpa {
                return false;
            }
        }

        true
    }

    /// Options passed to `ifup`: the stored ones with the key replaced by the
    /// PSK, the SSID quoted, and automatic channel selection unless WEP.
    pub fn activation_options(&self) -> Options {
        let mut options = self.options.clone();

        let psk = self.psk();
        if !psk.is_empty() {
            options.insert(self.passkey_option_key().to_string(), format!("\"{}\"", psk));
        }

        if !self.ssid.is_empty() {
            options.insert(self.ssid_option_key().to_string(), format!("\"{}\"", self.ssid));
        }

        if self.encryption_type() != EncryptionType::Wep {
            options.insert(WIRELESS_CHANNEL.to_string(), "auto".to_string());
        }

        options
    }

    /// Arguments for `ifup`: the interface followed by `-o key=value` pairs.
    pub fn ifup_args(&self) -> Vec<String> {
        let options = self.activation_options();
        let mut args = Vec::with_capacity(1 + options.len() * 2);
        args.push(self.interface.clone());
        for (key, value) in &options {
            args.push("-o".to_string());
            args.push(format!("{}={}", key, value));
        }
        args
    }

    /// The stanza for this profile as file lines, with an `auto` line first
    /// when `auto_connect` is set.
    pub fn render_lines(&self, auto_connect: bool) -> Vec<String> {
        let mut lines = Vec::new();
        if auto_connect {
            lines.push(format!("auto {}\n", self.interface));
        }
        lines.extend(stanza::split_lines(&self.to_string()));
        lines
    }

    /// Writes this profile into `lines`, replacing any stanza for the same
    /// interface.
    pub fn save_to_lines(&self, lines: &mut Vec<String>, auto_connect: bool) {
        stanza::insert_stanza(lines, &self.interface, self.render_lines(auto_connect));
    }

    /// Removes every stanza for this profile's interface from `lines`.
    pub fn delete_from_lines(&self, lines: &mut Vec<String>) -> bool {
        stanza::remove_stanzas(&self.interface, lines)
    }

    /// All profiles in `file`, in file order.
    pub fn all(file: &InterfacesFile) -> Result<Vec<Scheme>> {
        let lines = file.read_lines()?;
        let stanzas = stanza::parse_stanzas(&lines, true);
        Ok(stanza::order_stanzas(&stanzas)
            .into_iter()
            .map(Scheme::from_stanza)
            .collect())
    }

    /// The first profile in `file` for `interface`.
    pub fn for_interface(file: &InterfacesFile, interface: &str) -> Result<Option<Scheme>> {
        Ok(Scheme::all(file)?
            .into_iter()
            .find(|scheme| scheme.interface == interface))
    }

    pub fn save(&self, file: &InterfacesFile, auto_connect: bool) -> Result<()> {
        file.edit(|lines| {
            self.save_to_lines(lines, auto_connect);
            true
        })?;
        tracing::info!(interface = %self.interface, ssid = %self.ssid, path = %file.path().display(), "saved scheme");
        Ok(())
    }

    /// Removes this profile's interface from `file`. Returns whether anything
    /// was there to remove; the file is not rewritten otherwise.
    pub fn delete(&self, file: &InterfacesFile) -> Result<bool> {
        let removed = file.edit(|lines| self.delete_from_lines(lines))?;
        if removed {
            tracing::info!(interface = %self.interface, path = %file.path().display(), "deleted scheme");
        }
        Ok(removed)
    }
}

/// Renders the stanza as it appears in the interfaces file, without the
/// `auto` line.
impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iface {} inet dhcp", self.interface)?;
        for (key, value) in &self.options {
            writeln!(f, "    {} \"{}\"", key, value)?;
        }
        Ok(())
    }
}
