//! Wireless network scanning module.
//!
//! This module runs the scan tool (`iwlist <iface> scan`) and turns its
//! output into [`Cell`] records, one per network the radio heard.
//!
//! # Scanning Process
//!
//! 1. Runs the scan tool for the interface; a non-zero exit is an error
//! 2. Splits the output on the `Cell NN - ` header that starts every block
//! 3. Parses each block on its own; an unusable block is skipped, never fatal
//! 4. Optionally filters hidden networks and duplicate SSIDs for display
//!
//! # Example
//!
//! ```no_run
//! use ifupdown_wifi::command::{Shell, SystemRunner, Tools};
//! use ifupdown_wifi::scan::{scan_visible, display_cells};
//!
//! let tools = Tools::default();
//! let shell = Shell::new(&SystemRunner, &tools);
//! let cells = scan_visible(&shell, "wlan0").expect("Scan failed");
//! display_cells(&cells);
//! ```

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::command::{Shell, Tool};
use crate::error::Result;

lazy_static! {
    static ref CELL_HEADER: Regex = Regex::new(r"Cell \d+ - ").expect("valid cell header pattern");
}

/// Lines of a cell block are indented this far in the scan tool's output.
/// The first line loses its indent to the split, so it is restored before
/// dedenting.
const BLOCK_INDENT: usize = 20;

/// Continuation lines of an information element sit this much deeper than
/// the element's own line once the block has been dedented.
const IE_CONTINUATION_INDENT: &str = "    ";

/// Security family of a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionType {
    Wpa2,
    Wpa,
    Wep,
    Unknown,
}

impl EncryptionType {
    pub fn is_wpa(self) -> bool {
        matches!(self, EncryptionType::Wpa | EncryptionType::Wpa2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionType::Wpa2 => "wpa2",
            EncryptionType::Wpa => "wpa",
            EncryptionType::Wep => "wep",
            EncryptionType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One network observed by a scan.
///
/// Cells live only as long as the scan result that produced them; they are
/// never written anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    /// Position of the cell within its scan, starting at 1. Lets a caller
    /// tell apart entries that otherwise look identical. 0 is never assigned.
    pub id: u32,

    /// The SSID (network name), without surrounding quotes.
    /// Empty for hidden networks.
    pub ssid: String,

    /// Whether the network requires a key.
    pub encrypted: bool,

    /// Security family, inferred from the information elements.
    pub encryption_type: EncryptionType,

    /// BSSID of the access point.
    pub address: String,

    /// Operating mode reported by the scan tool (e.g. "Master").
    pub mode: String,
}

/// Fields collected while walking one block.
#[derive(Default)]
struct CellFields {
    ssid: Option<String>,
    encrypted: Option<bool>,
    inferred_type: Option<EncryptionType>,
    address: Option<String>,
    mode: Option<String>,
}

impl CellFields {
    fn is_empty(&self) -> bool {
        self.ssid.is_none()
            && self.encrypted.is_none()
            && self.address.is_none()
            && self.mode.is_none()
            && self.inferred_type.is_none()
    }

    fn infer(&mut self, element: &str) {
        if element.contains("WPA2") {
            self.inferred_type = Some(EncryptionType::Wpa2);
        } else if element.contains("WPA") && self.inferred_type != Some(EncryptionType::Wpa2) {
            self.inferred_type = Some(EncryptionType::Wpa);
        }
    }

    fn into_cell(self, id: u32) -> Cell {
        let encrypted = self.encrypted.unwrap_or(false);

        // WEP networks carry no information element announcing themselves,
        // so an encrypted cell without one is WEP.
        let encryption_type = match (encrypted, self.inferred_type) {
            (_, Some(kind)) => kind,
            (true, None) => EncryptionType::Wep,
            (false, None) => EncryptionType::Unknown,
        };

        Cell {
            id,
            ssid: self.ssid.unwrap_or_default(),
            encrypted,
            encryption_type,
            address: self.address.unwrap_or_default(),
            mode: self.mode.unwrap_or_default(),
        }
    }
}

/// Runs the scan tool on `interface` and returns every cell it reported.
///
/// # Returns
/// - `Ok(Vec<Cell>)` in the order the tool listed them
/// - `Err(WifiError::Interface)` if the scan tool exits non-zero; the error
///   carries the tool's combined output
///
/// # Command Executed
/// ```bash
/// iwlist <interface> scan
/// ```
pub fn all_cells(shell: &Shell<'_>, interface: &str) -> Result<Vec<Cell>> {
    let output = shell.run_checked(Tool::Scan, interface, &[interface, "scan"])?;
    let cells = parse_scan_output(&output);
    tracing::debug!(interface, count = cells.len(), "scan complete");
    Ok(cells)
}

/// Scans and returns only the cells worth showing to a user.
///
/// See [`visible_cells`].
pub fn scan_visible(shell: &Shell<'_>, interface: &str) -> Result<Vec<Cell>> {
    Ok(visible_cells(all_cells(shell, interface)?))
}

/// Finds the first visible cell whose SSID matches `ssid`, ignoring case.
pub fn find_cell(shell: &Shell<'_>, interface: &str, ssid: &str) -> Result<Option<Cell>> {
    Ok(scan_visible(shell, interface)?
        .into_iter()
        .find(|cell| cell.ssid.to_lowercase() == ssid.to_lowercase()))
}

/// Drops hidden networks and collapses SSIDs that differ only by case,
/// keeping the first one seen.
///
/// Two access points broadcasting the same name can't be told apart by the
/// bring-up tool either, which only takes a name.
pub fn visible_cells(cells: Vec<Cell>) -> Vec<Cell> {
    let mut seen = std::collections::HashSet::new();

    cells
        .into_iter()
        .filter(|cell| !cell.ssid.is_empty())
        .filter(|cell| seen.insert(cell.ssid.to_lowercase()))
        .collect()
}

/// Parses the complete output of one scan.
///
/// Text before the first cell header (the "Scan completed" banner) is
/// ignored. Ids are numbered from 1 within this call.
pub fn parse_scan_output(output: &str) -> Vec<Cell> {
    let mut cells = Vec::new();

    for block in CELL_HEADER.split(output).skip(1) {
        match parse_cell_block(block) {
            Some(fields) => {
                let id = u32::try_from(cells.len() + 1).unwrap_or(u32::MAX);
                cells.push(fields.into_cell(id));
            }
            None => tracing::debug!("skipping scan block with no usable fields"),
        }
    }

    cells
}

fn parse_cell_block(block: &str) -> Option<CellFields> {
    let indented = format!("{}{}", " ".repeat(BLOCK_INDENT), block);
    let lines = dedent(&indented);
    let mut fields = CellFields::default();

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        index += 1;

        let Some((raw_key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match normalize_key(raw_key).as_str() {
            "ie" => {
                if value.contains("Unknown") {
                    continue;
                }
                // The element's details follow on deeper lines; they carry
                // nothing we use beyond what the first line names.
                while index < lines.len() && lines[index].starts_with(IE_CONTINUATION_INDENT) {
                    index += 1;
                }
                fields.infer(value);
            }
            "ssid" => fields.ssid = Some(value.trim_matches('"').to_string()),
            "encrypted" => fields.encrypted = Some(value == "on"),
            "address" => fields.address = Some(value.to_string()),
            "mode" => fields.mode = Some(value.to_string()),
            _ => {}
        }
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

fn normalize_key(key: &str) -> String {
    let key = key.trim().to_lowercase();
    let key = match key.as_str() {
        "encryption key" => "encrypted",
        "essid" => "ssid",
        other => other,
    };
    key.replace(' ', "")
}

/// Removes the whitespace margin shared by every non-blank line.
fn dedent(text: &str) -> Vec<&str> {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[margin..]
            }
        })
        .collect()
}

/// Displays a list of cells in a formatted table.
///
/// # Output Format
/// ```text
/// ID   SSID                             SECURITY ADDRESS
/// ------------------------------------------------------------------
/// 1    HomeNet                          wpa2     00:11:22:33:44:55
/// 3    CoffeeShop                       open     66:77:88:99:AA:BB
/// ```
pub fn display_cells(cells: &[Cell]) {
    if cells.is_empty() {
        println!("No networks found.");
        return;
    }

    println!("{:<4} {:<32} {:<8} {}", "ID", "SSID", "SECURITY", "ADDRESS");
    println!("{}", "-".repeat(66));

    for cell in cells {
        let security = if cell.encrypted {
            cell.encryption_type.as_str()
        } else {
            "open"
        };
        println!(
            "{:<4} {:<32} {:<8} {}",
            cell.id,
            truncate_ssid(&cell.ssid, 32),
            security,
            cell.address
        );
    }
}

/// Truncates an SSID to `max_len` characters, appending "..." when cut.
fn truncate_ssid(ssid: &str, max_len: usize) -> String {
    if ssid.chars().count() > max_len {
        let kept: String = ssid.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    } else {
        ssid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCAN: &str = "wlan0     Scan completed :
          Cell 01 - Address: 00:11:22:33:44:55
                    Channel:6
                    Frequency:2.437 GHz (Channel 6)
                    Quality=70/70  Signal level=-38 dBm
                    Encryption key:on
                    ESSID:\"HomeNet\"
                    Bit Rates:1 Mb/s; 2 Mb/s; 5.5 Mb/s; 11 Mb/s
                    Mode:Master
                    IE: IEEE 802.11i/WPA2 Version 1
                        Group Cipher : CCMP
                        Pairwise Ciphers (1) : CCMP
                        Authentication Suites (1) : PSK
                    IE: WPA Version 1
                        Group Cipher : TKIP
                        Pairwise Ciphers (1) : TKIP
                        Authentication Suites (1) : PSK
          Cell 02 - Address: 66:77:88:99:AA:BB
                    Channel:11
                    Encryption key:on
                    ESSID:\"OldRouter\"
                    Mode:Master
          Cell 03 - Address: 12:34:56:78:9A:BC
                    Encryption key:off
                    ESSID:\"CoffeeShop\"
                    Mode:Master
                    IE: Unknown: DD0900037F01010000FF7F
          Cell 04 - Address: DE:AD:BE:EF:00:01
                    Encryption key:on
                    ESSID:\"\"
                    Mode:Master
                    IE: WPA Version 1
                        Group Cipher : TKIP
          Cell 05 - Address: 00:11:22:33:44:66
                    Encryption key:on
                    ESSID:\"homenet\"
                    Mode:Master
                    IE: IEEE 802.11i/WPA2 Version 1
";

    #[test]
    fn parses_every_cell_with_ids_from_one() {
        let cells = parse_scan_output(SCAN);
        let ids: Vec<u32> = cells.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn parses_fields_of_wpa2_cell() {
        let cells = parse_scan_output(SCAN);
        let home = &cells[0];
        assert_eq!(home.ssid, "HomeNet");
        assert!(home.encrypted);
        assert_eq!(home.encryption_type, EncryptionType::Wpa2);
        assert_eq!(home.address, "00:11:22:33:44:55");
        assert_eq!(home.mode, "Master");
    }

    #[test]
    fn encrypted_cell_without_element_is_wep() {
        let cells = parse_scan_output(SCAN);
        assert_eq!(cells[1].ssid, "OldRouter");
        assert_eq!(cells[1].encryption_type, EncryptionType::Wep);
    }

    #[test]
    fn open_cell_ignores_unknown_element() {
        let cells = parse_scan_output(SCAN);
        assert!(!cells[2].encrypted);
        assert_eq!(cells[2].encryption_type, EncryptionType::Unknown);
    }

    #[test]
    fn wpa_only_cell_is_wpa() {
        let cells = parse_scan_output(SCAN);
        assert_eq!(cells[3].encryption_type, EncryptionType::Wpa);
        assert_eq!(cells[3].ssid, "");
    }

    #[test]
    fn mixed_mode_cell_reports_wpa2_in_either_element_order() {
        let wpa2_first = parse_scan_output(SCAN);
        assert_eq!(wpa2_first[0].encryption_type, EncryptionType::Wpa2);

        let wpa_first = parse_scan_output(
            "          Cell 01 - Address: 00:11:22:33:44:77
                    Encryption key:on
                    ESSID:\"Mixed\"
                    IE: WPA Version 1
                        Group Cipher : TKIP
                    IE: IEEE 802.11i/WPA2 Version 1
                        Group Cipher : CCMP
",
        );
        assert_eq!(wpa_first[0].encryption_type, EncryptionType::Wpa2);
    }

    #[test]
    fn visible_drops_hidden_and_case_duplicates() {
        let visible = visible_cells(parse_scan_output(SCAN));
        let names: Vec<&str> = visible.iter().map(|c| c.ssid.as_str()).collect();
        assert_eq!(names, vec!["HomeNet", "OldRouter", "CoffeeShop"]);
        assert_eq!(visible[0].id, 1);
    }

    #[test]
    fn garbage_block_is_skipped() {
        let output = "Cell 01 - nothing useful here\nCell 02 - Address: AA:BB:CC:DD:EE:FF\n                    ESSID:\"Lab\"\n";
        let cells = parse_scan_output(output);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].ssid, "Lab");
        assert_eq!(cells[0].id, 1);
    }

    #[test]
    fn no_cells_when_header_missing() {
        assert!(parse_scan_output("wlan0     No scan results\n").is_empty());
    }

    #[test]
    fn truncates_long_ssids() {
        assert_eq!(truncate_ssid("Short", 10), "Short");
        assert_eq!(truncate_ssid("VeryLongNetworkName", 10), "VeryLon...");
    }
}
