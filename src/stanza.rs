//! Parsing and line surgery for `/etc/network/interfaces`.
//!
//! The file is handled as a vector of lines that keep their terminators, so
//! concatenating the vector reproduces the original bytes exactly. Parsing
//! records where each wireless stanza sits; editing deletes and inserts whole
//! line ranges and leaves every other line alone.
//!
//! A stanza looks like this, with an optional `auto` line in front and an
//! optional blank line after:
//!
//! ```text
//! auto wlan0
//! iface wlan0 inet dhcp
//!     wpa-ssid "HomeNet"
//!     wpa-psk "secret123"
//!
//! ```

use std::ops::Range;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IFACE_HEADER: Regex =
        Regex::new(r"^iface\s+(?P<interface>wlan\d?)(?:-(?P<name>\w+))?").expect("valid iface pattern");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s{2,}").expect("valid whitespace pattern");
}

/// Option key to value, in file order. Keys are unique within a stanza.
pub type Options = IndexMap<String, String>;

/// Stanzas grouped by interface. An interface maps to several stanzas when
/// the file holds duplicates (usually from hand edits).
pub type StanzaMap = IndexMap<String, Vec<Stanza>>;

pub const WPA_SSID: &str = "wpa-ssid";
pub const WIRELESS_ESSID: &str = "wireless-essid";

/// Position and content of one wireless interface definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    pub interface: String,
    /// Logical name after `-` in `iface wlan0-home`, if any.
    pub name: Option<String>,
    /// Raw SSID option value, quotes included.
    pub ssid: String,
    pub options: Options,
    /// An `auto <interface>` line directly precedes the header.
    pub has_auto_connect: bool,
    /// The blank line after the options is counted in the range.
    pub has_trailing_blank: bool,
    /// First line of the range (the auto line when present).
    pub start_line: usize,
    pub line_count: usize,
}

impl Stanza {
    pub fn line_range(&self) -> Range<usize> {
        self.start_line..self.start_line + self.line_count
    }
}

/// Splits file content into lines that keep their `\n`.
pub fn split_lines(content: &str) -> Vec<String> {
    content.split_inclusive('\n').map(String::from).collect()
}

/// The SSID option of a stanza: `wpa-ssid` first, then `wireless-essid`.
pub fn ssid_from_options(options: &Options) -> Option<&str> {
    options
        .get(WPA_SSID)
        .or_else(|| options.get(WIRELESS_ESSID))
        .map(String::as_str)
}

/// Whether stanzas for `interface` can be recognized in the file at all.
pub fn is_managed_interface(interface: &str) -> bool {
    IFACE_HEADER
        .captures(&format!("iface {} inet dhcp", interface))
        .is_some_and(|captures| &captures["interface"] == interface)
}

/// Finds every well-formed wireless stanza in `lines`.
///
/// A header must not be commented out and must match the wireless interface
/// pattern. The indented lines right after it are its options. Stanzas with
/// no options, an option without a value, or no SSID option are skipped.
///
/// With `count_trailing_blank`, a blank line right after the options joins
/// the range when the line before the stanza is blank or absent, so removing
/// the range never leaves two blank lines in a row.
pub fn parse_stanzas(lines: &[String], count_trailing_blank: bool) -> StanzaMap {
    let mut stanzas = StanzaMap::new();

    for (index, line) in lines.iter().enumerate() {
        if line.starts_with('#') {
            continue;
        }
        let Some(captures) = IFACE_HEADER.captures(line) else {
            continue;
        };
        let interface = captures["interface"].to_string();
        let name = captures.name("name").map(|m| m.as_str().to_string());

        let mut options = Options::new();
        let mut malformed = false;
        let mut after = index + 1;
        while after < lines.len() && is_option_line(&lines[after]) {
            match parse_option(&lines[after]) {
                Some((key, value)) => {
                    options.insert(key, value);
                }
                None => malformed = true,
            }
            after += 1;
        }

        if malformed || options.is_empty() {
            tracing::debug!(line = index, %interface, "skipping stanza with missing options");
            continue;
        }
        let Some(ssid) = ssid_from_options(&options).filter(|ssid| !ssid.is_empty()) else {
            tracing::debug!(line = index, %interface, "skipping stanza without an ssid");
            continue;
        };
        let ssid = ssid.to_string();

        let mut start_line = index;
        let mut line_count = after - index;

        let has_auto_connect = index > 0 && lines[index - 1].trim() == format!("auto {}", interface);
        if has_auto_connect {
            start_line -= 1;
            line_count += 1;
        }

        let has_trailing_blank = count_trailing_blank
            && after < lines.len()
            && is_blank(&lines[after])
            && (start_line == 0 || is_blank(&lines[start_line - 1]));
        if has_trailing_blank {
            line_count += 1;
        }

        stanzas.entry(interface.clone()).or_default().push(Stanza {
            interface,
            name,
            ssid,
            options,
            has_auto_connect,
            has_trailing_blank,
            start_line,
            line_count,
        });
    }

    stanzas
}

/// Flattens a [`StanzaMap`] into file order.
pub fn order_stanzas(stanzas: &StanzaMap) -> Vec<&Stanza> {
    let mut ordered: Vec<&Stanza> = stanzas.values().flatten().collect();
    ordered.sort_by_key(|stanza| stanza.start_line);
    ordered
}

/// Deletes every stanza for `interface`, duplicates included.
///
/// Returns whether anything was removed.
pub fn remove_stanzas(interface: &str, lines: &mut Vec<String>) -> bool {
    let stanzas = parse_stanzas(lines, true);
    let Some(found) = stanzas.get(interface) else {
        return false;
    };

    let mut doomed: Vec<usize> = found.iter().flat_map(Stanza::line_range).collect();
    doomed.sort_unstable();
    doomed.dedup();

    // Highest first, so the indices still to go stay valid.
    for index in doomed.into_iter().rev() {
        lines.remove(index);
    }

    true
}

/// Replaces the stanza(s) for `interface` with `block`.
///
/// The block goes in front of the first remaining stanza of another
/// interface, followed by a blank line. With no other stanza it is appended,
/// preceded by a blank line when the file does not already end with one.
pub fn insert_stanza(lines: &mut Vec<String>, interface: &str, mut block: Vec<String>) {
    remove_stanzas(interface, lines);

    let remaining = parse_stanzas(lines, true);
    let first_other = order_stanzas(&remaining).first().map(|stanza| stanza.start_line);

    let insert_at = match first_other {
        Some(start_line) => {
            block.push("\n".to_string());
            start_line
        }
        None => {
            if let Some(last) = lines.last_mut() {
                if !last.ends_with('\n') {
                    last.push('\n');
                }
                if !is_blank(last) {
                    block.insert(0, "\n".to_string());
                }
            }
            lines.len()
        }
    };

    lines.splice(insert_at..insert_at, block);
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_option_line(line: &str) -> bool {
    line.starts_with([' ', '\t']) && !is_blank(line)
}

fn parse_option(line: &str) -> Option<(String, String)> {
    let collapsed = WHITESPACE_RUN.replace_all(line.trim(), " ");
    let (key, value) = collapsed.split_once(' ')?;
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<String> {
        split_lines(text)
    }

    fn block(interface: &str, ssid: &str) -> Vec<String> {
        vec![
            format!("auto {}\n", interface),
            format!("iface {} inet dhcp\n", interface),
            format!("    wireless-essid \"{}\"\n", ssid),
        ]
    }

    const FILE: &str = "\
# The loopback network interface
auto lo
iface lo inet loopback

auto wlan0
iface wlan0 inet dhcp
    wpa-ssid \"HomeNet\"
    wpa-psk   \"secret123\"

iface wlan1-lab inet dhcp
    wireless-essid \"Lab\"
";

    #[test]
    fn parses_positions_and_options() {
        let stanzas = parse_stanzas(&lines(FILE), false);
        let wlan0 = &stanzas["wlan0"][0];

        assert_eq!(wlan0.start_line, 4);
        assert_eq!(wlan0.line_count, 4);
        assert!(wlan0.has_auto_connect);
        assert!(!wlan0.has_trailing_blank);
        assert_eq!(wlan0.ssid, "\"HomeNet\"");
        assert_eq!(wlan0.options["wpa-psk"], "\"secret123\"");
        assert_eq!(wlan0.name, None);

        let wlan1 = &stanzas["wlan1"][0];
        assert_eq!(wlan1.start_line, 9);
        assert_eq!(wlan1.line_count, 2);
        assert_eq!(wlan1.name.as_deref(), Some("lab"));
        assert!(!wlan1.has_auto_connect);
    }

    #[test]
    fn trailing_blank_counted_only_after_blank_line() {
        let stanzas = parse_stanzas(&lines(FILE), true);
        let wlan0 = &stanzas["wlan0"][0];
        assert!(wlan0.has_trailing_blank);
        assert_eq!(wlan0.line_range(), 4..9);

        let text = "auto lo\niface wlan0 inet dhcp\n    wireless-essid x\n\nauto eth0\n";
        let stanzas = parse_stanzas(&lines(text), true);
        assert!(!stanzas["wlan0"][0].has_trailing_blank);
    }

    #[test]
    fn trailing_blank_counted_at_start_of_file() {
        let text = "auto wlan0\niface wlan0 inet dhcp\n    wireless-essid x\n\nauto eth0\n";
        let stanzas = parse_stanzas(&lines(text), true);
        assert_eq!(stanzas["wlan0"][0].line_range(), 0..4);
    }

    #[test]
    fn skips_malformed_and_commented_stanzas() {
        let text = "\
#iface wlan0 inet dhcp
#    wireless-essid \"Commented\"
iface wlan0 inet dhcp
iface wlan0 inet dhcp
    wireless-channel auto
iface wlan0 inet dhcp
    pre-up
    wireless-essid \"Broken\"
iface eth0 inet dhcp
    wireless-essid \"Wired\"
";
        assert!(parse_stanzas(&lines(text), true).is_empty());
    }

    #[test]
    fn keeps_duplicates() {
        let text = "\
iface wlan0 inet dhcp
    wireless-essid \"One\"
iface wlan0 inet dhcp
    wireless-essid \"Two\"
";
        let stanzas = parse_stanzas(&lines(text), true);
        let ssids: Vec<&str> = stanzas["wlan0"].iter().map(|s| s.ssid.as_str()).collect();
        assert_eq!(ssids, vec!["\"One\"", "\"Two\""]);
    }

    #[test]
    fn orders_across_interfaces() {
        let text = "\
iface wlan1 inet dhcp
    wireless-essid b
iface wlan0 inet dhcp
    wireless-essid a
iface wlan1 inet dhcp
    wireless-essid c
";
        let stanzas = parse_stanzas(&lines(text), false);
        let starts: Vec<usize> = order_stanzas(&stanzas).iter().map(|s| s.start_line).collect();
        assert_eq!(starts, vec![0, 2, 4]);
    }

    #[test]
    fn removes_all_duplicates_and_leaves_the_rest() {
        let text = "\
auto lo
iface wlan0 inet dhcp
    wireless-essid \"One\"
iface eth0 inet dhcp
auto wlan0
iface wlan0 inet dhcp
    wireless-essid \"Two\"
";
        let mut file = lines(text);
        assert!(remove_stanzas("wlan0", &mut file));
        assert_eq!(file.concat(), "auto lo\niface eth0 inet dhcp\n");
        assert!(!remove_stanzas("wlan0", &mut file));
    }

    #[test]
    fn insert_goes_before_other_interfaces() {
        let mut file = lines("auto lo\niface lo inet loopback\n\niface wlan1 inet dhcp\n    wireless-essid \"Lab\"\n");
        insert_stanza(&mut file, "wlan0", block("wlan0", "HomeNet"));
        assert_eq!(
            file.concat(),
            "auto lo\niface lo inet loopback\n\nauto wlan0\niface wlan0 inet dhcp\n    wireless-essid \"HomeNet\"\n\niface wlan1 inet dhcp\n    wireless-essid \"Lab\"\n"
        );
    }

    #[test]
    fn insert_appends_with_separating_blank_line() {
        let mut file = lines("auto lo\niface lo inet loopback");
        insert_stanza(&mut file, "wlan0", block("wlan0", "HomeNet"));
        assert_eq!(
            file.concat(),
            "auto lo\niface lo inet loopback\n\nauto wlan0\niface wlan0 inet dhcp\n    wireless-essid \"HomeNet\"\n"
        );
    }

    #[test]
    fn insert_into_empty_file() {
        let mut file = Vec::new();
        insert_stanza(&mut file, "wlan0", block("wlan0", "HomeNet"));
        assert_eq!(file.concat(), "auto wlan0\niface wlan0 inet dhcp\n    wireless-essid \"HomeNet\"\n");
    }

    #[test]
    fn repeated_insert_replaces_in_place() {
        let original = "auto lo\niface lo inet loopback\n\niface wlan1 inet dhcp\n    wireless-essid \"Lab\"\n";
        let mut file = lines(original);
        insert_stanza(&mut file, "wlan0", block("wlan0", "HomeNet"));
        let once = file.concat();
        insert_stanza(&mut file, "wlan0", block("wlan0", "HomeNet"));
        assert_eq!(file.concat(), once);
        assert_eq!(parse_stanzas(&file, true)["wlan0"].len(), 1);

        remove_stanzas("wlan0", &mut file);
        assert_eq!(file.concat(), original);
    }

    #[test]
    fn collapses_interior_whitespace() {
        assert_eq!(
            parse_option("\twpa-psk    \"a  b\"\n"),
            Some(("wpa-psk".to_string(), "\"a b\"".to_string()))
        );
        assert_eq!(parse_option("    pre-up\n"), None);
    }

    #[test]
    fn managed_interface_names() {
        assert!(is_managed_interface("wlan0"));
        assert!(is_managed_interface("wlan"));
        assert!(!is_managed_interface("wlan10"));
        assert!(!is_managed_interface("eth0"));
    }
}
