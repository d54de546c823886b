mod common;

use common::{interfaces_file, read, FakeRunner};
use ifupdown_wifi::command::Shell;
use ifupdown_wifi::scan::parse_scan_output;
use ifupdown_wifi::{activate, Scheme, Tools, WifiError};
use pretty_assertions::assert_eq;

fn secure_net_scheme() -> Scheme {
    let cells = parse_scan_output(common::SCAN_OUTPUT);
    Scheme::for_cell("wlan0", &cells[1], "password").unwrap()
}

#[test]
fn activation_persists_then_brings_link_up() {
    let (_dir, file) = interfaces_file("auto lo\niface lo inet loopback\n");
    let runner = FakeRunner::new(true, Some("10.0.0.7"));
    let tools = Tools::default();
    let shell = Shell::new(&runner, &tools);

    let connection = activate(&shell, &file, &secure_net_scheme()).unwrap();
    assert_eq!(connection.ip_address, "10.0.0.7");
    assert_eq!(connection.scheme.ssid(), "SecureNet");

    assert_eq!(
        read(&file),
        "auto lo\niface lo inet loopback\n\nauto wlan0\niface wlan0 inet dhcp\n    wpa-ssid \"SecureNet\"\n    wpa-psk \"password\"\n"
    );

    let calls = runner.calls();
    assert_eq!(calls[0], "/sbin/ifdown wlan0");
    assert!(calls[1].starts_with("/sbin/ifup wlan0 -o wpa-ssid=\"SecureNet\" -o wpa-psk=\""));
    assert!(calls[1].ends_with("\" -o wireless-channel=auto"));
    assert!(!calls[1].contains("password"));
    assert_eq!(calls[2], "/sbin/ifconfig wlan0");
    assert_eq!(calls.len(), 3);
}

#[test]
fn activating_twice_keeps_one_stanza() {
    let (_dir, file) = interfaces_file("");
    let runner = FakeRunner::new(true, Some("10.0.0.7"));
    let tools = Tools::default();
    let shell = Shell::new(&runner, &tools);
    let scheme = secure_net_scheme();

    activate(&shell, &file, &scheme).unwrap();
    let first = read(&file);
    activate(&shell, &file, &scheme).unwrap();

    assert_eq!(read(&file), first);
    assert_eq!(Scheme::all(&file).unwrap().len(), 1);
}

#[test]
fn missing_address_is_reported_as_authentication_error() {
    let (_dir, file) = interfaces_file("");
    let runner = FakeRunner::new(true, None);
    let tools = Tools::default();
    let shell = Shell::new(&runner, &tools);

    let err = activate(&shell, &file, &secure_net_scheme()).unwrap_err();
    assert!(matches!(err, WifiError::Authentication { ref ssid, .. } if ssid == "SecureNet"));
}

#[test]
fn failed_bring_up_is_interface_error() {
    let (_dir, file) = interfaces_file("");
    let runner = FakeRunner::new(true, Some("10.0.0.7"));
    runner.host.lock().unwrap().ifup_fails = true;
    let tools = Tools::default();
    let shell = Shell::new(&runner, &tools);

    let err = activate(&shell, &file, &secure_net_scheme()).unwrap_err();
    match err {
        WifiError::Interface { interface, output } => {
            assert_eq!(interface, "wlan0");
            assert_eq!(output, "ifup: failed to bring up wlan0");
        }
        other => panic!("unexpected error: {other}"),
    }
}
