#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ifupdown_wifi::{CommandOutput, CommandRunner, InterfacesFile, Result};
use tempfile::TempDir;

pub const SCAN_OUTPUT: &str = "wlan0     Scan completed :
          Cell 01 - Address: 00:11:22:33:44:55
                    Channel:6
                    Encryption key:off
                    ESSID:\"HomeNet\"
                    Mode:Master
          Cell 02 - Address: 66:77:88:99:AA:BB
                    Channel:11
                    Encryption key:on
                    ESSID:\"SecureNet\"
                    Mode:Master
                    IE: IEEE 802.11i/WPA2 Version 1
                        Group Cipher : CCMP
                        Authentication Suites (1) : PSK
";

/// What the fake host looks like at a point in time.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub link_up: bool,
    pub ip_address: Option<String>,
    /// Address handed out when a profile is brought up; `None` simulates a
    /// rejected key.
    pub lease: Option<String>,
    pub ifup_fails: bool,
    pub calls: Vec<String>,
}

/// Scripted stand-in for iwlist, ifup, ifdown and ifconfig.
#[derive(Clone, Default)]
pub struct FakeRunner {
    pub host: Arc<Mutex<FakeHost>>,
}

impl FakeRunner {
    pub fn new(link_up: bool, lease: Option<&str>) -> Self {
        let runner = FakeRunner::default();
        {
            let mut host = runner.host.lock().unwrap();
            host.link_up = link_up;
            host.lease = lease.map(str::to_string);
        }
        runner
    }

    pub fn connected(ip_address: &str) -> Self {
        let runner = FakeRunner::new(true, Some(ip_address));
        runner.host.lock().unwrap().ip_address = Some(ip_address.to_string());
        runner
    }

    pub fn calls(&self) -> Vec<String> {
        self.host.lock().unwrap().calls.clone()
    }

    /// Calls that change link state, as opposed to probes.
    pub fn link_changes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("/sbin/ifup") || call.starts_with("/sbin/ifdown"))
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut host = self.host.lock().unwrap();
        host.calls.push(format!("{} {}", program, args.join(" ")));

        let output = match program {
            "/sbin/iwlist" if host.link_up => CommandOutput::ok(SCAN_OUTPUT),
            "/sbin/iwlist" => {
                CommandOutput::failed("wlan0     Interface doesn't support scanning : Network is down\n")
            }
            "/sbin/ifdown" => {
                host.link_up = false;
                host.ip_address = None;
                CommandOutput::ok("")
            }
            "/sbin/ifup" if args.contains(&"--interfaces") => {
                host.link_up = true;
                CommandOutput::ok("")
            }
            "/sbin/ifup" if host.ifup_fails => CommandOutput::failed("ifup: failed to bring up wlan0\n"),
            "/sbin/ifup" => {
                host.link_up = true;
                host.ip_address = host.lease.clone();
                CommandOutput::ok("")
            }
            "/sbin/ifconfig" => {
                let mut output =
                    "wlan0     Link encap:Ethernet  HWaddr 00:0c:29:3e:5c:7a\n".to_string();
                if let Some(ip) = &host.ip_address {
                    output.push_str(&format!(
                        "          inet addr:{}  Bcast:192.168.1.255  Mask:255.255.255.0\n",
                        ip
                    ));
                }
                CommandOutput::ok(output)
            }
            other => CommandOutput::failed(format!("{}: command not found\n", other)),
        };

        Ok(output)
    }
}

/// Wraps a [`FakeRunner`], holding each tool call open briefly and recording
/// the most calls that were ever in flight together.
#[derive(Clone, Default)]
pub struct OverlapRunner {
    pub inner: FakeRunner,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl OverlapRunner {
    pub fn new(inner: FakeRunner) -> Self {
        OverlapRunner {
            inner,
            ..OverlapRunner::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl CommandRunner for OverlapRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        let output = self.inner.run(program, args);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        output
    }
}

/// An interfaces file in a fresh temporary directory.
pub fn interfaces_file(content: &str) -> (TempDir, InterfacesFile) {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("interfaces");
    std::fs::write(&path, content).unwrap();
    (dir, InterfacesFile::new(path))
}

pub fn read(file: &InterfacesFile) -> String {
    std::fs::read_to_string(file.path()).unwrap()
}
