//! Process execution for the OS network tools.
//!
//! Every tool invocation in the crate goes through [`Shell`], which pairs a
//! [`CommandRunner`] with the configured [`Tools`]. Production code uses
//! [`SystemRunner`]; tests substitute a scripted runner so scan output, link
//! state and bring-up results can be controlled without touching the host.
//!
//! Invocations block until the child exits. No timeout is applied here:
//! callers that need bounded latency must enforce it themselves.

use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WifiError};

/// Captured result of one tool invocation.
///
/// `output` is stdout followed by stderr, mirroring a shell `2>&1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        CommandOutput {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        CommandOutput {
            success: false,
            output: output.into(),
        }
    }
}

/// Executes external programs.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// Only a failure to start the process is an `Err`; a non-zero exit is
    /// reported through [`CommandOutput::success`].
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runs programs on the host with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| WifiError::CommandSpawn {
                program: program.to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            success: output.status.success(),
            output: combined,
        })
    }
}

/// The OS tools this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Wireless scan tool (`iwlist <iface> scan`).
    Scan,
    /// Interface bring-up tool (`ifup`).
    Up,
    /// Interface bring-down tool (`ifdown`).
    Down,
    /// Interface status tool (`ifconfig <iface>`).
    Status,
}

impl Tool {
    fn privileged(self) -> bool {
        !matches!(self, Tool::Status)
    }
}

/// Paths of the OS tools, loaded from the `[tools]` config table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Tools {
    /// Prefix the scan, bring-up and bring-down tools with `sudo`.
    pub use_sudo: bool,
    pub iwlist: String,
    pub ifup: String,
    pub ifdown: String,
    pub ifconfig: String,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            use_sudo: false,
            iwlist: "/sbin/iwlist".to_string(),
            ifup: "/sbin/ifup".to_string(),
            ifdown: "/sbin/ifdown".to_string(),
            ifconfig: "/sbin/ifconfig".to_string(),
        }
    }
}

impl Tools {
    pub fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Scan => &self.iwlist,
            Tool::Up => &self.ifup,
            Tool::Down => &self.ifdown,
            Tool::Status => &self.ifconfig,
        }
    }
}

/// A runner bound to a tool set.
#[derive(Clone, Copy)]
pub struct Shell<'a> {
    runner: &'a dyn CommandRunner,
    tools: &'a Tools,
}

impl<'a> Shell<'a> {
    pub fn new(runner: &'a dyn CommandRunner, tools: &'a Tools) -> Self {
        Shell { runner, tools }
    }

    /// Invokes `tool` with `args`, going through `sudo` when configured.
    pub fn run(&self, tool: Tool, args: &[&str]) -> Result<CommandOutput> {
        let program = self.tools.program(tool);

        let output = if self.tools.use_sudo && tool.privileged() {
            let mut sudo_args = Vec::with_capacity(args.len() + 1);
            sudo_args.push(program);
            sudo_args.extend_from_slice(args);
            tracing::debug!(command = %display_line("sudo", &sudo_args), "running tool");
            self.runner.run("sudo", &sudo_args)?
        } else {
            tracing::debug!(command = %display_line(program, args), "running tool");
            self.runner.run(program, args)?
        };

        if !output.success {
            tracing::debug!(?tool, output = %output.output.trim(), "tool exited non-zero");
        }

        Ok(output)
    }

    /// Like [`Shell::run`] but turns a non-zero exit into
    /// [`WifiError::Interface`] carrying the trimmed output.
    pub fn run_checked(&self, tool: Tool, interface: &str, args: &[&str]) -> Result<String> {
        let output = self.run(tool, args)?;
        if !output.success {
            return Err(WifiError::Interface {
                interface: interface.to_string(),
                output: output.output.trim().to_string(),
            });
        }
        Ok(output.output)
    }
}

const SECRET_OPTIONS: [&str; 2] = ["wpa-psk=", "wireless-key="];

/// Command line for logs, with key material replaced.
fn display_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        match SECRET_OPTIONS.iter().find(|prefix| arg.starts_with(*prefix)) {
            Some(prefix) => {
                line.push_str(prefix);
                line.push_str("<redacted>");
            }
            None => line.push_str(arg),
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl CommandRunner for Recorder {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program, args.join(" ")));
            if program.ends_with("ifdown") || args.first().is_some_and(|a| a.ends_with("ifdown")) {
                return Ok(CommandOutput::failed("ifdown: interface wlan0 not configured\n"));
            }
            Ok(CommandOutput::ok(""))
        }
    }

    #[test]
    fn sudo_prefixes_privileged_tools_only() {
        let runner = Recorder::default();
        let tools = Tools {
            use_sudo: true,
            ..Tools::default()
        };
        let shell = Shell::new(&runner, &tools);

        shell.run(Tool::Scan, &["wlan0", "scan"]).unwrap();
        shell.run(Tool::Status, &["wlan0"]).unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], "sudo /sbin/iwlist wlan0 scan");
        assert_eq!(calls[1], "/sbin/ifconfig wlan0");
    }

    #[test]
    fn display_line_redacts_key_material() {
        let line = display_line("/sbin/ifup", &["wlan0", "-o", "wpa-psk=\"abc\"", "-o", "wpa-ssid=\"Home\""]);
        assert_eq!(line, "/sbin/ifup wlan0 -o wpa-psk=<redacted> -o wpa-ssid=\"Home\"");
    }

    #[test]
    fn run_checked_maps_failure_to_interface_error() {
        let runner = Recorder::default();
        let tools = Tools::default();
        let shell = Shell::new(&runner, &tools);

        let err = shell.run_checked(Tool::Down, "wlan0", &["wlan0"]).unwrap_err();
        match err {
            WifiError::Interface { interface, output } => {
                assert_eq!(interface, "wlan0");
                assert_eq!(output, "ifdown: interface wlan0 not configured");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
