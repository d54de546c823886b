use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ifupdown_wifi::{
    activation,
    command::{Shell, SystemRunner},
    config::{self, Config},
    interface,
    manager::{self, DesiredState, WifiManager},
    psk, scan,
    scheme::Scheme,
    server,
};

#[derive(Parser)]
#[command(name = "ifupdown-wifi")]
#[command(about = "Manage wifi profiles in /etc/network/interfaces")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/ifupdown-wifi/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InterfaceArg {
    /// Interface to use (defaults to the configured or first wireless interface)
    #[arg(short, long)]
    interface: Option<String>,
}

#[derive(Args)]
struct DesiredArgs {
    /// Network to connect to
    #[arg(long, conflicts_with = "off")]
    ssid: Option<String>,

    /// Passphrase for the network (empty for open networks)
    #[arg(long, default_value = "")]
    passkey: String,

    /// Turn the radio off and forget the stored profile
    #[arg(long)]
    off: bool,
}

impl DesiredArgs {
    fn desired_state(&self) -> DesiredState {
        match (&self.ssid, self.off) {
            (_, true) => DesiredState::disabled(),
            (Some(ssid), false) => DesiredState::connect(ssid.as_str(), self.passkey.as_str()),
            (None, false) => DesiredState {
                ssid_selected: false,
                ..DesiredState::connect("", "")
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available wireless interfaces
    ListInterfaces,

    /// Scan for visible networks
    Scan(InterfaceArg),

    /// Show the interface's current wifi settings
    Status(InterfaceArg),

    /// Show which actions reaching a desired state would take
    NeedsChange {
        #[command(flatten)]
        interface: InterfaceArg,
        #[command(flatten)]
        desired: DesiredArgs,
    },

    /// Reconcile the interface to a desired state
    Apply {
        #[command(flatten)]
        interface: InterfaceArg,
        #[command(flatten)]
        desired: DesiredArgs,
    },

    /// Bring the interface up on its stored profile
    Activate(InterfaceArg),

    /// Turn the radio on without changing the stored profile
    Enable(InterfaceArg),

    /// Turn the radio off without changing the stored profile
    Disable(InterfaceArg),

    /// List profiles stored in the interfaces file
    Schemes,

    /// Remove the interface's stored profile
    Forget(InterfaceArg),

    /// Derive the WPA PSK for a passphrase and SSID
    Psk {
        ssid: String,
        passphrase: String,
    },

    /// Serve the JSON API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        #[command(flatten)]
        interface: InterfaceArg,
    },

    /// Show the effective configuration
    ShowConfig {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

struct App {
    config: Config,
    config_path: PathBuf,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let config = Config::load_from(&config_path)?;
    let ctx = App {
        config,
        config_path,
        json: cli.json,
    };

    match cli.command {
        Commands::ListInterfaces => cmd_list_interfaces(&ctx),
        Commands::Scan(iface) => cmd_scan(&ctx, &iface),
        Commands::Status(iface) => cmd_status(&ctx, &iface),
        Commands::NeedsChange { interface, desired } => cmd_needs_change(&ctx, &interface, &desired),
        Commands::Apply { interface, desired } => cmd_apply(&ctx, &interface, &desired),
        Commands::Activate(iface) => cmd_activate(&ctx, &iface),
        Commands::Enable(iface) => cmd_set_enabled(&ctx, &iface, true),
        Commands::Disable(iface) => cmd_set_enabled(&ctx, &iface, false),
        Commands::Schemes => cmd_schemes(&ctx),
        Commands::Forget(iface) => cmd_forget(&ctx, &iface),
        Commands::Psk { ssid, passphrase } => cmd_psk(&ctx, &ssid, &passphrase),
        Commands::Serve { port, interface } => cmd_serve(&ctx, port, &interface).await,
        Commands::ShowConfig { init } => cmd_show_config(&ctx, init),
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn wifi_manager(ctx: &App) -> WifiManager<SystemRunner> {
    WifiManager::new(SystemRunner, ctx.config.tools.clone(), ctx.config.interfaces_file())
}

fn resolve(ctx: &App, arg: &InterfaceArg) -> Result<String> {
    Ok(interface::resolve_interface(
        arg.interface.as_deref(),
        ctx.config.default_interface.as_deref(),
    )?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn cmd_list_interfaces(ctx: &App) -> Result<()> {
    let interfaces = interface::list_wifi_interfaces()?;

    if ctx.json {
        let names: Vec<_> = interfaces
            .iter()
            .map(|i| serde_json::json!({ "name": i.name, "state": i.state, "usb": i.is_usb }))
            .collect();
        return print_json(&names);
    }

    if interfaces.is_empty() {
        println!("No wireless interfaces found.");
        return Ok(());
    }

    println!("{:<16} {:<12} {}", "INTERFACE", "STATE", "TYPE");
    println!("{}", "-".repeat(40));

    for iface in interfaces {
        let iface_type = if iface.is_usb { "USB" } else { "Built-in" };
        println!("{:<16} {:<12} {}", iface.name, iface.state, iface_type);
    }

    Ok(())
}

fn cmd_scan(ctx: &App, arg: &InterfaceArg) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let cells = wifi_manager(ctx).scan(&iface)?;

    if ctx.json {
        return print_json(&cells);
    }

    println!("Scanning on interface: {}", iface);
    println!();
    scan::display_cells(&cells);

    Ok(())
}

fn cmd_status(ctx: &App, arg: &InterfaceArg) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let settings = wifi_manager(ctx).current_settings(&iface)?;

    if ctx.json {
        return print_json(&settings);
    }

    manager::display_settings(&settings);
    Ok(())
}

fn cmd_needs_change(ctx: &App, arg: &InterfaceArg, desired: &DesiredArgs) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let response = wifi_manager(ctx).needs_change(&iface, &desired.desired_state())?;

    if ctx.json {
        return print_json(&response);
    }

    if !response.valid_request {
        bail!("Invalid request: an SSID is required unless --off is given");
    }

    let flags = response.flags;
    if flags.is_empty() {
        println!("No change needed on {}.", iface);
    } else if flags.needs_disable {
        println!("{} would be disabled.", iface);
    } else if flags.needs_switch {
        println!("{} would switch networks.", iface);
    } else {
        println!("{} would connect.", iface);
    }

    Ok(())
}

fn cmd_apply(ctx: &App, arg: &InterfaceArg, desired: &DesiredArgs) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let response = wifi_manager(ctx).apply(&iface, &desired.desired_state());

    if ctx.json {
        return print_json(&response);
    }

    let result = response.result;
    if result.succeeded {
        if response.ip_address.is_empty() {
            println!("Done. {} is disabled.", iface);
        } else {
            println!("Connected on {} with IP {}.", iface, response.ip_address);
        }
        return Ok(());
    }

    if result.invalid_request {
        bail!("Invalid request: an SSID is required unless --off is given");
    }
    if result.ssid_not_found {
        bail!("Network not visible on {}", iface);
    }
    if result.authenticate_failed {
        bail!("Authentication failed on {}: no address was bound", iface);
    }
    bail!("Network tools failed on {}; rerun with -v for details", iface)
}

fn cmd_activate(ctx: &App, arg: &InterfaceArg) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let file = ctx.config.interfaces_file();
    let scheme = Scheme::for_interface(&file, &iface)?
        .with_context(|| format!("No stored profile for {} in {}", iface, file.path().display()))?;

    println!("Activating '{}' on {}...", scheme.ssid(), iface);
    let shell = Shell::new(&SystemRunner, &ctx.config.tools);
    let connection = activation::activate(&shell, &file, &scheme)?;

    if ctx.json {
        return print_json(&serde_json::json!({
            "interface": connection.scheme.interface(),
            "ssid": connection.scheme.ssid(),
            "ipAddress": connection.ip_address,
        }));
    }

    activation::display_connection(&connection);
    Ok(())
}

fn cmd_set_enabled(ctx: &App, arg: &InterfaceArg, enabled: bool) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let response = wifi_manager(ctx).set_enabled(&iface, enabled)?;

    if ctx.json {
        return print_json(&response);
    }

    let state = if response.enabled { "enabled" } else { "disabled" };
    println!("{} is {}.", iface, state);
    Ok(())
}

fn cmd_schemes(ctx: &App) -> Result<()> {
    let file = ctx.config.interfaces_file();
    let schemes = Scheme::all(&file)?;

    if ctx.json {
        let entries: Vec<_> = schemes
            .iter()
            .map(|s| {
                serde_json::json!({
                    "interface": s.interface(),
                    "ssid": s.ssid(),
                    "encryption": s.encryption_type(),
                })
            })
            .collect();
        return print_json(&entries);
    }

    if schemes.is_empty() {
        println!("No profiles in {}.", file.path().display());
        return Ok(());
    }

    println!("{:<12} {:<32} {:<10} {}", "INTERFACE", "SSID", "SECURITY", "PASSKEY");
    println!("{}", "-".repeat(66));
    for scheme in &schemes {
        let masked = "*".repeat(scheme.passkey().len().min(12));
        println!(
            "{:<12} {:<32} {:<10} {}",
            scheme.interface(),
            scheme.ssid(),
            scheme.encryption_type(),
            masked
        );
    }

    Ok(())
}

fn cmd_forget(ctx: &App, arg: &InterfaceArg) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let file = ctx.config.interfaces_file();

    let removed = match Scheme::for_interface(&file, &iface)? {
        Some(scheme) => scheme.delete(&file)?,
        None => false,
    };

    if ctx.json {
        return print_json(&serde_json::json!({ "interface": iface, "removed": removed }));
    }

    if removed {
        println!("Removed profile for {} from {}.", iface, file.path().display());
    } else {
        println!("No profile for {} in {}.", iface, file.path().display());
    }
    Ok(())
}

fn cmd_psk(ctx: &App, ssid: &str, passphrase: &str) -> Result<()> {
    let key = psk::derive_psk(passphrase, ssid);
    if ctx.json {
        return print_json(&serde_json::json!({ "ssid": ssid, "psk": key }));
    }
    println!("{}", key);
    Ok(())
}

async fn cmd_serve(ctx: &App, port: u16, arg: &InterfaceArg) -> Result<()> {
    let iface = resolve(ctx, arg)?;
    let config = server::ServerConfig { port, interface: iface };
    server::run_server(config, wifi_manager(ctx)).await
}

fn cmd_show_config(ctx: &App, init: bool) -> Result<()> {
    if init {
        ctx.config.save_to(&ctx.config_path)?;
        println!("Wrote {}", ctx.config_path.display());
        return Ok(());
    }

    if ctx.json {
        return print_json(&ctx.config);
    }

    println!("Config file: {}", ctx.config_path.display());
    println!();

    let cfg = &ctx.config;
    println!("Default interface: {}", cfg.default_interface.as_deref().unwrap_or("(auto)"));
    println!("Interfaces file:   {}", cfg.interfaces_file.display());
    println!("Use sudo:          {}", if cfg.tools.use_sudo { "yes" } else { "no" });
    println!("iwlist:            {}", cfg.tools.iwlist);
    println!("ifup:              {}", cfg.tools.ifup);
    println!("ifdown:            {}", cfg.tools.ifdown);
    println!("ifconfig:          {}", cfg.tools.ifconfig);

    Ok(())
}
