use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use wiz_control_lib::control::{CliColors, DriverConfig, PilotDriver};
use wiz_control_lib::device::{DeviceRegistry, DeviceSummary};
use wiz_control_lib::discovery::DiscoveryService;
use wiz_control_lib::protocol::{self, PilotState, CONTROL_PORT};
use wiz_control_lib::util::host::LogHost;
use wiz_control_lib::util::transport::{Transport, UdpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "wiz_control",
    about = "Discovers and controls WiZ smart lights",
    version = "0.1.0"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Supported output formats for the `discover` command.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Power states accepted by the `power` action.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Searches the local network for devices
    #[clap(name = "discover")]
    Discover {
        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,

        /// Search timeout in milliseconds
        #[clap(short = 't', long = "timeout", default_value_t = 5000)]
        timeout: u64,
    },
    /// Sends one command to a single device, without discovery
    #[clap(name = "device-call")]
    DeviceCall {
        /// Sets the IP address of the device
        #[clap(long)]
        ip: IpAddr,

        /// Sets the control port of the device
        #[clap(long, default_value_t = CONTROL_PORT)]
        port: u16,

        #[clap(subcommand)]
        action: DeviceAction,
    },
    /// Runs discovery and drives devices until interrupted
    #[clap(name = "run")]
    Run {
        /// Path to a YAML driver configuration file
        #[clap(short, long)]
        config: Option<PathBuf>,
    },
}

/// Actions available under the `device-call` subcommand
#[derive(Subcommand)]
pub enum DeviceAction {
    /// Sets a solid color.
    #[clap(name = "set-color")]
    SetColor {
        /// The color to set by name
        #[clap(value_enum)]
        color: Option<CliColors>,

        /// Red component of the color (0-255)
        #[clap(short = 'r', long = "red", value_parser = clap::value_parser!(u8))]
        red: Option<u8>,

        /// Green component of the color (0-255)
        #[clap(short = 'g', long = "green", value_parser = clap::value_parser!(u8))]
        green: Option<u8>,

        /// Blue component of the color (0-255)
        #[clap(short = 'b', long = "blue", value_parser = clap::value_parser!(u8))]
        blue: Option<u8>,

        /// Brightness percentage (1-100)
        #[clap(short = 'd', long = "brightness", default_value_t = 100)]
        brightness: u8,
    },
    /// Sets a color temperature.
    #[clap(name = "set-temp")]
    SetTemp {
        /// Color temperature in Kelvin (2200-6500)
        #[clap(short = 'k', long = "kelvin")]
        kelvin: u16,

        /// Brightness percentage (1-100)
        #[clap(short = 'd', long = "brightness", default_value_t = 100)]
        brightness: u8,
    },
    /// Turns the device on or off.
    #[clap(name = "power")]
    Power {
        #[clap(value_enum)]
        state: PowerArg,
    },
}

async fn handle_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Discover { output, timeout } => {
            let devices = discover_devices(Duration::from_millis(timeout)).await?;
            match output {
                OutputFormat::Plaintext => {
                    pretty_print_devices(&devices);
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string(&devices)?;
                    println!("{}", json);
                }
                OutputFormat::Yaml => {
                    let yaml = serde_yaml::to_string(&devices)?;
                    println!("{}", yaml);
                }
            }
        }
        Commands::DeviceCall { ip, port, action } => {
            let transport = UdpTransport::bind_port(0)
                .await
                .context("Failed to bind a local socket")?;
            let state = pilot_state_for(action)?;
            transport.send_unicast(ip, port, &protocol::set_pilot(&state))?;
            println!("Sent {:?} to {}:{}", state, ip, port);
        }
        Commands::Run { config } => {
            let config = load_config(config)?;
            run_service(config).await?;
        }
    }

    Ok(())
}

fn pilot_state_for(action: DeviceAction) -> Result<PilotState> {
    match action {
        DeviceAction::SetColor {
            color,
            red,
            green,
            blue,
            brightness,
        } => {
            check_brightness(brightness)?;
            let (r, g, b) = match (color, red, green, blue) {
                (Some(name), None, None, None) => name.rgb(),
                (None, Some(r), Some(g), Some(b)) => (r, g, b),
                _ => return Err(anyhow!("Specify either a color name or all of -r, -g, -b")),
            };
            Ok(PilotState::Color {
                r,
                g,
                b,
                dimming: brightness,
            })
        }
        DeviceAction::SetTemp { kelvin, brightness } => {
            check_brightness(brightness)?;
            if !(2200..=6500).contains(&kelvin) {
                bail!("Color temperature must be within 2200..=6500 K");
            }
            Ok(PilotState::White {
                temp: kelvin,
                dimming: brightness,
            })
        }
        DeviceAction::Power { state } => Ok(PilotState::Power {
            on: state == PowerArg::On,
        }),
    }
}

fn check_brightness(brightness: u8) -> Result<()> {
    if !(1..=100).contains(&brightness) {
        bail!("Brightness must be within 1..=100");
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<DriverConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => DriverConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Runs the discovery loop for a fixed window and returns what answered.
async fn discover_devices(timeout: Duration) -> Result<Vec<DeviceSummary>> {
    let transport = UdpTransport::bind()
        .await
        .context("Failed to bind the listen socket")?;
    let host = LogHost;
    let mut registry = DeviceRegistry::new();
    let mut discovery = DiscoveryService::new();
    let mut buf = [0u8; 1024];

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let now = Instant::now();
        discovery.tick(now, &transport);
        registry.tick(now, &transport, &host);

        let recv = tokio::time::timeout(Duration::from_millis(100), transport.recv(&mut buf)).await;
        if let Ok(Ok((len, src))) = recv {
            discovery.handle_datagram(&buf[..len], src, &mut registry, &host);
        }
    }

    let mut devices: Vec<DeviceSummary> = registry.iter().map(|record| record.summary()).collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(devices)
}

/// The cooperative service loop: broadcast scheduling, datagram dispatch,
/// per-device ticks and (when a forced color is configured) rendering.
async fn run_service(config: DriverConfig) -> Result<()> {
    let transport = UdpTransport::bind()
        .await
        .context("Failed to bind the listen socket")?;
    let host = LogHost;
    let mut registry = DeviceRegistry::new();
    let mut discovery = DiscoveryService::new();
    let mut drivers: HashMap<String, PilotDriver> = HashMap::new();
    let mut buf = [0u8; 1024];

    println!("Searching for devices, press Ctrl-C to stop");
    loop {
        let now = Instant::now();
        discovery.tick(now, &transport);
        registry.tick(now, &transport, &host);

        for record in registry.iter() {
            if record.announced() && !drivers.contains_key(record.id()) {
                drivers.insert(
                    record.id().to_string(),
                    PilotDriver::new(record, config.clone()),
                );
            }
        }

        if config.auto_start && config.force_color {
            let color = config.forced_color;
            for driver in drivers.values_mut() {
                driver.render(&transport, color.red, color.green, color.blue, 100);
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            recv = tokio::time::timeout(Duration::from_millis(250), transport.recv(&mut buf)) => {
                if let Ok(Ok((len, src))) = recv {
                    discovery.handle_datagram(&buf[..len], src, &mut registry, &host);
                }
            }
        }
    }

    if config.turn_off_on_exit {
        println!("Turning devices off");
        for driver in drivers.values() {
            driver.set_power(&transport, false);
        }
    }

    Ok(())
}

fn pretty_print_devices(devices: &[DeviceSummary]) {
    if devices.is_empty() {
        println!("No devices found. Try increasing the search timeout.");
        return;
    }

    // Determine the maximum width for each column
    let max_ip_width = column_width(devices, "IP Address", |d| d.ip.len());
    let max_id_width = column_width(devices, "Device ID", |d| d.id.len());
    let max_model_width = column_width(devices, "Module", |d| d.model_name.len());
    let max_fw_width = column_width(devices, "Firmware", |d| d.fw_version.len());
    let max_product_width = column_width(devices, "Product", |d| {
        d.product_name.as_deref().unwrap_or("-").len()
    });

    println!(
        "{:<ip_width$} {:<id_width$} {:<model_width$} {:<fw_width$} {:<product_width$} {}",
        "IP Address",
        "Device ID",
        "Module",
        "Firmware",
        "Product",
        "Room",
        ip_width = max_ip_width,
        id_width = max_id_width,
        model_width = max_model_width,
        fw_width = max_fw_width,
        product_width = max_product_width,
    );
    println!(
        "{:<ip_width$} {:<id_width$} {:<model_width$} {:<fw_width$} {:<product_width$} {}",
        "-".repeat(max_ip_width),
        "-".repeat(max_id_width),
        "-".repeat(max_model_width),
        "-".repeat(max_fw_width),
        "-".repeat(max_product_width),
        "----",
        ip_width = max_ip_width,
        id_width = max_id_width,
        model_width = max_model_width,
        fw_width = max_fw_width,
        product_width = max_product_width,
    );

    for device in devices {
        println!(
            "{:<ip_width$} {:<id_width$} {:<model_width$} {:<fw_width$} {:<product_width$} {}",
            device.ip,
            device.id,
            device.model_name,
            device.fw_version,
            device.product_name.as_deref().unwrap_or("-"),
            device.room_id,
            ip_width = max_ip_width,
            id_width = max_id_width,
            model_width = max_model_width,
            fw_width = max_fw_width,
            product_width = max_product_width,
        );
    }
}

fn column_width<F>(devices: &[DeviceSummary], header: &str, len: F) -> usize
where
    F: Fn(&DeviceSummary) -> usize,
{
    devices
        .iter()
        .map(len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
        + 2
}
