use std::net::IpAddr;

use clap::ValueEnum;
use log::warn;
use palette::Srgb;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::device::DeviceRecord;
use crate::protocol::{self, PilotState};
use crate::util::transport::Transport;

/// A configuration value is out of range.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_brightness must be within 1..=100, got {0}")]
    MinBrightness(u8),
    #[error("color_temp must be within 2200..=6500 K, got {0}")]
    ColorTemp(u16),
}

/// Immutable runtime configuration for the command driver.
///
/// Loaded once (YAML or defaults), validated once, then shared read-only.
/// Colors are written as hex strings in config files and parsed at load
/// time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Render requests are ignored entirely when false.
    pub auto_start: bool,
    /// Send a best-effort power-off to every device at teardown.
    pub turn_off_on_exit: bool,
    /// Replace every requested color with `forced_color`.
    pub force_color: bool,
    #[serde(deserialize_with = "hex_color")]
    pub forced_color: Srgb<u8>,
    /// Brightness floor used when a black frame is substituted, percent.
    pub min_brightness: u8,
    /// Color substituted for black frames in RGB mode.
    #[serde(deserialize_with = "hex_color")]
    pub dim_color: Srgb<u8>,
    /// Drive color temperature even on devices that could do RGB.
    pub use_color_temp: bool,
    /// Color temperature in Kelvin for white mode.
    pub color_temp: u16,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            auto_start: true,
            turn_off_on_exit: false,
            force_color: false,
            forced_color: Srgb::new(0x00, 0x9b, 0xde),
            min_brightness: 10,
            dim_color: Srgb::new(0x01, 0x01, 0x01),
            use_color_temp: false,
            color_temp: 4000,
        }
    }
}

impl DriverConfig {
    /// Range checks, applied once when a config is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.min_brightness) {
            return Err(ConfigError::MinBrightness(self.min_brightness));
        }
        if !(2200..=6500).contains(&self.color_temp) {
            return Err(ConfigError::ColorTemp(self.color_temp));
        }
        Ok(())
    }
}

fn hex_color<'de, D>(deserializer: D) -> Result<Srgb<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse::<Srgb<u8>>()
        .map_err(|_| serde::de::Error::custom(format!("invalid hex color: {}", text)))
}

/// Named colors accepted by the CLI as a shorthand for RGB components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliColors {
    Red,
    Green,
    Blue,
    White,
    WarmWhite,
    Yellow,
    Orange,
    Purple,
    Cyan,
    Magenta,
    Pink,
}

impl CliColors {
    /// The color's components, for callers that do not work in palette
    /// types.
    pub fn rgb(self) -> (u8, u8, u8) {
        let srgb = Srgb::<u8>::from(self);
        (srgb.red, srgb.green, srgb.blue)
    }
}

impl From<CliColors> for Srgb<u8> {
    fn from(color: CliColors) -> Self {
        match color {
            CliColors::Red => Srgb::new(255, 0, 0),
            CliColors::Green => Srgb::new(0, 255, 0),
            CliColors::Blue => Srgb::new(0, 0, 255),
            CliColors::White => Srgb::new(255, 255, 255),
            CliColors::WarmWhite => Srgb::new(255, 180, 107),
            CliColors::Yellow => Srgb::new(255, 255, 0),
            CliColors::Orange => Srgb::new(255, 128, 0),
            CliColors::Purple => Srgb::new(128, 0, 128),
            CliColors::Cyan => Srgb::new(0, 255, 255),
            CliColors::Magenta => Srgb::new(255, 0, 255),
            CliColors::Pink => Srgb::new(255, 105, 180),
        }
    }
}

/// Per-device command driver.
///
/// Converts a requested color into `setPilot` commands: picks the mode
/// (RGB or white), suppresses sends that would not change the rendered
/// state, and substitutes black frames with the configured dim color at
/// the minimum brightness floor so the device stays visibly addressable.
/// [`set_power`](Self::set_power) is the only path to true off.
pub struct PilotDriver {
    id: String,
    ip: IpAddr,
    port: u16,
    tunable_white_only: bool,
    config: DriverConfig,
    last_state: Option<PilotState>,
}

impl PilotDriver {
    /// Builds a driver for an announced device, capturing its address and
    /// capabilities.
    pub fn new(record: &DeviceRecord, config: DriverConfig) -> Self {
        PilotDriver {
            id: record.id().to_string(),
            ip: record.ip(),
            port: record.port(),
            tunable_white_only: record.capabilities().tunable_white_only(),
            config,
            last_state: None,
        }
    }

    /// Builds a driver for a known address without going through
    /// discovery. Capability defaults to RGB.
    pub fn for_address(ip: IpAddr, port: u16, config: DriverConfig) -> Self {
        PilotDriver {
            id: ip.to_string(),
            ip,
            port,
            tunable_white_only: false,
            config,
            last_state: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn last_state(&self) -> Option<PilotState> {
        self.last_state
    }

    /// Renders one requested color.
    ///
    /// White mode is used for tunable-white-only devices and whenever the
    /// config asks for color temperature; RGB mode otherwise. Exactly one
    /// mode per call. Suppression compares the *requested* state, before
    /// blackout substitution, against the last one sent; white mode
    /// therefore keys on temperature and brightness only.
    pub fn render(&mut self, transport: &dyn Transport, r: u8, g: u8, b: u8, brightness: u8) {
        let (r, g, b) = if self.config.force_color {
            let forced = self.config.forced_color;
            (forced.red, forced.green, forced.blue)
        } else {
            (r, g, b)
        };

        let requested = if self.tunable_white_only || self.config.use_color_temp {
            PilotState::White {
                temp: self.config.color_temp,
                dimming: brightness,
            }
        } else {
            PilotState::Color {
                r,
                g,
                b,
                dimming: brightness,
            }
        };

        if self.last_state == Some(requested) {
            return;
        }
        self.last_state = Some(requested);

        let blackout = r == 0 && g == 0 && b == 0;
        let wire = match requested {
            PilotState::White { temp, .. } if blackout => PilotState::White {
                temp,
                dimming: self.config.min_brightness,
            },
            PilotState::Color { .. } if blackout => {
                let dim = self.config.dim_color;
                PilotState::Color {
                    r: dim.red,
                    g: dim.green,
                    b: dim.blue,
                    dimming: self.config.min_brightness,
                }
            }
            other => other,
        };
        self.send(transport, &wire);
    }

    /// Unconditional power command; bypasses suppression so an explicit
    /// off always reaches the device.
    pub fn set_power(&self, transport: &dyn Transport, on: bool) {
        self.send(transport, &PilotState::Power { on });
    }

    fn send(&self, transport: &dyn Transport, state: &PilotState) {
        if let Err(err) = transport.send_unicast(self.ip, self.port, &protocol::set_pilot(state)) {
            warn!("{}: setPilot send failed: {}", self.id, err);
        }
    }
}
