use crate::error::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Device node behind the primary hardware select line.
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.0";
/// Device node behind the secondary hardware select line.
pub const SECONDARY_DEVICE: &str = "/dev/spidev0.1";

// Characterized against the shipped matrix modules. Changing any of these
// without re-testing on hardware corrupts the displayed image.
pub const DEFAULT_CLOCK_SPEED_HZ: u32 = 500_000;
pub const DEFAULT_INTER_BYTE_DELAY_USECS: u16 = 5;
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 32;
pub const WORD_SIZE_BITS: u8 = 8;

/// Upper bound on segments in one SPI_IOC_MESSAGE: the ioctl size field is
/// 14 bits wide and each segment descriptor is 32 bytes.
pub const MAX_SEGMENTS_PER_MESSAGE: usize = 511;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/led-matrix-spi/config.yaml";

/// SPI clock polarity/phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClockMode {
    /// CPOL 0, CPHA 0
    #[default]
    Mode0,
    /// CPOL 0, CPHA 1
    Mode1,
    /// CPOL 1, CPHA 0
    Mode2,
    /// CPOL 1, CPHA 1
    Mode3,
}

impl ClockMode {
    /// Mask of the CPOL/CPHA bits in the driver's mode byte.
    pub const MASK: u8 = 0x03;

    pub fn bits(self) -> u8 {
        match self {
            ClockMode::Mode0 => 0,
            ClockMode::Mode1 => 1,
            ClockMode::Mode2 => 2,
            ClockMode::Mode3 => 3,
        }
    }
}

impl TryFrom<u8> for ClockMode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ClockMode::Mode0),
            1 => Ok(ClockMode::Mode1),
            2 => Ok(ClockMode::Mode2),
            3 => Ok(ClockMode::Mode3),
            other => Err(format!("SPI mode must be 0-3, got {}", other)),
        }
    }
}

impl From<ClockMode> for u8 {
    fn from(mode: ClockMode) -> u8 {
        mode.bits()
    }
}

/// Which of the two hardware select lines the device node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectLine {
    #[default]
    Primary,
    Secondary,
}

impl SelectLine {
    pub fn device_path(self) -> &'static str {
        match self {
            SelectLine::Primary => DEFAULT_DEVICE,
            SelectLine::Secondary => SECONDARY_DEVICE,
        }
    }
}

/// Electrical and framing parameters for the bus session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Explicit device node; takes precedence over `select_line`.
    pub device: Option<PathBuf>,
    pub select_line: SelectLine,
    pub mode: ClockMode,
    pub clock_speed_hz: u32,
    pub inter_byte_delay_usecs: u16,
    pub max_chunk_length: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: None,
            select_line: SelectLine::Primary,
            mode: ClockMode::Mode0,
            clock_speed_hz: DEFAULT_CLOCK_SPEED_HZ,
            inter_byte_delay_usecs: DEFAULT_INTER_BYTE_DELAY_USECS,
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
        }
    }
}

impl BusConfig {
    pub fn device_path(&self) -> &Path {
        match &self.device {
            Some(path) => path.as_path(),
            None => Path::new(self.select_line.device_path()),
        }
    }

    /// Word size is not configurable; the matrices latch 8-bit words.
    pub fn word_size_bits(&self) -> u8 {
        WORD_SIZE_BITS
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_length == 0 {
            return Err(Error::InvalidConfig(
                "max_chunk_length must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_length > MAX_SEGMENTS_PER_MESSAGE {
            return Err(Error::InvalidConfig(format!(
                "max_chunk_length {} exceeds the {} segments one SPI message can carry",
                self.max_chunk_length, MAX_SEGMENTS_PER_MESSAGE
            )));
        }
        if self.clock_speed_hz == 0 {
            return Err(Error::InvalidConfig(
                "clock_speed_hz must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipSelectConfig {
    /// BCM number of the GPIO wired to the matrices' select input.
    /// `None` leaves select handling to the SPI controller.
    pub gpio: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Module count used when chain detection finds nothing.
    pub modules: usize,
    /// Longest chain probed by detection.
    pub max_modules: usize,
    pub frame_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            modules: 1,
            max_modules: 50,
            frame_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spi: BusConfig,
    pub chip_select: ChipSelectConfig,
    pub display: DisplayConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse configuration file")?;
        config.spi.validate()?;
        Ok(config)
    }
}
