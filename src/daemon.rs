use crate::chip_select::{send_frame, ChipSelect, GpioChipSelect, NoChipSelect};
use crate::config::Config;
use crate::detect::detect_chain_length;
use crate::session::BusSession;
use crate::spi::{PortOpener, SpidevOpener};
use anyhow::{Context, Result};
use log::{info, warn};
use std::time::Duration;
use tokio::time::sleep;

/// Brightness levels a 4-bit pixel can take.
const LEVELS: u8 = 16;

/// Every pixel of every module at `level` (4 bits per pixel, two per byte).
pub fn level_frame(level: u8, modules: usize, chunk_len: usize) -> Vec<u8> {
    let nibble = level & 0x0F;
    vec![(nibble << 4) | nibble; modules * chunk_len]
}

/// Hardware check loop: sweeps the whole chain through every brightness
/// level, one frame per poll.
pub struct Daemon<O: PortOpener = SpidevOpener> {
    bus: BusSession<O>,
    cs: Box<dyn ChipSelect>,
    config: Config,
    modules: usize,
    level: u8,
}

impl Daemon<SpidevOpener> {
    pub fn new(config: Config) -> Result<Self> {
        let bus = BusSession::new(config.spi.clone())?;
        let cs: Box<dyn ChipSelect> = match config.chip_select.gpio {
            Some(pin) => Box::new(
                GpioChipSelect::new(pin)
                    .with_context(|| format!("Failed to claim chip-select GPIO {}", pin))?,
            ),
            None => {
                warn!("No chip-select GPIO configured, relying on the SPI controller");
                Box::new(NoChipSelect)
            }
        };
        Self::with_bus(bus, cs, config)
    }
}

impl<O: PortOpener> Daemon<O> {
    pub fn with_bus(
        mut bus: BusSession<O>,
        mut cs: Box<dyn ChipSelect>,
        config: Config,
    ) -> Result<Self> {
        bus.open_bus().context("Failed to open SPI bus")?;
        let modules = Self::resolve_modules(&mut bus, cs.as_mut(), &config)?;

        info!("SPI device initialized: {}", bus.config().device_path().display());
        info!("Frame interval: {}ms", config.display.frame_interval_ms);
        info!("Driving {} module(s)", modules);

        Ok(Daemon {
            bus,
            cs,
            config,
            modules,
            level: 0,
        })
    }

    fn resolve_modules(
        bus: &mut BusSession<O>,
        cs: &mut dyn ChipSelect,
        config: &Config,
    ) -> Result<usize> {
        let detected = detect_chain_length(bus, cs, config.display.max_modules)
            .context("Module detection failed")?;
        match detected {
            Some(n) if n > 0 => Ok(n),
            _ => {
                warn!(
                    "No modules detected, assuming {} from configuration",
                    config.display.modules
                );
                Ok(config.display.modules)
            }
        }
    }

    pub fn modules(&self) -> usize {
        self.modules
    }

    pub async fn poll(&mut self) -> Result<()> {
        let mut frame = level_frame(self.level, self.modules, self.bus.chunk_len());
        send_frame(&mut self.bus, self.cs.as_mut(), &mut frame)
            .with_context(|| format!("Failed to send frame at level {}", self.level))?;
        self.level = (self.level + 1) % LEVELS;

        sleep(Duration::from_millis(self.config.display.frame_interval_ms)).await;
        Ok(())
    }

    /// Blank every module, used on shutdown.
    pub fn blank(&mut self) -> Result<()> {
        let mut frame = level_frame(0, self.modules, self.bus.chunk_len());
        send_frame(&mut self.bus, self.cs.as_mut(), &mut frame)
            .context("Failed to blank display")?;
        Ok(())
    }

    pub fn reload_config(&mut self, new_config: Config) -> Result<()> {
        if new_config.chip_select.gpio != self.config.chip_select.gpio {
            warn!("Chip-select GPIO changes take effect on restart");
        }
        self.bus
            .reconfigure(new_config.spi.clone())
            .context("Failed to re-open SPI bus")?;
        self.modules = Self::resolve_modules(&mut self.bus, self.cs.as_mut(), &new_config)?;
        self.config = new_config;
        self.level = 0;
        info!("Configuration reloaded successfully");
        Ok(())
    }
}
