use crate::config::{BusConfig, ClockMode};
use crate::error::{Error, InitStep, Result};
use crate::spi::{PortOpener, SpiPort, SpidevOpener};
use crate::transfer::ChunkedTransfer;
use log::{debug, info, warn};
use std::io;

/// The single open SPI connection to the matrix chain.
///
/// `transfer` only shifts bytes; the caller keeps the chip-select line
/// asserted across every chunk of a frame (see [`crate::chip_select`]).
pub struct BusSession<O: PortOpener = SpidevOpener> {
    opener: O,
    config: BusConfig,
    engine: ChunkedTransfer,
    port: Option<O::Port>,
}

impl BusSession<SpidevOpener> {
    pub fn new(config: BusConfig) -> Result<Self> {
        Self::with_opener(SpidevOpener, config)
    }
}

impl<O: PortOpener> BusSession<O> {
    pub fn with_opener(opener: O, config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(BusSession {
            opener,
            engine: ChunkedTransfer::from_config(&config),
            config,
            port: None,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn chunk_len(&self) -> usize {
        self.engine.chunk_len()
    }

    pub fn check_length(&self, len: usize) -> Result<()> {
        self.engine.check_length(len)
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open and configure the device, closing any port this session already
    /// holds. On failure the session is left closed.
    pub fn open_bus(&mut self) -> Result<()> {
        self.close();

        let path = self.config.device_path();
        info!("Opening SPI device: {}", path.display());
        let mut port = self
            .opener
            .open(path)
            .map_err(Error::bus_init(InitStep::Open))?;

        // On error `port` is dropped here, which closes the descriptor.
        Self::configure(&mut port, &self.config)?;

        info!(
            "SPI device ready: mode {}, {} bits, {} Hz, {} us inter-byte delay, {}-byte chunks",
            self.config.mode.bits(),
            self.config.word_size_bits(),
            self.config.clock_speed_hz,
            self.config.inter_byte_delay_usecs,
            self.config.max_chunk_length
        );
        self.port = Some(port);
        Ok(())
    }

    /// Swap in new parameters and re-open with them. An invalid config is
    /// rejected without touching the current port.
    pub fn reconfigure(&mut self, config: BusConfig) -> Result<()> {
        config.validate()?;
        self.close();
        self.engine = ChunkedTransfer::from_config(&config);
        self.config = config;
        self.open_bus()
    }

    fn configure(port: &mut O::Port, config: &BusConfig) -> Result<()> {
        debug!("Writing SPI mode {}", config.mode.bits());
        port.write_mode(config.mode)
            .map_err(Error::bus_init(InitStep::WriteMode))?;

        // Some drivers clamp or ignore mode requests without failing the
        // ioctl; a wrong mode shows up as shifted bits, so check now.
        let reported = port
            .read_mode()
            .map_err(Error::bus_init(InitStep::ReadMode))?;
        debug!("Driver reports SPI mode byte 0x{:02x}", reported);
        if reported & ClockMode::MASK != config.mode.bits() {
            warn!(
                "SPI mode mismatch: requested {}, driver reports {}",
                config.mode.bits(),
                reported & ClockMode::MASK
            );
            return Err(Error::BusInit {
                step: InitStep::VerifyMode,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "requested mode {}, driver reports {}",
                        config.mode.bits(),
                        reported & ClockMode::MASK
                    ),
                ),
            });
        }

        debug!("Writing word size {}", config.word_size_bits());
        port.write_word_size(config.word_size_bits())
            .map_err(Error::bus_init(InitStep::WriteWordSize))?;

        debug!("Writing max speed {} Hz", config.clock_speed_hz);
        port.write_max_speed_hz(config.clock_speed_hz)
            .map_err(Error::bus_init(InitStep::WriteSpeed))?;

        Ok(())
    }

    /// Full-duplex transfer of `buffer`, in place. The length must be a
    /// multiple of the chunk length; that is checked before the bus is
    /// touched.
    pub fn transfer(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.check_length(buffer.len())?;
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;
        self.engine.run(port, buffer)
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed SPI device: {}", self.config.device_path().display());
        }
    }
}
