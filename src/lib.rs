//! LED Matrix SPI - transport for daisy-chained LED matrix modules on a Linux spidev bus
//!
//! Frames are shifted into the chain in fixed-size chunks of one-byte
//! transfers with an idle gap after every byte, which the modules' shift
//! registers need to latch and forward data. The chip-select line must stay
//! asserted across a whole frame and is driven separately, see
//! [`chip_select`].

pub mod chip_select;
pub mod config;
pub mod daemon;
pub mod detect;
pub mod error;
pub mod session;
pub mod spi;
pub mod transfer;

// Re-export main types for convenience
pub use chip_select::{send_frame, ChipSelect, GpioChipSelect, NoChipSelect};
pub use config::{BusConfig, ClockMode, Config, SelectLine};
pub use detect::detect_chain_length;
pub use error::{Error, InitStep, Result};
pub use session::BusSession;
pub use spi::{ByteSegment, PortOpener, SpiPort, SpidevOpener, SpidevPort};
pub use transfer::ChunkedTransfer;
