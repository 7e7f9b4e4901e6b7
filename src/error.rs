use std::fmt;
use std::io;
use thiserror::Error;

/// The configuration step that was running when `open_bus` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Open,
    WriteMode,
    ReadMode,
    VerifyMode,
    WriteWordSize,
    WriteSpeed,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStep::Open => "open device",
            InitStep::WriteMode => "write clock mode",
            InitStep::ReadMode => "read clock mode",
            InitStep::VerifyMode => "verify clock mode",
            InitStep::WriteWordSize => "write word size",
            InitStep::WriteSpeed => "write clock speed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("SPI bus initialization failed at step '{step}': {source}")]
    BusInit {
        step: InitStep,
        #[source]
        source: io::Error,
    },

    #[error("buffer length {len} is not a multiple of the {chunk_len}-byte chunk size")]
    InvalidLength { len: usize, chunk_len: usize },

    #[error("SPI transfer failed at chunk {chunk_index}: {source}")]
    Transfer {
        chunk_index: usize,
        #[source]
        source: io::Error,
    },

    #[error("SPI bus is not open")]
    NotOpen,

    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),

    #[error("chip-select line failure: {0}")]
    ChipSelect(#[from] rppal::gpio::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn bus_init(step: InitStep) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::BusInit { step, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_init_message_names_step() {
        let err = Error::bus_init(InitStep::WriteSpeed)(io::Error::from(io::ErrorKind::Other));
        let msg = err.to_string();
        assert!(msg.contains("write clock speed"), "{}", msg);
    }

    #[test]
    fn test_transfer_message_names_chunk() {
        let err = Error::Transfer {
            chunk_index: 3,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert!(err.to_string().contains("chunk 3"));
    }
}
