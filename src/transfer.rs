//! Chunked, per-byte-delayed transfers into the matrix shift-register chain.
//!
//! The matrices need idle time between bytes to latch and forward data down
//! the chain, so a frame is never sent as one bulk transfer. Instead every
//! window of `chunk_len` bytes goes out as a single bus message built from
//! `chunk_len` one-byte segments, each followed by `delay_usecs` of idle
//! clock. The driver sequences the segments of one message without gaps.

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::spi::{ByteSegment, SpiPort};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkedTransfer {
    chunk_len: usize,
    delay_usecs: u16,
}

impl ChunkedTransfer {
    pub fn new(chunk_len: usize, delay_usecs: u16) -> Self {
        ChunkedTransfer {
            chunk_len,
            delay_usecs,
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.max_chunk_length, config.inter_byte_delay_usecs)
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn delay_usecs(&self) -> u16 {
        self.delay_usecs
    }

    /// Rejects lengths that would leave a partial chunk.
    pub fn check_length(&self, len: usize) -> Result<()> {
        if self.chunk_len == 0 || len % self.chunk_len != 0 {
            return Err(Error::InvalidLength {
                len,
                chunk_len: self.chunk_len,
            });
        }
        Ok(())
    }

    /// Shift `buffer` out through `port`, replacing each byte with the one
    /// clocked in alongside it. Stops at the first failing chunk; chunks
    /// already sent stay sent.
    pub fn run<P: SpiPort>(&self, port: &mut P, buffer: &mut [u8]) -> Result<()> {
        self.check_length(buffer.len())?;

        let chunks = buffer.len() / self.chunk_len;
        debug!(
            "Transferring {} bytes as {} chunk(s) of {}",
            buffer.len(),
            chunks,
            self.chunk_len
        );

        let mut segments = Vec::with_capacity(self.chunk_len);
        for (chunk_index, window) in buffer.chunks_exact_mut(self.chunk_len).enumerate() {
            segments.clear();
            segments.extend(window.iter_mut().map(|slot| ByteSegment {
                tx: *slot,
                rx: slot,
                delay_usecs: self.delay_usecs,
            }));

            if let Err(source) = port.transfer_message(&mut segments) {
                warn!("Chunk {} of {} failed: {}", chunk_index, chunks, source);
                return Err(Error::Transfer {
                    chunk_index,
                    source,
                });
            }
        }
        Ok(())
    }
}
