//! Count the modules on the chain from what comes back on MISO.
//!
//! Every module holds one chunk in its shift register, so whatever is
//! shifted in reappears on the far end after `modules * chunk_len` bytes.

use crate::chip_select::{send_frame, ChipSelect};
use crate::error::Result;
use crate::session::BusSession;
use crate::spi::PortOpener;
use log::{debug, info};

fn marker(chunk_len: usize) -> Vec<u8> {
    (0..chunk_len)
        .map(|i| 0xA5 ^ (i as u8).wrapping_mul(0x1D))
        .collect()
}

/// Chunk-aligned offset, in chunks, of the first copy of `marker`.
fn locate_marker(received: &[u8], marker: &[u8]) -> Option<usize> {
    received
        .chunks_exact(marker.len())
        .position(|chunk| chunk == marker)
}

/// Probe for up to `max_modules` modules.
///
/// Returns `Some(n)` when the probe came back after `n` modules (`0` means
/// MOSI is looped straight to MISO) and `None` when it never came back.
/// Leaves the chain filled with zeros, i.e. blank.
pub fn detect_chain_length<O, C>(
    bus: &mut BusSession<O>,
    cs: &mut C,
    max_modules: usize,
) -> Result<Option<usize>>
where
    O: PortOpener,
    C: ChipSelect + ?Sized,
{
    let chunk_len = bus.chunk_len();
    let frame_len = (max_modules.max(1) + 1) * chunk_len;

    // Flush so stale data from an earlier frame cannot look like the probe.
    let mut flush = vec![0u8; frame_len];
    send_frame(bus, cs, &mut flush)?;

    let marker = marker(chunk_len);
    let mut probe = vec![0u8; frame_len];
    probe[..chunk_len].copy_from_slice(&marker);
    send_frame(bus, cs, &mut probe)?;

    let found = locate_marker(&probe, &marker);
    match found {
        Some(n) => info!("Detected {} LED matrix module(s)", n),
        None => debug!("Probe did not return within {} modules", max_modules),
    }

    // The marker may still sit in the registers; push it out.
    let mut blank = vec![0u8; frame_len];
    send_frame(bus, cs, &mut blank)?;

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip_select::NoChipSelect;
    use crate::config::BusConfig;
    use crate::spi::fake::{Behavior, FakeOpener};

    fn bus_with_chain(modules: usize) -> BusSession<FakeOpener> {
        let opener = FakeOpener::new(Behavior {
            chain_modules: modules,
            chunk_len: 32,
            ..Behavior::default()
        });
        let mut bus = BusSession::with_opener(opener, BusConfig::default()).unwrap();
        bus.open_bus().unwrap();
        bus
    }

    #[test]
    fn test_counts_modules_in_chain() {
        for modules in [1usize, 3, 8] {
            let mut bus = bus_with_chain(modules);
            let found = detect_chain_length(&mut bus, &mut NoChipSelect, 10).unwrap();
            assert_eq!(found, Some(modules));
        }
    }

    #[test]
    fn test_loopback_reports_zero() {
        let mut bus = bus_with_chain(0);
        assert_eq!(
            detect_chain_length(&mut bus, &mut NoChipSelect, 4).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn test_chain_longer_than_probe_is_not_found() {
        let mut bus = bus_with_chain(6);
        assert_eq!(
            detect_chain_length(&mut bus, &mut NoChipSelect, 4).unwrap(),
            None
        );
    }

    #[test]
    fn test_marker_only_matches_on_chunk_boundary() {
        let m = marker(4);
        let mut received = vec![0u8; 16];
        received[2..6].copy_from_slice(&m);
        assert_eq!(locate_marker(&received, &m), None);
        received[8..12].copy_from_slice(&m);
        assert_eq!(locate_marker(&received, &m), Some(2));
    }

    #[test]
    fn test_marker_is_not_blank() {
        assert!(marker(32).iter().any(|&b| b != 0));
    }
}
