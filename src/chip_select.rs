//! Frame-level chip-select bracketing.
//!
//! The matrices only latch a frame when their select input stays asserted
//! across every chunk of it, and one of the controller's hardware select
//! lines cannot be held that long. The line is therefore driven from a
//! plain GPIO around the whole sequence of `transfer` calls for a frame.

use crate::error::Result;
use crate::session::BusSession;
use crate::spi::PortOpener;
use log::debug;
use rppal::gpio::{Gpio, OutputPin};

pub trait ChipSelect {
    /// Assert the line ahead of the first chunk of a frame.
    fn select(&mut self) -> Result<()>;

    /// Release the line after the last chunk of a frame.
    fn deselect(&mut self) -> Result<()>;
}

/// For wiring where the controller's own select line is usable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChipSelect;

impl ChipSelect for NoChipSelect {
    fn select(&mut self) -> Result<()> {
        Ok(())
    }

    fn deselect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Active-low select line on a BCM-numbered GPIO.
pub struct GpioChipSelect {
    pin: OutputPin,
}

impl GpioChipSelect {
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_output_high();
        debug!("Chip select on GPIO {}", bcm_pin);
        Ok(GpioChipSelect { pin })
    }
}

impl ChipSelect for GpioChipSelect {
    fn select(&mut self) -> Result<()> {
        self.pin.set_low();
        Ok(())
    }

    fn deselect(&mut self) -> Result<()> {
        self.pin.set_high();
        Ok(())
    }
}

/// Send one frame with the select line held for its full duration. The line
/// is released even when the transfer fails; the transfer error wins.
pub fn send_frame<O, C>(bus: &mut BusSession<O>, cs: &mut C, frame: &mut [u8]) -> Result<()>
where
    O: PortOpener,
    C: ChipSelect + ?Sized,
{
    // Validate before asserting so a bad frame never toggles the line.
    bus.check_length(frame.len())?;
    cs.select()?;
    let sent = bus.transfer(frame);
    let released = cs.deselect();
    sent.and(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::error::Error;
    use crate::spi::fake::{Behavior, FakeOpener};

    /// Records line changes and how many bus messages had gone out at each.
    #[derive(Default)]
    struct RecordingSelect {
        log: Vec<(&'static str, usize)>,
        opener: Option<FakeOpener>,
    }

    impl RecordingSelect {
        fn watching(opener: &FakeOpener) -> Self {
            RecordingSelect {
                log: Vec::new(),
                opener: Some(opener.clone()),
            }
        }

        fn sent(&self) -> usize {
            self.opener
                .as_ref()
                .map(|o| o.state.borrow().messages().len())
                .unwrap_or(0)
        }
    }

    impl ChipSelect for RecordingSelect {
        fn select(&mut self) -> Result<()> {
            let sent = self.sent();
            self.log.push(("select", sent));
            Ok(())
        }

        fn deselect(&mut self) -> Result<()> {
            let sent = self.sent();
            self.log.push(("deselect", sent));
            Ok(())
        }
    }

    fn open_bus(behavior: Behavior) -> (FakeOpener, BusSession<FakeOpener>) {
        let opener = FakeOpener::new(behavior);
        let mut bus = BusSession::with_opener(opener.clone(), BusConfig::default()).unwrap();
        bus.open_bus().unwrap();
        (opener, bus)
    }

    #[test]
    fn test_select_brackets_every_chunk() {
        let (opener, mut bus) = open_bus(Behavior::default());
        let mut cs = RecordingSelect::watching(&opener);

        let mut frame = [0x11u8; 96];
        send_frame(&mut bus, &mut cs, &mut frame).unwrap();
        assert_eq!(cs.log, vec![("select", 0), ("deselect", 3)]);
    }

    #[test]
    fn test_deselect_after_failed_transfer() {
        let (opener, mut bus) = open_bus(Behavior {
            fail_message: Some(1),
            ..Behavior::default()
        });
        let mut cs = RecordingSelect::watching(&opener);

        let mut frame = [0u8; 96];
        let err = send_frame(&mut bus, &mut cs, &mut frame).unwrap_err();
        assert!(matches!(err, Error::Transfer { chunk_index: 1, .. }));
        assert_eq!(cs.log.last(), Some(&("deselect", 2)));
    }

    #[test]
    fn test_bad_length_never_selects() {
        let (_opener, mut bus) = open_bus(Behavior::default());
        let mut cs = RecordingSelect::default();

        let mut frame = [0u8; 40];
        assert!(matches!(
            send_frame(&mut bus, &mut cs, &mut frame),
            Err(Error::InvalidLength { .. })
        ));
        assert!(cs.log.is_empty());
    }

    #[test]
    fn test_no_chip_select_is_transparent() {
        let (opener, mut bus) = open_bus(Behavior::default());
        let mut frame: Vec<u8> = (0..32).collect();
        send_frame(&mut bus, &mut NoChipSelect, &mut frame).unwrap();
        assert_eq!(frame, (0..32).collect::<Vec<u8>>());
        assert_eq!(opener.state.borrow().messages().len(), 1);
    }
}
