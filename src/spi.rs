use crate::config::ClockMode;
use linux_embedded_hal::spidev::{spidevioctl, SpiModeFlags, Spidev, SpidevTransfer};
use log::debug;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::slice;

/// One byte of a bus message: shifted out from `tx`, the byte clocked in at
/// the same time lands in `rx`, then the bus idles for `delay_usecs`.
#[derive(Debug)]
pub struct ByteSegment<'a> {
    pub tx: u8,
    pub rx: &'a mut u8,
    pub delay_usecs: u16,
}

/// An open SPI device node. Dropping the port closes it.
pub trait SpiPort {
    fn write_mode(&mut self, mode: ClockMode) -> io::Result<()>;

    /// Raw mode byte as reported by the driver.
    fn read_mode(&mut self) -> io::Result<u8>;

    fn write_word_size(&mut self, bits: u8) -> io::Result<()>;

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()>;

    /// Submit all segments as a single message: the driver sequences them
    /// back to back with no other traffic in between.
    fn transfer_message(&mut self, segments: &mut [ByteSegment<'_>]) -> io::Result<()>;
}

/// Opens ports by device path.
pub trait PortOpener {
    type Port: SpiPort;

    fn open(&mut self, path: &Path) -> io::Result<Self::Port>;
}

/// Opens `/dev/spidevB.C` nodes through the kernel spidev interface.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpidevOpener;

impl PortOpener for SpidevOpener {
    type Port = SpidevPort;

    fn open(&mut self, path: &Path) -> io::Result<SpidevPort> {
        let dev = Spidev::open(path)?;
        debug!("Opened SPI device {}", path.display());
        Ok(SpidevPort {
            dev,
            device_path: path.to_path_buf(),
        })
    }
}

pub struct SpidevPort {
    dev: Spidev,
    device_path: PathBuf,
}

impl SpidevPort {
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    fn fd(&self) -> RawFd {
        self.dev.inner().as_raw_fd()
    }
}

impl SpiPort for SpidevPort {
    fn write_mode(&mut self, mode: ClockMode) -> io::Result<()> {
        let flags = match mode {
            ClockMode::Mode0 => SpiModeFlags::SPI_MODE_0,
            ClockMode::Mode1 => SpiModeFlags::SPI_MODE_1,
            ClockMode::Mode2 => SpiModeFlags::SPI_MODE_2,
            ClockMode::Mode3 => SpiModeFlags::SPI_MODE_3,
        };
        spidevioctl::set_mode(self.fd(), flags)
    }

    fn read_mode(&mut self) -> io::Result<u8> {
        spidevioctl::get_mode(self.fd())
    }

    fn write_word_size(&mut self, bits: u8) -> io::Result<()> {
        spidevioctl::set_bits_per_word(self.fd(), bits)
    }

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        spidevioctl::set_max_speed_hz(self.fd(), speed_hz)
    }

    fn transfer_message(&mut self, segments: &mut [ByteSegment<'_>]) -> io::Result<()> {
        let mut transfers: Vec<SpidevTransfer<'_, '_>> = segments
            .iter_mut()
            .map(|seg| {
                let mut xfer = SpidevTransfer::read_write(
                    slice::from_ref(&seg.tx),
                    slice::from_mut(&mut *seg.rx),
                );
                xfer.delay_usecs = seg.delay_usecs;
                xfer
            })
            .collect();
        self.dev.transfer_multiple(&mut transfers)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{Event, FakeOpener};
    use super::*;

    #[test]
    fn test_fake_echo_round_trip() {
        let mut opener = FakeOpener::echo();
        let mut port = opener.open(Path::new("/dev/spidev0.0")).unwrap();

        let mut slots = [0u8; 3];
        let tx = [0x11, 0x22, 0x33];
        let mut segments: Vec<ByteSegment<'_>> = slots
            .iter_mut()
            .zip(tx)
            .map(|(rx, tx)| ByteSegment {
                tx,
                rx,
                delay_usecs: 5,
            })
            .collect();
        port.transfer_message(&mut segments).unwrap();
        drop(segments);
        assert_eq!(slots, tx);

        drop(port);
        let state = opener.state.borrow();
        assert_eq!(state.events.last(), Some(&Event::Close { handle: 1 }));
    }

    #[test]
    fn test_spidev_open_missing_node_fails() {
        let mut opener = SpidevOpener;
        assert!(opener.open(Path::new("/dev/spidev-does-not-exist")).is_err());
    }
}
