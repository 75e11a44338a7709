//! Serial port capability
//!
//! The HAL has no UART driver. Board crates implement [`HardwareSerial`] for
//! their transport and hand it to whatever needs a byte stream.
use embedded_io::ErrorType;

/// A byte oriented serial port.
///
/// Transfers are non-blocking: [`read`](Self::read), [`write`](Self::write)
/// and [`flush`](Self::flush) return [`nb::Error::WouldBlock`] until they can
/// make progress. Wrap them in [`nb::block!`] to wait.
pub trait HardwareSerial: ErrorType {
    /// Enable the port at `baud` bits per second.
    fn begin(&mut self, baud: u32) -> Result<(), Self::Error>;

    /// Disable the port. Pending receive data is dropped.
    fn end(&mut self);

    /// Bytes received and not yet read
    fn available(&self) -> usize;

    /// Next received byte without consuming it
    fn peek(&self) -> Option<u8>;

    fn read(&mut self) -> nb::Result<u8, Self::Error>;

    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error>;

    /// Wait for everything written so far to leave the transmitter.
    fn flush(&mut self) -> nb::Result<(), Self::Error>;

    /// Write every byte of `bytes`, blocking while the transmitter is full.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        for &byte in bytes {
            nb::block!(self.write(byte))?;
        }
        Ok(())
    }
}

/// Adapter for `core::fmt` output (`write!`, `writeln!`) over a serial port
pub struct Writer<'a, S: HardwareSerial>(pub &'a mut S);

impl<S: HardwareSerial> core::fmt::Write for Writer<'_, S> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}
