//! Serial-over-USB transport for a physical board (FTDI USB-CDC).

use super::Transport;
use serialport::{SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

/// FTDI vendor ID carried by the board's USB interface chip.
pub const FTDI_VID: u16 = 0x0403;
/// FT245-family product ID.
pub const FTDI_PID: u16 = 0x6001;

// The FT245 ignores the line rate, but the serial stack requires one.
const BAUD_RATE: u32 = 921_600;

// Keep reads short so collect() stays close to "whatever is pending".
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// An open serial link to one board.
pub struct Serial {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl Serial {
    /// Lists the port names of attached boards, newest enumeration first.
    /// # Errors
    /// Returns an error if the host serial stack cannot be enumerated.
    pub fn discover() -> serialport::Result<Vec<String>> {
        let mut names = Vec::new();
        for port in serialport::available_ports()? {
            if let SerialPortType::UsbPort(usb) = &port.port_type {
                if usb.vid == FTDI_VID && usb.pid == FTDI_PID {
                    names.push(port.port_name.clone());
                }
            }
        }
        Ok(names)
    }

    /// Opens the named port.
    /// # Errors
    /// Returns an error if the port cannot be opened or configured.
    pub fn connect(port_name: &str) -> serialport::Result<Self> {
        let port = serialport::new(port_name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()?;
        let mut link = Self {
            port,
            port_name: port_name.to_owned(),
        };
        let stale = link.drain_stale()?;
        info!(port_name, stale, "serial link open");
        Ok(link)
    }

    // A previous session may have died with reply words still in flight;
    // anything buffered before we send our first command is garbage.
    fn drain_stale(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; 512];
        let mut total = 0;
        loop {
            let n = self.read_bytes(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            total += n;
        }
    }

    /// Opens the first attached board found by [`Serial::discover`].
    /// # Errors
    /// Returns a `NoDevice` error when no board is attached.
    pub fn connect_first() -> serialport::Result<Self> {
        let names = Self::discover()?;
        let name = names.first().ok_or_else(|| {
            serialport::Error::new(serialport::ErrorKind::NoDevice, "no board attached")
        })?;
        Self::connect(name)
    }

    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for Serial {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            // An empty link is not an error at this seam.
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let written = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(written)
    }
}
