/// Serial access to the RF transceiver
use log::info;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Short enough that the bridge loop notices shutdown promptly
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte stream the bridge loop reads frames from and forwards them to
pub trait SerialLink {
    /// Up to `max_bytes`; empty when the read timed out
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>>;
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

pub struct SerialInterface {
    port: Box<dyn SerialPort>,
}

impl SerialInterface {
    pub fn open(device: &str, baud: u32) -> Result<Self, Box<dyn std::error::Error>> {
        let port = serialport::new(device, baud)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(|e| format!("Failed to open serial port {}: {}", device, e))?;

        info!("Serial port {} opened at {} baud", device, baud);
        Ok(SerialInterface { port })
    }
}

impl SerialLink for SerialInterface {
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}
