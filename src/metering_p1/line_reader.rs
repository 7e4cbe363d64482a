use log::{debug, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt as _, BufReader};
use tokio_serial::{SerialPortBuilderExt as _, SerialStream};

/// P1 port framing, fixed by the DSMR P1 companion standard.
pub const P1_BAUD_RATE: u32 = 9600;
pub const P1_DATA_BITS: tokio_serial::DataBits = tokio_serial::DataBits::Seven;
pub const P1_PARITY: tokio_serial::Parity = tokio_serial::Parity::Even;
pub const P1_STOP_BITS: tokio_serial::StopBits = tokio_serial::StopBits::One;

/// Consecutive read errors after which every further error is followed by a pause.
const MAX_READ_ERRORS: u32 = 10;
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Longest accepted line. DSMR lines stay well below this, so reaching it
/// without a newline means line noise.
pub const MAX_LINE_LENGTH: usize = 2048;

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Serial error `{0}`")]
    Port(#[from] tokio_serial::Error),
    #[error("Line stream closed")]
    Closed,
}

pub fn open_p1_port(path: &str) -> Result<SerialStream, SerialError> {
    let serial_config = tokio_serial::new(path, P1_BAUD_RATE)
        .data_bits(P1_DATA_BITS)
        .parity(P1_PARITY)
        .stop_bits(P1_STOP_BITS)
        .flow_control(tokio_serial::FlowControl::None);

    debug!("Try to open serial {:?}", serial_config);
    let serial = serial_config.open_native_async()?;
    debug!("Ok to open serial {:?}", serial);

    Ok(serial)
}

/// Splits a byte stream into newline terminated lines.
///
/// A read that times out yields an empty line; bytes already received stay
/// buffered and are completed by the next call.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    timeout: Duration,
    read_errors: u32,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, timeout: Duration) -> Self {
        LineReader {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(128),
            timeout,
            read_errors: 0,
        }
    }

    /// Next line including its terminator, or an empty string on timeout,
    /// read errors and overlong lines. Only the end of the stream is an error.
    pub async fn next_line(&mut self) -> Result<String, SerialError> {
        let limit = MAX_LINE_LENGTH.saturating_sub(self.buffer.len()).max(1) as u64;
        let mut limited = (&mut self.reader).take(limit);
        let read = tokio::time::timeout(
            self.timeout,
            limited.read_until(b'\n', &mut self.buffer),
        )
        .await;

        match read {
            Err(_) => {
                debug!("Serial read timed out with {} bytes pending", self.buffer.len());
                Ok(String::new())
            }
            Ok(Ok(0)) => {
                if self.buffer.is_empty() {
                    Err(SerialError::Closed)
                } else {
                    Ok(self.take_line())
                }
            }
            Ok(Ok(_)) => {
                self.read_errors = 0;
                if self.buffer.len() >= MAX_LINE_LENGTH && self.buffer.last() != Some(&b'\n') {
                    warn!("Discarding {} bytes without line end, check the port settings", self.buffer.len());
                    self.buffer.clear();
                    return Ok(String::new());
                }
                Ok(self.take_line())
            }
            Ok(Err(e)) => {
                self.read_errors = self.read_errors.saturating_add(1);
                self.buffer.clear();
                warn!("Error reading from serial port ({} in a row): {}", self.read_errors, e);
                if self.read_errors >= MAX_READ_ERRORS {
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
                Ok(String::new())
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        line
    }
}
