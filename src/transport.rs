//! Framed bincode message streams.

use crate::framing::{read_frame, write_frame};
use crate::messages::TransportError;
use serde::{de::DeserializeOwned, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Sending and receiving bincode-serialized messages over a framed stream.
pub trait Transport {
    /// Serialize and send a value.
    fn send<T: Serialize>(&mut self, value: &T) -> Result<(), TransportError>;
    /// Receive and deserialize a value.
    fn recv<T: DeserializeOwned>(&mut self) -> Result<T, TransportError>;
}

/// [`Transport`] implementation backed by a length-framed `Read + Write`
/// stream, typically a TCP connection with a read timeout.
pub struct FramedIo<RW> {
    inner: RW,
}

impl<RW> FramedIo<RW> {
    /// Wrap a stream.
    pub fn new(inner: RW) -> Self {
        Self { inner }
    }

    /// Unwrap the inner stream.
    pub fn into_inner(self) -> RW {
        self.inner
    }
}

fn io_error(err: std::io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout,
        _ => TransportError::Io(err.to_string()),
    }
}

impl<RW: Read + Write> Transport for FramedIo<RW> {
    fn send<T: Serialize>(&mut self, value: &T) -> Result<(), TransportError> {
        let bytes = bincode::serialize(value).map_err(|e| {
            log::debug!("transport serialize error: {}", e);
            TransportError::Decode(e.to_string())
        })?;
        write_frame(&mut self.inner, &bytes).map_err(|e| {
            log::debug!("transport write error: {}", e);
            io_error(e)
        })
    }

    fn recv<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        let bytes = read_frame(&mut self.inner).map_err(|e| {
            log::debug!("transport read error: {}", e);
            io_error(e)
        })?;
        bincode::deserialize(&bytes).map_err(|e| {
            log::debug!("transport deserialize error: {}", e);
            TransportError::Decode(e.to_string())
        })
    }
}
