//! Length-prefixed frames carrying RPC envelopes.

use std::io::{self, Read, Write};

/// Upper bound on a single frame; answers for large databases stay well
/// below this, and it keeps a bad length prefix from exhausting memory.
pub const MAX_FRAME_BYTES: usize = 1 << 30;

/// Write a `u32` big-endian length prefix followed by the payload.
pub fn write_frame<W: Write>(mut writer: W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(io::ErrorKind::InvalidInput.into());
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)
}

/// Read one length-prefixed frame.
pub fn read_frame<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::ErrorKind::InvalidData.into());
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, b"hello").unwrap();
        write_frame(&mut buf, b"").unwrap();
        buf.set_position(0);
        assert_eq!(read_frame(&mut buf).unwrap(), b"hello");
        assert_eq!(read_frame(&mut buf).unwrap(), b"");
    }

    #[test]
    fn test_read_rejects_oversized_length() {
        let mut buf = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        assert!(read_frame(&mut buf).is_err());
    }

    #[test]
    fn test_read_rejects_truncated_payload() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, b"hello").unwrap();
        let bytes = buf.into_inner();
        let mut truncated = Cursor::new(bytes[..7].to_vec());
        assert!(read_frame(&mut truncated).is_err());
    }
}
