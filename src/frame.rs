// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Length-prefixed framing for the socket endpoint.
//
//   +------+------+----------------+-----------------+
//   | 'C'  | 'B'  | len: u32 (LE)  | payload[len]    |
//   +------+------+----------------+-----------------+

use std::io::{self, Read, Write};

pub const MAGIC: [u8; 2] = *b"CB";
pub const HEADER_SIZE: usize = 6;
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("bad frame magic {0:02x?}")]
    BadMagic([u8; 2]),
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("peer closed the connection mid-frame")]
    Truncated,
    #[error("peer closed the connection before sending a frame")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError> {
    if payload.len() > max || payload.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge { len: payload.len(), max });
    }
    let mut header = [0u8; HEADER_SIZE];
    header[..2].copy_from_slice(&MAGIC);
    header[2..].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    w.write_all(&header)?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

/// Read exactly one frame. The length is checked before the payload buffer
/// is allocated.
pub fn read_frame<R: Read>(r: &mut R, max: usize) -> Result<Vec<u8>, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    let got = read_full(r, &mut header)?;
    if got == 0 {
        return Err(FrameError::Closed);
    }
    if got < HEADER_SIZE {
        return Err(FrameError::Truncated);
    }
    if header[..2] != MAGIC {
        return Err(FrameError::BadMagic([header[0], header[1]]));
    }
    let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }
    let mut payload = vec![0u8; len];
    if read_full(r, &mut payload)? < len {
        return Err(FrameError::Truncated);
    }
    Ok(payload)
}

/// Like `read_exact`, but reports how many bytes arrived before EOF.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
