//! Lumberjack v2 wire framing
//!
//! The protocol spoken to Beats/Logstash ingest endpoints. One batch
//! transmission is:
//!
//! ```text
//! '2' 'W' <count:u32be>                      window frame
//! '2' 'J' <seq:u32be> <len:u32be> <payload>  data frame, seq 1..=count
//! ```
//!
//! With a compression level > 0 the data frames are wrapped in a single
//! compressed frame instead:
//!
//! ```text
//! '2' 'C' <len:u32be> <zlib(data frames)>
//! ```
//!
//! The server acknowledges with `'2' 'A' <seq:u32be>` frames; the highest
//! sequence acknowledged equals the window size when the batch is done.

use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use tokio::io::{AsyncRead, AsyncReadExt};

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;

pub(crate) const VERSION: u8 = b'2';
pub(crate) const FRAME_WINDOW: u8 = b'W';
pub(crate) const FRAME_JSON: u8 = b'J';
pub(crate) const FRAME_COMPRESSED: u8 = b'C';
pub(crate) const FRAME_ACK: u8 = b'A';

/// Encode a window frame plus the data frames for one batch.
pub(crate) fn encode_batch(payloads: &[Vec<u8>], compression: u32) -> io::Result<Vec<u8>> {
    let mut frames = Vec::new();
    for (index, payload) in payloads.iter().enumerate() {
        frames.push(VERSION);
        frames.push(FRAME_JSON);
        frames.extend_from_slice(&((index + 1) as u32).to_be_bytes());
        frames.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frames.extend_from_slice(payload);
    }

    let mut buf = Vec::with_capacity(frames.len() + 16);
    buf.push(VERSION);
    buf.push(FRAME_WINDOW);
    buf.extend_from_slice(&(payloads.len() as u32).to_be_bytes());

    if compression > 0 {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(compression));
        encoder.write_all(&frames)?;
        let compressed = encoder.finish()?;
        buf.push(VERSION);
        buf.push(FRAME_COMPRESSED);
        buf.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        buf.extend_from_slice(&compressed);
    } else {
        buf.extend_from_slice(&frames);
    }
    Ok(buf)
}

/// Read ack frames until the final sequence of the window is acknowledged.
pub(crate) async fn read_acks<S>(stream: &mut S, count: u32) -> io::Result<()>
where
    S: AsyncRead + Unpin + ?Sized,
{
    if count == 0 {
        return Ok(());
    }
    loop {
        let mut frame = [0u8; 6];
        stream.read_exact(&mut frame).await?;
        if frame[0] != VERSION || frame[1] != FRAME_ACK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unexpected frame {:02x}{:02x} while awaiting ack",
                    frame[0], frame[1]
                ),
            ));
        }
        let seq = u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]);
        if seq >= count {
            return Ok(());
        }
    }
}
