//! Tests for the lumberjack framing

use std::io::Read;

use flate2::read::ZlibDecoder;

use super::{encode_batch, read_acks, FRAME_COMPRESSED, FRAME_JSON, FRAME_WINDOW, VERSION};

fn be32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Parse concatenated data frames back into payloads.
fn parse_data_frames(mut data: &[u8]) -> Vec<(u32, Vec<u8>)> {
    let mut frames = Vec::new();
    while !data.is_empty() {
        assert_eq!(data[0], VERSION);
        assert_eq!(data[1], FRAME_JSON);
        let seq = be32(&data[2..6]);
        let len = be32(&data[6..10]) as usize;
        frames.push((seq, data[10..10 + len].to_vec()));
        data = &data[10 + len..];
    }
    frames
}

#[test]
fn test_encode_uncompressed() {
    let payloads = vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()];
    let buf = encode_batch(&payloads, 0).unwrap();

    // Window frame announces the batch size.
    assert_eq!(buf[0], VERSION);
    assert_eq!(buf[1], FRAME_WINDOW);
    assert_eq!(be32(&buf[2..6]), 2);

    let frames = parse_data_frames(&buf[6..]);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], (1, payloads[0].clone()));
    assert_eq!(frames[1], (2, payloads[1].clone()));
}

#[test]
fn test_encode_compressed_roundtrips() {
    let payloads: Vec<Vec<u8>> = (0..10)
        .map(|i| format!("{{\"seq\":{i}}}").into_bytes())
        .collect();
    let buf = encode_batch(&payloads, 6).unwrap();

    assert_eq!(buf[1], FRAME_WINDOW);
    assert_eq!(be32(&buf[2..6]), 10);
    assert_eq!(buf[6], VERSION);
    assert_eq!(buf[7], FRAME_COMPRESSED);
    let compressed_len = be32(&buf[8..12]) as usize;
    assert_eq!(buf.len(), 12 + compressed_len);

    let mut inflated = Vec::new();
    ZlibDecoder::new(&buf[12..])
        .read_to_end(&mut inflated)
        .unwrap();
    let frames = parse_data_frames(&inflated);
    assert_eq!(frames.len(), 10);
    assert_eq!(frames[9].0, 10);
    assert_eq!(frames[3].1, b"{\"seq\":3}".to_vec());
}

#[test]
fn test_encode_empty_batch() {
    let buf = encode_batch(&[], 0).unwrap();
    assert_eq!(buf.len(), 6);
    assert_eq!(be32(&buf[2..6]), 0);
}

#[tokio::test]
async fn test_read_acks_waits_for_final_sequence() {
    // Partial acks (1, 2) followed by the final one.
    let mut acks = Vec::new();
    for seq in [1u32, 2, 3] {
        acks.push(VERSION);
        acks.push(super::FRAME_ACK);
        acks.extend_from_slice(&seq.to_be_bytes());
    }
    let mut reader = std::io::Cursor::new(acks);
    read_acks(&mut reader, 3).await.unwrap();
}

#[tokio::test]
async fn test_read_acks_rejects_garbage() {
    let mut reader = std::io::Cursor::new(vec![b'X', b'Y', 0, 0, 0, 1]);
    assert!(read_acks(&mut reader, 1).await.is_err());
}

#[tokio::test]
async fn test_read_acks_zero_window_is_noop() {
    let mut reader = std::io::Cursor::new(Vec::<u8>::new());
    read_acks(&mut reader, 0).await.unwrap();
}

#[tokio::test]
async fn test_read_acks_truncated_stream() {
    let mut reader = std::io::Cursor::new(vec![VERSION, super::FRAME_ACK, 0]);
    assert!(read_acks(&mut reader, 1).await.is_err());
}
