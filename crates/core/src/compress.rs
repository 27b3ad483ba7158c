//! The controller's proprietary LZ-style compressed configuration archive (C3).
//!
//! Algorithm transcribed from the Python reference's `uncompress`: a
//! sequence of packets, each a literal run followed by an optional
//! back-reference copy (`offset == 1` degenerates into byte-repeat RLE).

use std::io::Read;

use crate::error::{Error, Result};

const MAGIC: u32 = 0xaabbccee;
const CONFIG_ENTRY_NAME: &str = "sps0.LoxCC";

/// Decode the controller's LZ-style container format: literal-length
/// nibble/overflow, literal bytes, 16-bit offset, match-length
/// nibble/overflow, then a byte-at-a-time back-copy (so `offset == 1`
/// degenerates into run-length repetition of the last output byte).
fn decode_packets(compressed: &[u8], uncompressed_len: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_len as usize);
    let mut index = 0usize;

    while index < compressed.len() {
        let token = compressed[index];
        index += 1;

        let mut lit = (token >> 4) as usize;
        let mat = (token & 0x0f) as usize;

        if lit == 15 {
            loop {
                let b = compressed[index];
                index += 1;
                lit += b as usize;
                if b != 0xff {
                    break;
                }
            }
        }

        if lit > 0 {
            out.extend_from_slice(&compressed[index..index + lit]);
            index += lit;
        }

        if index >= compressed.len() {
            break;
        }

        let offset = u16::from_le_bytes([compressed[index], compressed[index + 1]]) as usize;
        index += 2;

        let mut mlen = 4 + mat;
        if mat == 15 {
            loop {
                let b = compressed[index];
                index += 1;
                mlen += b as usize;
                if b != 0xff {
                    break;
                }
            }
        }

        for _ in 0..mlen {
            let byte = out[out.len() - offset];
            out.push(byte);
        }
    }

    Ok(out)
}

/// Decompress a raw `sps0.LoxCC` payload: `<magic:u32> <compressed_len:u32>
/// <uncompressed_len:u32> <crc32:u32>` followed by the compressed body.
pub fn decompress_config(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < 16 {
        return Err(Error::Protocol("config payload shorter than its header".into()));
    }

    let magic = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(Error::BadMagic(magic));
    }
    let compressed_len = u32::from_le_bytes(payload[4..8].try_into().unwrap());
    let uncompressed_len = u32::from_le_bytes(payload[8..12].try_into().unwrap());
    let checksum = u32::from_le_bytes(payload[12..16].try_into().unwrap());

    let body = &payload[16..16 + compressed_len as usize];
    let result = decode_packets(body, uncompressed_len)?;

    if result.len() as u32 != uncompressed_len {
        return Err(Error::LengthMismatch {
            expected: uncompressed_len,
            actual: result.len() as u32,
        });
    }

    let actual_crc = crc32fast::hash(&result);
    if actual_crc != checksum {
        return Err(Error::ChecksumMismatch {
            expected: checksum,
            actual: actual_crc,
        });
    }

    Ok(result)
}

/// Open a zip archive, read the `sps0.LoxCC` entry, and decompress it.
pub fn decompress_archive(archive_bytes: &[u8]) -> Result<Vec<u8>> {
    let cursor = std::io::Cursor::new(archive_bytes);
    let mut zip = zip::ZipArchive::new(cursor)?;
    let mut entry = zip
        .by_name(CONFIG_ENTRY_NAME)
        .map_err(|_| Error::MissingConfigEntry)?;
    let mut payload = Vec::new();
    entry.read_to_end(&mut payload)?;
    decompress_config(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_header(compressed: &[u8], uncompressed_len: u32, crc: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&MAGIC.to_le_bytes());
        payload.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        payload.extend_from_slice(&uncompressed_len.to_le_bytes());
        payload.extend_from_slice(&crc.to_le_bytes());
        payload.extend_from_slice(compressed);
        payload
    }

    #[test]
    fn decompresses_a_literal_only_packet() {
        // token 0xA0: lit = 10, mat = 0; ten literal bytes, no back-reference.
        let literal = b"ABCDEFGHIJ";
        let mut compressed = vec![0xA0u8];
        compressed.extend_from_slice(literal);

        let crc = crc32fast::hash(literal);
        let payload = archive_header(&compressed, literal.len() as u32, crc);

        let result = decompress_config(&payload).unwrap();
        assert_eq!(result, literal);
    }

    #[test]
    fn run_length_expansion_via_offset_one() {
        // token 0x10: lit=1 ("X"), mat=0 (mlen=4); offset=1 repeats the
        // last emitted byte, so pre-state "X" expands to "XXXXX".
        let mut compressed = vec![0x10u8, b'X'];
        compressed.extend_from_slice(&1u16.to_le_bytes());

        let expected = b"XXXXX";
        let crc = crc32fast::hash(expected);
        let payload = archive_header(&compressed, expected.len() as u32, crc);

        let result = decompress_config(&payload).unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut payload = vec![0u8; 16];
        payload[0] = 0; // wrong magic
        assert!(matches!(decompress_config(&payload), Err(Error::BadMagic(_))));
    }

    #[test]
    fn checksum_mismatch_is_fatal() {
        let literal = b"HELLO";
        let mut compressed = vec![0x50u8];
        compressed.extend_from_slice(literal);
        let payload = archive_header(&compressed, literal.len() as u32, 0xdeadbeef);
        assert!(matches!(
            decompress_config(&payload),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let literal = b"HELLO";
        let mut compressed = vec![0x50u8];
        compressed.extend_from_slice(literal);
        let crc = crc32fast::hash(literal);
        let payload = archive_header(&compressed, 999, crc);
        assert!(matches!(
            decompress_config(&payload),
            Err(Error::LengthMismatch { .. })
        ));
    }
}
