//! End-to-end through the real zip container: build an `sps0.LoxCC` archive
//! the way a Miniserver backup actually ships it, then decompress it back.

use std::io::Write;

use loxone_core::Error;

const MAGIC: u32 = 0xaabbccee;

fn config_payload(literal: &[u8]) -> Vec<u8> {
    // token 0xA0..: pure literal run, no back-reference.
    let mut compressed = vec![0xA0u8 | (literal.len() as u8 & 0x0f)];
    if literal.len() >= 15 {
        panic!("fixture literal too long for a single nibble-encoded token");
    }
    compressed.extend_from_slice(literal);

    let mut payload = Vec::new();
    payload.extend_from_slice(&MAGIC.to_le_bytes());
    payload.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    payload.extend_from_slice(&(literal.len() as u32).to_le_bytes());
    payload.extend_from_slice(&crc32fast::hash(literal).to_le_bytes());
    payload.extend_from_slice(&compressed);
    payload
}

fn zip_with_entry(name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
    writer.write_all(bytes).unwrap();
    writer.finish().unwrap().into_inner()
}

#[test]
fn decompresses_the_config_entry_out_of_a_real_zip_archive() {
    let literal = b"{\"msInfo\":{}}";
    let archive = zip_with_entry("sps0.LoxCC", &config_payload(literal));

    let raw = loxone_core::compress::decompress_archive(&archive).unwrap();
    assert_eq!(raw, literal);
}

#[test]
fn missing_config_entry_is_reported() {
    let archive = zip_with_entry("not-the-right-name.bin", b"whatever");
    let error = loxone_core::compress::decompress_archive(&archive).unwrap_err();
    assert!(matches!(error, Error::MissingConfigEntry));
}
