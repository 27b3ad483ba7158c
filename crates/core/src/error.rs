use thiserror::Error;

/// Everything that can go wrong inside the CORE: framing, crypto,
/// decompression, and structure-document parsing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unknown frame identifier: {0}")]
    UnknownIdentifier(u8),

    #[error("value-state body size {0} is not a multiple of 24")]
    MisalignedValueStates(usize),

    #[error("invalid utf-8 in text frame")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("rsa key error: {0}")]
    RsaKey(#[from] rsa::pkcs8::spki::Error),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("archive magic mismatch: expected 0xaabbccee, found {0:#010x}")]
    BadMagic(u32),

    #[error("decompressed length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: u32, actual: u32 },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive is missing the sps0.LoxCC entry")]
    MissingConfigEntry,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("structure document is missing field: {0}")]
    MissingField(&'static str),

    #[error("identifier {0} is already registered")]
    DuplicateIdentifier(String),
}

pub type Result<T> = std::result::Result<T, Error>;
