//! Offline archive decoding: turn a previously retrieved `sps0.LoxCC`
//! archive into the raw `LoxAPP3.json` it contains, without opening a
//! connection. Retrieving the archive itself (the Python reference does
//! this over FTP) is out of scope — no FTP crate is grounded anywhere in
//! this stack, so the operator supplies the archive file directly.

use std::path::Path;

use crate::error::Result;

pub async fn run(archive: &Path, destination: &Path) -> Result<()> {
    let bytes = tokio::fs::read(archive).await?;
    let raw = loxone_core::compress::decompress_archive(&bytes)?;
    tokio::fs::write(destination, raw).await?;
    tracing::info!(archive = %archive.display(), destination = %destination.display(), "archive decompressed");
    Ok(())
}
