//! Line-delimited JSON spool of chunk records.
//!
//! A transient handoff written between chunking and embedding — one
//! JSON object per line — and the input format of the `load` command.
//! Not a long-term storage format.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::ChunkRecord;

/// Write chunk records to `path`, one JSON object per line. Any
/// existing file is replaced. Parent directories are created as needed.
pub fn write_records(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create spool file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

/// Read chunk records back from a spool file. Blank lines are skipped;
/// a malformed line is an error (the spool is machine-written).
pub fn read_records(path: &Path) -> Result<Vec<ChunkRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open spool file: {}", path.display()))?;

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ChunkRecord = serde_json::from_str(&line)
            .with_context(|| format!("Malformed spool line: {}", line))?;
        records.push(record);
    }

    Ok(records)
}
