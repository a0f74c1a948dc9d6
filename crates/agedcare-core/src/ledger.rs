use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::ProviderRecord;
use crate::traits::Ledger;

/// Append-only CSV output file.
///
/// The header is written only when the file is new (or empty), so re-runs
/// keep appending below the rows of earlier runs. A row left half-written by
/// a crash is cut off on open, before anything else is appended.
pub struct CsvLedger {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLedger {
    /// Open (or create) the CSV at `path` for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let needs_header = trim_torn_tail(&path)? == 0;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(ProviderRecord::HEADERS)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
            tracing::info!("Created {}", path.display());
        } else {
            tracing::info!("Appending to existing {}", path.display());
        }

        Ok(Self { path, writer })
    }
}

/// Truncate `path` back to its last complete line and return the kept length.
///
/// Every append ends in `\n`, so anything after the last newline is a row the
/// process died writing. Its location was never marked complete and will be
/// crawled again.
fn trim_torn_tail(path: &Path) -> Result<u64, AppError> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    if content.last().is_none_or(|&b| b == b'\n') {
        return Ok(content.len() as u64);
    }

    let keep = content.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    tracing::warn!(
        dropped_bytes = content.len() - keep,
        "Discarding partial last row of {}",
        path.display()
    );
    file.set_len(keep as u64)?;
    file.sync_data()?;
    Ok(keep as u64)
}

impl Ledger for CsvLedger {
    fn append(&mut self, record: &ProviderRecord) -> Result<(), AppError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn read_all_telephones(&self) -> Result<HashSet<String>, AppError> {
        read_telephones(&self.path)
    }
}

/// Read the `telephone` column of an existing ledger file.
///
/// A missing file yields an empty set. Rows that fail to parse are skipped;
/// I/O failures are returned.
pub fn read_telephones(path: &Path) -> Result<HashSet<String>, AppError> {
    let mut telephones = HashSet::new();
    if !path.exists() {
        return Ok(telephones);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let Some(column) = reader.headers()?.iter().position(|h| h == "telephone") else {
        tracing::warn!(
            "{} has no telephone column; nothing to deduplicate against",
            path.display()
        );
        return Ok(telephones);
    };

    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(row) => {
                if let Some(tel) = row.get(column).filter(|t| !t.is_empty()) {
                    telephones.insert(tel.to_string());
                }
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(row = line + 2, error = %e, "Skipping unreadable ledger row");
            }
        }
    }

    tracing::info!(
        "Loaded {} existing telephone numbers from {}",
        telephones.len(),
        path.display()
    );
    Ok(telephones)
}
