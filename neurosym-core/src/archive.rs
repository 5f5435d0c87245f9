//! # Program Archive
//!
//! Every generated program is written to disk before it runs, so a failed
//! or surprising cycle can be inspected afterwards. The archive is
//! append-only: files are created with create-new semantics and never
//! rewritten.
//!
//! Layout:
//! ```text
//! prolog_programs/
//!   problem_20250101_000000.pl
//!   problem_20250101_000000_1.pl   <- second program in the same second
//!   archive.jsonl                  <- one ArchiveRecord per line
//! ```

use crate::config::ArchiveConfig;
use crate::error::{self, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Journal file name inside the archive directory
pub const JOURNAL_FILE: &str = "archive.jsonl";

/// Upper bound on `_N` suffixes tried for a single timestamp
const MAX_COLLISIONS: usize = 1000;

/// Source of archive timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Where and when a program was archived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub timestamp: NaiveDateTime,
    pub path: PathBuf,
}

/// One line of `archive.jsonl`
#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    #[serde(flatten)]
    record: &'a ArchiveRecord,
    statement: &'a str,
}

/// Writes generated programs to timestamped files
pub struct Archiver<C: Clock = SystemClock> {
    dir: PathBuf,
    extension: String,
    journal: bool,
    clock: C,
}

impl Archiver<SystemClock> {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            extension: config.extension.clone(),
            journal: config.journal,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> Archiver<C> {
    /// Swap the time source (tests use `FixedClock`)
    pub fn with_clock<D: Clock>(self, clock: D) -> Archiver<D> {
        Archiver {
            dir: self.dir,
            extension: self.extension,
            journal: self.journal,
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    /// `problem_<YYYYMMDD_HHMMSS>[_N].<ext>`; `attempt` 0 has no suffix
    pub fn file_name(&self, timestamp: &NaiveDateTime, attempt: usize) -> String {
        let stamp = timestamp.format("%Y%m%d_%H%M%S");
        if attempt == 0 {
            format!("problem_{}.{}", stamp, self.extension)
        } else {
            format!("problem_{}_{}.{}", stamp, attempt, self.extension)
        }
    }

    /// Write `code` to a new file and return its record.
    ///
    /// `statement` only goes to the journal; the program file holds exactly
    /// the bytes of `code`.
    pub fn archive(&self, statement: &str, code: &str) -> Result<ArchiveRecord> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| error::archive_failed(&self.dir, e).with_operation("archive::create_dir"))?;

        let timestamp = self.clock.now();
        for attempt in 0..MAX_COLLISIONS {
            let path = self.dir.join(self.file_name(&timestamp, attempt));

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %path.display(), "archive name taken, trying next suffix");
                    continue;
                }
                Err(e) => return Err(error::archive_failed(&path, e).with_operation("archive::open")),
            };

            if let Err(e) = file.write_all(code.as_bytes()).and_then(|_| file.sync_all()) {
                drop(file);
                return Err(discard_partial(&path, e));
            }

            let record = ArchiveRecord { timestamp, path };
            if self.journal {
                if let Err(e) = self.append_journal(&record, statement) {
                    tracing::warn!("failed to append archive journal: {}", e);
                }
            }
            tracing::info!(path = %record.path.display(), bytes = code.len(), "program archived");
            return Ok(record);
        }

        Err(crate::Error::archive_failed(format!(
            "more than {} programs archived at {}",
            MAX_COLLISIONS, timestamp
        ))
        .with_operation("archive::archive"))
    }

    fn append_journal(&self, record: &ArchiveRecord, statement: &str) -> Result<()> {
        let path = self.journal_path();
        let mut line = serde_json::to_string(&JournalEntry { record, statement }).map_err(|e| {
            crate::Error::new(crate::ErrorKind::SerializationFailed, e.to_string()).set_source(e)
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| error::archive_failed(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| error::archive_failed(&path, e))?;
        Ok(())
    }

    /// Records from the journal, oldest first. Missing journal is empty.
    pub fn read_journal(&self) -> Result<Vec<ArchiveRecord>> {
        let path = self.journal_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(crate::Error::from(e).with_operation("archive::read_journal")),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<ArchiveRecord>(line).map_err(|e| {
                    crate::Error::parse_failed(format!("bad journal line: {}", e))
                        .with_context("path", path.display().to_string())
                        .set_source(e)
                })
            })
            .collect()
    }
}

/// Remove a program file whose write failed, so the name is free again
fn discard_partial(path: &Path, err: std::io::Error) -> crate::Error {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), "cannot remove partial program: {}", e);
    }
    error::archive_failed(path, err).with_operation("archive::write")
}
