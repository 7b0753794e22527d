//! Intake WAL Writer/Reader
//!
//! Business-layer WAL operations for match requests, built on top of wal_v2.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use super::IntakeKind;
use crate::error::IntakeError;
use crate::models::MatchRequest;
use crate::wal_v2::{WalReaderV2, WalWriterV2};

/// What a scan of an existing WAL file found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalTail {
    pub entries: u64,
    /// Oldest seq_id still in the file; `next_seq` when empty
    pub first_seq: u64,
    pub next_seq: u64,
    pub last_epoch: u32,
    /// Bytes covered by complete, checksummed entries
    pub valid_len: u64,
}

// ============================================================
// INTAKE WAL WRITER
// ============================================================

pub struct IntakeWalWriter {
    writer: WalWriterV2<BufWriter<File>>,
    first_seq: u64,
}

impl IntakeWalWriter {
    /// Open `path` for appending, creating it if needed
    ///
    /// An existing file is scanned first: the sequence continues after its
    /// last complete entry, a torn tail left by a crash is cut off, and the
    /// epoch is bumped so entries from this process are distinguishable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tail = if path.exists() {
            IntakeWalReader::open(path)?.scan()?
        } else {
            WalTail {
                first_seq: 1,
                next_seq: 1,
                ..WalTail::default()
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if file.metadata()?.len() > tail.valid_len {
            warn!(
                path = %path.display(),
                valid_len = tail.valid_len,
                "Truncating torn intake WAL tail"
            );
            file.set_len(tail.valid_len)?;
        }

        let epoch = tail.last_epoch + 1;
        info!(
            path = %path.display(),
            entries = tail.entries,
            next_seq = tail.next_seq,
            epoch,
            "Intake WAL opened"
        );

        Ok(Self {
            writer: WalWriterV2::new(BufWriter::new(file), epoch, tail.next_seq),
            first_seq: tail.first_seq,
        })
    }

    /// Append a request; returns the assigned seq_id
    pub fn append(&mut self, kind: IntakeKind, request: &MatchRequest) -> Result<u64, IntakeError> {
        let payload = bincode::serialize(request)?;
        Ok(self.writer.write_entry(kind.into(), &payload)?)
    }

    pub fn flush(&mut self) -> Result<(), IntakeError> {
        Ok(self.writer.flush()?)
    }

    pub fn next_seq(&self) -> u64 {
        self.writer.next_seq()
    }

    pub fn epoch(&self) -> u32 {
        self.writer.epoch()
    }

    /// Oldest seq_id still on disk
    pub fn first_seq(&self) -> u64 {
        self.first_seq
    }

    /// Rewrite `path` keeping only frames with `seq_id >= keep_from`
    ///
    /// Survivors are copied verbatim into `<path>.compact`, synced, and the
    /// copy is renamed over the log. The append handle is opened on the copy
    /// before the rename, so appends continue on the compacted file with the
    /// same epoch and sequence. On error the original file is untouched.
    pub fn compact(&mut self, path: &Path, keep_from: u64) -> Result<u64, IntakeError> {
        self.writer.flush()?;

        let tmp = path.with_extension("wal.compact");
        let mut kept = 0u64;
        let mut first_kept = None;
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            let frames = WalReaderV2::new(BufReader::new(File::open(path)?));
            for frame in frames {
                let frame = frame.map_err(corrupted)?;
                if frame.header.seq_id < keep_from {
                    continue;
                }
                first_kept.get_or_insert(frame.header.seq_id);
                out.write_all(&frame.header.encode())?;
                out.write_all(&frame.payload)?;
                kept += 1;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        let file = OpenOptions::new().append(true).open(&tmp)?;
        std::fs::rename(&tmp, path)?;

        let (epoch, next_seq) = (self.writer.epoch(), self.writer.next_seq());
        let released = first_kept.unwrap_or(next_seq).saturating_sub(self.first_seq);
        self.writer = WalWriterV2::new(BufWriter::new(file), epoch, next_seq);
        self.first_seq = first_kept.unwrap_or(next_seq);

        info!(
            path = %path.display(),
            kept,
            released,
            first_seq = self.first_seq,
            "Intake WAL compacted"
        );
        Ok(kept)
    }
}

// ============================================================
// INTAKE WAL READER
// ============================================================

pub struct IntakeWalReader {
    reader: WalReaderV2<BufReader<File>>,
}

impl IntakeWalReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let file = File::open(path)?;
        Ok(Self {
            reader: WalReaderV2::new(BufReader::new(file)),
        })
    }

    /// Replay entries with `seq_id >= from_seq`
    ///
    /// The callback returns `false` to stop early.
    pub fn replay<F>(&mut self, from_seq: u64, mut callback: F) -> Result<(), IntakeError>
    where
        F: FnMut(u64, IntakeKind, MatchRequest) -> Result<bool, IntakeError>,
    {
        while let Some(entry) = self.reader.read_frame().map_err(corrupted)? {
            if entry.header.seq_id < from_seq {
                continue;
            }
            let kind = IntakeKind::from(entry.header.entry_type);
            let request: MatchRequest = bincode::deserialize(&entry.payload)?;
            if !callback(entry.header.seq_id, kind, request)? {
                break;
            }
        }
        Ok(())
    }

    /// Walk the whole file and report where a writer should resume
    pub fn scan(&mut self) -> Result<WalTail, IntakeError> {
        let mut tail = WalTail {
            next_seq: 1,
            ..WalTail::default()
        };
        while let Some(entry) = self.reader.read_frame().map_err(corrupted)? {
            if tail.entries == 0 {
                tail.first_seq = entry.header.seq_id;
            }
            tail.entries += 1;
            tail.next_seq = entry.header.seq_id + 1;
            tail.last_epoch = entry.header.epoch;
            tail.valid_len += entry.header.frame_len();
        }
        if tail.entries == 0 {
            tail.first_seq = tail.next_seq;
        }
        Ok(tail)
    }
}

fn corrupted(e: std::io::Error) -> IntakeError {
    if e.kind() == std::io::ErrorKind::InvalidData {
        IntakeError::Corrupted(e.to_string())
    } else {
        IntakeError::Io(e)
    }
}
