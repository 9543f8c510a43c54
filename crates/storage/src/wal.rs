// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage
//!
//! Each record is framed as `[len: u32 BE][crc32: u32 BE][payload]`. The
//! offset of a record is the byte position of its header, so a reader can
//! recover exactly one record from an offset without knowing where the
//! next one starts.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, warn};

/// Bytes in a record header (length + checksum)
const HEADER_LEN: usize = 8;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: i64, reason: String },
    #[error("no entry at offset {0}")]
    NoEntry(i64),
    #[error("record of {0} bytes exceeds the maximum record size")]
    RecordTooLarge(usize),
}

/// A record read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl WalEntry {
    /// Offset of the record that follows this one
    pub fn next_offset(&self) -> i64 {
        self.offset + (HEADER_LEN + self.payload.len()) as i64
    }
}

/// Append-only, checksummed record log
pub struct Wal {
    path: PathBuf,
    writer: Mutex<File>,
    reader: Mutex<File>,
    end: AtomicI64,
}

impl Wal {
    /// Open or create a WAL at the given path.
    ///
    /// A partially written record at the end of the file (a crash during
    /// append) is truncated away. A complete record whose checksum does not
    /// match is reported as corruption, as is a record whose length runs
    /// past the end of the file while intact records still follow it.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let end = recover(&mut file, path)?;
        drop(file);

        let writer = OpenOptions::new().append(true).open(path)?;
        let reader = File::open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            end: AtomicI64::new(end),
        })
    }

    /// Append one record and return the offset it was written at
    pub fn append(&self, payload: &[u8]) -> Result<i64, WalError> {
        let frame = encode_frame(payload)?;

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let offset = self.end.load(Ordering::Acquire);

        if let Err(e) = write_frame(&mut writer, &frame) {
            // Drop whatever part of the frame made it to disk so the next
            // append still lands at `offset`.
            if let Err(truncate_err) = writer.set_len(offset as u64) {
                warn!(
                    path = %self.path.display(),
                    offset,
                    error = %truncate_err,
                    "failed to roll back partial WAL append"
                );
            }
            return Err(e.into());
        }

        self.end
            .store(offset + frame.len() as i64, Ordering::Release);
        Ok(offset)
    }

    /// Read the payload of the record starting at `offset`
    pub fn read(&self, offset: i64) -> Result<Vec<u8>, WalError> {
        self.read_entry(offset)?
            .map(|entry| entry.payload)
            .ok_or(WalError::NoEntry(offset))
    }

    /// Read the record starting at `offset`; `None` once past the last record
    pub fn read_entry(&self, offset: i64) -> Result<Option<WalEntry>, WalError> {
        if offset < 0 {
            return Err(WalError::NoEntry(offset));
        }
        let end = self.end.load(Ordering::Acquire);
        if offset >= end {
            return Ok(None);
        }

        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        reader.seek(SeekFrom::Start(offset as u64))?;

        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        let (len, crc) = parse_header(&header);

        if offset + (HEADER_LEN + len) as i64 > end {
            return Err(WalError::Corrupt {
                offset,
                reason: format!("record length {} overruns end of log", len),
            });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        verify(offset, crc, &payload)?;

        Ok(Some(WalEntry { offset, payload }))
    }

    /// Iterate every record from the start of the log
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            wal: self,
            next: Some(0),
        }
    }

    /// Size of the log in bytes (the offset the next append will use)
    pub fn len(&self) -> i64 {
        self.end.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over WAL records in append order
pub struct Entries<'a> {
    wal: &'a Wal,
    next: Option<i64>,
}

impl Iterator for Entries<'_> {
    type Item = Result<WalEntry, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        match self.wal.read_entry(offset) {
            Ok(Some(entry)) => {
                self.next = Some(entry.next_offset());
                Some(Ok(entry))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, WalError> {
    let len = u32::try_from(payload.len()).map_err(|_| WalError::RecordTooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn write_frame(file: &mut File, frame: &[u8]) -> io::Result<()> {
    file.write_all(frame)?;
    file.sync_data()
}

fn parse_header(header: &[u8; HEADER_LEN]) -> (usize, u32) {
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    (len, crc)
}

fn verify(offset: i64, expected: u32, payload: &[u8]) -> Result<(), WalError> {
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(WalError::Corrupt {
            offset,
            reason: format!("checksum mismatch (expected {expected:08x}, got {actual:08x})"),
        });
    }
    Ok(())
}

/// Start of the first complete, non-empty frame with a matching checksum
fn find_frame(bytes: &[u8]) -> Option<usize> {
    (0..bytes.len()).find(|&at| {
        let Some((header, body)) = bytes[at..].split_first_chunk::<HEADER_LEN>() else {
            return false;
        };
        let (len, crc) = parse_header(header);
        len > 0 && len <= body.len() && crc32fast::hash(&body[..len]) == crc
    })
}

/// Scan every frame, truncate a torn tail, and return the end of the valid log
fn recover(file: &mut File, path: &Path) -> Result<i64, WalError> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(&mut *file);
    let mut pos: u64 = 0;

    while pos < file_len {
        if file_len - pos < HEADER_LEN as u64 {
            break;
        }
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        let (len, crc) = parse_header(&header);

        if file_len - pos - (HEADER_LEN as u64) < len as u64 {
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest)?;
            if let Some(at) = find_frame(&rest) {
                let next = pos + (HEADER_LEN + at) as u64;
                error!(
                    path = %path.display(),
                    offset = pos,
                    next_record = next,
                    remaining_bytes = file_len - pos,
                    "WAL record length overruns the log but later records are intact"
                );
                return Err(WalError::Corrupt {
                    offset: pos as i64,
                    reason: format!(
                        "record length {len} overruns end of log, \
                         but a complete record starts at offset {next}"
                    ),
                });
            }
            break;
        }
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        verify(pos as i64, crc, &payload)?;

        pos += (HEADER_LEN + len) as u64;
    }

    if pos < file_len {
        warn!(
            path = %path.display(),
            valid_bytes = pos,
            torn_bytes = file_len - pos,
            "truncating partially written record at end of WAL"
        );
        drop(reader);
        file.set_len(pos)?;
        file.sync_all()?;
    }

    Ok(pos as i64)
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
