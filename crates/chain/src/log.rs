//! Chain log: append, verified iteration, verification
//!
//! On-disk layout is a single file of frames, each frame a little-endian
//! u32 length followed by the block's canonical bincode bytes:
//!
//! ```text
//! [len0][block0][len1][block1]...[lenN][blockN][possible torn tail]
//! ```
//!
//! The writer holds an in-process mutex plus an on-disk lock file for the
//! duration of one append and fsyncs before returning. Readers never lock:
//! they scan forward, verify each hash link, and treat an incomplete
//! trailing frame as end-of-log so they can run concurrently with a writer.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tracing::{debug, warn};

use chronicle_core::ChainOptions;

use crate::block::{sha256, Block, GENESIS_PREV_HASH, MAX_FRAME_LEN};
use crate::codec::Codec;
use crate::error::ChainError;

// ============================================================================
// Append lock
// ============================================================================

/// Cross-process append lock, held for the duration of one append
///
/// Implemented as a sentinel file created with `create_new`; the holder's
/// pid is written into it for post-mortem inspection. Removed on drop.
struct AppendLock {
    path: PathBuf,
}

impl AppendLock {
    fn acquire(path: &Path, retries: u32, retry_delay_ms: u64) -> Result<Self, ChainError> {
        for attempt in 0..=retries {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(AppendLock {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt < retries {
                        std::thread::sleep(Duration::from_millis(retry_delay_ms));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ChainError::LockBusy {
            path: path.display().to_string(),
        })
    }
}

impl Drop for AppendLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ============================================================================
// Chain log
// ============================================================================

/// Cached tail position so appends do not rescan the whole file
#[derive(Debug, Clone)]
struct Tail {
    next_sequence: u64,
    tail_hash: [u8; 32],
    end_offset: u64,
}

impl Default for Tail {
    fn default() -> Self {
        Tail {
            next_sequence: 0,
            tail_hash: GENESIS_PREV_HASH,
            end_offset: 0,
        }
    }
}

/// Append-only, hash-linked, per-block-compressed event log
pub struct ChainLog {
    path: PathBuf,
    lock_path: PathBuf,
    options: ChainOptions,
    codec: Codec,
    tail: Mutex<Tail>,
}

impl ChainLog {
    /// Open a chain log at `path` with default options
    ///
    /// No file is created until the first append; a missing file reads as an
    /// empty chain.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with(path, ChainOptions::default())
    }

    /// Open a chain log with explicit options
    pub fn open_with(path: impl Into<PathBuf>, options: ChainOptions) -> Self {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        ChainLog {
            path,
            lock_path,
            options,
            codec: Codec::Zstd,
            tail: Mutex::new(Tail::default()),
        }
    }

    /// Path of the underlying chain file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Use a different codec for subsequently appended blocks
    ///
    /// Existing blocks are unaffected; the codec id travels in each block.
    pub fn set_codec(&mut self, codec: Codec) {
        self.codec = codec;
    }

    /// Append one payload as a new block, returning its sequence number
    ///
    /// Holds the append lock for the duration, truncates any torn tail left
    /// by a crashed writer, writes the new frame, and fsyncs before
    /// returning. On any error the in-progress block is not committed. A
    /// body larger than one frame can hold fails with
    /// [`ChainError::FrameTooLarge`] before anything touches the file, so a
    /// successful append always yields a block readers can decode.
    pub fn append(&self, payload: &[u8]) -> Result<u64, ChainError> {
        let mut tail = self.tail.lock();
        let _lock = AppendLock::acquire(
            &self.lock_path,
            self.options.lock_retries,
            self.options.lock_retry_delay_ms,
        )?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;

        self.refresh_tail(&mut tail, &mut file)?;

        let block = Block::seal(
            tail.next_sequence,
            tail.tail_hash,
            payload,
            self.codec,
            self.options.compression_level,
        )?;
        let body = block.canonical_bytes()?;
        if body.len() as u64 > MAX_FRAME_LEN as u64 {
            return Err(ChainError::FrameTooLarge {
                length: body.len() as u64,
            });
        }

        file.seek(SeekFrom::Start(tail.end_offset))?;
        file.write_u32::<LittleEndian>(body.len() as u32)?;
        file.write_all(&body)?;
        file.sync_all()?;

        debug!(
            sequence = block.sequence,
            bytes = body.len(),
            "appended chain block"
        );

        tail.tail_hash = sha256(&body);
        tail.end_offset += 4 + body.len() as u64;
        tail.next_sequence += 1;
        Ok(block.sequence)
    }

    /// Bring the cached tail up to date with the file, truncating a torn
    /// trailing frame left by a crashed writer
    fn refresh_tail(&self, tail: &mut Tail, file: &mut File) -> Result<(), ChainError> {
        let file_len = file.metadata()?.len();
        if file_len < tail.end_offset {
            // File shrank underneath us (manual truncation); rescan fully.
            *tail = Tail::default();
        }
        if file_len == tail.end_offset {
            return Ok(());
        }

        file.seek(SeekFrom::Start(tail.end_offset))?;
        {
            let mut reader = BufReader::new(&mut *file);
            let mut offset = tail.end_offset;

            loop {
                let len = match reader.read_u32::<LittleEndian>() {
                    Ok(len) => len,
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                };
                if len == 0 || len > MAX_FRAME_LEN {
                    return Err(ChainError::MalformedFrame { offset });
                }
                if offset + 4 + len as u64 > file_len {
                    // Torn frame at the end of the file.
                    break;
                }
                let mut body = vec![0u8; len as usize];
                reader.read_exact(&mut body)?;
                let block = Block::from_canonical_bytes(&body)
                    .map_err(|_| ChainError::MalformedFrame { offset })?;
                if block.sequence != tail.next_sequence || block.prev_hash != tail.tail_hash {
                    return Err(ChainError::Integrity {
                        sequence: tail.next_sequence,
                        reason: "tail refresh found a broken link".to_string(),
                    });
                }
                tail.tail_hash = sha256(&body);
                tail.next_sequence += 1;
                offset += 4 + len as u64;
                tail.end_offset = offset;
            }
        }

        if tail.end_offset < file_len {
            warn!(
                path = %self.path.display(),
                from = file_len,
                to = tail.end_offset,
                "truncating torn tail before append"
            );
            file.set_len(tail.end_offset)?;
        }
        Ok(())
    }

    /// Verified iteration over every block payload
    pub fn iter(&self) -> Result<ChainIter, ChainError> {
        self.iter_range(0, u64::MAX)
    }

    /// Verified iteration over payloads with `from <= sequence <= to`
    ///
    /// The walk always starts at genesis — hash links can only be checked
    /// from the start — but only blocks inside the range are yielded. The
    /// iterator fails with [`ChainError::Integrity`] at the first broken
    /// link and yields nothing past that point.
    pub fn iter_range(&self, from: u64, to: u64) -> Result<ChainIter, ChainError> {
        let reader = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(ChainIter {
            reader,
            offset: 0,
            expect_sequence: 0,
            prev_hash: GENESIS_PREV_HASH,
            from,
            to,
            done: false,
        })
    }

    /// Walk the whole chain and report integrity
    ///
    /// An integrity break is a reported outcome, not an error: the result
    /// carries the break point and the walk stops there. Only I/O failures
    /// surface as `Err`.
    pub fn verify(&self) -> Result<VerifyReport, ChainError> {
        let mut report = VerifyReport {
            ok: true,
            blocks: 0,
            break_at: None,
            detail: None,
        };
        let iter = self.iter()?;
        for item in iter {
            match item {
                Ok(_) => report.blocks += 1,
                Err(ChainError::Integrity { sequence, reason }) => {
                    report.ok = false;
                    report.break_at = Some(sequence);
                    report.detail = Some(reason);
                    break;
                }
                Err(ChainError::MalformedFrame { offset }) => {
                    report.ok = false;
                    report.break_at = Some(report.blocks);
                    report.detail = Some(format!("undecodable frame at offset {}", offset));
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Number of verifiably complete blocks currently readable
    pub fn len(&self) -> Result<u64, ChainError> {
        Ok(self.verify()?.blocks)
    }

    /// True when the chain has no complete blocks
    pub fn is_empty(&self) -> Result<bool, ChainError> {
        Ok(self.len()? == 0)
    }
}

/// Outcome of a full-chain verification walk
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Whether every link and payload hash checked out
    pub ok: bool,
    /// Blocks successfully verified (the full chain length when `ok`)
    pub blocks: u64,
    /// Sequence number of the first offending block, if any
    pub break_at: Option<u64>,
    /// What failed to line up, if anything
    pub detail: Option<String>,
}

impl VerifyReport {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        match self.break_at {
            None => format!("chain ok: {} blocks verified", self.blocks),
            Some(seq) => format!(
                "chain BROKEN at sequence {}: {} ({} blocks verified before the break)",
                seq,
                self.detail.as_deref().unwrap_or("integrity failure"),
                self.blocks
            ),
        }
    }
}

// ============================================================================
// Iterator
// ============================================================================

/// Lazy, verified forward iterator over decoded block payloads
///
/// Yields `(sequence, payload_bytes)` for blocks inside the requested
/// range. Restartable: create a fresh iterator to walk again.
pub struct ChainIter {
    reader: Option<BufReader<File>>,
    offset: u64,
    expect_sequence: u64,
    prev_hash: [u8; 32],
    from: u64,
    to: u64,
    done: bool,
}

impl ChainIter {
    /// Read the next complete frame, or `None` at end-of-log / torn tail
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ChainError> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(None),
        };

        let len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(ChainError::Integrity {
                sequence: self.expect_sequence,
                reason: format!("implausible frame length {}", len),
            });
        }
        let mut body = vec![0u8; len as usize];
        let mut filled = 0;
        while filled < body.len() {
            match reader.read(&mut body[filled..])? {
                // A writer may be mid-append; stop at the last complete block.
                0 => return Ok(None),
                n => filled += n,
            }
        }
        self.offset += 4 + len as u64;
        Ok(Some(body))
    }
}

impl Iterator for ChainIter {
    type Item = Result<(u64, Vec<u8>), ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let body = match self.next_frame() {
                Ok(Some(body)) => body,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            let offset = self.offset - 4 - body.len() as u64;
            let block = match Block::from_canonical_bytes(&body) {
                Ok(block) => block,
                Err(_) => {
                    self.done = true;
                    return Some(Err(ChainError::MalformedFrame { offset }));
                }
            };

            if block.sequence != self.expect_sequence {
                self.done = true;
                return Some(Err(ChainError::Integrity {
                    sequence: self.expect_sequence,
                    reason: format!(
                        "sequence gap: expected {}, found {}",
                        self.expect_sequence, block.sequence
                    ),
                }));
            }
            if block.prev_hash != self.prev_hash {
                self.done = true;
                return Some(Err(ChainError::Integrity {
                    sequence: block.sequence,
                    reason: "prev_hash does not match preceding block".to_string(),
                }));
            }

            let payload = match block.open_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            self.prev_hash = sha256(&body);
            let sequence = block.sequence;
            self.expect_sequence += 1;

            if sequence > self.to {
                self.done = true;
                return None;
            }
            if sequence >= self.from {
                return Some(Ok((sequence, payload)));
            }
            // Before the requested range: keep verifying, yield nothing.
        }
    }
}

fn lock_path_for(chain_path: &Path) -> PathBuf {
    let mut name = chain_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "chain".into());
    name.push(".lock");
    chain_path.with_file_name(name)
}
