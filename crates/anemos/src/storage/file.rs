//! Column file format.
//!
//! Each table is persisted as a single append-only column file with the
//! `.acol` extension. Appends add a self-contained chunk; a tail delete
//! truncates at a chunk boundary, so the update protocol never rewrites the
//! untouched head of a table.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  File Header (16 bytes)                                      │
//! │  - Magic: "ACOL" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Flags: u16 (2 bytes)                                      │
//! │  - Column Count: u32 (4 bytes)                               │
//! │  - Reserved: 4 bytes                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Chunk (repeated per append)                                 │
//! │  - Row Count: u32                                            │
//! │  - CRC32 of row count + payload: u32                         │
//! │  - Timestamps: i64 × rows                                    │
//! │  - Column 0..n: f64 × rows each                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::config::SyncMode;
use crate::error::{AnemosError, Result};
use crate::storage::frame::TableFrame;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for the column file header: "ACOL"
pub const COLUMN_MAGIC: [u8; 4] = *b"ACOL";

/// Current column file format version.
pub const COLUMN_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Chunk header size in bytes (row count + CRC).
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Column file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFileHeader {
    /// Magic bytes.
    pub magic: [u8; 4],
    /// Format version.
    pub version: u16,
    /// Reserved flag bits.
    pub flags: u16,
    /// Number of value columns (excluding timestamps).
    pub column_count: u32,
}

impl ColumnFileHeader {
    /// Creates a header for a file with `column_count` value columns.
    pub fn new(column_count: u32) -> Self {
        Self {
            magic: COLUMN_MAGIC,
            version: COLUMN_VERSION,
            flags: 0,
            column_count,
        }
    }

    /// Writes the header to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.column_count.to_le_bytes())?;
        writer.write_all(&[0u8; 4])?;
        Ok(())
    }

    /// Reads and validates a header from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != COLUMN_MAGIC {
            return Err(AnemosError::InvalidMagic(magic));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != COLUMN_VERSION {
            return Err(AnemosError::UnsupportedVersion(version));
        }
        Ok(Self {
            magic,
            version,
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            column_count: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkInfo {
    offset: u64,
    first_row: usize,
    rows: usize,
}

/// An open column file and its in-memory chunk index.
#[derive(Debug)]
pub struct ColumnFile {
    path: PathBuf,
    column_count: usize,
    chunks: Vec<ChunkInfo>,
    row_count: usize,
    end_offset: u64,
    sync_mode: SyncMode,
}

impl ColumnFile {
    /// Creates (or truncates) a column file holding only a header.
    pub fn create(path: impl AsRef<Path>, column_count: usize, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = ColumnFileHeader::new(u32::try_from(column_count).map_err(|_| {
            AnemosError::Schema(format!("too many columns: {}", column_count))
        })?);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);
        header.write_to(&mut writer)?;
        writer.flush()?;
        sync_file(writer.get_ref(), sync_mode)?;

        Ok(Self {
            path,
            column_count,
            chunks: Vec::new(),
            row_count: 0,
            end_offset: HEADER_SIZE as u64,
            sync_mode,
        })
    }

    /// Opens an existing column file and indexes its chunks.
    ///
    /// A torn trailing chunk left by an interrupted append is discarded.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = ColumnFileHeader::read_from(&mut reader)?;
        let column_count = header.column_count as usize;

        let mut chunks = Vec::new();
        let mut row_count = 0usize;
        let mut offset = HEADER_SIZE as u64;
        let mut torn = false;
        while offset < file_len {
            if offset + CHUNK_HEADER_SIZE as u64 > file_len {
                torn = true;
                break;
            }
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            let rows = u32::from_le_bytes(buf) as usize;
            let end = offset + (CHUNK_HEADER_SIZE + payload_len(rows, column_count)) as u64;
            if end > file_len {
                torn = true;
                break;
            }
            chunks.push(ChunkInfo {
                offset,
                first_row: row_count,
                rows,
            });
            row_count += rows;
            reader.seek(SeekFrom::Start(end))?;
            offset = end;
        }
        drop(reader);

        if torn {
            warn!(
                "Discarding torn chunk at offset {} in {}",
                offset,
                path.display()
            );
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(offset)?;
            sync_file(&file, sync_mode)?;
        }

        Ok(Self {
            path,
            column_count,
            chunks,
            row_count,
            end_offset: offset,
            sync_mode,
        })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of value columns.
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Appends `frame` as a new chunk.
    pub fn append(&mut self, frame: &TableFrame) -> Result<()> {
        if frame.column_count() != self.column_count {
            return Err(AnemosError::Schema(format!(
                "frame has {} columns, file has {}",
                frame.column_count(),
                self.column_count
            )));
        }
        if frame.is_empty() {
            return Ok(());
        }

        let bytes = encode_chunk(frame);
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let written = writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(AnemosError::from)
            .and_then(|_| sync_file(writer.get_ref(), self.sync_mode));
        drop(writer);
        if let Err(err) = written {
            // Drop whatever part of the chunk reached the file.
            let truncated = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .and_then(|file| file.set_len(self.end_offset));
            if let Err(truncate_err) = truncated {
                warn!(
                    "Failed to truncate {} to {} bytes after append error: {}",
                    self.path.display(),
                    self.end_offset,
                    truncate_err
                );
            }
            return Err(err);
        }

        self.chunks.push(ChunkInfo {
            offset: self.end_offset,
            first_row: self.row_count,
            rows: frame.len(),
        });
        self.row_count += frame.len();
        self.end_offset += bytes.len() as u64;

        debug!(
            "Appended {} rows to {} ({} chunks)",
            frame.len(),
            self.path.display(),
            self.chunks.len()
        );
        Ok(())
    }

    /// Reads every row, verifying chunk checksums.
    pub fn read_all(&self) -> Result<TableFrame> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        ColumnFileHeader::read_from(&mut reader)?;

        let mut timestamps = Vec::with_capacity(self.row_count);
        let mut columns = vec![Vec::with_capacity(self.row_count); self.column_count];
        for _ in &self.chunks {
            read_chunk_into(&mut reader, self.column_count, &mut timestamps, &mut columns)?;
        }
        TableFrame::from_columns(timestamps, columns)
    }

    /// Removes rows `first..=last`.
    ///
    /// Covering the whole table recreates an empty file; covering a tail
    /// truncates at the containing chunk; anything else rewrites the file.
    pub fn delete_range(&mut self, first: usize, last: usize) -> Result<()> {
        if first > last || last >= self.row_count {
            return Err(AnemosError::Range(format!(
                "row range {}..={} outside table of {} rows",
                first, last, self.row_count
            )));
        }
        if first == 0 && last + 1 == self.row_count {
            *self = Self::create(&self.path, self.column_count, self.sync_mode)?;
            return Ok(());
        }
        if last + 1 == self.row_count {
            return self.truncate_from(first);
        }
        let kept = self.read_all()?.without_range(first, last)?;
        self.rewrite(&kept)
    }

    /// Replaces the file content with `frame` via a temp file and rename.
    pub fn rewrite(&mut self, frame: &TableFrame) -> Result<()> {
        if frame.column_count() != self.column_count {
            return Err(AnemosError::Schema(format!(
                "frame has {} columns, file has {}",
                frame.column_count(),
                self.column_count
            )));
        }
        let tmp_path = self.path.with_extension("acol.tmp");
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            ColumnFileHeader::new(self.column_count as u32).write_to(&mut writer)?;
            if !frame.is_empty() {
                writer.write_all(&encode_chunk(frame))?;
            }
            writer.flush()?;
            sync_file(writer.get_ref(), self.sync_mode)?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir, self.sync_mode)?;
        }

        self.chunks.clear();
        self.end_offset = HEADER_SIZE as u64;
        self.row_count = 0;
        if !frame.is_empty() {
            self.chunks.push(ChunkInfo {
                offset: HEADER_SIZE as u64,
                first_row: 0,
                rows: frame.len(),
            });
            self.row_count = frame.len();
            self.end_offset += (CHUNK_HEADER_SIZE + payload_len(frame.len(), self.column_count)) as u64;
        }
        debug!("Rewrote {} with {} rows", self.path.display(), self.row_count);
        Ok(())
    }

    /// Merges all chunks into one.
    pub fn compact(&mut self) -> Result<()> {
        if self.chunks.len() <= 1 {
            return Ok(());
        }
        let frame = self.read_all()?;
        self.rewrite(&frame)
    }

    fn truncate_from(&mut self, first: usize) -> Result<()> {
        let index = self
            .chunks
            .partition_point(|chunk| chunk.first_row + chunk.rows <= first);
        let chunk = self.chunks.get(index).copied().ok_or_else(|| {
            AnemosError::Range(format!("row {} outside table of {} rows", first, self.row_count))
        })?;

        let keep = first - chunk.first_row;
        let head = if keep > 0 {
            Some(self.read_chunk(&chunk)?.slice(0, keep - 1)?)
        } else {
            None
        };

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(chunk.offset)?;
        sync_file(&file, self.sync_mode)?;
        self.chunks.truncate(index);
        self.row_count = chunk.first_row;
        self.end_offset = chunk.offset;
        debug!(
            "Truncated {} to {} rows",
            self.path.display(),
            self.row_count
        );

        match head {
            Some(head) => self.append(&head),
            None => Ok(()),
        }
    }

    fn read_chunk(&self, chunk: &ChunkInfo) -> Result<TableFrame> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(chunk.offset))?;
        let mut timestamps = Vec::with_capacity(chunk.rows);
        let mut columns = vec![Vec::with_capacity(chunk.rows); self.column_count];
        read_chunk_into(&mut reader, self.column_count, &mut timestamps, &mut columns)?;
        TableFrame::from_columns(timestamps, columns)
    }
}

fn payload_len(rows: usize, column_count: usize) -> usize {
    rows * 8 * (column_count + 1)
}

fn encode_chunk(frame: &TableFrame) -> Vec<u8> {
    let rows = frame.len() as u32;
    let mut payload = Vec::with_capacity(payload_len(frame.len(), frame.column_count()));
    for timestamp in frame.timestamps().iter() {
        payload.extend_from_slice(&timestamp.to_le_bytes());
    }
    for column in frame.columns() {
        for value in column.iter() {
            payload.extend_from_slice(&value.to_le_bytes());
        }
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&rows.to_le_bytes());
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut bytes = Vec::with_capacity(CHUNK_HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&rows.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes
}

fn read_chunk_into<R: Read>(
    reader: &mut R,
    column_count: usize,
    timestamps: &mut Vec<i64>,
    columns: &mut [Vec<f64>],
) -> Result<usize> {
    let mut head = [0u8; CHUNK_HEADER_SIZE];
    reader.read_exact(&mut head)?;
    let rows = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    let expected = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

    let mut payload = vec![0u8; payload_len(rows, column_count)];
    reader.read_exact(&mut payload)?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&head[..4]);
    hasher.update(&payload);
    let actual = hasher.finalize();
    if actual != expected {
        return Err(AnemosError::ChecksumMismatch { expected, actual });
    }

    let mut words = payload.chunks_exact(8).map(|bytes| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        buf
    });
    timestamps.extend(words.by_ref().take(rows).map(i64::from_le_bytes));
    for column in columns.iter_mut() {
        column.extend(words.by_ref().take(rows).map(f64::from_le_bytes));
    }
    Ok(rows)
}

pub(crate) fn sync_file(file: &File, mode: SyncMode) -> Result<()> {
    match mode {
        SyncMode::Fsync => file.sync_all()?,
        SyncMode::Fdatasync => file.sync_data()?,
        SyncMode::None => {}
    }
    Ok(())
}

pub(crate) fn sync_dir(dir: &Path, mode: SyncMode) -> Result<()> {
    if mode != SyncMode::None {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::frame::MISSING;
    use tempfile::TempDir;

    fn frame(start: i64, count: usize) -> TableFrame {
        let timestamps = (0..count).map(|i| start + 60 * i as i64).collect();
        let a = (0..count).map(|i| i as f64).collect();
        let b = (0..count).map(|i| (i as f64) * 0.5).collect();
        TableFrame::from_columns(timestamps, vec![a, b]).unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let header = ColumnFileHeader::new(7);
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(ColumnFileHeader::read_from(&mut buf.as_slice()).unwrap(), header);
    }

    #[test]
    fn test_invalid_magic() {
        let buf = [b'X'; HEADER_SIZE];
        let err = ColumnFileHeader::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, AnemosError::InvalidMagic(_)));
    }

    #[test]
    fn test_append_read_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        file.append(&frame(0, 10)).unwrap();
        file.append(&frame(600, 5)).unwrap();
        assert_eq!(file.chunk_count(), 2);

        let reopened = ColumnFile::open(&path, SyncMode::None).unwrap();
        assert_eq!(reopened.row_count(), 15);
        let all = reopened.read_all().unwrap();
        assert_eq!(all.len(), 15);
        assert_eq!(all.timestamps()[10], 600);
    }

    #[test]
    fn test_missing_values_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 1, SyncMode::None).unwrap();
        let f = TableFrame::from_columns(vec![0, 60], vec![vec![MISSING, 1.0]]).unwrap();
        file.append(&f).unwrap();
        assert_eq!(file.read_all().unwrap(), f);
    }

    #[test]
    fn test_tail_delete_splits_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        file.append(&frame(0, 10)).unwrap();
        file.append(&frame(600, 10)).unwrap();

        file.delete_range(13, 19).unwrap();
        assert_eq!(file.row_count(), 13);
        let all = ColumnFile::open(&path, SyncMode::None).unwrap().read_all().unwrap();
        assert_eq!(all.len(), 13);
        assert_eq!(all.last_timestamp(), Some(600 + 2 * 60));
    }

    #[test]
    fn test_delete_whole_and_middle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        file.append(&frame(0, 10)).unwrap();

        file.delete_range(2, 4).unwrap();
        let all = file.read_all().unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(&all.timestamps()[..3], &[0, 60, 300]);

        file.delete_range(0, 6).unwrap();
        assert_eq!(file.row_count(), 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
        assert!(file.delete_range(0, 0).is_err());
    }

    #[test]
    fn test_torn_chunk_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        file.append(&frame(0, 4)).unwrap();
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(&100u32.to_le_bytes()).unwrap();
            raw.write_all(&[0u8; 20]).unwrap();
        }
        let reopened = ColumnFile::open(&path, SyncMode::None).unwrap();
        assert_eq!(reopened.row_count(), 4);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn test_corrupted_chunk_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        file.append(&frame(0, 4)).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let reopened = ColumnFile::open(&path, SyncMode::None).unwrap();
        let err = reopened.read_all().unwrap_err();
        assert!(matches!(err, AnemosError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_compact_merges_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        for i in 0..5 {
            file.append(&frame(i * 600, 10)).unwrap();
        }
        let before = file.read_all().unwrap();
        file.compact().unwrap();
        assert_eq!(file.chunk_count(), 1);
        assert_eq!(file.read_all().unwrap(), before);
        assert!(!path.with_extension("acol.tmp").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_append_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.acol");
        let mut file = ColumnFile::create(&path, 2, SyncMode::None).unwrap();
        file.append(&frame(0, 4)).unwrap();

        // Writes to /dev/full fail with ENOSPC and it cannot be truncated.
        fs::remove_file(&path).unwrap();
        std::os::unix::fs::symlink("/dev/full", &path).unwrap();
        assert!(file.append(&frame(240, 4)).is_err());
        assert_eq!(file.row_count(), 4);
        assert_eq!(file.chunk_count(), 1);
    }
}
