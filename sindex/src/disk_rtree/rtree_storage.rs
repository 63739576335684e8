//! Page I/O for the index file.
//!
//! Every page, the header page included, is a frame: a little-endian `u32`
//! payload length, a little-endian CRC32 of the payload, then the bincode
//! payload, zero padded to [`PAGE_SIZE`]. Files are written once, front to
//! back, by [`StorageWriter`] and read through a read-only memory map by
//! [`Storage`].

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{SindexError, SindexResult};

use super::rtree_constants::{FRAME_HEADER_SIZE, PAGE_SIZE};
use super::rtree_types::{FileHeader, Node, PageId};

/// Encodes `value` into one zero-padded page frame.
pub(crate) fn encode_frame<T: Serialize>(value: &T) -> SindexResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| SindexError::Serialization(e.to_string()))?;

    if payload.len() > PAGE_SIZE - FRAME_HEADER_SIZE {
        return Err(SindexError::Serialization(format!(
            "Page payload too large: {} bytes (max {})",
            payload.len(),
            PAGE_SIZE - FRAME_HEADER_SIZE
        )));
    }

    let mut page = Vec::with_capacity(PAGE_SIZE);
    page.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    page.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    page.extend_from_slice(&payload);
    page.resize(PAGE_SIZE, 0);
    Ok(page)
}

/// Verifies and decodes one page frame.
pub(crate) fn decode_frame<T: DeserializeOwned>(page: &[u8]) -> Result<T, String> {
    if page.len() < FRAME_HEADER_SIZE {
        return Err(format!("truncated page of {} bytes", page.len()));
    }
    let (len_bytes, rest) = page.split_at(4);
    let (crc_bytes, body) = rest.split_at(4);
    let len = u32::from_le_bytes(len_bytes.try_into().map_err(|_| "bad frame length")?) as usize;
    let expected = u32::from_le_bytes(crc_bytes.try_into().map_err(|_| "bad frame checksum")?);

    let payload = body
        .get(..len)
        .ok_or_else(|| format!("frame length {} exceeds page", len))?;
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(format!(
            "checksum mismatch: expected {:#010x}, found {:#010x}",
            expected, actual
        ));
    }

    bincode::serde::decode_from_slice(payload, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| e.to_string())
}

/// Sequential writer for a new index file.
///
/// Page 0 is reserved on creation and filled by [`StorageWriter::finish`],
/// so a file without a valid header is never mistaken for a complete index.
pub struct StorageWriter {
    out: BufWriter<File>,
    next_page: PageId,
}

impl StorageWriter {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path) -> SindexResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut out = BufWriter::new(file);
        out.write_all(&vec![0u8; PAGE_SIZE])?;
        Ok(Self { out, next_page: 1 })
    }

    /// Appends a node and returns its page id.
    pub fn append(&mut self, node: &Node) -> SindexResult<PageId> {
        let page = encode_frame(node)?;
        self.out.write_all(&page)?;
        let page_id = self.next_page;
        self.next_page += 1;
        Ok(page_id)
    }

    /// Number of pages written so far, header page included.
    pub fn page_count(&self) -> u64 {
        self.next_page
    }

    /// Writes the header into page 0 and syncs the file.
    pub fn finish(mut self, header: &FileHeader) -> SindexResult<u64> {
        let page = encode_frame(header)?;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&page)?;
        self.out.flush()?;

        let file = self
            .out
            .into_inner()
            .map_err(|e| SindexError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(self.next_page * PAGE_SIZE as u64)
    }
}

/// Read-only view of an index file.
///
/// The file is memory mapped on open; reading a page decodes it straight out
/// of the mapping without further system calls.
pub struct Storage {
    mmap: Mmap,
    path: PathBuf,
}

impl Storage {
    /// Maps an existing index file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be opened, `IndexCorrupt` if its size is not a
    /// whole number of pages.
    pub fn open(path: &Path) -> SindexResult<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < PAGE_SIZE as u64 || len % PAGE_SIZE as u64 != 0 {
            return Err(SindexError::index_corrupt(
                path,
                format!("file size {} is not a multiple of {}", len, PAGE_SIZE),
            ));
        }

        // SAFETY: index files are published once and never modified in
        // place; replacement happens by rename.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages in the file, header page included.
    pub fn page_count(&self) -> u64 {
        (self.mmap.len() / PAGE_SIZE) as u64
    }

    /// Reads and validates the header page.
    pub fn read_header(&self) -> SindexResult<FileHeader> {
        let header: FileHeader = decode_frame(self.page_bytes(0))
            .map_err(|e| SindexError::index_corrupt(&self.path, format!("header: {}", e)))?;
        header
            .validate()
            .map_err(|e| SindexError::index_corrupt(&self.path, format!("header: {}", e)))?;

        if header.page_count != self.page_count() {
            return Err(SindexError::index_corrupt(
                &self.path,
                format!(
                    "header records {} pages, file has {}",
                    header.page_count,
                    self.page_count()
                ),
            ));
        }
        Ok(header)
    }

    /// Reads a SINGLE node.
    pub fn read_page(&self, page_id: PageId) -> SindexResult<Node> {
        if page_id == 0 || page_id >= self.page_count() {
            return Err(SindexError::index_corrupt(
                &self.path,
                format!("page {} out of range", page_id),
            ));
        }
        decode_frame(self.page_bytes(page_id))
            .map_err(|e| SindexError::index_corrupt(&self.path, format!("page {}: {}", page_id, e)))
    }

    fn page_bytes(&self, page_id: PageId) -> &[u8] {
        let start = page_id as usize * PAGE_SIZE;
        &self.mmap[start..start + PAGE_SIZE]
    }
}
