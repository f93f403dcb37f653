//! Sequential file chunking and reassembly for the windowed transfer engine.

use crate::DEFAULT_CHUNK_SIZE;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Chunk metadata.
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    /// Chunk index.
    pub index: u64,
    /// Byte offset in file.
    pub offset: u64,
    /// Chunk size in bytes.
    pub size: usize,
    /// SHA-256 hash of the chunk's plaintext.
    pub hash: [u8; 32],
}

/// Sequential file reader that yields plaintext chunks no larger than the
/// configured chunk size, the sender side of the windowed transfer protocol.
pub struct FileChunker {
    file: File,
    chunk_size: usize,
    total_size: u64,
    current_offset: u64,
}

impl FileChunker {
    /// Open a file for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read.
    pub fn new<P: AsRef<Path>>(path: P, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let total_size = file.metadata()?.len();

        Ok(Self {
            file,
            chunk_size,
            total_size,
            current_offset: 0,
        })
    }

    /// Open a file using the protocol's default chunk size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read.
    pub fn with_default_size<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(path, DEFAULT_CHUNK_SIZE)
    }

    /// Total number of chunks, including a zero-size chunk for an empty file.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size as u64).max(1)
    }

    /// Configured chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total file size in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Read the next chunk in sequence. Returns `None` once the file is
    /// exhausted; callers append the protocol's terminal empty chunk
    /// themselves rather than reading one from here.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the file fails.
    pub fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.current_offset >= self.total_size {
            return Ok(None);
        }

        let remaining = self.total_size - self.current_offset;
        let chunk_len = remaining.min(self.chunk_size as u64) as usize;

        let mut buffer = vec![0u8; chunk_len];
        self.file.read_exact(&mut buffer)?;

        self.current_offset += chunk_len as u64;

        Ok(Some(buffer))
    }

    /// Seek to the start of a specific chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk index is out of bounds or seeking fails.
    pub fn seek_to_chunk(&mut self, chunk_index: u64) -> io::Result<()> {
        let offset = chunk_index * self.chunk_size as u64;

        if offset >= self.total_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk index out of bounds",
            ));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.current_offset = offset;

        Ok(())
    }

    /// Read a specific chunk by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk index is invalid or reading fails.
    pub fn read_chunk_at(&mut self, chunk_index: u64) -> io::Result<Vec<u8>> {
        self.seek_to_chunk(chunk_index)?;
        self.read_chunk()?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "chunk not found"))
    }

    /// Metadata, including plaintext hash, for a specific chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the chunk fails.
    pub fn chunk_info(&mut self, chunk_index: u64) -> io::Result<ChunkInfo> {
        let offset = chunk_index * self.chunk_size as u64;

        if offset >= self.total_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk index out of bounds",
            ));
        }

        let chunk_data = self.read_chunk_at(chunk_index)?;
        let hash = ember_crypto::hash::hash(&chunk_data);

        Ok(ChunkInfo {
            index: chunk_index,
            offset,
            size: chunk_data.len(),
            hash,
        })
    }
}

/// Receiving-side file writer. The windowed protocol streams chunks in
/// order, but writes are addressed by offset so a chunk retransmitted after
/// an ACK timeout can land in the same place.
pub struct FileReassembler {
    file: File,
    written_bytes: u64,
    total_size: u64,
}

impl FileReassembler {
    /// Create a new reassembler, pre-allocating the file to its final size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or pre-allocated.
    pub fn new<P: AsRef<Path>>(path: P, total_size: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.set_len(total_size)?;

        Ok(Self {
            file,
            written_bytes: 0,
            total_size,
        })
    }

    /// Append plaintext at the current write offset.
    ///
    /// # Errors
    ///
    /// Returns an error if writing exceeds the file's declared size or the
    /// underlying write fails.
    pub fn write_next(&mut self, data: &[u8]) -> io::Result<()> {
        if self.written_bytes + data.len() as u64 > self.total_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write would exceed declared file size",
            ));
        }

        self.file.seek(SeekFrom::Start(self.written_bytes))?;
        self.file.write_all(data)?;
        self.written_bytes += data.len() as u64;

        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    /// Progress toward completion, in `[0.0, 1.0]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.written_bytes as f64 / self.total_size as f64
        }
    }

    /// Whether every declared byte has been written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.written_bytes == self.total_size
    }

    /// Flush and fsync the file to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing fails.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Finalize the file, refusing to do so until every byte has arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if bytes are still missing or syncing fails.
    pub fn finalize(mut self) -> io::Result<()> {
        if !self.is_complete() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "transfer incomplete: {}/{} bytes received",
                    self.written_bytes, self.total_size
                ),
            ));
        }

        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_chunking_roundtrip() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let data = vec![0xAA; 256 * 1024];
        temp_file.write_all(&data).unwrap();
        temp_file.flush().unwrap();

        let mut chunker = FileChunker::new(temp_file.path(), DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(chunker.num_chunks(), 4); // 256KiB / 64KiB = 4 chunks

        let mut chunks = Vec::new();
        while let Some(chunk) = chunker.read_chunk().unwrap() {
            chunks.push(chunk);
        }
        assert_eq!(chunks.len(), 4);

        let output_file = NamedTempFile::new().unwrap();
        let mut reassembler =
            FileReassembler::new(output_file.path(), data.len() as u64).unwrap();
        for chunk in &chunks {
            reassembler.write_next(chunk).unwrap();
        }

        assert!(reassembler.is_complete());
        assert_eq!(reassembler.progress(), 1.0);
        reassembler.finalize().unwrap();

        let reconstructed = std::fs::read(output_file.path()).unwrap();
        assert_eq!(reconstructed, data);
    }

    #[test]
    fn test_seek_to_chunk() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&vec![0u8; 256 * 1024]).unwrap();
        temp_file.flush().unwrap();

        let mut chunker = FileChunker::new(temp_file.path(), DEFAULT_CHUNK_SIZE).unwrap();

        chunker.seek_to_chunk(2).unwrap();
        let chunk = chunker.read_chunk().unwrap().unwrap();

        assert_eq!(chunk.len(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_chunk_info() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let data = vec![0xCC; 256 * 1024];
        temp_file.write_all(&data).unwrap();
        temp_file.flush().unwrap();

        let mut chunker = FileChunker::new(temp_file.path(), DEFAULT_CHUNK_SIZE).unwrap();
        let info = chunker.chunk_info(0).unwrap();

        assert_eq!(info.index, 0);
        assert_eq!(info.offset, 0);
        assert_eq!(info.size, DEFAULT_CHUNK_SIZE);
        assert_ne!(info.hash, [0u8; 32]);
    }

    #[test]
    fn test_incomplete_finalize_fails() {
        let output_file = NamedTempFile::new().unwrap();
        let reassembler = FileReassembler::new(output_file.path(), 4 * DEFAULT_CHUNK_SIZE as u64)
            .unwrap();

        assert!(reassembler.finalize().is_err());
    }

    #[test]
    fn test_empty_file_has_one_chunk() {
        let temp_file = NamedTempFile::new().unwrap();
        let chunker = FileChunker::new(temp_file.path(), DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(chunker.num_chunks(), 1);
        assert_eq!(chunker.total_size(), 0);
    }

    #[test]
    fn test_write_past_declared_size_fails() {
        let output_file = NamedTempFile::new().unwrap();
        let mut reassembler = FileReassembler::new(output_file.path(), 4).unwrap();
        assert!(reassembler.write_next(&[0u8; 8]).is_err());
    }
}
