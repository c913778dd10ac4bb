//! Binary snapshot files for the embedded catalogs.
//!
//! All snapshots share a 47-byte header:
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the embedding model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before the checksum)
//!
//! Tag and keyword snapshots then repeat:
//! - id: u64, text: u16 length + UTF-8 bytes, embedding: [f32; dimensions]
//!
//! Cluster snapshots repeat:
//! - tag_id: u64, parent_key_id: u64, sentiment: u8 length + UTF-8 bytes,
//!   text: u16 length + UTF-8 bytes, embedding: [f32; dimensions]
//!
//! All integers and floats are little-endian. Writes are atomic
//! (temp file, flush, fsync, rename).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Errors that can occur reading or writing snapshot files.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: snapshot was written with a different model")]
    ModelMismatch,

    #[error("Checksum mismatch: snapshot may be corrupted")]
    ChecksumMismatch,
}

/// A tag or keyword entry: id, display text, embedding.
pub type VectorEntry = (u64, String, Vec<f32>);

/// A cluster entry: tag id, parent key id, sentiment, original text, embedding.
pub type ClusterEntry = (u64, u64, String, String, Vec<f32>);

/// Decoded snapshot payload.
pub struct Snapshot<T> {
    pub dimensions: usize,
    pub entries: Vec<T>,
}

/// Snapshot of `(id, text, embedding)` entries: the tag catalog and the
/// keyword catalog share this layout.
pub struct VectorSnapshot {
    path: PathBuf,
}

impl VectorSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all entries, validating the header against `expected_model_id`.
    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<Snapshot<VectorEntry>, SnapshotError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if header.model_id != *expected_model_id {
            return Err(SnapshotError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let id = read_u64(&mut reader)?;
            let text = read_string_u16(&mut reader)?;
            let embedding = read_embedding(&mut reader, dimensions)?;
            entries.push((id, text, embedding));
        }

        Ok(Snapshot {
            dimensions,
            entries,
        })
    }

    /// Write all entries atomically.
    pub fn save(
        &self,
        model_id: &[u8; 32],
        dimensions: usize,
        entries: &[VectorEntry],
    ) -> Result<(), SnapshotError> {
        write_atomic(&self.path, model_id, dimensions, entries.len(), |writer| {
            for (id, text, embedding) in entries {
                writer.write_all(&id.to_le_bytes())?;
                write_string_u16(writer, text)?;
                write_embedding(writer, embedding)?;
            }
            Ok(())
        })
    }
}

/// Snapshot of cluster member entries with per-member metadata.
pub struct ClusterSnapshot {
    path: PathBuf,
}

impl ClusterSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<Snapshot<ClusterEntry>, SnapshotError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if header.model_id != *expected_model_id {
            return Err(SnapshotError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let tag_id = read_u64(&mut reader)?;
            let parent_key_id = read_u64(&mut reader)?;
            let sentiment = read_string_u8(&mut reader)?;
            let text = read_string_u16(&mut reader)?;
            let embedding = read_embedding(&mut reader, dimensions)?;
            entries.push((tag_id, parent_key_id, sentiment, text, embedding));
        }

        Ok(Snapshot {
            dimensions,
            entries,
        })
    }

    pub fn save(
        &self,
        model_id: &[u8; 32],
        dimensions: usize,
        entries: &[ClusterEntry],
    ) -> Result<(), SnapshotError> {
        write_atomic(&self.path, model_id, dimensions, entries.len(), |writer| {
            for (tag_id, parent_key_id, sentiment, text, embedding) in entries {
                writer.write_all(&tag_id.to_le_bytes())?;
                writer.write_all(&parent_key_id.to_le_bytes())?;
                write_string_u8(writer, sentiment)?;
                write_string_u16(writer, text)?;
                write_embedding(writer, embedding)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

/// Snapshot header summary for diagnostics, read without decoding entries.
#[derive(Debug)]
pub struct SnapshotInfo {
    pub model_id_hex: String,
    pub dimensions: usize,
    pub entry_count: u64,
    pub file_size: u64,
}

pub fn describe(path: &Path) -> Result<SnapshotInfo, SnapshotError> {
    let file_size = std::fs::metadata(path)?.len();
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;

    let mut model_id_hex = String::with_capacity(64);
    for byte in header.model_id {
        model_id_hex.push_str(&format!("{byte:02x}"));
    }

    Ok(SnapshotInfo {
        model_id_hex,
        dimensions: header.dimensions as usize,
        entry_count: header.entry_count,
        file_size,
    })
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, SnapshotError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(SnapshotError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let entry_count = u64::from_le_bytes(header_bytes[35..43].try_into().unwrap());
    let stored_checksum = u32::from_le_bytes(header_bytes[43..47].try_into().unwrap());

    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(SnapshotError::ChecksumMismatch);
    }

    if dimensions == 0 {
        return Err(SnapshotError::InvalidFormat("zero dimensions".to_string()));
    }

    Ok(Header {
        model_id,
        dimensions,
        entry_count,
    })
}

fn write_header<W: Write>(
    writer: &mut W,
    model_id: &[u8; 32],
    dimensions: usize,
    entry_count: usize,
) -> Result<(), SnapshotError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = FORMAT_VERSION;
    header_bytes[1..33].copy_from_slice(model_id);
    header_bytes[33..35].copy_from_slice(&(dimensions as u16).to_le_bytes());
    header_bytes[35..43].copy_from_slice(&(entry_count as u64).to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn write_atomic<F>(
    path: &Path,
    model_id: &[u8; 32],
    dimensions: usize,
    entry_count: usize,
    write_entries: F,
) -> Result<(), SnapshotError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), SnapshotError>,
{
    let temp_path = path.with_extension("tmp");

    let result = (|| {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, model_id, dimensions, entry_count)?;
        write_entries(&mut writer)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(err);
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, SnapshotError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_string_u8<R: Read>(reader: &mut R) -> Result<String, SnapshotError> {
    let mut len = [0u8; 1];
    reader.read_exact(&mut len)?;
    read_utf8(reader, len[0] as usize)
}

fn read_string_u16<R: Read>(reader: &mut R) -> Result<String, SnapshotError> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    read_utf8(reader, u16::from_le_bytes(len) as usize)
}

fn read_utf8<R: Read>(reader: &mut R, len: usize) -> Result<String, SnapshotError> {
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| SnapshotError::InvalidFormat(format!("invalid utf-8 in entry: {}", e)))
}

fn write_string_u8<W: Write>(writer: &mut W, value: &str) -> Result<(), SnapshotError> {
    if value.len() > u8::MAX as usize {
        return Err(SnapshotError::InvalidFormat(format!(
            "sentiment too long: {} bytes",
            value.len()
        )));
    }
    writer.write_all(&[value.len() as u8])?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn write_string_u16<W: Write>(writer: &mut W, value: &str) -> Result<(), SnapshotError> {
    if value.len() > u16::MAX as usize {
        return Err(SnapshotError::InvalidFormat(format!(
            "text too long: {} bytes",
            value.len()
        )));
    }
    writer.write_all(&(value.len() as u16).to_le_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_embedding<R: Read>(reader: &mut R, dimensions: usize) -> Result<Vec<f32>, SnapshotError> {
    let mut bytes = vec![0u8; dimensions * 4];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

fn write_embedding<W: Write>(writer: &mut W, embedding: &[f32]) -> Result<(), SnapshotError> {
    for &value in embedding {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    #[test]
    fn test_vector_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = VectorSnapshot::new(dir.path().join("tag_vectors.bin"));
        let model_id = test_model_id();

        let entries = vec![
            (1, "액션".to_string(), vec![1.0, 0.0]),
            (2, "드라마".to_string(), vec![0.0, 1.0]),
        ];
        snapshot.save(&model_id, 2, &entries).unwrap();
        assert!(snapshot.exists());

        let loaded = snapshot.load(&model_id).unwrap();
        assert_eq!(loaded.dimensions, 2);
        assert_eq!(loaded.entries, entries);
    }

    #[test]
    fn test_cluster_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = ClusterSnapshot::new(dir.path().join("tag_clusters.bin"));
        let model_id = test_model_id();

        let entries = vec![(
            10,
            1,
            "positive".to_string(),
            "#설렘".to_string(),
            vec![0.5, 0.5],
        )];
        snapshot.save(&model_id, 2, &entries).unwrap();

        let loaded = snapshot.load(&model_id).unwrap();
        assert_eq!(loaded.entries, entries);
    }

    #[test]
    fn test_model_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = VectorSnapshot::new(dir.path().join("tags.bin"));
        snapshot.save(&test_model_id(), 2, &[]).unwrap();

        let mut other = [0u8; 32];
        other[0] = 0xFF;
        assert!(matches!(
            snapshot.load(&other),
            Err(SnapshotError::ModelMismatch)
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let snapshot = VectorSnapshot::new(PathBuf::from("/nonexistent/tags.bin"));
        assert!(matches!(
            snapshot.load(&test_model_id()),
            Err(SnapshotError::Io(_))
        ));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.bin");
        let snapshot = VectorSnapshot::new(path.clone());
        snapshot
            .save(&test_model_id(), 2, &[(1, "액션".to_string(), vec![1.0, 0.0])])
            .unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        assert!(matches!(
            snapshot.load(&test_model_id()),
            Err(SnapshotError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_atomic_write_cleans_up_on_error() {
        let path = PathBuf::from("/nonexistent/directory/tags.bin");
        let snapshot = VectorSnapshot::new(path.clone());
        assert!(snapshot.save(&test_model_id(), 2, &[]).is_err());
        assert!(!path.with_extension("tmp").exists());
    }
}
