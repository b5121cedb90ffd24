//! Chunked persisted database format.
//!
//! A saved database is a sequence of length-framed key/value records: a
//! reserved `info` record holding the geometry and the chunk index, then one
//! record per chunk of field elements keyed by the chunk's 8-byte
//! little-endian start index. Loading failures are fatal to a server at
//! startup; nothing here retries.

use crate::database::{Db, Info};
use crate::field::Element;
use crate::framing::{read_frame, write_frame};
use crate::messages::StorageError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Elements per chunk unless the caller picks otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000_000;

const INFO_KEY: &[u8] = b"info";

#[derive(Serialize, Deserialize)]
struct SaveInfo {
    info: Info,
    // Start/end element index of every chunk record.
    chunks: Vec<(u64, u64)>,
}

/// Save a database with the default chunk size.
pub fn save(db: &Db, path: &Path) -> Result<(), StorageError> {
    save_with_chunk_size(db, path, DEFAULT_CHUNK_SIZE)
}

pub fn save_with_chunk_size(
    db: &Db,
    path: &Path,
    chunk_size: usize,
) -> Result<(), StorageError> {
    let chunk_size = chunk_size.max(1);
    let elements = db.elements();

    let mut save_info = SaveInfo { info: db.info.clone(), chunks: Vec::new() };
    let mut start = 0;
    while start < elements.len() {
        let end = (start + chunk_size).min(elements.len());
        save_info.chunks.push((start as u64, end as u64));
        start = end;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_frame(&mut writer, INFO_KEY)?;
    let info_bytes = bincode::serialize(&save_info)
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
    write_frame(&mut writer, &info_bytes)?;

    for &(chunk_start, chunk_end) in &save_info.chunks {
        write_frame(&mut writer, &chunk_start.to_le_bytes())?;
        let payload =
            bincode::serialize(&elements[chunk_start as usize..chunk_end as usize])
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        write_frame(&mut writer, &payload)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load a database saved by [`save`].
pub fn load(path: &Path) -> Result<Db, StorageError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let key = read_frame(&mut reader)?;
    if key != INFO_KEY {
        return Err(StorageError::Corrupt("first record is not the info record".into()));
    }
    let save_info: SaveInfo = bincode::deserialize(&read_frame(&mut reader)?)
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;

    let info = save_info.info;
    let total = if info.block_size == 0 {
        info.num_blocks()
    } else {
        info.num_blocks() * info.block_size
    };
    let mut elements = vec![Element::ZERO; total];
    let mut seen = vec![false; save_info.chunks.len()];

    for _ in 0..save_info.chunks.len() {
        let key = read_frame(&mut reader)?;
        let key: [u8; 8] = key
            .try_into()
            .map_err(|_| StorageError::Corrupt("chunk key is not 8 bytes".into()))?;
        let chunk_start = u64::from_le_bytes(key);

        let position = save_info
            .chunks
            .iter()
            .position(|&(start, _)| start == chunk_start)
            .ok_or_else(|| {
                StorageError::Corrupt(format!("unindexed chunk at {}", chunk_start))
            })?;
        if seen[position] {
            return Err(StorageError::Corrupt(format!("duplicate chunk at {}", chunk_start)));
        }
        seen[position] = true;

        let (start, end) = save_info.chunks[position];
        let (start, end) = (start as usize, end as usize);
        if end > total || start > end {
            return Err(StorageError::Corrupt(format!("chunk {}..{} out of range", start, end)));
        }
        let chunk: Vec<Element> = bincode::deserialize(&read_frame(&mut reader)?)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        if chunk.len() != end - start {
            return Err(StorageError::Corrupt(format!(
                "chunk {}..{} holds {} elements",
                start,
                end,
                chunk.len()
            )));
        }
        elements[start..end].copy_from_slice(&chunk);
    }

    Db::from_elements(info, elements).map_err(|e| StorageError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xof::Xof;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut xof = Xof::keyed(b"persist");
        let db = Db::random(&mut xof, 1 << 14, 2, 4);
        let path = temp_path("vpir_persist_roundtrip.db");
        // Small chunks force several records plus a short tail.
        save_with_chunk_size(&db, &path, 7).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.info, db.info);
        assert_eq!(loaded.elements(), db.elements());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_save_load_single_bit() {
        let db = Db::single_bit_from_bytes(b"persisted bits", true);
        let path = temp_path("vpir_persist_single_bit.db");
        save(&db, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.info, db.info);
        assert_eq!(loaded.elements(), db.elements());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_truncated_file() {
        let mut xof = Xof::keyed(b"persist");
        let db = Db::random(&mut xof, 1 << 12, 1, 2);
        let path = temp_path("vpir_persist_truncated.db");
        save_with_chunk_size(&db, &path, 16).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 9]).unwrap();
        assert!(load(&path).is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_missing_info_record() {
        let path = temp_path("vpir_persist_noinfo.db");
        let file = File::create(&path).unwrap();
        let mut writer = BufWriter::new(file);
        write_frame(&mut writer, b"chunk").unwrap();
        writer.flush().unwrap();
        drop(writer);
        assert!(matches!(load(&path).unwrap_err(), StorageError::Corrupt(_)));
        let _ = std::fs::remove_file(path);
    }
}
