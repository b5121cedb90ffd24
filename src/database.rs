//! In-memory database model, geometry and builders.

use crate::field::{Element, ELEMENT_BYTES};
use crate::messages::SchemeError;
use crate::xof::Xof;
use serde::{Deserialize, Serialize};

/// PIR flavor of a database, advertised to clients in [`Info`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PirMode {
    /// XOR-based classical PIR over bytes.
    Classic,
    /// Classical PIR with Merkle-authenticated blocks.
    Merkle,
    /// VPIR over field elements with message-and-tag answers.
    Authenticated,
}

/// Immutable companion record describing a database's geometry and mode.
///
/// `block_size = 0` marks single-bit blocks (one field element per cell).
/// For Merkle databases `block_size` includes the embedded proof bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub num_rows: usize,
    pub num_columns: usize,
    pub block_size: usize,
    pub mode: PirMode,
    pub merkle_root: Option<Vec<u8>>,
    pub proof_len: Option<usize>,
    // Lengths of id/key segments for externally-parsed payloads.
    pub id_length: Option<usize>,
    pub key_length: Option<usize>,
}

impl Info {
    pub fn authenticated(num_rows: usize, num_columns: usize, block_size: usize) -> Info {
        Info {
            num_rows,
            num_columns,
            block_size,
            mode: PirMode::Authenticated,
            merkle_root: None,
            proof_len: None,
            id_length: None,
            key_length: None,
        }
    }

    pub fn classic(num_rows: usize, num_columns: usize, block_size: usize) -> Info {
        Info {
            num_rows,
            num_columns,
            block_size,
            mode: PirMode::Classic,
            merkle_root: None,
            proof_len: None,
            id_length: None,
            key_length: None,
        }
    }

    /// Total number of retrievable blocks.
    pub fn num_blocks(&self) -> usize {
        self.num_rows * self.num_columns
    }

    /// Field elements per query group: one zero-base scalar plus one tag
    /// randomizer per block element (single-bit blocks carry no randomizers).
    pub fn group_len(&self) -> usize {
        if self.block_size == 0 {
            1
        } else {
            self.block_size + 1
        }
    }

    /// Block bytes belonging to the user once any embedded proof is stripped.
    pub fn user_block_size(&self) -> usize {
        self.block_size - self.proof_len.unwrap_or(0)
    }

    /// Geometry equality, ignoring per-server extras.
    pub fn same_geometry(&self, other: &Info) -> bool {
        self.num_rows == other.num_rows
            && self.num_columns == other.num_columns
            && self.block_size == other.block_size
            && self.mode == other.mode
    }
}

/// Row-major store of field elements for the VPIR schemes.
#[derive(Debug)]
pub struct Db {
    pub info: Info,
    elements: Vec<Element>,
}

impl Db {
    /// Create a zeroed database with the given geometry.
    pub fn new(info: Info) -> Db {
        let n = if info.block_size == 0 {
            info.num_blocks()
        } else {
            info.num_blocks() * info.block_size
        };
        Db { elements: vec![Element::ZERO; n], info }
    }

    /// Wrap existing storage; the length must match the geometry.
    pub fn from_elements(info: Info, elements: Vec<Element>) -> Result<Db, SchemeError> {
        let expected = if info.block_size == 0 {
            info.num_blocks()
        } else {
            info.num_blocks() * info.block_size
        };
        if elements.len() != expected {
            return Err(SchemeError::InvalidArgument(format!(
                "storage holds {} elements, geometry needs {}",
                elements.len(),
                expected
            )));
        }
        Ok(Db { info, elements })
    }

    pub fn set_entry(&mut self, i: usize, element: Element) {
        self.elements[i] = element;
    }

    pub fn get_entry(&self, i: usize) -> Element {
        self.elements[i]
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// The `block_size` elements of the block with the given global index.
    pub fn block(&self, block_index: usize) -> &[Element] {
        let width = self.info.block_size.max(1);
        &self.elements[block_index * width..(block_index + 1) * width]
    }

    /// Re-balance a vector database into a square matrix view.
    ///
    /// The storage stays row-major and untouched; only the geometry changes,
    /// trading answer bandwidth for query bandwidth. The block count must
    /// already be a perfect square.
    pub fn rebalance(mut self) -> Result<Db, SchemeError> {
        let (rows, cols) = square_dimensions(self.info.num_blocks())?;
        self.info.num_rows = rows;
        self.info.num_columns = cols;
        Ok(self)
    }

    /// Random database of roughly `db_len_bits` bits. A `block_size` of
    /// zero selects the single-bit layout, one cell per bit.
    pub fn random(xof: &mut Xof, db_len_bits: usize, num_rows: usize, block_size: usize) -> Db {
        if block_size == 0 {
            return Db::random_single_bit(xof, db_len_bits, num_rows);
        }
        let num_rows = num_rows.max(1);
        let mut num_columns = db_len_bits / (8 * ELEMENT_BYTES * num_rows * block_size);
        if num_columns == 0 {
            num_columns = 1;
        }
        let info = Info::authenticated(num_rows, num_columns, block_size);
        let n = num_rows * num_columns * block_size;
        let elements = Element::random_vector(n, xof);
        Db { info, elements }
    }

    /// Random single-bit database of `db_len` cells.
    pub fn random_single_bit(xof: &mut Xof, db_len: usize, num_rows: usize) -> Db {
        let num_rows = num_rows.max(1);
        let num_columns = db_len / num_rows;
        let info = Info::authenticated(num_rows, num_columns, 0);
        let mut db = Db::new(info);
        let mut byte = [0u8; 1];
        for i in 0..num_rows * num_columns {
            xof.read(&mut byte);
            if byte[0] >> 7 == 1 {
                db.set_entry(i, Element::one());
            }
        }
        db
    }

    /// Single-bit database holding the bits of `payload`, most significant
    /// bit of each byte first. `matrix` selects the re-balanced square
    /// layout (padded with zero cells); otherwise a one-row vector.
    pub fn single_bit_from_bytes(payload: &[u8], matrix: bool) -> Db {
        let num_bits = payload.len() * 8;
        let (num_rows, num_columns) = rows_and_columns(num_bits, matrix);
        let info = Info::authenticated(num_rows, num_columns, 0);
        let mut db = Db::new(info);
        for i in 0..num_bits {
            if (payload[i / 8] >> (7 - i % 8)) & 1 == 1 {
                db.set_entry(i, Element::one());
            }
        }
        db
    }
}

/// Row-major store of raw bytes for the classical PIR schemes.
#[derive(Debug)]
pub struct BytesDb {
    pub info: Info,
    entries: Vec<u8>,
}

impl BytesDb {
    /// Wrap existing storage; the length must match the geometry.
    pub fn from_entries(info: Info, entries: Vec<u8>) -> Result<BytesDb, SchemeError> {
        let expected = info.num_blocks() * info.block_size;
        if entries.len() != expected {
            return Err(SchemeError::InvalidArgument(format!(
                "storage holds {} bytes, geometry needs {}",
                entries.len(),
                expected
            )));
        }
        Ok(BytesDb { info, entries })
    }

    /// Random byte database of roughly `db_len_bits` bits. Byte blocks have
    /// no single-bit mode, so `block_size` must be positive.
    pub fn random(
        xof: &mut Xof,
        db_len_bits: usize,
        num_rows: usize,
        block_size: usize,
    ) -> Result<BytesDb, SchemeError> {
        if block_size == 0 {
            return Err(SchemeError::InvalidArgument(
                "byte databases need a positive block size".into(),
            ));
        }
        let num_rows = num_rows.max(1);
        let mut num_columns = db_len_bits / (8 * block_size * num_rows);
        if num_columns == 0 {
            num_columns = 1;
        }
        let info = Info::classic(num_rows, num_columns, block_size);
        let mut entries = vec![0u8; num_rows * num_columns * block_size];
        xof.read(&mut entries);
        Ok(BytesDb { info, entries })
    }

    pub fn entries(&self) -> &[u8] {
        &self.entries
    }

    /// The bytes of the block with the given global index.
    pub fn block(&self, block_index: usize) -> &[u8] {
        let width = self.info.block_size;
        &self.entries[block_index * width..(block_index + 1) * width]
    }
}

/// Database geometry for `num_blocks` blocks: a one-row vector, or a square
/// matrix padded up to the next perfect square.
pub fn rows_and_columns(num_blocks: usize, matrix: bool) -> (usize, usize) {
    if matrix {
        let side = (next_square(num_blocks) as f64).sqrt() as usize;
        (side, side)
    } else {
        (1, num_blocks)
    }
}

/// Smallest perfect square >= `n`.
pub fn next_square(n: usize) -> usize {
    let mut side = (n as f64).sqrt() as usize;
    while side * side < n {
        side += 1;
    }
    side * side
}

/// Side length of an exactly-square block count.
pub fn square_dimensions(num_blocks: usize) -> Result<(usize, usize), SchemeError> {
    let side = (num_blocks as f64).sqrt() as usize;
    for candidate in side.saturating_sub(1)..=side + 1 {
        if candidate * candidate == num_blocks {
            return Ok((candidate, candidate));
        }
    }
    Err(SchemeError::InvalidArgument(format!(
        "{} blocks do not form a square matrix",
        num_blocks
    )))
}

/// Map an identifier to a block index for a database of `length` blocks.
pub fn hash_to_index(id: &str, length: usize) -> usize {
    let digest = blake3::hash(id.as_bytes());
    let word = u64::from_be_bytes(digest.as_bytes()[..8].try_into().unwrap());
    (word % length as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_row_major() {
        let mut db = Db::new(Info::authenticated(2, 3, 4));
        // Element at (r, c, b) lives at (r * cols + c) * block_size + b.
        db.set_entry((1 * 3 + 2) * 4 + 1, Element::one());
        assert_eq!(db.block(1 * 3 + 2)[1], Element::one());
        assert_eq!(db.block(0)[0], Element::zero());
    }

    #[test]
    fn test_from_elements_checks_length() {
        let info = Info::authenticated(2, 2, 2);
        assert!(Db::from_elements(info.clone(), vec![Element::ZERO; 8]).is_ok());
        let err = Db::from_elements(info, vec![Element::ZERO; 7]).unwrap_err();
        assert!(matches!(err, SchemeError::InvalidArgument(_)));
    }

    #[test]
    fn test_single_bit_from_bytes_vector() {
        let db = Db::single_bit_from_bytes(&[0b1010_0001], false);
        assert_eq!(db.info.num_rows, 1);
        assert_eq!(db.info.num_columns, 8);
        assert_eq!(db.info.block_size, 0);
        assert_eq!(db.get_entry(0), Element::one());
        assert_eq!(db.get_entry(1), Element::zero());
        assert_eq!(db.get_entry(7), Element::one());
    }

    #[test]
    fn test_single_bit_from_bytes_matrix_pads_to_square() {
        // 17 bytes = 136 bits, padded to a 12 x 12 matrix.
        let db = Db::single_bit_from_bytes(&[0xffu8; 17], true);
        assert_eq!(db.info.num_rows, 12);
        assert_eq!(db.info.num_columns, 12);
        assert_eq!(db.get_entry(135), Element::one());
        assert_eq!(db.get_entry(136), Element::zero());
    }

    #[test]
    fn test_random_db_geometry() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 1 << 17, 1, 16);
        assert_eq!(db.info.num_rows, 1);
        assert_eq!(db.info.num_columns, (1 << 17) / (8 * 16 * 16));
        assert_eq!(db.elements().len(), db.info.num_columns * 16);

        let tiny = Db::random(&mut xof, 8, 1, 16);
        assert_eq!(tiny.info.num_columns, 1);
    }

    #[test]
    fn test_random_zero_block_size_is_single_bit() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 256, 1, 0);
        assert_eq!(db.info.block_size, 0);
        assert_eq!(db.info.num_columns, 256);
        assert_eq!(db.elements().len(), 256);

        assert!(matches!(
            BytesDb::random(&mut xof, 256, 1, 0).unwrap_err(),
            SchemeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_rebalance() {
        let mut xof = Xof::keyed(b"db key");
        // 16 blocks re-balance into a 4 x 4 matrix over the same storage.
        let db = Db::random(&mut xof, 1 << 15, 1, 16);
        assert_eq!(db.info.num_columns, 16);
        let flat = db.elements().to_vec();
        let db = db.rebalance().unwrap();
        assert_eq!((db.info.num_rows, db.info.num_columns), (4, 4));
        assert_eq!(db.elements(), flat.as_slice());

        let odd = Db::new(Info::authenticated(1, 5, 2));
        assert!(odd.rebalance().is_err());
    }

    #[test]
    fn test_square_dimensions() {
        assert_eq!(square_dimensions(144).unwrap(), (12, 12));
        assert_eq!(square_dimensions(1).unwrap(), (1, 1));
        assert!(square_dimensions(140).is_err());
    }

    #[test]
    fn test_next_square() {
        assert_eq!(next_square(136), 144);
        assert_eq!(next_square(144), 144);
        assert_eq!(next_square(1), 1);
        assert_eq!(next_square(2), 4);
    }

    #[test]
    fn test_hash_to_index_stable_and_bounded() {
        let a = hash_to_index("alice", 97);
        assert_eq!(a, hash_to_index("alice", 97));
        assert!(a < 97);
        assert_ne!(hash_to_index("alice", 1 << 20), hash_to_index("bob", 1 << 20));
    }
}
