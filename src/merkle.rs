//! Binary hash tree binding database blocks to a public root.
//!
//! The tree is a flat array of `2 * next_pow2(n)` BLAKE3 hashes in heap
//! order (root at index 1), built over the blocks padded with zero blocks up
//! to a power of two, so every proof has the same length.

use crate::database::{BytesDb, PirMode};
use crate::messages::SchemeError;

/// Bytes per tree hash.
pub const HASH_BYTES: usize = 32;

/// Binary hash tree over a sequence of equal-length blocks.
pub struct MerkleTree {
    num_blocks: usize,
    padded: usize,
    nodes: Vec<[u8; HASH_BYTES]>,
}

/// Sibling path from a leaf to the root, plus the leaf index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    hashes: Vec<[u8; HASH_BYTES]>,
    index: u64,
}

impl MerkleTree {
    /// Build a tree over the blocks. All blocks must have the same length.
    pub fn build(blocks: &[&[u8]]) -> Result<MerkleTree, SchemeError> {
        if blocks.is_empty() {
            return Err(SchemeError::InvalidArgument("no blocks to authenticate".into()));
        }
        let block_len = blocks[0].len();
        if blocks.iter().any(|b| b.len() != block_len) {
            return Err(SchemeError::InvalidArgument("unequal block lengths".into()));
        }

        let padded = blocks.len().next_power_of_two();
        let zero_block = vec![0u8; block_len];
        let mut nodes = vec![[0u8; HASH_BYTES]; 2 * padded];
        for i in 0..padded {
            let data = if i < blocks.len() { blocks[i] } else { &zero_block };
            nodes[padded + i] = leaf_hash(data, i as u32);
        }
        for i in (1..padded).rev() {
            nodes[i] = node_hash(&nodes[2 * i], &nodes[2 * i + 1]);
        }

        Ok(MerkleTree { num_blocks: blocks.len(), padded, nodes })
    }

    pub fn root(&self) -> [u8; HASH_BYTES] {
        self.nodes[1]
    }

    /// Sibling path for the block at `index`.
    pub fn prove(&self, index: usize) -> Result<Proof, SchemeError> {
        if index >= self.num_blocks {
            return Err(SchemeError::InvalidArgument(format!(
                "proof index {} out of {} blocks",
                index, self.num_blocks
            )));
        }
        let mut hashes = Vec::new();
        let mut pos = self.padded + index;
        while pos > 1 {
            hashes.push(self.nodes[pos ^ 1]);
            pos /= 2;
        }
        Ok(Proof { hashes, index: index as u64 })
    }

    /// Encoded byte length of every proof of this tree.
    pub fn proof_len(&self) -> usize {
        4 + self.padded.trailing_zeros() as usize * HASH_BYTES + 8
    }
}

impl Proof {
    pub fn index(&self) -> u64 {
        self.index
    }

    /// `u32` little-endian hash count, the hashes, `u64` little-endian index.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.hashes.len() * HASH_BYTES + 8);
        out.extend_from_slice(&(self.hashes.len() as u32).to_le_bytes());
        for h in &self.hashes {
            out.extend_from_slice(h);
        }
        out.extend_from_slice(&self.index.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Proof, SchemeError> {
        if bytes.len() < 12 {
            return Err(SchemeError::DecodeFailure("proof too short".into()));
        }
        let count = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
        if bytes.len() != 4 + count * HASH_BYTES + 8 {
            return Err(SchemeError::DecodeFailure(format!(
                "proof length {} does not match {} hashes",
                bytes.len(),
                count
            )));
        }
        let mut hashes = Vec::with_capacity(count);
        for i in 0..count {
            let mut h = [0u8; HASH_BYTES];
            h.copy_from_slice(&bytes[4 + i * HASH_BYTES..4 + (i + 1) * HASH_BYTES]);
            hashes.push(h);
        }
        let index = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap());
        Ok(Proof { hashes, index })
    }
}

/// Recompute the leaf and walk the sibling path; true iff it meets `root`.
pub fn verify(block: &[u8], proof: &Proof, root: &[u8; HASH_BYTES]) -> bool {
    let mut hash = leaf_hash(block, proof.index as u32);
    let mut index = proof.index;
    for sibling in &proof.hashes {
        hash = if index & 1 == 0 {
            node_hash(&hash, sibling)
        } else {
            node_hash(sibling, &hash)
        };
        index >>= 1;
    }
    hash == *root
}

/// Rewrite a classic byte database so every block carries its inclusion
/// proof. The visible block size grows by the proof length; the root and
/// proof length are pinned in the returned info.
pub fn augment(db: &BytesDb) -> Result<BytesDb, SchemeError> {
    let num_blocks = db.info.num_blocks();
    let blocks: Vec<&[u8]> = (0..num_blocks).map(|i| db.block(i)).collect();
    let tree = MerkleTree::build(&blocks)?;
    let proof_len = tree.proof_len();

    let mut entries = Vec::with_capacity(num_blocks * (db.info.block_size + proof_len));
    for (i, block) in blocks.iter().enumerate() {
        entries.extend_from_slice(block);
        entries.extend_from_slice(&tree.prove(i)?.to_bytes());
    }

    let mut info = db.info.clone();
    info.block_size += proof_len;
    info.mode = PirMode::Merkle;
    info.merkle_root = Some(tree.root().to_vec());
    info.proof_len = Some(proof_len);
    BytesDb::from_entries(info, entries)
}

fn leaf_hash(block: &[u8], index: u32) -> [u8; HASH_BYTES] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(block);
    hasher.update(&index.to_le_bytes());
    *hasher.finalize().as_bytes()
}

fn node_hash(left: &[u8; HASH_BYTES], right: &[u8; HASH_BYTES]) -> [u8; HASH_BYTES] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}
