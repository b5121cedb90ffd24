//! Server-side answer engines.
//!
//! The database is read-only after construction and shared by all workers
//! without locking; every output slot is written by exactly one worker.

use crate::database::{BytesDb, Db, Info};
use crate::dpf::{self, DpfKey};
use crate::field::Element;
use crate::messages::{bit_at, SchemeError};
use rayon::prelude::*;

/// XOR `src` into `dst`; the lengths must match.
pub fn xor_bytes_inplace(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// VPIR answer engine over a field-element database.
pub struct Server {
    db: Db,
    num_workers: usize,
}

impl Server {
    pub fn new(db: Db) -> Server {
        Server::with_workers(db, default_workers())
    }

    pub fn with_workers(db: Db, num_workers: usize) -> Server {
        Server { db, num_workers: num_workers.max(1) }
    }

    pub fn db_info(&self) -> &Info {
        &self.db.info
    }

    /// Compute the answer vector for an information-theoretic query.
    ///
    /// Single-bit databases take `num_columns` query elements and produce
    /// `num_rows` elements. Multi-bit databases take `num_columns *
    /// (block_size + 1)` elements (zero-base scalar plus tag randomizers per
    /// column group) and produce `block_size + 1` elements per row, the tag
    /// last.
    pub fn answer(&self, query: &[Element]) -> Result<Vec<Element>, SchemeError> {
        let info = &self.db.info;
        if info.block_size == 0 {
            if query.len() != info.num_columns {
                return Err(SchemeError::InvalidArgument(format!(
                    "single-bit query has {} elements, want {}",
                    query.len(),
                    info.num_columns
                )));
            }
            return Ok(self.answer_single_bit(query));
        }

        let expected = info.num_columns * info.group_len();
        if query.len() != expected {
            return Err(SchemeError::InvalidArgument(format!(
                "query has {} elements, want {}",
                query.len(),
                expected
            )));
        }
        Ok(self.answer_multi_bit(query))
    }

    /// Expand a DPF key over the column domain and fold it like an IT query.
    pub fn answer_dpf(&self, key: &DpfKey) -> Result<Vec<Element>, SchemeError> {
        let info = &self.db.info;
        if key.domain() != info.num_columns || key.value_len() != info.group_len() {
            return Err(SchemeError::InvalidArgument(format!(
                "dpf key shape {}x{}, database wants {}x{}",
                key.domain(),
                key.value_len(),
                info.num_columns,
                info.group_len()
            )));
        }
        let expanded = dpf::full_eval(key);
        self.answer(&expanded)
    }

    fn answer_single_bit(&self, query: &[Element]) -> Vec<Element> {
        let rows = self.db.info.num_rows;
        let cols = self.db.info.num_columns;
        let one = Element::one();
        let mut answer = vec![Element::ZERO; rows];
        for r in 0..rows {
            for c in 0..cols {
                if self.db.get_entry(r * cols + c) == one {
                    answer[r] += query[c];
                }
            }
        }
        answer
    }

    fn answer_multi_bit(&self, query: &[Element]) -> Vec<Element> {
        let info = &self.db.info;
        let rows = info.num_rows;
        let cols = info.num_columns;
        let block_size = info.block_size;
        let group = info.group_len();

        if rows == 1 {
            // Vector database: hand each worker a contiguous column chunk
            // and sum the partial message-and-tag vectors. Addition is
            // commutative, so the reduction order does not matter.
            let cols_per_chunk = cols.div_ceil(self.num_workers);
            let num_chunks = cols.div_ceil(cols_per_chunk);
            return (0..num_chunks)
                .into_par_iter()
                .map(|w| {
                    let start = w * cols_per_chunk;
                    let end = (start + cols_per_chunk).min(cols);
                    message_and_tag(
                        &self.db.elements()[start * block_size..end * block_size],
                        block_size,
                        &query[start * group..end * group],
                    )
                })
                .reduce(|| vec![Element::ZERO; group], add_vectors);
        }

        // Matrix database: give each worker a contiguous row group writing
        // into its own region of the output buffer.
        let rows_per_chunk = rows.div_ceil(self.num_workers);
        let row_elems = cols * block_size;
        let mut answer = vec![Element::ZERO; rows * group];
        answer
            .par_chunks_mut(rows_per_chunk * group)
            .zip(self.db.elements().par_chunks(rows_per_chunk * row_elems))
            .for_each(|(out, entries)| {
                for (i, row) in entries.chunks(row_elems).enumerate() {
                    let res = message_and_tag(row, block_size, query);
                    out[i * group..(i + 1) * group].copy_from_slice(&res);
                }
            });
        answer
    }
}

// Message-and-tag fold of a run of column groups against the matching query
// slice: sum[b] += D[j,b] * q0[j], tag += D[j,b] * q1[j,b]. Zero entries
// contribute nothing and skip both multiplications.
fn message_and_tag(elements: &[Element], block_size: usize, query: &[Element]) -> Vec<Element> {
    let group = block_size + 1;
    let mut sum = vec![Element::ZERO; group];
    for j in 0..elements.len() / block_size {
        for b in 0..block_size {
            let entry = elements[j * block_size + b];
            if entry.is_zero() {
                continue;
            }
            let table = entry.precompute();
            sum[b] += table.mul(query[j * group]);
            sum[block_size] += table.mul(query[j * group + 1 + b]);
        }
    }
    sum
}

fn add_vectors(mut acc: Vec<Element>, other: Vec<Element>) -> Vec<Element> {
    for (a, b) in acc.iter_mut().zip(other.into_iter()) {
        *a += b;
    }
    acc
}

/// Classical XOR-PIR answer engine over a byte database.
pub struct PirServer {
    db: BytesDb,
    num_workers: usize,
}

impl PirServer {
    pub fn new(db: BytesDb) -> PirServer {
        PirServer::with_workers(db, default_workers())
    }

    pub fn with_workers(db: BytesDb, num_workers: usize) -> PirServer {
        PirServer { db, num_workers: num_workers.max(1) }
    }

    pub fn db_info(&self) -> &Info {
        &self.db.info
    }

    /// XOR the blocks of the selected columns, one block per row.
    pub fn answer(&self, query: &[u8]) -> Result<Vec<u8>, SchemeError> {
        let info = &self.db.info;
        let rows = info.num_rows;
        let cols = info.num_columns;
        let block_size = info.block_size;
        if query.len() != cols.div_ceil(8) {
            return Err(SchemeError::InvalidArgument(format!(
                "packed query has {} bytes, want {}",
                query.len(),
                cols.div_ceil(8)
            )));
        }

        if rows == 1 {
            let cols_per_chunk = cols.div_ceil(self.num_workers);
            let num_chunks = cols.div_ceil(cols_per_chunk);
            return Ok((0..num_chunks)
                .into_par_iter()
                .map(|w| {
                    let start = w * cols_per_chunk;
                    let end = (start + cols_per_chunk).min(cols);
                    xor_fold(
                        &self.db.entries()[start * block_size..end * block_size],
                        block_size,
                        query,
                        start,
                    )
                })
                .reduce(
                    || vec![0u8; block_size],
                    |mut acc, part| {
                        xor_bytes_inplace(&mut acc, &part);
                        acc
                    },
                ));
        }

        let rows_per_chunk = rows.div_ceil(self.num_workers);
        let row_bytes = cols * block_size;
        let mut answer = vec![0u8; rows * block_size];
        answer
            .par_chunks_mut(rows_per_chunk * block_size)
            .zip(self.db.entries().par_chunks(rows_per_chunk * row_bytes))
            .for_each(|(out, entries)| {
                for (i, row) in entries.chunks(row_bytes).enumerate() {
                    let res = xor_fold(row, block_size, query, 0);
                    out[i * block_size..(i + 1) * block_size].copy_from_slice(&res);
                }
            });
        Ok(answer)
    }
}

// XOR together the blocks whose query bit is set. `col_offset` positions the
// run inside the packed query when a worker sees only a column chunk.
fn xor_fold(entries: &[u8], block_size: usize, query: &[u8], col_offset: usize) -> Vec<u8> {
    let mut sum = vec![0u8; block_size];
    for j in 0..entries.len() / block_size {
        if bit_at(query, col_offset + j) {
            xor_bytes_inplace(&mut sum, &entries[j * block_size..(j + 1) * block_size]);
        }
    }
    sum
}
