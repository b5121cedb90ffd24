//! Clients: query construction and verified reconstruction.
//!
//! A client holds the negotiated database info and a deterministic byte
//! source. Each query creates one-shot state `(ix, iy, alpha, gammas)` that
//! the matching reconstruction consumes; reconstruction is all-or-nothing
//! and returns either the block or an error.

use crate::database::{Info, PirMode};
use crate::dpf::{self, DpfKey};
use crate::field::Element;
use crate::merkle;
use crate::messages::{self, SchemeError};
use crate::server::xor_bytes_inplace;
use crate::xof::Xof;

struct QueryState {
    ix: usize,
    iy: usize,
    alpha: Element,
    gammas: Vec<Element>,
}

// Map a block index to (target column, target row). A vector database is the
// one-row special case, so the same formula serves both layouts.
fn split_index(info: &Info, index: usize) -> Result<(usize, usize), SchemeError> {
    if index >= info.num_blocks() {
        return Err(SchemeError::InvalidArgument(format!(
            "index {} out of {} blocks",
            index,
            info.num_blocks()
        )));
    }
    Ok((index % info.num_columns, index / info.num_columns))
}

fn sample_nonzero(xof: &mut Xof) -> Element {
    loop {
        let candidate = Element::random(xof);
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

// Draw the per-query secrets and lay out the plaintext query vector E:
// zero everywhere except block ix, which carries alpha and the blinded tag
// randomizers gamma[b] * alpha.
fn build_state_and_plain(
    info: &Info,
    index: usize,
    xof: &mut Xof,
) -> Result<(QueryState, Vec<Element>), SchemeError> {
    let (ix, iy) = split_index(info, index)?;
    let alpha = sample_nonzero(xof);
    let gammas = if info.block_size == 0 {
        Vec::new()
    } else {
        Element::random_vector(info.block_size, xof)
    };

    let group = info.group_len();
    let mut plain = vec![Element::ZERO; info.num_columns * group];
    plain[ix * group] = alpha;
    for (b, gamma) in gammas.iter().enumerate() {
        plain[ix * group + 1 + b] = *gamma * alpha;
    }
    Ok((QueryState { ix, iy, alpha, gammas }, plain))
}

// Sum the per-server answers componentwise, verify every row's tag (or, for
// single-bit databases, every position), and decode the target block.
fn reconstruct_vpir(
    info: &Info,
    state: &QueryState,
    answers: &[Vec<Element>],
) -> Result<Vec<Element>, SchemeError> {
    let group = info.group_len();
    let expected = info.num_rows * group;
    if answers.is_empty() || answers.iter().any(|a| a.len() != expected) {
        return Err(SchemeError::InvalidArgument(format!(
            "answers must each hold {} elements",
            expected
        )));
    }

    let mut sum = vec![Element::ZERO; expected];
    for answer in answers {
        for (s, a) in sum.iter_mut().zip(answer.iter()) {
            *s += *a;
        }
    }

    if info.block_size == 0 {
        // Every position must reconstruct to 0 or alpha; anything else means
        // a server deviated.
        for s in &sum {
            if !s.is_zero() && *s != state.alpha {
                return Err(SchemeError::VerificationRejected);
            }
        }
        let value = if sum[state.iy] == state.alpha {
            Element::one()
        } else {
            Element::zero()
        };
        return Ok(vec![value]);
    }

    let block_size = info.block_size;
    for r in 0..info.num_rows {
        let row = &sum[r * group..(r + 1) * group];
        let mut tag = Element::ZERO;
        for (b, gamma) in state.gammas.iter().enumerate() {
            tag += *gamma * row[b];
        }
        if row[block_size] != tag {
            return Err(SchemeError::VerificationRejected);
        }
    }

    let inv = state.alpha.inverse();
    let row = &sum[state.iy * group..(state.iy + 1) * group];
    Ok(row[..block_size].iter().map(|m| *m * inv).collect())
}

/// Information-theoretic VPIR client: additive secret sharing over two or
/// more servers.
pub struct ItClient {
    xof: Xof,
    info: Info,
    state: Option<QueryState>,
}

impl ItClient {
    pub fn new(xof: Xof, info: Info) -> ItClient {
        ItClient { xof, info, state: None }
    }

    /// Build one query share per server for the given block index.
    pub fn query(
        &mut self,
        index: usize,
        num_servers: usize,
    ) -> Result<Vec<Vec<Element>>, SchemeError> {
        if num_servers < 2 {
            return Err(SchemeError::InvalidArgument(format!(
                "need at least 2 servers, got {}",
                num_servers
            )));
        }
        let (state, plain) = build_state_and_plain(&self.info, index, &mut self.xof)?;

        // The first n-1 shares are fresh uniform vectors; the last share is
        // E plus their sum, so the shares add up to E.
        let len = plain.len();
        let mut shares = Vec::with_capacity(num_servers);
        let mut last = plain;
        for _ in 0..num_servers - 1 {
            let share = Element::random_vector(len, &mut self.xof);
            for (l, s) in last.iter_mut().zip(share.iter()) {
                *l += *s;
            }
            shares.push(share);
        }
        shares.push(last);

        self.state = Some(state);
        Ok(shares)
    }

    /// Wire-format variant of [`ItClient::query`].
    pub fn query_bytes(
        &mut self,
        index: usize,
        num_servers: usize,
    ) -> Result<Vec<Vec<u8>>, SchemeError> {
        let shares = self.query(index, num_servers)?;
        Ok(shares.iter().map(|s| messages::encode_elements(s)).collect())
    }

    /// Combine the answers, verify the tags and return the block.
    pub fn reconstruct(&mut self, answers: &[Vec<Element>]) -> Result<Vec<Element>, SchemeError> {
        let state = self
            .state
            .take()
            .ok_or_else(|| SchemeError::InvalidArgument("no pending query".into()))?;
        reconstruct_vpir(&self.info, &state, answers)
    }

    /// Wire-format variant of [`ItClient::reconstruct`].
    pub fn reconstruct_bytes(&mut self, answers: &[Vec<u8>]) -> Result<Vec<Element>, SchemeError> {
        let decoded = answers
            .iter()
            .map(|a| messages::decode_elements(a))
            .collect::<Result<Vec<_>, _>>()?;
        self.reconstruct(&decoded)
    }
}

/// DPF-based VPIR client for exactly two servers.
pub struct DpfClient {
    xof: Xof,
    info: Info,
    state: Option<QueryState>,
}

impl DpfClient {
    pub fn new(xof: Xof, info: Info) -> DpfClient {
        DpfClient { xof, info, state: None }
    }

    /// Build the two DPF keys whose expansions share the query vector.
    pub fn query(&mut self, index: usize, num_servers: usize) -> Result<Vec<DpfKey>, SchemeError> {
        if num_servers != 2 {
            return Err(SchemeError::InvalidArgument(format!(
                "dpf scheme requires exactly 2 servers, got {}",
                num_servers
            )));
        }
        let (state, _) = build_state_and_plain(&self.info, index, &mut self.xof)?;

        // The point value is block ix of the plaintext query: alpha followed
        // by the blinded tag randomizers.
        let mut beta = Vec::with_capacity(self.info.group_len());
        beta.push(state.alpha);
        for gamma in &state.gammas {
            beta.push(*gamma * state.alpha);
        }
        let (k0, k1) = dpf::keygen(&beta, state.ix, self.info.num_columns, &mut self.xof)?;

        self.state = Some(state);
        Ok(vec![k0, k1])
    }

    /// Wire-format variant of [`DpfClient::query`].
    pub fn query_bytes(
        &mut self,
        index: usize,
        num_servers: usize,
    ) -> Result<Vec<Vec<u8>>, SchemeError> {
        let keys = self.query(index, num_servers)?;
        keys.iter().map(messages::encode_dpf_key).collect()
    }

    /// Combine the answers, verify the tags and return the block.
    pub fn reconstruct(&mut self, answers: &[Vec<Element>]) -> Result<Vec<Element>, SchemeError> {
        let state = self
            .state
            .take()
            .ok_or_else(|| SchemeError::InvalidArgument("no pending query".into()))?;
        reconstruct_vpir(&self.info, &state, answers)
    }

    /// Wire-format variant of [`DpfClient::reconstruct`].
    pub fn reconstruct_bytes(&mut self, answers: &[Vec<u8>]) -> Result<Vec<Element>, SchemeError> {
        let decoded = answers
            .iter()
            .map(|a| messages::decode_elements(a))
            .collect::<Result<Vec<_>, _>>()?;
        self.reconstruct(&decoded)
    }
}

/// Classical PIR client; handles plain and Merkle-authenticated databases.
pub struct PirClient {
    xof: Xof,
    info: Info,
    state: Option<(usize, usize)>,
}

impl PirClient {
    pub fn new(xof: Xof, info: Info) -> PirClient {
        PirClient { xof, info, state: None }
    }

    /// Build one bit-packed query share per server.
    pub fn query(&mut self, index: usize, num_servers: usize) -> Result<Vec<Vec<u8>>, SchemeError> {
        if num_servers < 2 {
            return Err(SchemeError::InvalidArgument(format!(
                "need at least 2 servers, got {}",
                num_servers
            )));
        }
        let (ix, iy) = split_index(&self.info, index)?;

        let packed_len = self.info.num_columns.div_ceil(8);
        let mut last = vec![0u8; packed_len];
        last[ix / 8] ^= 1 << (ix % 8);
        let mut shares = Vec::with_capacity(num_servers);
        for _ in 0..num_servers - 1 {
            let mut share = vec![0u8; packed_len];
            self.xof.read(&mut share);
            xor_bytes_inplace(&mut last, &share);
            shares.push(share);
        }
        shares.push(last);

        self.state = Some((ix, iy));
        Ok(shares)
    }

    /// XOR the answers, pick the target row and, for Merkle databases,
    /// verify the embedded proof against the pinned root before stripping it.
    pub fn reconstruct(&mut self, answers: &[Vec<u8>]) -> Result<Vec<u8>, SchemeError> {
        let (ix, iy) = self
            .state
            .take()
            .ok_or_else(|| SchemeError::InvalidArgument("no pending query".into()))?;

        let block_size = self.info.block_size;
        let expected = self.info.num_rows * block_size;
        if answers.is_empty() || answers.iter().any(|a| a.len() != expected) {
            return Err(SchemeError::InvalidArgument(format!(
                "answers must each hold {} bytes",
                expected
            )));
        }

        let mut sum = vec![0u8; expected];
        for answer in answers {
            xor_bytes_inplace(&mut sum, answer);
        }
        let row = &sum[iy * block_size..(iy + 1) * block_size];

        match self.info.mode {
            PirMode::Classic => Ok(row.to_vec()),
            PirMode::Merkle => {
                let (block, proof_bytes) = row.split_at(self.info.user_block_size());
                let proof = merkle::Proof::from_bytes(proof_bytes)
                    .map_err(|_| SchemeError::VerificationRejected)?;
                if proof.index() != (iy * self.info.num_columns + ix) as u64 {
                    return Err(SchemeError::VerificationRejected);
                }
                let root: [u8; merkle::HASH_BYTES] = self
                    .info
                    .merkle_root
                    .as_deref()
                    .and_then(|r| r.try_into().ok())
                    .ok_or_else(|| {
                        SchemeError::InvalidArgument("database info carries no merkle root".into())
                    })?;
                if !merkle::verify(block, &proof, &root) {
                    return Err(SchemeError::VerificationRejected);
                }
                Ok(block.to_vec())
            }
            PirMode::Authenticated => Err(SchemeError::InvalidArgument(
                "classic client cannot serve an authenticated database".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{BytesDb, Db};
    use crate::server::{PirServer, Server};

    fn it_roundtrip(db: Db, num_servers: usize) {
        let info = db.info.clone();
        let expected: Vec<Vec<Element>> =
            (0..info.num_blocks()).map(|i| db.block(i).to_vec()).collect();
        let server = Server::with_workers(db, 2);
        let mut client = ItClient::new(Xof::keyed(b"my key"), info.clone());
        for (i, want) in expected.iter().enumerate() {
            let queries = client.query(i, num_servers).unwrap();
            let answers: Vec<Vec<Element>> =
                queries.iter().map(|q| server.answer(q).unwrap()).collect();
            let got = client.reconstruct(&answers).unwrap();
            if info.block_size == 0 {
                assert_eq!(got, vec![want[0]], "bit {}", i);
            } else {
                assert_eq!(&got, want, "block {}", i);
            }
        }
    }

    #[test]
    fn test_it_single_bit_roundtrip() {
        it_roundtrip(Db::single_bit_from_bytes(b"ab", false), 3);
        it_roundtrip(Db::single_bit_from_bytes(b"ab", true), 3);
    }

    #[test]
    fn test_it_multi_bit_roundtrip() {
        let mut xof = Xof::keyed(b"db key");
        it_roundtrip(Db::random(&mut xof, 1 << 13, 1, 4), 2);
        let elements = Element::random_vector(3 * 3 * 2, &mut xof);
        it_roundtrip(
            Db::from_elements(crate::database::Info::authenticated(3, 3, 2), elements).unwrap(),
            3,
        );
    }

    #[test]
    fn test_it_rejects_tampered_answer() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 1 << 12, 1, 4);
        let info = db.info.clone();
        let server = Server::new(db);
        let mut client = ItClient::new(Xof::keyed(b"my key"), info);

        let queries = client.query(0, 2).unwrap();
        let mut answers: Vec<Vec<Element>> =
            queries.iter().map(|q| server.answer(q).unwrap()).collect();
        answers[0][1] += Element::one();
        let err = client.reconstruct(&answers).unwrap_err();
        assert!(matches!(err, SchemeError::VerificationRejected));
    }

    #[test]
    fn test_it_argument_checks() {
        let info = crate::database::Info::authenticated(1, 8, 2);
        let mut client = ItClient::new(Xof::keyed(b"my key"), info);
        assert!(client.query(0, 1).is_err());
        assert!(client.query(8, 2).is_err());
        assert!(client.reconstruct(&[]).is_err());
    }

    #[test]
    fn test_dpf_roundtrip_and_tamper() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 1 << 13, 1, 4);
        let info = db.info.clone();
        let expected: Vec<Vec<Element>> =
            (0..info.num_blocks()).map(|i| db.block(i).to_vec()).collect();
        let server = Server::with_workers(db, 2);
        let mut client = DpfClient::new(Xof::keyed(b"my key"), info.clone());

        assert!(client.query(0, 3).is_err());

        for (i, want) in expected.iter().enumerate() {
            let keys = client.query(i, 2).unwrap();
            let answers: Vec<Vec<Element>> =
                keys.iter().map(|k| server.answer_dpf(k).unwrap()).collect();
            assert_eq!(&client.reconstruct(&answers).unwrap(), want, "block {}", i);
        }

        let keys = client.query(3, 2).unwrap();
        let mut answers: Vec<Vec<Element>> =
            keys.iter().map(|k| server.answer_dpf(k).unwrap()).collect();
        answers[1][0] += Element::one();
        assert!(matches!(
            client.reconstruct(&answers).unwrap_err(),
            SchemeError::VerificationRejected
        ));
    }

    #[test]
    fn test_dpf_single_bit_roundtrip() {
        let db = Db::single_bit_from_bytes(b"hi", false);
        let info = db.info.clone();
        let bits: Vec<Element> = (0..info.num_blocks()).map(|i| db.get_entry(i)).collect();
        let server = Server::new(db);
        let mut client = DpfClient::new(Xof::keyed(b"my key"), info);
        for (i, want) in bits.iter().enumerate() {
            let keys = client.query(i, 2).unwrap();
            let answers: Vec<Vec<Element>> =
                keys.iter().map(|k| server.answer_dpf(k).unwrap()).collect();
            assert_eq!(client.reconstruct(&answers).unwrap(), vec![*want], "bit {}", i);
        }
    }

    #[test]
    fn test_classic_roundtrip() {
        let mut xof = Xof::keyed(b"db key");
        for rows in [1usize, 4] {
            let db = BytesDb::random(&mut xof, 1 << 12, rows, 8).unwrap();
            let info = db.info.clone();
            let expected: Vec<Vec<u8>> =
                (0..info.num_blocks()).map(|i| db.block(i).to_vec()).collect();
            let server = PirServer::with_workers(db, 2);
            let mut client = PirClient::new(Xof::stream(&[1u8; 16]), info.clone());
            for (i, want) in expected.iter().enumerate() {
                let queries = client.query(i, 2).unwrap();
                let answers: Vec<Vec<u8>> =
                    queries.iter().map(|q| server.answer(q).unwrap()).collect();
                assert_eq!(&client.reconstruct(&answers).unwrap(), want, "block {}", i);
            }
        }
    }

    #[test]
    fn test_merkle_roundtrip_and_tamper() {
        let mut xof = Xof::keyed(b"db key");
        let plain = BytesDb::random(&mut xof, 1 << 13, 1, 16).unwrap();
        let db = merkle::augment(&plain).unwrap();
        let info = db.info.clone();
        let server = PirServer::new(db);
        let mut client = PirClient::new(Xof::stream(&[2u8; 16]), info.clone());

        for i in 0..info.num_blocks() {
            let queries = client.query(i, 2).unwrap();
            let answers: Vec<Vec<u8>> =
                queries.iter().map(|q| server.answer(q).unwrap()).collect();
            assert_eq!(client.reconstruct(&answers).unwrap(), plain.block(i), "block {}", i);
        }

        let queries = client.query(0, 2).unwrap();
        let mut answers: Vec<Vec<u8>> =
            queries.iter().map(|q| server.answer(q).unwrap()).collect();
        answers[0][0] ^= 1;
        assert!(matches!(
            client.reconstruct(&answers).unwrap_err(),
            SchemeError::VerificationRejected
        ));
    }

    #[test]
    fn test_query_shares_sum_to_plain_vector() {
        let info = crate::database::Info::authenticated(1, 4, 2);
        let mut client = ItClient::new(Xof::keyed(b"my key"), info.clone());
        let shares = client.query(2, 3).unwrap();
        let mut sum = vec![Element::ZERO; info.num_columns * info.group_len()];
        for share in &shares {
            for (s, x) in sum.iter_mut().zip(share.iter()) {
                *s += *x;
            }
        }
        // Only the target group is populated.
        let group = info.group_len();
        for (i, value) in sum.iter().enumerate() {
            if i / group == 2 {
                if i % group == 0 {
                    assert!(!value.is_zero());
                }
            } else {
                assert!(value.is_zero(), "position {}", i);
            }
        }
    }
}
