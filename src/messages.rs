//! Wire messages, codecs and protocol error types.

use crate::database::Info;
use crate::dpf::DpfKey;
use crate::field::{Element, ELEMENT_BYTES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by query construction, answering and reconstruction.
#[derive(Debug, Error)]
pub enum SchemeError {
    /// Out-of-range index, bad server count, bad shapes. A programming bug.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Tag or Merkle-proof mismatch; the retrieval is untrustworthy and no
    /// block is returned.
    #[error("verification rejected")]
    VerificationRejected,
    /// Malformed wire bytes from a peer.
    #[error("malformed wire bytes: {0}")]
    DecodeFailure(String),
}

/// Errors carried from the transport; never recovered locally.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("request timed out")]
    Timeout,
    #[error("connection to {0} failed: {1}")]
    Connect(String, String),
    #[error("transport i/o: {0}")]
    Io(String),
    #[error("peer sent malformed frame: {0}")]
    Decode(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("servers returned inconsistent database info")]
    InfoMismatch,
}

/// Failure loading or saving the persisted database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt database file: {0}")]
    Corrupt(String),
}

/// Retrieval scheme selector, shared by the binaries and the RPC service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    PirClassic,
    PirMerkle,
    VpirIt,
    VpirDpf,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Scheme> {
        match s {
            "pir-classic" => Some(Scheme::PirClassic),
            "pir-merkle" => Some(Scheme::PirMerkle),
            "vpir-it" => Some(Scheme::VpirIt),
            "vpir-dpf" => Some(Scheme::VpirDpf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::PirClassic => "pir-classic",
            Scheme::PirMerkle => "pir-merkle",
            Scheme::VpirIt => "vpir-it",
            Scheme::VpirDpf => "vpir-dpf",
        }
    }
}

/// Client-to-server RPC request. No state is kept between requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    DatabaseInfo,
    Query(Vec<u8>),
}

/// Server-to-client RPC response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    DatabaseInfo(Info),
    Answer(Vec<u8>),
    Error(String),
}

/// Encode a vector of field elements in logical order, 16 bytes each.
pub fn encode_elements(elements: &[Element]) -> Vec<u8> {
    let mut out = Vec::with_capacity(elements.len() * ELEMENT_BYTES);
    for e in elements {
        out.extend_from_slice(&e.to_bytes());
    }
    out
}

/// Decode a vector of field elements; the byte count must be a multiple of 16.
pub fn decode_elements(bytes: &[u8]) -> Result<Vec<Element>, SchemeError> {
    if bytes.len() % ELEMENT_BYTES != 0 {
        return Err(SchemeError::DecodeFailure(format!(
            "element vector length {} not a multiple of {}",
            bytes.len(),
            ELEMENT_BYTES
        )));
    }
    Ok(bytes
        .chunks_exact(ELEMENT_BYTES)
        .map(|chunk| Element::from_bytes(chunk.try_into().unwrap()))
        .collect())
}

/// Encode a DPF key for the wire.
pub fn encode_dpf_key(key: &DpfKey) -> Result<Vec<u8>, SchemeError> {
    bincode::serialize(key).map_err(|e| SchemeError::DecodeFailure(e.to_string()))
}

/// Decode a DPF key from the wire.
pub fn decode_dpf_key(bytes: &[u8]) -> Result<DpfKey, SchemeError> {
    bincode::deserialize(bytes).map_err(|e| SchemeError::DecodeFailure(e.to_string()))
}

/// Pack a bit vector into bytes, bit `i` at `out[i / 8] >> (i % 8)`.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Read bit `i` of a packed bit vector.
pub fn bit_at(bytes: &[u8], i: usize) -> bool {
    (bytes[i / 8] >> (i % 8)) & 1 == 1
}
