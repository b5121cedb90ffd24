//! Two-party distributed point function with vector outputs.
//!
//! `keygen` splits a point function mapping one index of `[0, domain)` to a
//! vector `beta` in F^m (and every other index to zero) into two compact
//! keys. The XOR of the two parties' evaluations at any index recovers the
//! point function. Expansion follows the standard correction-word tree; the
//! tree itself stays implicit.

use crate::field::{Element, ELEMENT_BYTES};
use crate::messages::SchemeError;
use crate::xof::Xof;
use serde::{Deserialize, Serialize};

/// Bytes in an internal tree seed.
pub const SEED_BYTES: usize = 16;

const NODE_EXPAND_KEY: [u8; 32] = *b"vpir dpf node expansion key v1..";
const LEAF_CONVERT_KEY: [u8; 32] = *b"vpir dpf leaf conversion key v1.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct CorrectionWord {
    seed: [u8; SEED_BYTES],
    t_left: bool,
    t_right: bool,
}

/// One party's DPF key.
///
/// Serialized opaquely (serde/bincode); only the two endpoints need to agree
/// on the format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DpfKey {
    party: u8,
    domain: u64,
    value_len: u32,
    seed: [u8; SEED_BYTES],
    correction_words: Vec<CorrectionWord>,
    last_word: Vec<Element>,
}

impl DpfKey {
    /// Size of the domain this key expands over.
    pub fn domain(&self) -> usize {
        self.domain as usize
    }

    /// Number of field elements produced per index.
    pub fn value_len(&self) -> usize {
        self.value_len as usize
    }
}

/// Generate a key pair for the point function `index -> beta`.
///
/// Initial seeds are drawn from `xof`. Requires `domain >= 1`,
/// `index < domain` and a non-empty `beta`.
pub fn keygen(
    beta: &[Element],
    index: usize,
    domain: usize,
    xof: &mut Xof,
) -> Result<(DpfKey, DpfKey), SchemeError> {
    if domain == 0 {
        return Err(SchemeError::InvalidArgument("dpf domain must be non-empty".into()));
    }
    if index >= domain {
        return Err(SchemeError::InvalidArgument(format!(
            "dpf index {} out of domain {}",
            index, domain
        )));
    }
    if beta.is_empty() {
        return Err(SchemeError::InvalidArgument("dpf value must be non-empty".into()));
    }

    let bits = domain_bits(domain);
    let mut seed0 = [0u8; SEED_BYTES];
    let mut seed1 = [0u8; SEED_BYTES];
    xof.read(&mut seed0);
    xof.read(&mut seed1);

    let mut s0 = seed0;
    let mut s1 = seed1;
    let mut t0 = false;
    let mut t1 = true;
    let mut correction_words = Vec::with_capacity(bits as usize);

    for level in 0..bits {
        let bit = (index >> (bits - 1 - level)) & 1 == 1;
        let (s0l, t0l, s0r, t0r) = expand(&s0);
        let (s1l, t1l, s1r, t1r) = expand(&s1);

        // Keep the child on the path to `index`, correct the other one so
        // both parties' seeds collapse to equality off the path.
        let (keep0, keep1, lose0, lose1) = if bit {
            ((s0r, t0r), (s1r, t1r), s0l, s1l)
        } else {
            ((s0l, t0l), (s1l, t1l), s0r, s1r)
        };
        let seed_cw = xor_seeds(&lose0, &lose1);
        let t_left_cw = t0l ^ t1l ^ bit ^ true;
        let t_right_cw = t0r ^ t1r ^ bit;
        let t_keep_cw = if bit { t_right_cw } else { t_left_cw };

        s0 = if t0 { xor_seeds(&keep0.0, &seed_cw) } else { keep0.0 };
        s1 = if t1 { xor_seeds(&keep1.0, &seed_cw) } else { keep1.0 };
        t0 = keep0.1 ^ (t0 & t_keep_cw);
        t1 = keep1.1 ^ (t1 & t_keep_cw);

        correction_words.push(CorrectionWord {
            seed: seed_cw,
            t_left: t_left_cw,
            t_right: t_right_cw,
        });
    }

    let conv0 = convert(&s0, beta.len());
    let conv1 = convert(&s1, beta.len());
    let last_word: Vec<Element> = beta
        .iter()
        .zip(conv0.iter().zip(conv1.iter()))
        .map(|(&b, (&c0, &c1))| b + c0 + c1)
        .collect();

    let k0 = DpfKey {
        party: 0,
        domain: domain as u64,
        value_len: beta.len() as u32,
        seed: seed0,
        correction_words: correction_words.clone(),
        last_word: last_word.clone(),
    };
    let k1 = DpfKey {
        party: 1,
        domain: domain as u64,
        value_len: beta.len() as u32,
        seed: seed1,
        correction_words,
        last_word,
    };
    Ok((k0, k1))
}

/// Evaluate one party's share at a single index.
pub fn eval(key: &DpfKey, index: usize) -> Result<Vec<Element>, SchemeError> {
    if index >= key.domain() {
        return Err(SchemeError::InvalidArgument(format!(
            "dpf index {} out of domain {}",
            index, key.domain
        )));
    }
    let bits = domain_bits(key.domain());
    let mut seed = key.seed;
    let mut t = key.party == 1;
    for level in 0..bits {
        let cw = &key.correction_words[level as usize];
        let (mut sl, mut tl, mut sr, mut tr) = expand(&seed);
        if t {
            sl = xor_seeds(&sl, &cw.seed);
            sr = xor_seeds(&sr, &cw.seed);
            tl ^= cw.t_left;
            tr ^= cw.t_right;
        }
        if (index >> (bits - 1 - level)) & 1 == 1 {
            seed = sr;
            t = tr;
        } else {
            seed = sl;
            t = tl;
        }
    }
    Ok(leaf_value(key, &seed, t))
}

/// Expand one party's share over the whole domain.
///
/// Returns a flat vector of `domain * value_len` elements, the `value_len`
/// elements of index `j` stored contiguously. Level-order expansion keeps
/// the work linear in the domain; levels are capped at the node count that
/// covers `[0, domain)` so non-power-of-two domains skip dead subtrees.
pub fn full_eval(key: &DpfKey) -> Vec<Element> {
    let domain = key.domain();
    let bits = domain_bits(domain);
    let mut nodes: Vec<([u8; SEED_BYTES], bool)> = vec![(key.seed, key.party == 1)];

    for level in 0..bits {
        let span = 1usize << (bits - 1 - level);
        let needed = domain.div_ceil(span);
        let cw = &key.correction_words[level as usize];
        let mut next = Vec::with_capacity(needed);
        for (seed, t) in &nodes {
            let (mut sl, mut tl, mut sr, mut tr) = expand(seed);
            if *t {
                sl = xor_seeds(&sl, &cw.seed);
                sr = xor_seeds(&sr, &cw.seed);
                tl ^= cw.t_left;
                tr ^= cw.t_right;
            }
            next.push((sl, tl));
            if next.len() < needed {
                next.push((sr, tr));
            }
            if next.len() == needed {
                break;
            }
        }
        nodes = next;
    }

    let mut out = Vec::with_capacity(domain * key.value_len());
    for (seed, t) in &nodes {
        out.extend(leaf_value(key, seed, *t));
    }
    out
}

fn leaf_value(key: &DpfKey, seed: &[u8; SEED_BYTES], t: bool) -> Vec<Element> {
    let mut value = convert(seed, key.value_len());
    if t {
        for (v, cw) in value.iter_mut().zip(key.last_word.iter()) {
            *v += *cw;
        }
    }
    value
}

// PRG step: one 16-byte seed to two child seeds and two control bits.
fn expand(seed: &[u8; SEED_BYTES]) -> ([u8; SEED_BYTES], bool, [u8; SEED_BYTES], bool) {
    let mut hasher = blake3::Hasher::new_keyed(&NODE_EXPAND_KEY);
    hasher.update(seed);
    let mut out = [0u8; 2 * SEED_BYTES + 2];
    hasher.finalize_xof().fill(&mut out);
    let mut left = [0u8; SEED_BYTES];
    let mut right = [0u8; SEED_BYTES];
    left.copy_from_slice(&out[..SEED_BYTES]);
    right.copy_from_slice(&out[SEED_BYTES..2 * SEED_BYTES]);
    (left, out[2 * SEED_BYTES] & 1 == 1, right, out[2 * SEED_BYTES + 1] & 1 == 1)
}

// Convert a leaf seed into `n` field elements.
fn convert(seed: &[u8; SEED_BYTES], n: usize) -> Vec<Element> {
    let mut hasher = blake3::Hasher::new_keyed(&LEAF_CONVERT_KEY);
    hasher.update(seed);
    let mut bytes = vec![0u8; n * ELEMENT_BYTES];
    hasher.finalize_xof().fill(&mut bytes);
    bytes
        .chunks_exact(ELEMENT_BYTES)
        .map(|chunk| Element::from_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn xor_seeds(a: &[u8; SEED_BYTES], b: &[u8; SEED_BYTES]) -> [u8; SEED_BYTES] {
    let mut out = [0u8; SEED_BYTES];
    for i in 0..SEED_BYTES {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn domain_bits(domain: usize) -> u32 {
    if domain <= 1 {
        0
    } else {
        usize::BITS - (domain - 1).leading_zeros()
    }
}
