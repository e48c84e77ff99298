//! Job identifiers and the trace identities derived from them.
//!
//! A job's UUID is the only thing two independent runs need to agree on: the
//! trace id and root span id are pure functions of it, so a reconstruction
//! and a later attaching tool land in the same trace without talking to each
//! other. Every other span id comes from a [`SpanIdGenerator`] owned by the run.

use crate::{Error, Result};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

const URN_PREFIX: &str = "urn:uuid:";
const CANONICAL_LEN: usize = 36;
const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Hex segments of the canonical form mapped onto the 16 output bytes,
/// in UUID field order: time-low, time-mid, time-hi-and-version, clock-seq, node.
const SEGMENTS: [(usize, usize, usize); 5] = [
    (0, 8, 0),
    (9, 13, 4),
    (14, 18, 6),
    (19, 23, 8),
    (24, 36, 10),
];

/// External job identifier, a 128-bit value written as a dashed UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// Parse the canonical 36-character form, optionally `urn:uuid:`-prefixed.
    ///
    /// Braced, undashed and other lenient spellings are rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let body = strip_urn(input)?;
        let raw = body.as_bytes();

        for pos in DASH_POSITIONS {
            if raw[pos] != b'-' {
                return Err(Error::InvalidFormat(format!(
                    "expected '-' at offset {pos} in {input:?}"
                )));
            }
        }

        let mut bytes = [0u8; 16];
        for (from, to, out) in SEGMENTS {
            let len = (to - from) / 2;
            hex::decode_to_slice(&raw[from..to], &mut bytes[out..out + len])
                .map_err(|e| Error::InvalidHex(format!("{input:?}: {e}")))?;
        }

        Ok(Self(Uuid::from_bytes(bytes)))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

fn strip_urn(input: &str) -> Result<&str> {
    match input.len() {
        CANONICAL_LEN => Ok(input),
        len if len == CANONICAL_LEN + URN_PREFIX.len() => {
            match input.get(..URN_PREFIX.len()) {
                Some(prefix) if prefix.eq_ignore_ascii_case(URN_PREFIX) => {
                    Ok(&input[URN_PREFIX.len()..])
                }
                _ => Err(Error::InvalidFormat(format!(
                    "expected {URN_PREFIX} prefix in {input:?}"
                ))),
            }
        }
        len => Err(Error::InvalidFormat(format!(
            "expected {CANONICAL_LEN} characters, got {len}"
        ))),
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Trace id and root span id for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceIdentity {
    pub trace_id: [u8; 16],
    pub root_span_id: [u8; 8],
}

impl TraceIdentity {
    /// The trace id is the job id bit for bit; the root span id is its first 8 bytes.
    pub fn derive(job: &JobId) -> Self {
        let trace_id = *job.as_bytes();
        let mut root_span_id = [0u8; 8];
        root_span_id.copy_from_slice(&trace_id[..8]);
        Self {
            trace_id,
            root_span_id,
        }
    }

    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn root_span_id_hex(&self) -> String {
        hex::encode(self.root_span_id)
    }

    /// W3C trace context rejects all-zero ids, so a nil job id cannot name a trace.
    pub fn is_valid(&self) -> bool {
        self.trace_id != [0; 16] && self.root_span_id != [0; 8]
    }
}

/// Source of span ids for every span except the root.
///
/// Seeded once per run and shared by reference; draws are serialized
/// through a mutex.
#[derive(Debug)]
pub struct SpanIdGenerator {
    rng: Mutex<StdRng>,
}

impl SpanIdGenerator {
    /// Seed from the operating system's secure random source.
    pub fn from_entropy() -> Result<Self> {
        Self::from_source(&mut OsRng)
    }

    /// Seed from an arbitrary source. A failed read aborts instead of
    /// falling back to a partial seed.
    pub fn from_source<R: RngCore + ?Sized>(source: &mut R) -> Result<Self> {
        let mut seed = [0u8; 8];
        source
            .try_fill_bytes(&mut seed)
            .map_err(|e| Error::Entropy(e.to_string()))?;
        Ok(Self::with_seed(i64::from_le_bytes(seed)))
    }

    pub fn with_seed(seed: i64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed as u64)),
        }
    }

    /// Next non-zero span id.
    pub fn next_span_id(&self) -> [u8; 8] {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = rng.next_u64();
            if id != 0 {
                return id.to_be_bytes();
            }
        }
    }

    /// Next non-zero trace id, for spans started without any parent.
    pub fn next_trace_id(&self) -> [u8; 16] {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = (u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64());
            if id != 0 {
                return id.to_be_bytes();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

    #[test]
    fn test_parse_canonical_layout() {
        let id = JobId::parse(CANONICAL).unwrap();
        assert_eq!(
            id.as_bytes(),
            &[
                0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f,
                0xd4, 0x30, 0xc8
            ]
        );
    }

    #[test]
    fn test_parse_roundtrip_folds_case() {
        let upper = CANONICAL.to_uppercase();
        let id = JobId::parse(&upper).unwrap();
        assert_eq!(id.to_string(), CANONICAL);
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_urn_prefix() {
        let plain = JobId::parse(CANONICAL).unwrap();
        let urn = JobId::parse(&format!("urn:uuid:{CANONICAL}")).unwrap();
        let shouty = JobId::parse(&format!("URN:UUID:{CANONICAL}")).unwrap();
        assert_eq!(plain, urn);
        assert_eq!(plain, shouty);
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        let too_long = format!("{CANONICAL}0");
        for input in ["", "6ba7b810", &CANONICAL[..35], too_long.as_str()] {
            assert!(matches!(
                JobId::parse(input),
                Err(Error::InvalidFormat(_))
            ));
        }
        // 45 characters without the urn prefix
        let padded = format!("xxxxxxxxx{CANONICAL}");
        assert!(matches!(JobId::parse(&padded), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_rejects_misplaced_dashes() {
        let shifted = "6ba7b8109-dad-11d1-80b4-00c04fd430c8";
        assert!(matches!(JobId::parse(shifted), Err(Error::InvalidFormat(_))));

        let braced = "{6ba7b810-9dad-11d1-80b4-00c04fd430}";
        assert!(matches!(JobId::parse(braced), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let bad = "6ba7b810-9dad-11d1-80b4-00c04fd430cg";
        assert!(matches!(JobId::parse(bad), Err(Error::InvalidHex(_))));

        let dash_in_hex_slot = "6ba7b810-9dad-11d1-80b4-00c04fd-30c8";
        assert!(matches!(
            JobId::parse(dash_in_hex_slot),
            Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn test_parse_rejects_multibyte_prefix() {
        let sneaky = format!("urn:uuid\u{e9}{}", &CANONICAL[1..]);
        assert_eq!(sneaky.len(), 45);
        assert!(matches!(JobId::parse(&sneaky), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = TraceIdentity::derive(&JobId::parse(CANONICAL).unwrap());
        let b = TraceIdentity::derive(&JobId::parse(CANONICAL).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.trace_id_hex(), "6ba7b8109dad11d180b400c04fd430c8");
        assert_eq!(a.root_span_id_hex(), "6ba7b8109dad11d1");
        assert!(a.is_valid());
    }

    #[test]
    fn test_nil_identity_is_invalid() {
        let nil = JobId::from_uuid(Uuid::nil());
        assert!(nil.is_nil());
        assert!(!TraceIdentity::derive(&nil).is_valid());
    }

    #[test]
    fn test_generator_is_reproducible_per_seed() {
        let a = SpanIdGenerator::with_seed(42);
        let b = SpanIdGenerator::with_seed(42);
        let first: Vec<_> = (0..8).map(|_| a.next_span_id()).collect();
        let second: Vec<_> = (0..8).map(|_| b.next_span_id()).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|id| *id != [0; 8]));
    }

    #[test]
    fn test_generator_draws_do_not_repeat() {
        let generator = SpanIdGenerator::from_entropy().unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generator.next_span_id()));
        }
    }

    struct BrokenSource;

    impl RngCore for BrokenSource {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new("entropy pool unavailable"))
        }
    }

    #[test]
    fn test_generator_fails_fast_on_bad_source() {
        let err = SpanIdGenerator::from_source(&mut BrokenSource).unwrap_err();
        assert!(matches!(err, Error::Entropy(_)));
    }
}
