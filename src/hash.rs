//! The cache key: a 32-byte contract hash with a fast, uniform digest so it
//! can be used directly as a `HashMap`/`DashMap` key without re-hashing
//! cryptographic-strength bits through a slower general-purpose hasher.

use std::hash::{BuildHasherDefault, Hash, Hasher};

/// Opaque 32-byte contract identifier. Equality is bytewise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContractHash(pub [u8; 32]);

impl ContractHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ContractHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..")
    }
}

impl Hash for ContractHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // The bytes are already a uniform cryptographic digest; xxh3 over
        // them gives a fast uniform 64-bit map without re-mixing a strong
        // hash through something like SipHash's per-byte processing.
        state.write_u64(xxhash_rust::xxh3::xxh3_64(&self.0));
    }
}

impl From<[u8; 32]> for ContractHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// General-purpose xxh3 digest, exposed for callers that need a fast
/// content hash of raw bytes outside the `ContractHash` key type itself
/// (e.g. the reference compiler backend's per-contract sentinel value).
pub fn xxh3_of(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(bytes)
}

/// `BuildHasher` that trusts [`ContractHash`]'s own `Hash` impl and performs
/// no further mixing, since the xxh3 digest it writes is already uniform.
#[derive(Default, Clone, Copy)]
pub struct ContractHashHasher(u64);

impl Hasher for ContractHashHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        // Only ever called via `write_u64` from `ContractHash::hash`.
        debug_assert_eq!(bytes.len(), 8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        self.0 = u64::from_ne_bytes(buf);
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

/// `BuildHasherDefault` alias for use in `DashMap<ContractHash, V, _>`.
pub type ContractHashBuilder = BuildHasherDefault<ContractHashHasher>;
