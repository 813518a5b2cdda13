use std::collections::BTreeSet;
use std::sync::Arc;

/// Analyzed contract bytecode: raw opcode bytes plus precomputed
/// jump-destination offsets. Immutable once built, shared by reference
/// between the cache and any in-flight execution (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercode {
    bytes: Vec<u8>,
    jumpdests: BTreeSet<usize>,
}

impl Intercode {
    /// Builds an `Intercode` from raw bytes and a precomputed jumpdest set.
    /// Analysis itself (finding `JUMPDEST` offsets while skipping `PUSHn`
    /// immediates) is an external collaborator per §6; see
    /// [`crate::analysis`] for the default analyzer this crate ships.
    pub fn new(bytes: Vec<u8>, jumpdests: BTreeSet<usize>) -> Self {
        Self { bytes, jumpdests }
    }

    pub fn code(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte size of the analyzed code; also the cache entry's weight (§3).
    pub fn code_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_jumpdest(&self, offset: usize) -> bool {
        self.jumpdests.contains(&offset)
    }
}

/// Shared-ownership handle: the cache, the VM, and any in-flight execution
/// may all hold one simultaneously; the `Intercode` is dropped only when the
/// last handle is.
pub type SharedIntercode = Arc<Intercode>;
