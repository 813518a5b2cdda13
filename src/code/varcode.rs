use crate::cache::CacheWeight;
use crate::code::{SharedIntercode, SharedNativecode};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The cache's per-contract record: analyzed code, an optionally-published
/// native entrypoint, and the accumulated interpreted-execution gas used to
/// decide when compilation becomes worthwhile (§3).
///
/// Invariants (enforced by the accessors below, not by the caller):
/// - `nativecode_slot` only ever transitions empty → set, and set → set
///   with a different chain ID; it never regresses to empty.
/// - `intercode_gas_used` only increases.
/// - `intercode` never changes after construction.
pub struct Varcode {
    intercode: SharedIntercode,
    nativecode_slot: RwLock<Option<SharedNativecode>>,
    intercode_gas_used: AtomicU64,
}

impl Varcode {
    pub fn new(intercode: SharedIntercode) -> Self {
        Self {
            intercode,
            nativecode_slot: RwLock::new(None),
            intercode_gas_used: AtomicU64::new(0),
        }
    }

    pub fn with_nativecode(intercode: SharedIntercode, nativecode: SharedNativecode) -> Self {
        Self {
            intercode,
            nativecode_slot: RwLock::new(Some(nativecode)),
            intercode_gas_used: AtomicU64::new(0),
        }
    }

    pub fn intercode(&self) -> &SharedIntercode {
        &self.intercode
    }

    /// Current value of the native code slot. Acquiring the read lock here
    /// is the acquire side of the publish/observe ordering pair described
    /// in §5: any compile that has already released its write holds a fully
    /// constructed `Nativecode` by the time a subsequent reader observes it.
    pub fn nativecode(&self) -> Option<SharedNativecode> {
        self.nativecode_slot.read().clone()
    }

    /// Publishes `nativecode` into the slot. Callers (the compiler worker,
    /// per §4.2) are responsible for only calling this when the transition
    /// is legal: empty → set, or set-with-chain-C → set-with-chain-C'.
    /// Debug builds assert the invariant; release builds trust the caller,
    /// matching the "any panic here escalates to process termination"
    /// posture of §4.2's failure semantics.
    pub fn publish_nativecode(&self, nativecode: SharedNativecode) {
        let mut slot = self.nativecode_slot.write();
        if let Some(existing) = slot.as_ref() {
            debug_assert!(
                existing.chain_id() != nativecode.chain_id(),
                "nativecode_slot must not be rewritten for the same chain id"
            );
        }
        *slot = Some(nativecode);
    }

    /// Adds `gas_used` to the running interpreted-gas counter and returns
    /// the new total. Per the open-question resolution in SPEC_FULL.md
    /// §11, this counter is never reset, including after a successful
    /// compile publish.
    pub fn add_intercode_gas_used(&self, gas_used: u64) -> u64 {
        // Saturating: loop a compare-exchange instead of fetch_add so the
        // counter can never wrap even under pathological gas_used values.
        let mut current = self.intercode_gas_used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(gas_used);
            match self.intercode_gas_used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn intercode_gas_used(&self) -> u64 {
        self.intercode_gas_used.load(Ordering::Relaxed)
    }
}

/// Shared handle: co-owned by the cache entry and any caller that obtained
/// it via `find`/`find_varcode` before the entry was evicted.
pub type SharedVarcode = Arc<Varcode>;

impl CacheWeight for Varcode {
    /// Intercode size rounded up to the allocator's 64-byte page
    /// granularity, per §3's "weight: u32 = intercode.size rounded up".
    fn cache_weight(&self) -> u32 {
        const PAGE: usize = 64;
        (self.intercode.code_size().div_ceil(PAGE) * PAGE) as u32
    }
}
