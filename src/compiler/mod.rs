//! The async compiler service (§4.2): a bounded work queue serviced by a
//! fixed worker pool, with hash-keyed in-flight deduplication so the same
//! contract is never queued twice, and a publish discipline that writes the
//! result into the owning `Varcode`'s `nativecode_slot` exactly once per
//! revision change.

mod backend;

pub use backend::{CompileBackend, InterpretingBackend, NullBackend, SentinelBackend};

use crate::cache::LruWeightCache;
use crate::code::{Intercode, Nativecode, SharedIntercode, SharedVarcode, Varcode};
use crate::error::{CoreError, CoreResult};
use crate::hash::{ContractHash, ContractHashBuilder};
use crate::revision::ChainId;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use dashmap::DashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// The shared `Varcode` cache type this service publishes into, keyed by
/// [`ContractHash`] using the same xxh3-backed hasher as the dedup set
/// below rather than the default `RandomState`/SipHash (§10.5).
type VarcodeCache = LruWeightCache<ContractHash, Varcode, ContractHashBuilder>;

/// Tunables for the compiler service (SPEC_FULL.md §10.3).
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Bounded channel capacity; `async_compile` drops the request (not
    /// blocks) when the queue is full (§4.2, "backpressure by drop").
    pub queue_capacity: usize,
    /// Worker thread count. Defaults to the host's logical CPU count.
    pub worker_count: usize,
    /// Base offset added to a contract's analyzed code size to derive the
    /// accumulated-interpreted-gas bound at which Case E submits a compile
    /// (§4.3: "a threshold derived from `max_code_size(code_size)`") — a
    /// bigger contract amortizes compile cost over more interpreted gas
    /// before compiling it becomes worthwhile.
    pub gas_threshold_offset: u64,
    /// Varcode cache population at or above which `is_varcode_cache_warm`
    /// reports true (§4.2): below this, Case D eagerly compiles every new
    /// contract; at or above it, a cache miss instead falls through to
    /// Case E's gas-gated compilation.
    pub warm_population_threshold: usize,
    /// Contracts larger than this are never submitted for compilation —
    /// compile cost is assumed proportional to code size and this bounds
    /// worst-case worker latency.
    pub max_code_size: usize,
    /// When `true`, `async_compile` runs the backend inline on the calling
    /// thread instead of enqueuing (SPEC_FULL.md §10.5: used by tests and by
    /// embedders who want deterministic, synchronous compilation).
    pub synchronous: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: num_cpus::get().max(1),
            gas_threshold_offset: 1_000_000,
            warm_population_threshold: 64,
            max_code_size: 24_576,
            synchronous: false,
        }
    }
}

impl CompilerConfig {
    /// Rejects configurations that would make the service unable to do
    /// useful work (no workers, no queue room, no admissible code size).
    pub fn validate(&self) -> CoreResult<()> {
        if self.worker_count == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "compiler.worker_count must be at least 1".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "compiler.queue_capacity must be at least 1".into(),
            });
        }
        if self.max_code_size == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "compiler.max_code_size must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

struct CompileRequest {
    hash: ContractHash,
    intercode: SharedIntercode,
    chain_id: ChainId,
}

/// Owns the worker pool and the request queue. Shares the `Varcode` cache
/// with the `Vm` that drives tiering decisions; this service only ever
/// *inserts* new `Varcode`s (cold-cache case) or publishes into an existing
/// one's `nativecode_slot` — it never evicts or reads gas counters. Only a
/// worker thread (or the inline `synchronous` path, which runs as if it
/// were one) ever touches the cache, and only after a compile has actually
/// finished — `async_compile` itself never inserts (§10.5, grounded on
/// `async_compile_tests.cpp` never handing a `Varcode` into `async_compile`).
pub struct CompilerService {
    sender: Sender<CompileRequest>,
    pending: Arc<DashSet<ContractHash, ContractHashBuilder>>,
    workers: Vec<JoinHandle<()>>,
    config: CompilerConfig,
    backend: Arc<dyn CompileBackend>,
    cache: Arc<VarcodeCache>,
}

impl CompilerService {
    pub fn new(
        config: CompilerConfig,
        backend: Arc<dyn CompileBackend>,
        cache: Arc<VarcodeCache>,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity.max(1));
        let pending: Arc<DashSet<ContractHash, ContractHashBuilder>> =
            Arc::new(DashSet::with_hasher(ContractHashBuilder::default()));

        let workers = (0..config.worker_count.max(1))
            .map(|id| {
                spawn_worker(
                    id,
                    receiver.clone(),
                    Arc::clone(&pending),
                    Arc::clone(&backend),
                    Arc::clone(&cache),
                )
            })
            .collect();

        Self {
            sender,
            pending,
            workers,
            config,
            backend,
            cache,
        }
    }

    /// Heuristic used by Case D/E selection (§4.2): true once the Varcode
    /// cache's population has crossed `warm_population_threshold`. This is
    /// a property of the cache as a whole, not of any single contract —
    /// while the cache is still cold, every newly seen contract is worth
    /// eagerly compiling; once it's warm, a cache miss instead waits for
    /// the gas-threshold trigger (Case E) before compiling.
    pub fn is_varcode_cache_warm(&self) -> bool {
        self.cache.len() >= self.config.warm_population_threshold
    }

    /// True if `hash` already has a published, non-failed nativecode slot
    /// for some chain. Distinct from [`Self::is_varcode_cache_warm`]: this
    /// answers "has this specific contract been compiled", used by tests
    /// and embedders that want to observe a single contract's tier.
    pub fn is_contract_compiled(&self, hash: &ContractHash) -> bool {
        self.cache
            .find(hash)
            .map(|acc| acc.nativecode().is_some_and(|nc| !nc.is_failed()))
            .unwrap_or(false)
    }

    /// Accumulated-gas bound for Case E, derived from this contract's code
    /// size (§4.3, "derived from `max_code_size(code_size)`").
    pub fn gas_threshold_for(&self, code_size: usize) -> u64 {
        self.config.gas_threshold_offset + code_size as u64
    }

    pub fn find_varcode(&self, hash: &ContractHash) -> Option<SharedVarcode> {
        self.cache.find(hash).map(|acc| acc.shared())
    }

    /// Submits `intercode` for compilation under `chain_id`, deduplicating
    /// against any already-pending request for the same hash (§4.2). Touches
    /// only the `pending` dedup set — never `self.cache` — so a dropped
    /// request (queue full, disconnected) never needs to roll back anything
    /// but the dedup entry it just took. The `Varcode` itself is created or
    /// reused by whichever worker (or inline call, under `synchronous`)
    /// actually finishes the compile; see [`run_request`].
    ///
    /// Returns `false` if the request was dropped: already pending, code too
    /// large, or the queue was full.
    pub fn async_compile(
        &self,
        hash: ContractHash,
        intercode: SharedIntercode,
        chain_id: ChainId,
    ) -> bool {
        if intercode.code_size() > self.config.max_code_size {
            return false;
        }
        if !self.pending.insert(hash) {
            tracing::debug!(?hash, "compile request already pending, dropping duplicate");
            return false;
        }

        let request = CompileRequest {
            hash,
            intercode,
            chain_id,
        };

        if self.config.synchronous {
            run_request(request, &*self.backend, &self.cache);
            self.pending.remove(&hash);
            return true;
        }

        match self.sender.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.pending.remove(&hash);
                tracing::debug!(?hash, "compile queue full, dropping request");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.pending.remove(&hash);
                false
            }
        }
    }

    /// Synchronous variant: compiles inline regardless of `config.synchronous`
    /// and publishes directly, bypassing the queue and dedup set entirely.
    /// Used by embedders that want a blocking "compile now" call.
    pub fn compile(&self, intercode: &Intercode, chain_id: ChainId) -> Nativecode {
        self.backend.compile(intercode, chain_id)
    }

    /// Blocks until the work queue is empty and no request is pending
    /// dedup-tracking, polling at a short interval. Test-only: production
    /// callers have no reason to synchronize with worker completion.
    pub fn debug_wait_for_empty_queue(&self) {
        while !self.pending.is_empty() || !self.sender.is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

// No explicit `Drop` impl: dropping `sender` closes the channel, workers
// observe `Err` from `recv` and exit their loops on their own. Nothing
// joins them — by the time the service is dropped, in-flight compiles have
// nothing left to publish into that anyone will read.

fn spawn_worker(
    id: usize,
    receiver: Receiver<CompileRequest>,
    pending: Arc<DashSet<ContractHash, ContractHashBuilder>>,
    backend: Arc<dyn CompileBackend>,
    cache: Arc<VarcodeCache>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("polytier-compiler-{id}"))
        .spawn(move || {
            while let Ok(request) = receiver.recv() {
                let hash = request.hash;
                run_request(request, &*backend, &cache);
                pending.remove(&hash);
            }
        })
        .expect("failed to spawn compiler worker thread")
}

/// Runs the code generator and publishes the result into the `Varcode`
/// cache (§4.2, step 3-4). The `Varcode` itself is only ever created *here*,
/// after a compile has actually produced a `Nativecode` — never speculatively
/// by `async_compile`'s producer side, so a dropped/never-run request can
/// never leave a ghost entry behind for [`CompilerService::is_varcode_cache_warm`]
/// to count.
fn run_request(request: CompileRequest, backend: &dyn CompileBackend, cache: &VarcodeCache) {
    let nativecode = Arc::new(backend.compile(&request.intercode, request.chain_id));
    tracing::debug!(
        hash = ?request.hash,
        failed = nativecode.is_failed(),
        "compile finished"
    );

    if let Some(acc) = cache.find(&request.hash) {
        acc.publish_nativecode(nativecode);
        return;
    }

    let varcode = Varcode::new(Arc::clone(&request.intercode));
    varcode.publish_nativecode(Arc::clone(&nativecode));
    if !cache.insert(request.hash, varcode) {
        // Lost a race to a concurrent insert under the same hash (e.g. a
        // revision-change recompile racing a cold-miss compile); the
        // winner's Varcode is already in the cache, so publish this
        // compile's result into that one instead of dropping it.
        if let Some(acc) = cache.find(&request.hash) {
            acc.publish_nativecode(nativecode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Intercode;
    use crate::revision::{chain_of, Revision};
    use std::collections::BTreeSet;
    use std::time::Duration as StdDuration;

    fn cache() -> Arc<VarcodeCache> {
        Arc::new(LruWeightCache::with_hasher(
            1_000_000,
            StdDuration::from_nanos(0),
            ContractHashBuilder::default(),
        ))
    }

    fn hash(byte: u8) -> ContractHash {
        ContractHash::new([byte; 32])
    }

    #[test]
    fn compiles_and_publishes_asynchronously() {
        let cache = cache();
        let service = CompilerService::new(
            CompilerConfig::default(),
            Arc::new(SentinelBackend),
            Arc::clone(&cache),
        );
        let icode = Arc::new(Intercode::new(vec![0x00], BTreeSet::new()));
        let chain_id = chain_of(Revision::LATEST);

        assert!(service.async_compile(hash(1), Arc::clone(&icode), chain_id));
        service.debug_wait_for_empty_queue();

        assert!(service.is_contract_compiled(&hash(1)));
    }

    #[test]
    fn duplicate_submissions_are_deduplicated() {
        let cache = cache();
        let service = CompilerService::new(
            CompilerConfig::default(),
            Arc::new(SentinelBackend),
            Arc::clone(&cache),
        );
        let icode = Arc::new(Intercode::new(vec![0x00], BTreeSet::new()));
        let chain_id = chain_of(Revision::LATEST);

        assert!(service.async_compile(hash(2), Arc::clone(&icode), chain_id));
        assert!(!service.async_compile(hash(2), Arc::clone(&icode), chain_id));
        service.debug_wait_for_empty_queue();
        assert!(service.is_contract_compiled(&hash(2)));
    }

    #[test]
    fn rejected_code_publishes_permanent_failure() {
        let cache = cache();
        let service = CompilerService::new(
            CompilerConfig::default(),
            Arc::new(SentinelBackend),
            Arc::clone(&cache),
        );
        let icode = Arc::new(Intercode::new(vec![0xfe], BTreeSet::new()));
        let chain_id = chain_of(Revision::LATEST);

        assert!(service.async_compile(hash(3), icode, chain_id));
        service.debug_wait_for_empty_queue();

        let varcode = service.find_varcode(&hash(3)).expect("inserted");
        assert!(varcode.nativecode().unwrap().is_failed());
        assert!(!service.is_contract_compiled(&hash(3)));
    }

    #[test]
    fn synchronous_mode_compiles_inline() {
        let cache = cache();
        let mut config = CompilerConfig::default();
        config.synchronous = true;
        let service = CompilerService::new(config, Arc::new(SentinelBackend), Arc::clone(&cache));
        let icode = Arc::new(Intercode::new(vec![0x00], BTreeSet::new()));
        let chain_id = chain_of(Revision::LATEST);

        assert!(service.async_compile(hash(4), icode, chain_id));
        assert!(service.is_contract_compiled(&hash(4)));
    }

    #[test]
    fn oversized_code_is_never_submitted() {
        let cache = cache();
        let mut config = CompilerConfig::default();
        config.max_code_size = 2;
        let service = CompilerService::new(config, Arc::new(SentinelBackend), Arc::clone(&cache));
        let icode = Arc::new(Intercode::new(vec![0x00; 10], BTreeSet::new()));
        let chain_id = chain_of(Revision::LATEST);

        assert!(!service.async_compile(hash(5), icode, chain_id));
        assert!(service.find_varcode(&hash(5)).is_none());
    }

    #[test]
    fn cache_population_flips_the_warm_heuristic() {
        let cache = cache();
        let mut config = CompilerConfig::default();
        config.warm_population_threshold = 2;
        let service = CompilerService::new(config, Arc::new(SentinelBackend), Arc::clone(&cache));

        assert!(!service.is_varcode_cache_warm());
        cache.insert(hash(10), Varcode::new(Arc::new(Intercode::new(vec![0x00], BTreeSet::new()))));
        assert!(!service.is_varcode_cache_warm());
        cache.insert(hash(11), Varcode::new(Arc::new(Intercode::new(vec![0x00], BTreeSet::new()))));
        assert!(service.is_varcode_cache_warm());
    }

    #[test]
    fn gas_threshold_grows_with_code_size() {
        let cache = cache();
        let mut config = CompilerConfig::default();
        config.gas_threshold_offset = 1_000;
        let service = CompilerService::new(config, Arc::new(SentinelBackend), Arc::clone(&cache));

        assert_eq!(service.gas_threshold_for(0), 1_000);
        assert_eq!(service.gas_threshold_for(500), 1_500);
    }
}
