//! The VM facade (§4.3): ties the cache, the compiler service and the
//! interpreter together behind the tiering policy that decides, on every
//! call, whether to run compiled native code or fall back to the
//! interpreter — and when to kick off a background compile.
//!
//! Five cases drive that decision per contract hash:
//!   A. a published, current-chain entrypoint exists — run it.
//!   B. a published entrypoint exists for a stale chain — recompile in the
//!      background, interpret this call.
//!   C. the permanent-failure sentinel is published — interpret, and never
//!      ask the compiler to look at this code again.
//!   D. the hash has never been seen — interpret this call, but submit a
//!      compile immediately (eager, not gas-gated).
//!   E. the hash is cached but has no nativecode yet, and hasn't crossed the
//!      gas threshold before this call — interpret, then submit a compile
//!      only if this call's gas pushes the running total over the line.

use crate::analysis::{Analyzer, DefaultAnalyzer};
use crate::cache::LruWeightCache;
use crate::code::{SharedIntercode, Varcode};
use crate::compiler::{CompileBackend, CompilerConfig, CompilerService};
use crate::error::{CoreError, CoreResult};
use crate::hash::{ContractHash, ContractHashBuilder};
use crate::interpreter;
use crate::pool::VmPools;
use crate::revision::{chain_of, Revision};
use crate::runtime::{
    ChainParams, ExecutionResult, Host, HostInterface, Message, RuntimeContext, StatusCode,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounds on the LRU weight cache (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_weight: u32,
    pub update_period: Duration,
}

impl CacheConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_weight == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "cache.max_weight must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_weight: 64 * 1024 * 1024,
            update_period: Duration::from_millis(1),
        }
    }
}

/// Top-level VM configuration, composing the cache, compiler and pool
/// tunables an embedder cares about (SPEC_FULL.md §10.3).
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub revision: Revision,
    pub cache: CacheConfig,
    pub compiler: CompilerConfig,
    pub max_stack_pool: usize,
    pub max_memory_pool: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            revision: Revision::LATEST,
            cache: CacheConfig::default(),
            compiler: CompilerConfig::default(),
            max_stack_pool: 1024,
            max_memory_pool: 1024,
        }
    }
}

impl VmConfig {
    /// Rejects configurations that would leave the VM unable to make
    /// progress: a zero-weight cache, an unusable compiler service, or
    /// zero-capacity pools (§10.2/§10.3: surfaced as [`CoreError`], not a
    /// panic, since an embedder builds this from untrusted/external input).
    pub fn validate(&self) -> CoreResult<()> {
        self.cache.validate()?;
        self.compiler.validate()?;
        if self.max_stack_pool == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "max_stack_pool must be greater than zero".into(),
            });
        }
        if self.max_memory_pool == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "max_memory_pool must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Running counters, for embedders that want visibility into tiering
/// behavior without scraping logs (SPEC_FULL.md §10.5).
#[derive(Default)]
pub struct VmStats {
    native_hits: AtomicU64,
    permanent_failures: AtomicU64,
    revision_mismatches: AtomicU64,
    cold_misses: AtomicU64,
    gas_threshold_triggers: AtomicU64,
    interpreter_runs: AtomicU64,
}

/// Point-in-time copy of [`VmStats`]'s counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmStatsSnapshot {
    pub native_hits: u64,
    pub permanent_failures: u64,
    pub revision_mismatches: u64,
    pub cold_misses: u64,
    pub gas_threshold_triggers: u64,
    pub interpreter_runs: u64,
}

impl VmStats {
    pub fn snapshot(&self) -> VmStatsSnapshot {
        VmStatsSnapshot {
            native_hits: self.native_hits.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            revision_mismatches: self.revision_mismatches.load(Ordering::Relaxed),
            cold_misses: self.cold_misses.load(Ordering::Relaxed),
            gas_threshold_triggers: self.gas_threshold_triggers.load(Ordering::Relaxed),
            interpreter_runs: self.interpreter_runs.load(Ordering::Relaxed),
        }
    }
}

pub struct Vm {
    revision: Revision,
    cache: Arc<LruWeightCache<ContractHash, Varcode, ContractHashBuilder>>,
    compiler: CompilerService,
    pools: VmPools,
    analyzer: Arc<dyn Analyzer>,
    stats: VmStats,
}

impl Vm {
    pub fn new(config: VmConfig, backend: Arc<dyn CompileBackend>) -> CoreResult<Self> {
        Self::with_analyzer(config, backend, Arc::new(DefaultAnalyzer))
    }

    pub fn with_analyzer(
        config: VmConfig,
        backend: Arc<dyn CompileBackend>,
        analyzer: Arc<dyn Analyzer>,
    ) -> CoreResult<Self> {
        config.validate()?;

        let cache = Arc::new(LruWeightCache::with_hasher(
            config.cache.max_weight,
            config.cache.update_period,
            ContractHashBuilder::default(),
        ));
        let compiler = CompilerService::new(config.compiler, backend, Arc::clone(&cache));
        let pools = VmPools::new(config.max_stack_pool, config.max_memory_pool);

        Ok(Self {
            revision: config.revision,
            cache,
            compiler,
            pools,
            analyzer,
            stats: VmStats::default(),
        })
    }

    pub fn stats(&self) -> VmStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Full tiered execution against already-analyzed code, talking to the
    /// bare [`Host`] trait directly (SPEC_FULL.md §10.5's "raw" variant).
    pub fn execute_intercode_raw(
        &self,
        hash: ContractHash,
        intercode: SharedIntercode,
        host: &mut dyn Host,
        address: [u8; 20],
        params: ChainParams,
        message: Message,
    ) -> ExecutionResult {
        let memory = self.pools.memory.allocate().take();
        let mut ctx = RuntimeContext::new(params, message, memory);
        let ctx_ptr = &mut ctx as *mut RuntimeContext;
        let prev_ctx = host.set_runtime_context(ctx_ptr);

        self.dispatch_tiered(hash, &intercode, &mut ctx, host, address);

        host.set_runtime_context(prev_ctx);
        if host.rethrow_on_active_exception().is_err() {
            ctx.set_result(StatusCode::Failure, Vec::new());
        }

        ctx.into_result()
    }

    /// Tiered execution against a bare [`HostInterface`], without the
    /// reentrancy-stack save/restore `execute_intercode_raw` performs around
    /// it (SPEC_FULL.md §10.5): for embedders whose `Host` never needs
    /// `set_runtime_context`/`rethrow_on_active_exception` at this call site,
    /// or that manage reentrancy themselves.
    pub fn execute_intercode_with_interface(
        &self,
        hash: ContractHash,
        intercode: SharedIntercode,
        host: &mut dyn HostInterface,
        address: [u8; 20],
        params: ChainParams,
        message: Message,
    ) -> ExecutionResult {
        let memory = self.pools.memory.allocate().take();
        let mut ctx = RuntimeContext::new(params, message, memory);
        self.dispatch_tiered(hash, &intercode, &mut ctx, host, address);
        ctx.into_result()
    }

    /// Analyzes raw bytecode and runs it tiered, without the save/restore
    /// step — see [`Self::execute_intercode_with_interface`].
    pub fn execute_bytecode_with_interface(
        &self,
        hash: ContractHash,
        code: &[u8],
        host: &mut dyn HostInterface,
        address: [u8; 20],
        params: ChainParams,
        message: Message,
    ) -> ExecutionResult {
        let intercode = Arc::new(self.analyzer.analyze(code));
        self.execute_intercode_with_interface(hash, intercode, host, address, params, message)
    }

    /// Convenience entry point over [`Self::execute_bytecode_with_interface`]
    /// for a standalone call with no surrounding transaction context — see
    /// [`Self::execute_raw`].
    pub fn execute_with_interface(
        &self,
        hash: ContractHash,
        code: &[u8],
        host: &mut dyn HostInterface,
        address: [u8; 20],
    ) -> ExecutionResult {
        let message = Message {
            kind: crate::runtime::CallKind::Call,
            depth: 0,
            gas: i64::MAX,
            sender: [0; 20],
            recipient: address,
            value: [0; 32],
            input: Vec::new(),
        };
        self.execute_bytecode_with_interface(
            hash,
            code,
            host,
            address,
            ChainParams::default(),
            message,
        )
    }

    /// Runs `intercode` directly against the interpreter, never touching the
    /// Varcode cache or the compiler service and never installing `ctx` into
    /// the host's reentrancy stack (§4.3 "Variants"). Grounded on the
    /// original's `execute_intercode_raw` (`vm.cpp`), which builds a fresh
    /// runtime context and calls the interpreter directly rather than going
    /// through `execute_impl`'s tiering — genuinely cache-bypassing, unlike
    /// this crate's `execute_intercode_raw`, which (despite the name) is the
    /// tiered path.
    pub fn execute_intercode(
        &self,
        intercode: &SharedIntercode,
        host: &mut dyn HostInterface,
        address: [u8; 20],
        params: ChainParams,
        message: Message,
    ) -> ExecutionResult {
        let memory = self.pools.memory.allocate().take();
        let mut ctx = RuntimeContext::new(params, message, memory);
        let mut stack = self.pools.stack.allocate();
        self.stats.interpreter_runs.fetch_add(1, Ordering::Relaxed);
        interpreter::execute(self.revision, &mut ctx, intercode, host, address, &mut stack);
        ctx.into_result()
    }

    /// Analyzes raw bytecode and interprets it directly, bypassing the cache
    /// and compiler entirely — see [`Self::execute_intercode`].
    pub fn execute_bytecode(
        &self,
        code: &[u8],
        host: &mut dyn HostInterface,
        address: [u8; 20],
        params: ChainParams,
        message: Message,
    ) -> ExecutionResult {
        let intercode = Arc::new(self.analyzer.analyze(code));
        self.execute_intercode(&intercode, host, address, params, message)
    }

    /// Analyzes raw bytecode via this VM's [`Analyzer`] and runs it
    /// tiered, same as [`Self::execute_intercode_raw`].
    pub fn execute_bytecode_raw(
        &self,
        hash: ContractHash,
        code: &[u8],
        host: &mut dyn Host,
        address: [u8; 20],
        params: ChainParams,
        message: Message,
    ) -> ExecutionResult {
        let intercode = Arc::new(self.analyzer.analyze(code));
        self.execute_intercode_raw(hash, intercode, host, address, params, message)
    }

    /// Convenience entry point for a standalone call with no surrounding
    /// transaction context — builds an empty [`Message`]/[`ChainParams`]
    /// pair (mirrors the original's bootstrap "run this code" helper).
    pub fn execute_raw(
        &self,
        hash: ContractHash,
        code: &[u8],
        host: &mut dyn Host,
        address: [u8; 20],
    ) -> ExecutionResult {
        let message = Message {
            kind: crate::runtime::CallKind::Call,
            depth: 0,
            gas: i64::MAX,
            sender: [0; 20],
            recipient: address,
            value: [0; 32],
            input: Vec::new(),
        };
        self.execute_bytecode_raw(hash, code, host, address, ChainParams::default(), message)
    }

    /// The five-case tiering policy (§4.3), shared by every tiered entry
    /// point. Resolves or creates the hash's `Varcode`, runs the native
    /// entrypoint on a hit, and otherwise falls back to the interpreter —
    /// submitting a background compile per whichever case applies. Callers
    /// own the runtime-context save/restore step around this call, if any;
    /// this helper never touches the host's reentrancy stack.
    fn dispatch_tiered(
        &self,
        hash: ContractHash,
        intercode: &SharedIntercode,
        ctx: &mut RuntimeContext,
        host: &mut dyn HostInterface,
        address: [u8; 20],
    ) {
        let chain_id = chain_of(self.revision);
        let varcode = self.resolve_varcode(&hash, intercode);

        match varcode.nativecode() {
            Some(nc) if !nc.is_failed() && nc.chain_id() == chain_id => {
                tracing::trace!(?hash, "native hit");
                self.stats.native_hits.fetch_add(1, Ordering::Relaxed);
                let mut stack = self.pools.stack.allocate();
                let entrypoint = nc.entrypoint().expect("compiled").clone();
                entrypoint(ctx, &mut stack);
            }
            Some(nc) if nc.is_failed() => {
                tracing::trace!(?hash, "permanent compile failure, interpreting");
                self.stats.permanent_failures.fetch_add(1, Ordering::Relaxed);
                self.run_interpreter(ctx, &varcode, host, address);
            }
            Some(_) => {
                tracing::debug!(?hash, "stale chain nativecode, submitting recompile");
                self.stats.revision_mismatches.fetch_add(1, Ordering::Relaxed);
                self.compiler
                    .async_compile(hash, Arc::clone(varcode.intercode()), chain_id);
                self.run_interpreter(ctx, &varcode, host, address);
            }
            None if !self.compiler.is_varcode_cache_warm() => {
                tracing::debug!(?hash, "varcode cache still cold, compiling eagerly");
                self.stats.cold_misses.fetch_add(1, Ordering::Relaxed);
                self.compiler.async_compile(hash, Arc::clone(intercode), chain_id);
                self.run_interpreter(ctx, &varcode, host, address);
            }
            None => {
                let gas_used = self.run_interpreter(ctx, &varcode, host, address);
                let bound = self
                    .compiler
                    .gas_threshold_for(varcode.intercode().code_size());
                if varcode.add_intercode_gas_used(gas_used) >= bound {
                    tracing::debug!(?hash, bound, "gas threshold crossed, submitting compile");
                    self.stats
                        .gas_threshold_triggers
                        .fetch_add(1, Ordering::Relaxed);
                    self.compiler
                        .async_compile(hash, Arc::clone(varcode.intercode()), chain_id);
                }
            }
        }
    }

    fn resolve_varcode(&self, hash: &ContractHash, intercode: &SharedIntercode) -> Arc<Varcode> {
        if let Some(acc) = self.cache.find(hash) {
            return acc.shared();
        }
        self.cache.insert(*hash, Varcode::new(Arc::clone(intercode)));
        self.cache
            .find(hash)
            .map(|acc| acc.shared())
            .unwrap_or_else(|| Arc::new(Varcode::new(Arc::clone(intercode))))
    }

    /// Runs the interpreter for one call and returns the gas it consumed.
    /// Callers decide whether that gas counts toward a Varcode's running
    /// total — only Case E's warm-but-uncompiled path does (§4.3).
    fn run_interpreter(
        &self,
        ctx: &mut RuntimeContext,
        varcode: &Varcode,
        host: &mut dyn HostInterface,
        address: [u8; 20],
    ) -> u64 {
        self.stats.interpreter_runs.fetch_add(1, Ordering::Relaxed);
        let mut stack = self.pools.stack.allocate();
        let gas_before = ctx.gas_remaining;
        interpreter::execute(self.revision, ctx, varcode.intercode(), host, address, &mut stack);
        (gas_before - ctx.gas_remaining).max(0) as u64
    }

    pub fn is_warm(&self, hash: &ContractHash) -> bool {
        self.compiler.is_contract_compiled(hash)
    }

    pub fn debug_wait_for_compiler_idle(&self) {
        self.compiler.debug_wait_for_empty_queue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{EntryPoint, Intercode, Nativecode};
    use crate::compiler::SentinelBackend;
    use crate::revision::chain_of;
    use crate::runtime::{AccessStatus, CallKind, HostException, Message, StorageStatus, TxContext};
    use std::collections::BTreeSet;

    /// Host stub that only needs to satisfy the trait; none of these
    /// unit tests touch storage or nested calls.
    #[derive(Default)]
    struct NoopHost;

    impl HostInterface for NoopHost {
        fn access_account(&mut self, _: &[u8; 20]) -> AccessStatus {
            AccessStatus::Warm
        }
        fn get_balance(&mut self, _: &[u8; 20]) -> [u8; 32] {
            [0; 32]
        }
        fn get_code_hash(&mut self, _: &[u8; 20]) -> ContractHash {
            ContractHash::new([0; 32])
        }
        fn get_code_size(&mut self, _: &[u8; 20]) -> usize {
            0
        }
        fn copy_code(&mut self, _: &[u8; 20], _: usize, _: &mut [u8]) -> usize {
            0
        }
        fn selfdestruct(&mut self, _: &[u8; 20], _: &[u8; 20]) -> bool {
            true
        }
        fn call(&mut self, _: &Message) -> ExecutionResult {
            ExecutionResult {
                status: StatusCode::Success,
                gas_left: 0,
                gas_refund: 0,
                output: Vec::new(),
                created_address: None,
            }
        }
        fn get_storage(&mut self, _: &[u8; 20], _: &[u8; 32]) -> [u8; 32] {
            [0; 32]
        }
        fn set_storage(&mut self, _: &[u8; 20], _: &[u8; 32], _: &[u8; 32]) -> StorageStatus {
            StorageStatus::Unchanged
        }
        fn emit_log(&mut self, _: &[u8; 20], _: &[u8], _: &[[u8; 32]]) {}
        fn access_storage(&mut self, _: &[u8; 20], _: &[u8; 32]) -> AccessStatus {
            AccessStatus::Warm
        }
        fn get_tx_context(&mut self) -> TxContext {
            TxContext::default()
        }
        fn get_block_hash(&mut self, _: u64) -> [u8; 32] {
            [0; 32]
        }
        fn get_blob_hash(&mut self, _: usize) -> [u8; 32] {
            [0; 32]
        }
    }

    impl Host for NoopHost {
        fn set_runtime_context(&mut self, _ctx: *mut RuntimeContext) -> *mut RuntimeContext {
            std::ptr::null_mut()
        }
        fn rethrow_on_active_exception(&mut self) -> Result<(), HostException> {
            Ok(())
        }
    }

    fn message() -> Message {
        Message {
            kind: CallKind::Call,
            depth: 0,
            gas: 1_000_000,
            sender: [0; 20],
            recipient: [5; 20],
            value: [0; 32],
            input: Vec::new(),
        }
    }

    #[test]
    fn stale_chain_nativecode_triggers_recompile_and_still_interprets() {
        let vm = Vm::new(VmConfig::default(), Arc::new(SentinelBackend)).expect("valid config");
        let hash = ContractHash::new([42; 32]);
        let intercode = Arc::new(Intercode::new(vec![0x00], BTreeSet::new())); // STOP

        // Seed a Varcode whose nativecode was published (and compiled
        // successfully) under a chain that isn't the VM's current one —
        // simulating a contract compiled before a protocol upgrade changed
        // `chain_of`. A *failed* sentinel would instead hit the permanent-
        // failure arm regardless of chain, so this must be a real entrypoint.
        vm.cache.insert(hash, Varcode::new(Arc::clone(&intercode)));
        let stale_chain = chain_of(Revision::Frontier);
        assert_ne!(stale_chain, chain_of(vm.revision));
        let varcode = vm.cache.find(&hash).unwrap().shared();
        let stale_entrypoint: EntryPoint = Arc::new(|_ctx, _stack| {});
        varcode.publish_nativecode(Arc::new(Nativecode::compiled(stale_entrypoint, stale_chain)));

        let mut host = NoopHost;
        let result = vm.execute_intercode_raw(
            hash,
            intercode,
            &mut host,
            [42; 20],
            ChainParams::default(),
            message(),
        );

        // A stale-chain nativecode is neither a native hit nor a permanent
        // failure for the *current* chain — it's a mismatch that falls back
        // to the interpreter (which correctly runs STOP) and asks for a
        // recompile under the current chain.
        assert_eq!(result.status, StatusCode::Success);
        assert_eq!(vm.stats().revision_mismatches, 1);
        assert_eq!(vm.stats().native_hits, 0);

        vm.debug_wait_for_compiler_idle();
        assert_eq!(
            vm.cache
                .find(&hash)
                .unwrap()
                .shared()
                .nativecode()
                .unwrap()
                .chain_id(),
            chain_of(vm.revision)
        );
    }
}
