//! The host interface consumed by the VM (§6): the embedding chain's
//! account/storage/log surface, plus the two reentrancy-support calls used
//! to thread per-call state through host callbacks that are invoked
//! re-entrantly from native code (§7, §9).

use crate::hash::ContractHash;
use crate::runtime::{ExecutionResult, Message, RuntimeContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Cold,
    Warm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// Transaction-wide context (gas price, origin, timestamp, ...). Left
/// minimal; the concrete shape belongs to the embedding chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxContext {
    pub gas_price: [u8; 32],
    pub origin: [u8; 20],
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// The capability set the VM (and the interpreter loop itself) needs to
/// service opcodes: account/storage/log access plus nested calls. Does
/// *not* include the reentrancy bookkeeping in [`Host`] — code paths that
/// never install a runtime context on the host (the cache-bypassing
/// `execute_intercode`/`execute_bytecode` family and the `_with_interface`
/// family, SPEC_FULL.md §10.5) only need this narrower surface.
pub trait HostInterface {
    fn access_account(&mut self, address: &[u8; 20]) -> AccessStatus;
    fn get_balance(&mut self, address: &[u8; 20]) -> [u8; 32];
    fn get_code_hash(&mut self, address: &[u8; 20]) -> ContractHash;
    fn get_code_size(&mut self, address: &[u8; 20]) -> usize;
    fn copy_code(&mut self, address: &[u8; 20], offset: usize, buf: &mut [u8]) -> usize;
    fn selfdestruct(&mut self, address: &[u8; 20], beneficiary: &[u8; 20]) -> bool;
    fn call(&mut self, msg: &Message) -> ExecutionResult;
    fn get_storage(&mut self, address: &[u8; 20], key: &[u8; 32]) -> [u8; 32];
    fn set_storage(&mut self, address: &[u8; 20], key: &[u8; 32], value: &[u8; 32]) -> StorageStatus;
    fn emit_log(&mut self, address: &[u8; 20], data: &[u8], topics: &[[u8; 32]]);
    fn access_storage(&mut self, address: &[u8; 20], key: &[u8; 32]) -> AccessStatus;
    fn get_tx_context(&mut self) -> TxContext;
    fn get_block_hash(&mut self, number: u64) -> [u8; 32];
    fn get_blob_hash(&mut self, index: usize) -> [u8; 32];
}

/// The full host surface the VM's own `execute_intercode_raw`/
/// `execute_bytecode_raw` entry points require. A production host also
/// implements nested-call reentrancy: `set_runtime_context` and
/// `rethrow_on_active_exception` let a host callback invoked from inside a
/// native frame record a failure without unwinding through that frame (§7,
/// §9) — the VM polls for it immediately after every call returns.
pub trait Host: HostInterface {
    /// Installs `ctx` as the "current" runtime context for this thread,
    /// returning whatever was previously installed (null if none). The
    /// pointer is a non-owning back-pointer into the caller's stack frame
    /// (§9) — never dereferenced by the host itself outside of a callback
    /// invoked by the very call that installed it.
    fn set_runtime_context(&mut self, ctx: *mut RuntimeContext) -> *mut RuntimeContext;

    /// Surfaces any host-side failure recorded by a callback that could not
    /// unwind through a native frame (§7). The VM calls this after every
    /// `execute`, whether or not native code ran.
    fn rethrow_on_active_exception(&mut self) -> Result<(), HostException>;
}

/// A deferred host-side failure, recorded because the callback that
/// observed it was invoked from inside a native (non-unwindable) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    pub message: String,
}

/// Per-thread stack of installed runtime contexts, for hosts to embed.
/// Nested `execute` calls (a contract calling another) push and pop their
/// own context; modeled as a plain stack rather than shared ownership
/// (§9, "Shared-ownership cycles").
#[derive(Default)]
pub struct ContextStack {
    stack: Vec<*mut RuntimeContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Pushes `ctx`, returning the previously-current context (null if
    /// this is the outermost call).
    pub fn push(&mut self, ctx: *mut RuntimeContext) -> *mut RuntimeContext {
        let prev = self.stack.last().copied().unwrap_or(std::ptr::null_mut());
        self.stack.push(ctx);
        prev
    }

    /// Pops the most recently pushed context. The VM calls this
    /// unconditionally on return, restoring `prev_ctx` as "current" on the
    /// host (mirroring `set_runtime_context(prev_ctx)` in the original).
    pub fn pop(&mut self) -> Option<*mut RuntimeContext> {
        self.stack.pop()
    }

    pub fn current(&self) -> *mut RuntimeContext {
        self.stack.last().copied().unwrap_or(std::ptr::null_mut())
    }
}
