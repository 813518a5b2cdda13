//! Per-call mutable state (§3, "Runtime Context") and the result shape both
//! the interpreter and native entrypoints write into.

pub mod host;

pub use host::{AccessStatus, Host, HostException, HostInterface, StorageStatus, TxContext};

use crate::pool::MemoryBuffer;

/// Outcome of a call, shared by interpreter and native tiers (§4.3's
/// "correctness under all tiers" invariant requires these to agree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    Revert,
    Failure,
}

/// The kind of call being made, mirroring the EVM's CALL/DELEGATECALL/
/// STATICCALL/CREATE distinction. Only used to shape `Message`; semantics
/// are a host concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Call,
    DelegateCall,
    StaticCall,
    Create,
}

/// Inputs to a single call, analogous to `evmc_message`.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: CallKind,
    pub depth: u32,
    pub gas: i64,
    pub sender: [u8; 20],
    pub recipient: [u8; 20],
    pub value: [u8; 32],
    pub input: Vec<u8>,
}

/// Chain-wide parameters visible to a call (block gas limit, base fee,
/// etc). Kept intentionally small: the concrete chain-config surface is an
/// external collaborator per §1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainParams {
    pub block_gas_limit: u64,
    pub base_fee: u64,
}

/// Final shape of a call's outcome (§4.3).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: StatusCode,
    pub gas_left: i64,
    pub gas_refund: i64,
    pub output: Vec<u8>,
    pub created_address: Option<[u8; 20]>,
}

/// One per call; never shared across threads; destroyed on return (§3).
pub struct RuntimeContext {
    pub gas_remaining: i64,
    pub gas_refund: i64,
    pub memory: MemoryBuffer,
    pub message: Message,
    pub params: ChainParams,
    status: Option<StatusCode>,
    output: Vec<u8>,
    created_address: Option<[u8; 20]>,
}

impl RuntimeContext {
    pub fn new(params: ChainParams, message: Message, memory: MemoryBuffer) -> Self {
        let gas_remaining = message.gas;
        Self {
            gas_remaining,
            gas_refund: 0,
            memory,
            message,
            params,
            status: None,
            output: Vec::new(),
            created_address: None,
        }
    }

    /// Empty context for bootstrap/testing use (mirrors the original's
    /// `runtime::Context::empty()`, used to run a freshly compiled
    /// entrypoint before any real call exists).
    pub fn empty() -> Self {
        Self::new(
            ChainParams::default(),
            Message {
                kind: CallKind::Call,
                depth: 0,
                gas: 0,
                sender: [0; 20],
                recipient: [0; 20],
                value: [0; 32],
                input: Vec::new(),
            },
            Vec::new(),
        )
    }

    pub fn set_result(&mut self, status: StatusCode, output: Vec<u8>) {
        self.status = Some(status);
        self.output = output;
    }

    pub fn set_created_address(&mut self, address: [u8; 20]) {
        self.created_address = Some(address);
    }

    /// True once a terminating opcode (or the native entrypoint) has
    /// written a result.
    pub fn is_halted(&self) -> bool {
        self.status.is_some()
    }

    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            status: self.status.unwrap_or(StatusCode::Success),
            gas_left: self.gas_remaining,
            gas_refund: self.gas_refund,
            output: self.output,
            created_address: self.created_address,
        }
    }
}
