//! The code-generation backend (§6, "Compiler Backend (consumed)"). Real
//! native-code generation is an external collaborator; this module defines
//! the trait seam plus a reference backend sufficient to exercise the
//! tiering policy and the six end-to-end scenarios this crate tests.

use crate::code::{EntryPoint, Intercode, Nativecode};
use crate::hash::ContractHash;
use crate::revision::{ChainId, Revision};
use crate::runtime::{
    AccessStatus, ExecutionResult, HostInterface, Message, StatusCode, StorageStatus, TxContext,
};
use std::sync::Arc;

/// Turns analyzed code into a [`Nativecode`]. Pure and side-effect free: the
/// compiler service is what imposes concurrency, deduplication and
/// publish-once discipline around a call to this trait (§4.2).
pub trait CompileBackend: Send + Sync {
    fn compile(&self, intercode: &Intercode, chain_id: ChainId) -> Nativecode;
}

/// A backend that never succeeds — exercises the permanent-failure path
/// (§4.2, §4.3 Case C) without needing a real code generator.
#[derive(Default, Clone, Copy)]
pub struct NullBackend;

impl CompileBackend for NullBackend {
    fn compile(&self, _intercode: &Intercode, chain_id: ChainId) -> Nativecode {
        Nativecode::failed(chain_id)
    }
}

/// Reference backend used by this crate's own test scenarios. It doesn't
/// generate machine code; instead it builds an [`EntryPoint`] closure that
/// reduces the contract's bytes to a single sentinel value and writes it as
/// the call's output, so a test can tell which contract's native code ran
/// (§8 scenario: "every compiled entry executes correctly"). Code whose
/// first byte is `0xfe` (`INVALID`) is deliberately rejected, to exercise
/// the permanent-failure tier alongside a real success path.
#[derive(Default, Clone, Copy)]
pub struct SentinelBackend;

impl CompileBackend for SentinelBackend {
    fn compile(&self, intercode: &Intercode, chain_id: ChainId) -> Nativecode {
        let code = intercode.code();
        if code.first() == Some(&0xfe) {
            return Nativecode::failed(chain_id);
        }

        let sentinel = crate::hash::xxh3_of(code);
        let entrypoint: EntryPoint = Arc::new(move |ctx, _stack| {
            ctx.set_result(StatusCode::Success, sentinel.to_be_bytes().to_vec());
        });
        Nativecode::compiled(entrypoint, chain_id)
    }
}

/// A host that answers every callback with an inert default. Used only by
/// [`InterpretingBackend`]'s compiled entrypoint, which replays host-
/// independent bytecode and has nothing real to hand it.
struct NoHost;

impl HostInterface for NoHost {
    fn access_account(&mut self, _address: &[u8; 20]) -> AccessStatus {
        AccessStatus::Warm
    }
    fn get_balance(&mut self, _address: &[u8; 20]) -> [u8; 32] {
        [0; 32]
    }
    fn get_code_hash(&mut self, _address: &[u8; 20]) -> ContractHash {
        ContractHash::new([0; 32])
    }
    fn get_code_size(&mut self, _address: &[u8; 20]) -> usize {
        0
    }
    fn copy_code(&mut self, _address: &[u8; 20], _offset: usize, _buf: &mut [u8]) -> usize {
        0
    }
    fn selfdestruct(&mut self, _address: &[u8; 20], _beneficiary: &[u8; 20]) -> bool {
        false
    }
    fn call(&mut self, _msg: &Message) -> ExecutionResult {
        ExecutionResult {
            status: StatusCode::Failure,
            gas_left: 0,
            gas_refund: 0,
            output: Vec::new(),
            created_address: None,
        }
    }
    fn get_storage(&mut self, _address: &[u8; 20], _key: &[u8; 32]) -> [u8; 32] {
        [0; 32]
    }
    fn set_storage(&mut self, _address: &[u8; 20], _key: &[u8; 32], _value: &[u8; 32]) -> StorageStatus {
        StorageStatus::Unchanged
    }
    fn emit_log(&mut self, _address: &[u8; 20], _data: &[u8], _topics: &[[u8; 32]]) {}
    fn access_storage(&mut self, _address: &[u8; 20], _key: &[u8; 32]) -> AccessStatus {
        AccessStatus::Warm
    }
    fn get_tx_context(&mut self) -> TxContext {
        TxContext::default()
    }
    fn get_block_hash(&mut self, _number: u64) -> [u8; 32] {
        [0; 32]
    }
    fn get_blob_hash(&mut self, _index: usize) -> [u8; 32] {
        [0; 32]
    }
}

/// A backend whose compiled entrypoint actually replays the contract's
/// bytecode through [`crate::interpreter::execute`], rather than reducing it
/// to a sentinel (§8: "correctness under all tiers" — a compiled tier must
/// be observably equivalent to interpreting the same code). Only sound for
/// bytecode that doesn't depend on the real host or the real call address,
/// since the entrypoint closure has no host parameter to forward (§6's
/// `EntryPoint` shape) — it substitutes [`NoHost`] and a fixed placeholder
/// address. Intended for tests that need a real compiled/interpreted
/// equivalence check, not for production use.
#[derive(Clone, Copy)]
pub struct InterpretingBackend {
    pub revision: Revision,
}

impl Default for InterpretingBackend {
    fn default() -> Self {
        Self {
            revision: Revision::LATEST,
        }
    }
}

impl CompileBackend for InterpretingBackend {
    fn compile(&self, intercode: &Intercode, chain_id: ChainId) -> Nativecode {
        let code = intercode.code();
        if code.first() == Some(&0xfe) {
            return Nativecode::failed(chain_id);
        }

        let intercode = intercode.clone();
        let revision = self.revision;
        let entrypoint: EntryPoint = Arc::new(move |ctx, _stack| {
            let mut host = NoHost;
            let mut stack = Vec::new();
            crate::interpreter::execute(revision, ctx, &intercode, &mut host, [0; 20], &mut stack);
        });
        Nativecode::compiled(entrypoint, chain_id)
    }
}
