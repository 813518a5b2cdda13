//! Minimal [`Host`] implementation shared by the integration test suites:
//! just enough storage/account bookkeeping to drive the reference
//! interpreter and backend through realistic call shapes.

use polytier_vm::hash::ContractHash;
use polytier_vm::runtime::{
    AccessStatus, ExecutionResult, Host, HostException, HostInterface, Message, StorageStatus,
    TxContext,
};
use std::collections::HashMap;

/// Installs a `tracing` subscriber for the duration of a test binary.
/// Safe to call from every test: `try_init` only succeeds once per process,
/// so later calls are silently ignored instead of panicking.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
}

pub struct TestHost {
    storage: HashMap<([u8; 20], [u8; 32]), [u8; 32]>,
    selfdestructed: Vec<[u8; 20]>,
    context_stack: Vec<*mut polytier_vm::runtime::RuntimeContext>,
    exception: Option<HostException>,
}

impl Default for TestHost {
    fn default() -> Self {
        Self {
            storage: HashMap::new(),
            selfdestructed: Vec::new(),
            context_stack: Vec::new(),
            exception: None,
        }
    }
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostInterface for TestHost {
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

    fn selfdestruct(&mut self, address: &[u8; 20], _beneficiary: &[u8; 20]) -> bool {
        self.selfdestructed.push(*address);
        true
    }

    fn call(&mut self, _msg: &Message) -> ExecutionResult {
        ExecutionResult {
            status: polytier_vm::runtime::StatusCode::Success,
            gas_left: 0,
            gas_refund: 0,
            output: Vec::new(),
            created_address: None,
        }
    }

    fn get_storage(&mut self, address: &[u8; 20], key: &[u8; 32]) -> [u8; 32] {
        *self.storage.get(&(*address, *key)).unwrap_or(&[0; 32])
    }

    fn set_storage(&mut self, address: &[u8; 20], key: &[u8; 32], value: &[u8; 32]) -> StorageStatus {
        let existing = self.storage.insert((*address, *key), *value);
        match existing {
            None => StorageStatus::Added,
            Some(old) if old == *value => StorageStatus::Unchanged,
            Some(_) => StorageStatus::Modified,
        }
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

impl Host for TestHost {
    fn set_runtime_context(
        &mut self,
        ctx: *mut polytier_vm::runtime::RuntimeContext,
    ) -> *mut polytier_vm::runtime::RuntimeContext {
        let prev = self.context_stack.last().copied().unwrap_or(std::ptr::null_mut());
        self.context_stack.push(ctx);
        prev
    }

    fn rethrow_on_active_exception(&mut self) -> Result<(), HostException> {
        match self.exception.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
