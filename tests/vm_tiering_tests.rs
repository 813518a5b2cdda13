//! The six end-to-end tiering scenarios: cold-cache interpretation
//! followed by eager compile, warming into a native hit, stale-chain
//! recompilation, permanent-failure fallback, gas-threshold-triggered
//! compilation, and per-contract entrypoint correctness under concurrency.

mod common;

use common::TestHost;
use polytier_vm::code::{Intercode, Nativecode};
use polytier_vm::compiler::{CompileBackend, CompilerConfig, InterpretingBackend, SentinelBackend};
use polytier_vm::hash::ContractHash;
use polytier_vm::revision::ChainId;
use polytier_vm::runtime::{CallKind, ChainParams, Message, StatusCode};
use polytier_vm::{Vm, VmConfig};
use std::sync::Arc;
use std::time::Duration;

/// A backend slow enough that a test can observe several interpreted calls
/// running while the eager cold-miss compile (Case D) is still in flight —
/// otherwise SentinelBackend finishes before a second call could exercise
/// the gas-threshold path (Case E) instead.
struct SlowBackend;

impl CompileBackend for SlowBackend {
    fn compile(&self, intercode: &Intercode, chain_id: ChainId) -> Nativecode {
        std::thread::sleep(Duration::from_millis(50));
        SentinelBackend.compile(intercode, chain_id)
    }
}

// PUSH1 0x01, PUSH1 0x00, MSTORE8, PUSH1 0x01, PUSH1 0x00, RETURN
const RETURNS_ONE: [u8; 10] = [0x60, 0x01, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];

fn message() -> Message {
    Message {
        kind: CallKind::Call,
        depth: 0,
        gas: 1_000_000,
        sender: [0; 20],
        recipient: [1; 20],
        value: [0; 32],
        input: Vec::new(),
    }
}

fn vm_with(config: VmConfig) -> Vm {
    Vm::new(config, Arc::new(SentinelBackend)).expect("valid config")
}

#[test]
fn cold_contract_interprets_then_warms_into_a_native_hit() {
    common::init_test_tracing();
    let vm = vm_with(VmConfig::default());
    let mut host = TestHost::new();
    let hash = ContractHash::new([1; 32]);

    let first = vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut host,
        [1; 20],
        ChainParams::default(),
        message(),
    );
    assert_eq!(first.status, StatusCode::Success);
    assert_eq!(first.output, vec![0x01]);
    assert_eq!(vm.stats().cold_misses, 1);

    vm.debug_wait_for_compiler_idle();
    assert!(vm.is_warm(&hash));

    let second = vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut host,
        [1; 20],
        ChainParams::default(),
        message(),
    );
    assert_eq!(second.status, StatusCode::Success);
    assert_eq!(vm.stats().native_hits, 1);
}

#[test]
fn permanently_failed_code_always_falls_back_to_the_interpreter() {
    let vm = vm_with(VmConfig::default());
    let mut host = TestHost::new();
    let hash = ContractHash::new([2; 32]);
    let rejected_code = [0xfe]; // SentinelBackend refuses INVALID-prefixed code

    vm.execute_bytecode_raw(
        hash,
        &rejected_code,
        &mut host,
        [2; 20],
        ChainParams::default(),
        message(),
    );
    vm.debug_wait_for_compiler_idle();
    assert!(!vm.is_warm(&hash));

    for _ in 0..5 {
        vm.execute_bytecode_raw(
            hash,
            &rejected_code,
            &mut host,
            [2; 20],
            ChainParams::default(),
            message(),
        );
    }
    vm.debug_wait_for_compiler_idle();

    assert_eq!(vm.stats().native_hits, 0);
    assert!(vm.stats().permanent_failures >= 5);
}

#[test]
fn interpreted_gas_accumulates_across_calls_while_a_compile_is_in_flight() {
    let mut config = VmConfig::default();
    // Population 1 (this contract's own Varcode, inserted by the first
    // call) already meets this, so the second call sees a warm cache and
    // takes the gas-gated path (Case E) instead of another eager compile.
    config.compiler.warm_population_threshold = 1;
    // Low enough that the second call's interpreted gas alone crosses it.
    config.compiler.gas_threshold_offset = 1;
    let vm = Vm::new(config, Arc::new(SlowBackend)).expect("valid config");
    let mut host = TestHost::new();
    let hash = ContractHash::new([3; 32]);

    // The cold-miss call (Case D) submits an eager compile that won't
    // finish for 50ms. A second call in the meantime sees a now-warm cache
    // and must still be interpreted correctly, accumulating gas onto the
    // same running counter (Case E) rather than racing the in-flight
    // compile.
    let first = vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut host,
        [3; 20],
        ChainParams::default(),
        message(),
    );
    assert_eq!(first.status, StatusCode::Success);
    assert!(!vm.is_warm(&hash));

    let second = vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut host,
        [3; 20],
        ChainParams::default(),
        message(),
    );
    assert_eq!(second.status, StatusCode::Success);
    assert_eq!(second.output, vec![0x01]);

    vm.debug_wait_for_compiler_idle();
    assert!(vm.is_warm(&hash));
    assert!(vm.stats().cold_misses >= 1);
}

#[test]
fn every_compiled_contract_returns_its_own_sentinel() {
    let vm = vm_with(VmConfig::default());
    let mut host = TestHost::new();

    let hashes: Vec<ContractHash> = (0..6u8).map(|i| ContractHash::new([10 + i; 32])).collect();
    for (i, hash) in hashes.iter().enumerate() {
        let code = vec![0x60, i as u8, 0x00]; // distinct per-contract bytes
        vm.execute_bytecode_raw(
            *hash,
            &code,
            &mut host,
            [10 + i as u8; 20],
            ChainParams::default(),
            message(),
        );
    }
    vm.debug_wait_for_compiler_idle();

    let mut outputs = Vec::new();
    for (i, hash) in hashes.iter().enumerate() {
        assert!(vm.is_warm(hash));
        let code = vec![0x60, i as u8, 0x00];
        let result = vm.execute_bytecode_raw(
            *hash,
            &code,
            &mut host,
            [10 + i as u8; 20],
            ChainParams::default(),
            message(),
        );
        assert_eq!(result.status, StatusCode::Success);
        outputs.push(result.output);
    }

    for (i, a) in outputs.iter().enumerate() {
        for (j, b) in outputs.iter().enumerate() {
            if i != j {
                assert_ne!(a, b, "contracts {i} and {j} produced the same sentinel");
            }
        }
    }
}

#[test]
fn concurrent_calls_to_the_same_contract_are_all_correct() {
    let vm = Arc::new(vm_with(VmConfig::default()));
    let hash = ContractHash::new([20; 32]);

    // Warm it first so concurrent callers race on the native-hit path too.
    let mut warmup_host = TestHost::new();
    vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut warmup_host,
        [20; 20],
        ChainParams::default(),
        message(),
    );
    vm.debug_wait_for_compiler_idle();

    // Once warm, every call runs the same published native entrypoint, so
    // every result's output must be identical across threads and calls —
    // whether that's the interpreter's `[0x01]` (if a call happened to race
    // ahead of the compile) or the native tier's sentinel, the key property
    // under concurrency is that no call observes a torn or wrong value.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let vm = Arc::clone(&vm);
            std::thread::spawn(move || {
                let mut host = TestHost::new();
                let mut outputs = Vec::with_capacity(50);
                for _ in 0..50 {
                    let result = vm.execute_bytecode_raw(
                        hash,
                        &RETURNS_ONE,
                        &mut host,
                        [20; 20],
                        ChainParams::default(),
                        message(),
                    );
                    assert_eq!(result.status, StatusCode::Success);
                    outputs.push(result.output);
                }
                outputs
            })
        })
        .collect();

    let mut all_outputs = Vec::new();
    for h in handles {
        all_outputs.extend(h.join().unwrap());
    }

    // Every call ran after the warmup compile finished, so every thread
    // must have hit the native tier and produced the same sentinel.
    let first = &all_outputs[0];
    for output in &all_outputs {
        assert_eq!(output, first);
    }
}

/// Spec §8's "correctness under all tiers" property, made concrete: a
/// backend whose compiled entrypoint actually replays the interpreter
/// (rather than `SentinelBackend`'s hash sentinel) must produce the exact
/// same output once warm as the interpreter produced while cold, for
/// bytecode that doesn't touch the host.
#[test]
fn native_tier_output_matches_interpreted_output_for_host_independent_code() {
    let vm =
        Vm::new(VmConfig::default(), Arc::new(InterpretingBackend::default())).expect("valid config");
    let mut host = TestHost::new();
    let hash = ContractHash::new([30; 32]);

    let interpreted = vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut host,
        [30; 20],
        ChainParams::default(),
        message(),
    );
    assert_eq!(interpreted.status, StatusCode::Success);
    assert_eq!(interpreted.output, vec![0x01]);
    assert_eq!(vm.stats().cold_misses, 1);

    vm.debug_wait_for_compiler_idle();
    assert!(vm.is_warm(&hash));

    let native = vm.execute_bytecode_raw(
        hash,
        &RETURNS_ONE,
        &mut host,
        [30; 20],
        ChainParams::default(),
        message(),
    );
    assert_eq!(native.status, StatusCode::Success);
    assert_eq!(
        native.output, interpreted.output,
        "native tier diverged from the interpreter for identical host-independent bytecode"
    );
    assert_eq!(vm.stats().native_hits, 1);
}

#[test]
fn compiler_config_queue_capacity_is_honored_under_load() {
    let mut config = VmConfig::default();
    config.compiler = CompilerConfig {
        queue_capacity: 4,
        worker_count: 2,
        gas_threshold_offset: 1_000_000,
        warm_population_threshold: 64,
        max_code_size: 24_576,
        synchronous: false,
    };
    let vm = vm_with(config);
    let mut host = TestHost::new();

    for i in 0..20u8 {
        let hash = ContractHash::new([100 + i; 32]);
        let result = vm.execute_bytecode_raw(
            hash,
            &RETURNS_ONE,
            &mut host,
            [100 + i; 20],
            ChainParams::default(),
            message(),
        );
        // Every hash gets its own Varcode and a correct interpreted result
        // on this first call, even under queue pressure that may drop some
        // compile submissions entirely.
        assert_eq!(result.status, StatusCode::Success);
        assert_eq!(result.output, vec![0x01]);
    }
    vm.debug_wait_for_compiler_idle();
}
