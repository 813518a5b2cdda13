//! Tiered interpreter/JIT execution core for an EVM-compatible chain.
//!
//! [`vm::Vm`] is the facade: it decides, per call, whether to run a
//! published native entrypoint or fall back to the bytecode interpreter,
//! and when to ask the background [`compiler::CompilerService`] to compile
//! a contract. Both tiers read from and publish into a shared
//! [`cache::LruWeightCache`] of [`code::Varcode`] records, keyed by
//! [`hash::ContractHash`].
//!
//! What this crate does *not* do: full EVM opcode semantics, real native
//! code generation, or bytecode analysis beyond jump-destination discovery
//! — those are external collaborators (see `runtime::Host`,
//! `compiler::CompileBackend`, `analysis::Analyzer`).

pub mod analysis;
pub mod cache;
pub mod code;
pub mod compiler;
pub mod error;
pub mod hash;
pub mod interpreter;
pub mod pool;
pub mod revision;
pub mod runtime;
pub mod vm;

pub use error::{CoreError, CoreResult, VmError, VmResult};
pub use hash::ContractHash;
pub use revision::{chain_of, ChainId, Revision};
pub use vm::{CacheConfig, Vm, VmConfig, VmStats, VmStatsSnapshot};
