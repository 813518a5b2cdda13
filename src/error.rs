//! Error types for the polytier VM core.
//!
//! EVM-level failures (out of gas, revert, invalid opcode, stack
//! under/overflow) are *not* represented here: per the tiering contract they
//! are status-code data carried in [`crate::runtime::ExecutionResult`], not
//! Rust errors. [`VmError`] covers the interpreter's internal failure shape
//! (used while building a result, see `interpreter`), and [`CoreError`]
//! covers genuine resource/programming failures: bad configuration and pool
//! misuse.

use thiserror::Error;

/// Interpreter-internal failure. Always converted into a status code before
/// crossing the `execute` boundary; never returned to an embedder directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Ran out of gas mid-instruction.
    #[error("out of gas: needed {needed}, had {available}")]
    OutOfGas { needed: u64, available: u64 },

    /// Popped more items than were on the stack.
    #[error("stack underflow: attempted to access {requested} items, but only {available} available")]
    StackUnderflow { requested: usize, available: usize },

    /// Pushed past the configured stack depth.
    #[error("stack overflow: maximum stack size {max_size} exceeded")]
    StackOverflow { max_size: usize },

    /// Byte at the current program counter has no registered handler.
    #[error("invalid opcode: {opcode:#04x} at pc {pc}")]
    InvalidOpcode { opcode: u8, pc: usize },

    /// `JUMP`/`JUMPI` target is not a `JUMPDEST`.
    #[error("invalid jump destination: {dest}")]
    InvalidJumpDest { dest: usize },

    /// Memory expansion would exceed the protocol bound.
    #[error("memory limit exceeded: requested {requested} bytes, limit {limit} bytes")]
    MemoryLimitExceeded { requested: usize, limit: usize },
}

/// Crate-level result type for fallible, non-EVM operations.
pub type VmResult<T> = Result<T, VmError>;

/// Errors surfaced by the ambient stack (configuration, pools) rather than
/// by contract execution itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A `VmConfig`/`CacheConfig`/`CompilerConfig` field failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Crate-level result type for configuration/setup operations.
pub type CoreResult<T> = Result<T, CoreError>;
