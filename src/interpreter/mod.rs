//! The interpreter dispatch loop (§4.4): opcode-indexed, gas-metered,
//! pool-backed stack and memory, writing a result on any terminator.
//! Mutates only its own `RuntimeContext`/stack/memory — never the
//! `Varcode` it was handed; gas accounting for tiering purposes is the
//! caller's job (`vm::execute_impl`), not this loop's.

mod handlers;
mod jump_table;
pub mod opcode;

pub use jump_table::JumpTable;
pub use opcode::OpCode;

use crate::code::Intercode;
use crate::error::VmError;
use crate::pool::StackWord;
use crate::revision::Revision;
use crate::runtime::{HostInterface, RuntimeContext, StatusCode};

const MAX_STACK_DEPTH: usize = 1024;

/// Mutable dispatch state for one `execute` call. Borrows everything it
/// touches; owns nothing, per §4.4's "never allocates bytecode-sized
/// buffers per call" — the stack and memory come from the VM's pools.
pub struct Interp<'a> {
    code: &'a [u8],
    icode: &'a Intercode,
    pc: usize,
    stack: &'a mut Vec<StackWord>,
    ctx: &'a mut RuntimeContext,
    host: &'a mut dyn HostInterface,
    address: [u8; 20],
}

impl<'a> Interp<'a> {
    fn advance(&mut self, n: usize) {
        self.pc += n;
    }

    fn jump_to(&mut self, dest: usize) -> Result<(), VmError> {
        if !self.icode.is_jumpdest(dest) {
            return Err(VmError::InvalidJumpDest { dest });
        }
        self.pc = dest;
        Ok(())
    }

    fn push(&mut self, value: u64) -> Result<(), VmError> {
        if self.stack.len() >= MAX_STACK_DEPTH {
            return Err(VmError::StackOverflow {
                max_size: MAX_STACK_DEPTH,
            });
        }
        self.stack.push([value, 0, 0, 0]);
        Ok(())
    }

    fn pop(&mut self) -> Result<u64, VmError> {
        self.stack
            .pop()
            .map(|w| w[0])
            .ok_or(VmError::StackUnderflow {
                requested: 1,
                available: 0,
            })
    }

    fn peek(&self) -> Result<u64, VmError> {
        self.stack
            .last()
            .map(|w| w[0])
            .ok_or(VmError::StackUnderflow {
                requested: 1,
                available: 0,
            })
    }

    fn swap_top_two(&mut self) -> Result<(), VmError> {
        let len = self.stack.len();
        if len < 2 {
            return Err(VmError::StackUnderflow {
                requested: 2,
                available: len,
            });
        }
        self.stack.swap(len - 1, len - 2);
        Ok(())
    }

    fn ensure_memory(&mut self, end: usize) -> Result<(), VmError> {
        const MEMORY_LIMIT: usize = 1 << 20;
        if end > MEMORY_LIMIT {
            return Err(VmError::MemoryLimitExceeded {
                requested: end,
                limit: MEMORY_LIMIT,
            });
        }
        if self.ctx.memory.len() < end {
            self.ctx.memory.resize(end, 0);
        }
        Ok(())
    }

    fn mem_store(&mut self, offset: usize, value: u64) -> Result<(), VmError> {
        self.ensure_memory(offset + 32)?;
        let bytes = value.to_be_bytes();
        self.ctx.memory[offset + 24..offset + 32].copy_from_slice(&bytes);
        Ok(())
    }

    fn mem_store_byte(&mut self, offset: usize, value: u8) -> Result<(), VmError> {
        self.ensure_memory(offset + 1)?;
        self.ctx.memory[offset] = value;
        Ok(())
    }

    fn mem_load(&mut self, offset: usize) -> Result<u64, VmError> {
        self.ensure_memory(offset + 32)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.ctx.memory[offset + 24..offset + 32]);
        Ok(u64::from_be_bytes(buf))
    }

    fn mem_slice(&mut self, offset: usize, size: usize) -> Result<Vec<u8>, VmError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        self.ensure_memory(offset + size)?;
        Ok(self.ctx.memory[offset..offset + size].to_vec())
    }

    fn halt_success(&mut self, output: Vec<u8>) {
        self.ctx.set_result(StatusCode::Success, output);
    }

    fn halt_revert(&mut self, output: Vec<u8>) {
        self.ctx.set_result(StatusCode::Revert, output);
    }

    fn halt_failure(&mut self) {
        self.ctx.gas_remaining = 0;
        self.ctx.set_result(StatusCode::Failure, Vec::new());
    }
}

/// Runs `icode` against `ctx` until a terminator, an error, or the end of
/// the code is reached (falling off the end is treated as an implicit
/// `STOP`, matching the EVM). `stack` must come from a [`crate::pool`] pool
/// per §4.5; this function never grows it beyond what's already reserved
/// except via ordinary `Vec` push reallocation.
pub fn execute(
    revision: Revision,
    ctx: &mut RuntimeContext,
    icode: &Intercode,
    host: &mut dyn HostInterface,
    address: [u8; 20],
    stack: &mut Vec<StackWord>,
) {
    let table = JumpTable::for_revision(revision);
    let code = icode.code();
    let mut interp = Interp {
        code,
        icode,
        pc: 0,
        stack,
        ctx,
        host,
        address,
    };

    loop {
        if interp.pc >= code.len() {
            interp.halt_success(Vec::new());
            break;
        }
        let opcode = code[interp.pc];
        match table.get(opcode) {
            Some(handler) => {
                if let Err(err) = handler(&mut interp) {
                    tracing::debug!(?err, pc = interp.pc, opcode, "interpreter fault");
                    interp.halt_failure();
                    break;
                }
            }
            None => {
                tracing::debug!(pc = interp.pc, opcode, "invalid opcode");
                interp.halt_failure();
                break;
            }
        }
        if interp.ctx.is_halted() {
            break;
        }
    }
}
