//! Fixed-size opcode dispatch table, one per revision, matching the shape
//! of the teacher's own 256-entry `JumpTable`: a plain array indexed by
//! opcode byte rather than a big match/if-chain, so revision-specific
//! semantics live in how the table is *built*, not scattered through the
//! dispatch loop (§4.4).

use crate::error::VmError;
use crate::interpreter::handlers;
use crate::interpreter::Interp;
use crate::revision::Revision;

pub type Handler = fn(&mut Interp) -> Result<(), VmError>;

#[derive(Clone)]
pub struct JumpTable {
    handlers: [Option<Handler>; 256],
}

impl JumpTable {
    fn empty() -> Self {
        Self {
            handlers: [None; 256],
        }
    }

    pub fn get(&self, opcode: u8) -> Option<Handler> {
        self.handlers[opcode as usize]
    }

    fn set(&mut self, opcode: u8, handler: Handler) {
        self.handlers[opcode as usize] = Some(handler);
    }

    /// Builds the table for `revision`. This reference interpreter's
    /// opcode subset happens not to vary across revisions; a production
    /// table would register different handlers (or none) per revision
    /// here, which is the entire point of keying the table by revision
    /// instead of branching inside each handler.
    pub fn for_revision(_revision: Revision) -> Self {
        let mut table = Self::empty();
        table.set(0x00, handlers::stop);
        table.set(0x01, handlers::add);
        table.set(0x02, handlers::mul);
        table.set(0x03, handlers::sub);
        table.set(0x04, handlers::div);
        table.set(0x50, handlers::pop);
        table.set(0x51, handlers::mload);
        table.set(0x52, handlers::mstore);
        table.set(0x53, handlers::mstore8);
        table.set(0x54, handlers::sload);
        table.set(0x55, handlers::sstore);
        table.set(0x56, handlers::jump);
        table.set(0x57, handlers::jumpi);
        table.set(0x58, handlers::pc);
        table.set(0x5b, handlers::jumpdest);
        for op in 0x60..=0x7f {
            table.set(op, handlers::push);
        }
        table.set(0x80, handlers::dup1);
        table.set(0x90, handlers::swap1);
        table.set(0xf3, handlers::ret);
        table.set(0xfd, handlers::revert);
        table.set(0xfe, handlers::invalid);
        table.set(0xff, handlers::selfdestruct);
        table
    }
}
