//! Bytecode analysis: the pure transform from raw bytes to [`Intercode`]
//! (§6, "Analysis (consumed)"). The concrete analysis used by a production
//! chain is an external collaborator; this module defines the trait seam
//! and ships a reference analyzer sufficient to drive the interpreter in
//! `interpreter::execute` and the tests in this crate.

use crate::code::Intercode;
use crate::interpreter::opcode::OpCode;
use std::collections::BTreeSet;

/// Produces an [`Intercode`] from raw bytecode. Pure: no global state, no
/// side effects, safe to call from any thread.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, code: &[u8]) -> Intercode;
}

/// Reference analyzer: scans linearly, skipping `PUSHn` immediates, and
/// records every `JUMPDEST` offset reached by that scan (an immediate byte
/// equal to `0x5b` inside a `PUSHn`'s payload is not a valid jump target,
/// which is exactly why this can't be a naive byte search).
#[derive(Default, Clone, Copy)]
pub struct DefaultAnalyzer;

impl Analyzer for DefaultAnalyzer {
    fn analyze(&self, code: &[u8]) -> Intercode {
        let mut jumpdests = BTreeSet::new();
        let mut pc = 0usize;
        while pc < code.len() {
            let opcode = code[pc];
            if opcode == OpCode::Jumpdest as u8 {
                jumpdests.insert(pc);
                pc += 1;
                continue;
            }
            if let Some(push_len) = OpCode::push_immediate_len(opcode) {
                pc += 1 + push_len;
            } else {
                pc += 1;
            }
        }
        Intercode::new(code.to_vec(), jumpdests)
    }
}
