//! Opcode handlers. Deliberately not exhaustive EVM semantics (a non-goal,
//! see SPEC_FULL.md §1) — enough of a stack machine to exercise the
//! dispatch loop's shape: gas accounting, pool-backed stack/memory, status
//! writing on terminators, and host storage calls.

use crate::error::VmError;
use crate::interpreter::{Interp, OpCode};

const GAS_BASE: i64 = 2;
const GAS_VERYLOW: i64 = 3;
const GAS_STORAGE: i64 = 100;

fn charge(interp: &mut Interp, amount: i64) -> Result<(), VmError> {
    if interp.ctx.gas_remaining < amount {
        let needed = amount as u64;
        let available = interp.ctx.gas_remaining.max(0) as u64;
        return Err(VmError::OutOfGas { needed, available });
    }
    interp.ctx.gas_remaining -= amount;
    Ok(())
}

pub fn stop(interp: &mut Interp) -> Result<(), VmError> {
    interp.halt_success(Vec::new());
    Ok(())
}

pub fn add(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let a = interp.pop()?;
    let b = interp.pop()?;
    interp.push(a.wrapping_add(b))?;
    interp.advance(1);
    Ok(())
}

pub fn mul(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW + 2)?;
    let a = interp.pop()?;
    let b = interp.pop()?;
    interp.push(a.wrapping_mul(b))?;
    interp.advance(1);
    Ok(())
}

pub fn sub(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let a = interp.pop()?;
    let b = interp.pop()?;
    interp.push(a.wrapping_sub(b))?;
    interp.advance(1);
    Ok(())
}

pub fn div(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW + 2)?;
    let a = interp.pop()?;
    let b = interp.pop()?;
    interp.push(if b == 0 { 0 } else { a / b })?;
    interp.advance(1);
    Ok(())
}

pub fn pop(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_BASE)?;
    interp.pop()?;
    interp.advance(1);
    Ok(())
}

pub fn mload(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let offset = interp.pop()? as usize;
    let word = interp.mem_load(offset)?;
    interp.push(word)?;
    interp.advance(1);
    Ok(())
}

pub fn mstore(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let offset = interp.pop()? as usize;
    let value = interp.pop()?;
    interp.mem_store(offset, value)?;
    interp.advance(1);
    Ok(())
}

pub fn mstore8(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let offset = interp.pop()? as usize;
    let value = interp.pop()?;
    interp.mem_store_byte(offset, value as u8)?;
    interp.advance(1);
    Ok(())
}

pub fn sload(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_STORAGE)?;
    let key = interp.pop()?;
    let mut key_bytes = [0u8; 32];
    key_bytes[24..].copy_from_slice(&key.to_be_bytes());
    let value = interp.host.get_storage(&interp.address, &key_bytes);
    let mut low = [0u8; 8];
    low.copy_from_slice(&value[24..]);
    interp.push(u64::from_be_bytes(low))?;
    interp.advance(1);
    Ok(())
}

pub fn sstore(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_STORAGE)?;
    let key = interp.pop()?;
    let value = interp.pop()?;
    let mut key_bytes = [0u8; 32];
    key_bytes[24..].copy_from_slice(&key.to_be_bytes());
    let mut value_bytes = [0u8; 32];
    value_bytes[24..].copy_from_slice(&value.to_be_bytes());
    interp.host.set_storage(&interp.address, &key_bytes, &value_bytes);
    interp.advance(1);
    Ok(())
}

pub fn jump(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, 8)?;
    let dest = interp.pop()? as usize;
    interp.jump_to(dest)?;
    Ok(())
}

pub fn jumpi(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, 10)?;
    let dest = interp.pop()? as usize;
    let cond = interp.pop()?;
    if cond != 0 {
        interp.jump_to(dest)?;
    } else {
        interp.advance(1);
    }
    Ok(())
}

pub fn pc(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_BASE)?;
    let pc = interp.pc as u64;
    interp.push(pc)?;
    interp.advance(1);
    Ok(())
}

pub fn jumpdest(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, 1)?;
    interp.advance(1);
    Ok(())
}

pub fn push(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let opcode = interp.code[interp.pc];
    let width = OpCode::push_immediate_len(opcode).unwrap_or(0);
    let end = (interp.pc + 1 + width).min(interp.code.len());
    let mut value: u64 = 0;
    for &b in &interp.code[interp.pc + 1..end] {
        value = (value << 8) | b as u64;
    }
    interp.push(value)?;
    interp.advance(1 + width);
    Ok(())
}

pub fn dup1(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    let top = interp.peek()?;
    interp.push(top)?;
    interp.advance(1);
    Ok(())
}

pub fn swap1(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_VERYLOW)?;
    interp.swap_top_two()?;
    interp.advance(1);
    Ok(())
}

pub fn ret(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, GAS_BASE)?;
    let offset = interp.pop()? as usize;
    let size = interp.pop()? as usize;
    let output = interp.mem_slice(offset, size)?;
    interp.halt_success(output);
    Ok(())
}

pub fn revert(interp: &mut Interp) -> Result<(), VmError> {
    let offset = interp.pop()? as usize;
    let size = interp.pop()? as usize;
    let output = interp.mem_slice(offset, size)?;
    interp.halt_revert(output);
    Ok(())
}

pub fn invalid(interp: &mut Interp) -> Result<(), VmError> {
    interp.halt_failure();
    Ok(())
}

pub fn selfdestruct(interp: &mut Interp) -> Result<(), VmError> {
    charge(interp, 5000)?;
    let beneficiary_word = interp.pop()?;
    let mut beneficiary = [0u8; 20];
    beneficiary[12..].copy_from_slice(&beneficiary_word.to_be_bytes());
    interp.host.selfdestruct(&interp.address, &beneficiary);
    interp.halt_success(Vec::new());
    Ok(())
}
