//! The three code representations threaded through cache, compiler, and VM:
//! [`Intercode`] (analyzed bytecode), [`Nativecode`] (compiled entrypoint),
//! and [`Varcode`] (the pair, plus the tiering counter, that the cache
//! actually stores).

mod intercode;
mod nativecode;
mod varcode;

pub use intercode::{Intercode, SharedIntercode};
pub use nativecode::{EntryPoint, Nativecode, SharedNativecode};
pub use varcode::{SharedVarcode, Varcode};
