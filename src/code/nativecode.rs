use crate::revision::ChainId;
use crate::runtime::RuntimeContext;
use std::sync::Arc;

/// A compiled contract entrypoint: takes the per-call runtime context and a
/// pre-allocated stack buffer, executes the compiled code, and writes its
/// result into the context (mirroring the interpreter's contract in §4.4).
///
/// §6 describes this as a bare function pointer because the real
/// code-generation backend emits one machine-code address per contract.
/// That backend is an external collaborator (out of scope here — see §6),
/// so the reference backend this crate ships instead closes over
/// per-contract data; `Arc<dyn Fn(...)>` is the idiomatic Rust realization
/// of "an address to call with this shape" when the call target isn't a
/// bare `fn`.
pub type EntryPoint = Arc<dyn Fn(&mut RuntimeContext, &mut [crate::pool::StackWord]) + Send + Sync>;

/// Compiled representation of a contract, bound to the chain ID it was
/// compiled against. `entrypoint = None` is the permanent-failure sentinel
/// (§4.2): the generator rejected this code and it must never be
/// recompiled for this chain.
#[derive(Clone)]
pub struct Nativecode {
    entrypoint: Option<EntryPoint>,
    chain_id: ChainId,
}

impl Nativecode {
    pub fn compiled(entrypoint: EntryPoint, chain_id: ChainId) -> Self {
        Self {
            entrypoint: Some(entrypoint),
            chain_id,
        }
    }

    /// The permanent-failure sentinel for `chain_id`: a null entrypoint that
    /// tells the tiering policy to stop trying to compile this code.
    pub fn failed(chain_id: ChainId) -> Self {
        Self {
            entrypoint: None,
            chain_id,
        }
    }

    pub fn entrypoint(&self) -> Option<&EntryPoint> {
        self.entrypoint.as_ref()
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn is_failed(&self) -> bool {
        self.entrypoint.is_none()
    }
}

impl std::fmt::Debug for Nativecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nativecode")
            .field("entrypoint_installed", &self.entrypoint.is_some())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Shared handle to a `Nativecode`, co-owned by the `Varcode` slot that
/// published it and any caller that read it out before a revision change.
pub type SharedNativecode = Arc<Nativecode>;
