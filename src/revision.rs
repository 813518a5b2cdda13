//! Protocol revisions and the many-to-one mapping onto chain IDs that lets
//! native code compiled for one revision stay valid for another.

/// EVM protocol revision, one variant per successive upgrade. Ordered: later
/// variants are later revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Revision {
    Frontier = 0,
    Byzantium = 1,
    Istanbul = 2,
    Berlin = 3,
    London = 4,
    Paris = 5,
    Shanghai = 6,
    Cancun = 7,
}

impl Revision {
    pub const LATEST: Revision = Revision::Cancun;
}

/// Chain ID: the equivalence class of revisions that share opcode semantics
/// and can therefore share compiled native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(u8);

/// Maps a revision onto its chain ID. Revisions that only changed gas
/// schedules or added opcodes without touching existing semantics (here:
/// Istanbul→Berlin, and the post-Paris "The Merge" revisions that only
/// touched consensus, not opcode semantics) share a chain ID so native code
/// compiled under one is still valid under the other.
pub fn chain_of(rev: Revision) -> ChainId {
    use Revision::*;
    match rev {
        Frontier => ChainId(0),
        Byzantium => ChainId(1),
        Istanbul | Berlin => ChainId(2),
        London => ChainId(3),
        Paris | Shanghai | Cancun => ChainId(4),
    }
}
