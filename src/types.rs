//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers (PIDs, frame indices, buddy block ids) prevent
//! silent confusion between the many small integers the engines juggle.
//! Plain quantities (ticks, cylinders) stay as type aliases.

use std::fmt;

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Index into the physical frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.0)
    }
}

/// Handle to a block granted by the buddy allocator.
///
/// `index` names the arena slot and `generation` the grant that produced the
/// handle. Slots are reused after merges, so a handle is only accepted while
/// its generation still matches the slot's current allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    pub index: usize,
    pub generation: u64,
}

impl BlockId {
    pub fn new(index: usize, generation: u64) -> Self {
        BlockId { index, generation }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Simulated time in scheduler ticks.
pub type Tick = u64;

/// Disk cylinder number.
pub type Cylinder = u32;
