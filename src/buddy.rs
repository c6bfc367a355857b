//! Binary buddy memory allocator.
//!
//! The block tree lives in an arena of nodes indexed by [`BlockId`]. A node is
//! either a leaf (free or allocated) or split into two equal halves, and
//! children find their parent through its id. Slots released by a merge are
//! reused by later splits, and every grant carries a fresh generation so a
//! handle outliving its block is refused instead of freeing a newer one.

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::types::BlockId;

/// Pool geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyConfig {
    /// Total pool size. Must be a power of two.
    pub pool_size: u64,
    /// Smallest block the allocator will hand out. Must be a power of two.
    pub min_block: u64,
}

impl Default for BuddyConfig {
    fn default() -> Self {
        BuddyConfig {
            pool_size: 128,
            min_block: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Free,
    Allocated { generation: u64 },
    Split { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    offset: u64,
    size: u64,
    parent: Option<usize>,
    kind: NodeKind,
}

/// A leaf of the block tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: BlockId,
    pub offset: u64,
    pub size: u64,
    pub allocated: bool,
}

/// Result of an allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOutcome {
    Granted { block: BlockId, size: u64 },
    /// No free block is large enough, whatever the total free space.
    Insufficient { requested: u64, largest_free: u64 },
}

impl AllocOutcome {
    pub fn block(&self) -> Option<BlockId> {
        match self {
            AllocOutcome::Granted { block, .. } => Some(*block),
            AllocOutcome::Insufficient { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuddyAllocator {
    config: BuddyConfig,
    nodes: Vec<Option<Node>>,
    vacant: Vec<usize>,
    generation: u64,
}

const ROOT: usize = 0;

impl BuddyAllocator {
    pub fn new(config: BuddyConfig) -> Result<Self> {
        if !config.pool_size.is_power_of_two() {
            return Err(SimError::invalid(format!(
                "pool size {} is not a power of two",
                config.pool_size
            )));
        }
        if !config.min_block.is_power_of_two() || config.min_block > config.pool_size {
            return Err(SimError::invalid(format!(
                "minimum block {} must be a power of two no larger than the pool",
                config.min_block
            )));
        }
        let root = Node {
            offset: 0,
            size: config.pool_size,
            parent: None,
            kind: NodeKind::Free,
        };
        Ok(BuddyAllocator {
            config,
            nodes: vec![Some(root)],
            vacant: Vec::new(),
            generation: 0,
        })
    }

    pub fn config(&self) -> BuddyConfig {
        self.config
    }

    /// Allocate a block of at least `size` units.
    ///
    /// The smallest free leaf that fits is chosen, with ties going to the
    /// leaf met first in a depth-first walk that visits left before right. It
    /// is halved while the left half still fits and is no smaller than the
    /// minimum block.
    pub fn allocate(&mut self, size: u64) -> Result<AllocOutcome> {
        if size < self.config.min_block || size > self.config.pool_size {
            return Err(SimError::invalid(format!(
                "size {size} outside [{}, {}]",
                self.config.min_block, self.config.pool_size
            )));
        }

        let Some(mut idx) = self.find_fit(size) else {
            let largest_free = self.largest_free_block();
            info!(size, largest_free, "insufficient contiguous memory");
            return Ok(AllocOutcome::Insufficient {
                requested: size,
                largest_free,
            });
        };

        loop {
            let half = self.node(idx).size / 2;
            if half < size || half < self.config.min_block {
                break;
            }
            let (left, _) = self.split(idx);
            idx = left;
        }

        self.generation += 1;
        let generation = self.generation;
        let node = self.node_mut(idx);
        node.kind = NodeKind::Allocated { generation };
        let granted = node.size;
        debug!(block = idx, generation, offset = node.offset, size = granted, "block allocated");
        Ok(AllocOutcome::Granted {
            block: BlockId::new(idx, generation),
            size: granted,
        })
    }

    /// Release an allocated block and merge free buddies upward.
    pub fn free(&mut self, block: BlockId) -> Result<()> {
        let idx = block.index;
        match self.nodes.get(idx).copied().flatten() {
            Some(Node {
                kind: NodeKind::Allocated { generation },
                ..
            }) if generation == block.generation => {}
            _ => {
                return Err(SimError::contract(format!(
                    "block {block} is not an allocated block"
                )))
            }
        }
        self.node_mut(idx).kind = NodeKind::Free;
        debug!(block = idx, "block freed");

        let mut current = idx;
        while let Some(parent) = self.node(current).parent {
            let NodeKind::Split { left, right } = self.node(parent).kind else {
                break;
            };
            let sibling = if left == current { right } else { left };
            if self.node(sibling).kind != NodeKind::Free {
                break;
            }
            self.release(left);
            self.release(right);
            self.node_mut(parent).kind = NodeKind::Free;
            debug!(block = parent, size = self.node(parent).size, "buddies merged");
            current = parent;
        }
        Ok(())
    }

    /// Leaves in address order. Free leaves report generation 0, which no
    /// grant ever carries.
    pub fn leaves(&self) -> Vec<BlockInfo> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(idx) = stack.pop() {
            let node = self.node(idx);
            match node.kind {
                NodeKind::Split { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Allocated { generation } => out.push(BlockInfo {
                    id: BlockId::new(idx, generation),
                    offset: node.offset,
                    size: node.size,
                    allocated: true,
                }),
                NodeKind::Free => out.push(BlockInfo {
                    id: BlockId::new(idx, 0),
                    offset: node.offset,
                    size: node.size,
                    allocated: false,
                }),
            }
        }
        out
    }

    /// Units held by allocated blocks.
    pub fn used(&self) -> u64 {
        self.leaves()
            .iter()
            .filter(|b| b.allocated)
            .map(|b| b.size)
            .sum()
    }

    pub fn usage_percent(&self) -> f64 {
        self.used() as f64 * 100.0 / self.config.pool_size as f64
    }

    /// Size of the largest free leaf (0 when none).
    pub fn largest_free_block(&self) -> u64 {
        self.leaves()
            .iter()
            .filter(|b| !b.allocated)
            .map(|b| b.size)
            .max()
            .unwrap_or(0)
    }

    /// True when the tree is a single free root.
    pub fn is_pristine(&self) -> bool {
        self.node(ROOT).kind == NodeKind::Free
    }

    fn find_fit(&self, size: u64) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        let mut stack = vec![ROOT];
        while let Some(idx) = stack.pop() {
            let node = self.node(idx);
            match node.kind {
                NodeKind::Free if node.size >= size => {
                    if best.map_or(true, |(_, best_size)| node.size < best_size) {
                        best = Some((idx, node.size));
                    }
                    if node.size == size {
                        break;
                    }
                }
                NodeKind::Split { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                _ => {}
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn split(&mut self, idx: usize) -> (usize, usize) {
        let Node { offset, size, .. } = *self.node(idx);
        let half = size / 2;
        let left = self.insert(Node {
            offset,
            size: half,
            parent: Some(idx),
            kind: NodeKind::Free,
        });
        let right = self.insert(Node {
            offset: offset + half,
            size: half,
            parent: Some(idx),
            kind: NodeKind::Free,
        });
        self.node_mut(idx).kind = NodeKind::Split { left, right };
        debug!(block = idx, size, "block split");
        (left, right)
    }

    fn insert(&mut self, node: Node) -> usize {
        match self.vacant.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.vacant.push(idx);
    }

    // Internal indices come from the tree itself, so a vacant slot here is a
    // broken tree, not bad caller input.
    fn node(&self, idx: usize) -> &Node {
        match &self.nodes[idx] {
            Some(node) => node,
            None => unreachable!("dangling block index {idx}"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        match &mut self.nodes[idx] {
            Some(node) => node,
            None => unreachable!("dangling block index {idx}"),
        }
    }
}
