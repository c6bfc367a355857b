//! Clock (second-chance) page replacement.
//!
//! The memory model is split in two:
//!
//! - [`MemoryState`] is the shared data the caller owns: the physical frame
//!   array, the page table keyed by virtual page, and the processes that own
//!   those pages. It is passed explicitly into every engine call.
//! - [`ClockReplacer`] is the policy: the clock hand, hit/miss counters and
//!   the access history.
//!
//! An access is one synchronous transition. On a fault the whole
//! second-chance sweep (clearing reference bits, choosing the victim, loading
//! the page, moving the hand) is applied before `access` returns. The sweep is
//! also reported as a list of [`ClockStep`]s so a presentation layer can
//! replay it slowly without touching engine state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, SimError};
use crate::types::{FrameId, Pid};

/// Physical memory size used by the demo driver.
pub const DEFAULT_FRAMES: usize = 8;

/// Total page demand above this multiple of the frame count is reported as
/// thrashing.
pub const THRASHING_FACTOR: f64 = 1.5;

/// Virtual page: page `page` of process `pid`, written `"<pid>-<page>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vpn {
    pub pid: Pid,
    pub page: u32,
}

impl Vpn {
    pub fn new(pid: u32, page: u32) -> Self {
        Vpn {
            pid: Pid(pid),
            page,
        }
    }
}

impl fmt::Display for Vpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.pid.0, self.page)
    }
}

impl FromStr for Vpn {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || SimError::invalid(format!("{s:?} is not a virtual page (<pid>-<page>)"));
        let (pid, page) = s.trim().split_once('-').ok_or_else(bad)?;
        let pid = pid.parse::<u32>().map_err(|_| bad())?;
        let page = page.parse::<u32>().map_err(|_| bad())?;
        Ok(Vpn::new(pid, page))
    }
}

/// One slot of physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub id: FrameId,
    pub page: Option<Vpn>,
    pub reference_bit: bool,
}

impl Frame {
    fn empty(id: usize) -> Self {
        Frame {
            id: FrameId(id),
            page: None,
            reference_bit: false,
        }
    }

    fn clear(&mut self) {
        self.page = None;
        self.reference_bit = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageTableEntry {
    pub present: bool,
    pub frame: Option<FrameId>,
    pub referenced: bool,
    pub modified: bool,
}

/// A process that owns `page_count` virtual pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagedProcess {
    pub pid: Pid,
    pub page_count: u32,
}

/// Physical frames, page table and page-owning processes.
#[derive(Debug, Clone)]
pub struct MemoryState {
    frames: Vec<Frame>,
    page_table: BTreeMap<Vpn, PageTableEntry>,
    processes: Vec<PagedProcess>,
    /// `None` once `u32::MAX` has been handed out.
    next_pid: Option<u32>,
}

impl MemoryState {
    /// Create an empty memory with a fixed number of frames.
    pub fn new(frame_count: usize) -> Result<Self> {
        if frame_count == 0 {
            return Err(SimError::invalid("physical memory needs at least one frame"));
        }
        Ok(MemoryState {
            frames: (0..frame_count).map(Frame::empty).collect(),
            page_table: BTreeMap::new(),
            processes: Vec::new(),
            next_pid: Some(1),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0)
    }

    pub fn page_table(&self) -> &BTreeMap<Vpn, PageTableEntry> {
        &self.page_table
    }

    pub fn entry(&self, vpn: Vpn) -> Option<&PageTableEntry> {
        self.page_table.get(&vpn)
    }

    pub fn processes(&self) -> &[PagedProcess] {
        &self.processes
    }

    /// Every known virtual page, sorted by process then page.
    pub fn pages(&self) -> impl Iterator<Item = Vpn> + '_ {
        self.page_table.keys().copied()
    }

    /// Number of pages currently loaded in a frame.
    pub fn resident_pages(&self) -> usize {
        self.frames.iter().filter(|f| f.page.is_some()).count()
    }

    /// Sum of the page counts of all processes.
    pub fn page_demand(&self) -> u64 {
        self.processes.iter().map(|p| u64::from(p.page_count)).sum()
    }

    /// Whether page demand exceeds what physical memory can sensibly hold.
    pub fn is_thrashing(&self) -> bool {
        self.page_demand() as f64 > self.frames.len() as f64 * THRASHING_FACTOR
    }

    /// Register a process with `page_count` pages, none of them resident.
    pub fn create_process(&mut self, page_count: u32) -> Result<Pid> {
        let Some(next) = self.next_pid else {
            return Err(SimError::invalid("no pid left for a new process"));
        };
        let pid = Pid(next);
        self.register_process(pid, page_count)?;
        Ok(pid)
    }

    /// Register a process under a caller-chosen pid.
    pub fn register_process(&mut self, pid: Pid, page_count: u32) -> Result<()> {
        if page_count == 0 {
            return Err(SimError::invalid("a process needs at least one page"));
        }
        if self.processes.iter().any(|p| p.pid == pid) {
            return Err(SimError::invalid(format!("duplicate paged process {pid}")));
        }
        self.next_pid = next_pid_after(self.next_pid, pid);
        for page in 0..page_count {
            self.page_table
                .insert(Vpn { pid, page }, PageTableEntry::default());
        }
        self.processes.push(PagedProcess { pid, page_count });
        debug!(pid = pid.0, page_count, "process created");
        Ok(())
    }

    /// Remove a process, its page-table entries and any frames it occupies.
    pub fn kill_process(&mut self, pid: Pid) -> Result<()> {
        let idx = self
            .processes
            .iter()
            .position(|p| p.pid == pid)
            .ok_or_else(|| SimError::contract(format!("no paged process {pid}")))?;
        self.processes.remove(idx);
        for frame in &mut self.frames {
            if frame.page.is_some_and(|v| v.pid == pid) {
                frame.clear();
            }
        }
        self.page_table.retain(|vpn, _| vpn.pid != pid);
        debug!(pid = pid.0, "process killed");
        Ok(())
    }

    /// Empty every frame and mark every page non-resident.
    fn evict_all(&mut self) {
        for frame in &mut self.frames {
            frame.clear();
        }
        for entry in self.page_table.values_mut() {
            *entry = PageTableEntry::default();
        }
    }
}

/// Replacement policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagingConfig {
    /// Set the frame's reference bit when a page is loaded on a fault.
    /// When false (the default) a freshly loaded page has bit 0 and only a
    /// later hit protects it.
    pub reference_on_load: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagingStats {
    pub hits: u64,
    pub misses: u64,
}

impl PagingStats {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hits over accesses (0 before the first access).
    pub fn hit_ratio(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

/// One stage of a fault's sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStep {
    /// The hand passed a frame with reference bit 1 and cleared it.
    SecondChance { frame: FrameId, page: Option<Vpn> },
    /// The hand stopped on a frame with reference bit 0.
    Victim {
        frame: FrameId,
        evicted: Option<Vpn>,
    },
    /// The requested page was loaded into the victim frame.
    Loaded { frame: FrameId, vpn: Vpn },
}

/// Result of a single page access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessOutcome {
    pub vpn: Vpn,
    pub hit: bool,
    /// Frame holding the page after the access.
    pub frame: FrameId,
    /// Page pushed out to make room, on a fault into an occupied frame.
    pub evicted: Option<Vpn>,
    /// Sweep stages, empty on a hit.
    pub steps: Vec<ClockStep>,
}

/// History entry kept by the replacer for every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    pub vpn: Vpn,
    pub hit: bool,
    pub frame: FrameId,
}

/// Second-chance replacement engine.
#[derive(Debug, Clone, Default)]
pub struct ClockReplacer {
    hand: usize,
    config: PagingConfig,
    stats: PagingStats,
    history: Vec<AccessRecord>,
}

impl ClockReplacer {
    pub fn new(config: PagingConfig) -> Self {
        ClockReplacer {
            config,
            ..Default::default()
        }
    }

    /// Index of the frame the next fault starts scanning from.
    pub fn hand(&self) -> usize {
        self.hand
    }

    pub fn config(&self) -> PagingConfig {
        self.config
    }

    pub fn stats(&self) -> PagingStats {
        self.stats
    }

    pub fn history(&self) -> &[AccessRecord] {
        &self.history
    }

    /// Access `vpn`, loading it on a fault.
    ///
    /// Accessing a page that is not in the page table is a contract
    /// violation and leaves everything unchanged.
    pub fn access(&mut self, state: &mut MemoryState, vpn: Vpn) -> Result<AccessOutcome> {
        let entry = state
            .page_table
            .get_mut(&vpn)
            .ok_or_else(|| SimError::contract(format!("page {vpn} is not in the page table")))?;

        if let (true, Some(frame)) = (entry.present, entry.frame) {
            entry.referenced = true;
            state.frames[frame.0].reference_bit = true;
            self.stats.hits += 1;
            self.history.push(AccessRecord {
                vpn,
                hit: true,
                frame,
            });
            debug!(%vpn, frame = frame.0, "page hit");
            return Ok(AccessOutcome {
                vpn,
                hit: true,
                frame,
                evicted: None,
                steps: Vec::new(),
            });
        }

        self.stats.misses += 1;
        let n = state.frames.len();
        let mut steps = Vec::new();
        let mut current = self.hand % n;
        // Every pass over a set bit clears it, so a victim turns up within
        // two sweeps.
        while state.frames[current].reference_bit {
            let frame = &mut state.frames[current];
            frame.reference_bit = false;
            steps.push(ClockStep::SecondChance {
                frame: frame.id,
                page: frame.page,
            });
            current = (current + 1) % n;
        }

        let victim = FrameId(current);
        let evicted = state.frames[current].page.replace(vpn);
        state.frames[current].reference_bit = self.config.reference_on_load;
        if let Some(old) = evicted {
            if let Some(old_entry) = state.page_table.get_mut(&old) {
                old_entry.present = false;
                old_entry.frame = None;
            }
        }
        state.page_table.insert(
            vpn,
            PageTableEntry {
                present: true,
                frame: Some(victim),
                referenced: true,
                modified: false,
            },
        );
        self.hand = (current + 1) % n;

        steps.push(ClockStep::Victim {
            frame: victim,
            evicted,
        });
        steps.push(ClockStep::Loaded { frame: victim, vpn });
        self.history.push(AccessRecord {
            vpn,
            hit: false,
            frame: victim,
        });
        debug!(
            %vpn,
            frame = victim.0,
            evicted = ?evicted,
            second_chances = steps.len() - 2,
            hand = self.hand,
            "page fault"
        );

        Ok(AccessOutcome {
            vpn,
            hit: false,
            frame: victim,
            evicted,
            steps,
        })
    }

    /// Empty all frames, rewind the hand and clear the counters.
    pub fn reset(&mut self, state: &mut MemoryState) {
        state.evict_all();
        self.hand = 0;
        self.stats = PagingStats::default();
        self.history.clear();
    }
}

fn next_pid_after(next: Option<u32>, taken: Pid) -> Option<u32> {
    Some(next?.max(taken.0.checked_add(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_parse() {
        assert_eq!("3-1".parse::<Vpn>().unwrap(), Vpn::new(3, 1));
        assert_eq!(Vpn::new(12, 0).to_string(), "12-0");
        assert!("3".parse::<Vpn>().is_err());
        assert!("a-1".parse::<Vpn>().is_err());
    }

    #[test]
    fn test_hit_does_not_move_hand() {
        let mut mem = MemoryState::new(2).unwrap();
        let pid = mem.create_process(2).unwrap();
        let mut clock = ClockReplacer::default();
        let a = Vpn { pid, page: 0 };
        clock.access(&mut mem, a).unwrap();
        assert_eq!(clock.hand(), 1);
        let hit = clock.access(&mut mem, a).unwrap();
        assert!(hit.hit);
        assert!(hit.steps.is_empty());
        assert_eq!(clock.hand(), 1);
        assert!(mem.frames()[0].reference_bit);
    }

    #[test]
    fn test_unknown_page_is_contract_violation() {
        let mut mem = MemoryState::new(2).unwrap();
        let mut clock = ClockReplacer::default();
        let err = clock.access(&mut mem, Vpn::new(9, 9)).unwrap_err();
        assert!(err.is_contract());
        assert_eq!(clock.stats().accesses(), 0);
    }
}
