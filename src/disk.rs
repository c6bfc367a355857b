//! Disk head scheduling.
//!
//! A single batch computation: given every pending request and the starting
//! head, produce the full head path and its total seek distance. The
//! sweep-based policies split requests into `left` (below the head) and
//! `right` (at or above the head) and differ only in how they traverse the
//! two halves and whether they touch the disk bounds.
//!
//! A request at the head's current position is serviced in place and adds no
//! entry to the path, so the path never contains zero-length legs.

use std::fmt;

use tracing::debug;

use crate::error::{Result, SimError};
use crate::types::Cylinder;

/// Disk scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskPolicy {
    /// Input order.
    Fcfs,
    /// Shortest seek time first.
    Sstf,
    /// Elevator: sweep up to the upper bound, then reverse.
    Scan,
    /// Sweep up to the upper bound, wrap to the lower bound, sweep up again.
    CScan,
    /// Elevator that reverses at the last request instead of the bound.
    Look,
    /// Sweep up, then jump straight to the lowest pending request.
    CLook,
}

impl DiskPolicy {
    pub const ALL: [DiskPolicy; 6] = [
        DiskPolicy::Fcfs,
        DiskPolicy::Sstf,
        DiskPolicy::Scan,
        DiskPolicy::CScan,
        DiskPolicy::Look,
        DiskPolicy::CLook,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiskPolicy::Fcfs => "FCFS",
            DiskPolicy::Sstf => "SSTF",
            DiskPolicy::Scan => "SCAN",
            DiskPolicy::CScan => "C-SCAN",
            DiskPolicy::Look => "LOOK",
            DiskPolicy::CLook => "C-LOOK",
        }
    }
}

impl fmt::Display for DiskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cylinder range of the disk, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    pub lower: Cylinder,
    pub upper: Cylinder,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        DiskGeometry {
            lower: 0,
            upper: 199,
        }
    }
}

impl DiskGeometry {
    pub fn new(lower: Cylinder, upper: Cylinder) -> Result<Self> {
        if lower >= upper {
            return Err(SimError::invalid(format!(
                "disk bounds [{lower}, {upper}] are empty or inverted"
            )));
        }
        Ok(DiskGeometry { lower, upper })
    }

    pub fn contains(&self, cylinder: Cylinder) -> bool {
        (self.lower..=self.upper).contains(&cylinder)
    }
}

/// Result of a disk scheduling computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSchedule {
    pub policy: DiskPolicy,
    /// Sum of the absolute distances between consecutive head positions.
    pub total_seek: u64,
    /// Head positions in visiting order, starting with the initial head.
    pub head_movement: Vec<Cylinder>,
}

impl DiskSchedule {
    /// Mean seek distance per serviced request (0 with no requests).
    pub fn average_seek(&self, requests: usize) -> f64 {
        if requests == 0 {
            0.0
        } else {
            self.total_seek as f64 / requests as f64
        }
    }
}

/// Head path under construction.
struct HeadPath {
    head: Cylinder,
    total_seek: u64,
    movement: Vec<Cylinder>,
}

impl HeadPath {
    fn new(head: Cylinder, capacity: usize) -> Self {
        let mut movement = Vec::with_capacity(capacity + 3);
        movement.push(head);
        HeadPath {
            head,
            total_seek: 0,
            movement,
        }
    }

    fn visit(&mut self, cylinder: Cylinder) {
        if cylinder == self.head {
            return;
        }
        self.total_seek += u64::from(self.head.abs_diff(cylinder));
        self.head = cylinder;
        self.movement.push(cylinder);
    }

    fn visit_all(&mut self, cylinders: impl IntoIterator<Item = Cylinder>) {
        for c in cylinders {
            self.visit(c);
        }
    }

    fn finish(self, policy: DiskPolicy) -> DiskSchedule {
        DiskSchedule {
            policy,
            total_seek: self.total_seek,
            head_movement: self.movement,
        }
    }
}

/// Compute the complete service order for `requests`.
///
/// Every request and the head must lie within `geometry`.
pub fn compute(
    policy: DiskPolicy,
    requests: &[Cylinder],
    head: Cylinder,
    geometry: DiskGeometry,
) -> Result<DiskSchedule> {
    let geometry = DiskGeometry::new(geometry.lower, geometry.upper)?;
    if !geometry.contains(head) {
        return Err(SimError::invalid(format!(
            "head {head} outside disk bounds [{}, {}]",
            geometry.lower, geometry.upper
        )));
    }
    if let Some(bad) = requests.iter().find(|r| !geometry.contains(**r)) {
        return Err(SimError::invalid(format!(
            "request {bad} outside disk bounds [{}, {}]",
            geometry.lower, geometry.upper
        )));
    }

    let mut path = HeadPath::new(head, requests.len());

    let mut sorted = requests.to_vec();
    sorted.sort_unstable();
    let split = sorted.partition_point(|&r| r < head);
    let (left, right) = sorted.split_at(split);

    match policy {
        DiskPolicy::Fcfs => path.visit_all(requests.iter().copied()),
        DiskPolicy::Sstf => {
            let mut pending = requests.to_vec();
            // min_by_key keeps the first of equally close requests.
            while let Some(idx) = closest(&pending, path.head) {
                path.visit(pending.remove(idx));
            }
        }
        DiskPolicy::Scan => {
            path.visit_all(right.iter().copied());
            path.visit(geometry.upper);
            path.visit_all(left.iter().rev().copied());
        }
        DiskPolicy::CScan => {
            path.visit_all(right.iter().copied());
            if !left.is_empty() {
                path.visit(geometry.upper);
                path.visit(geometry.lower);
                path.visit_all(left.iter().copied());
            }
        }
        DiskPolicy::Look => {
            path.visit_all(right.iter().copied());
            path.visit_all(left.iter().rev().copied());
        }
        DiskPolicy::CLook => {
            path.visit_all(right.iter().copied());
            path.visit_all(left.iter().copied());
        }
    }

    let schedule = path.finish(policy);
    debug!(
        policy = policy.name(),
        head,
        requests = requests.len(),
        total_seek = schedule.total_seek,
        "disk schedule computed"
    );
    Ok(schedule)
}

fn closest(pending: &[Cylinder], head: Cylinder) -> Option<usize> {
    pending
        .iter()
        .enumerate()
        .min_by_key(|(_, r)| r.abs_diff(head))
        .map(|(i, _)| i)
}
