//! Banker's algorithm for deadlock avoidance.
//!
//! [`ResourceState`] holds the per-process `max`, `allocated` and `need`
//! vectors and the shared `available` vector. Every edit goes through a
//! method that keeps `need = max − allocated`.
//!
//! The safety scan is greedy and first-fit in process index order: after each
//! process it manages to finish, the scan restarts from index 0. It stops when
//! a full scan finishes nobody.

use std::fmt;

use tracing::{debug, info};

use crate::error::{Result, SimError};

/// Resource vectors of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResources {
    pub max: Vec<u32>,
    pub allocated: Vec<u32>,
    pub need: Vec<u32>,
}

impl ProcessResources {
    fn zeroed(n_resources: usize) -> Self {
        ProcessResources {
            max: vec![0; n_resources],
            allocated: vec![0; n_resources],
            need: vec![0; n_resources],
        }
    }
}

/// Verdict of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    pub safe: bool,
    /// Finishing order found by the scan. Complete only when `safe`; when
    /// unsafe it holds the processes that could still finish.
    pub sequence: Vec<usize>,
}

/// Why a resource request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The request asks for more than the process declared it still needs.
    ExceedsNeed { resource: usize },
    /// Not enough of the resource is free right now.
    ExceedsAvailable { resource: usize },
    /// Granting would leave no safe finishing order.
    Unsafe,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ExceedsNeed { resource } => {
                write!(f, "request exceeds the process's need for R{resource}")
            }
            RejectReason::ExceedsAvailable { resource } => {
                write!(f, "not enough R{resource} available")
            }
            RejectReason::Unsafe => write!(f, "would produce an unsafe state"),
        }
    }
}

/// Result of a resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request was committed. `sequence` is the safe order that
    /// justified it.
    Granted { sequence: Vec<usize> },
    /// Nothing changed.
    Rejected(RejectReason),
}

impl RequestOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, RequestOutcome::Granted { .. })
    }
}

/// Resource allocation state for `n` processes and `m` resource types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    processes: Vec<ProcessResources>,
    available: Vec<u32>,
}

impl ResourceState {
    /// All-zero state with the given dimensions.
    pub fn new(n_processes: usize, n_resources: usize) -> Result<Self> {
        if n_processes == 0 {
            return Err(SimError::invalid("need at least one process"));
        }
        if n_resources == 0 {
            return Err(SimError::invalid("need at least one resource type"));
        }
        Ok(ResourceState {
            processes: vec![ProcessResources::zeroed(n_resources); n_processes],
            available: vec![0; n_resources],
        })
    }

    /// Build a state from full matrices, one row per process.
    pub fn from_matrices(
        max: &[Vec<u32>],
        allocated: &[Vec<u32>],
        available: &[u32],
    ) -> Result<Self> {
        if max.len() != allocated.len() {
            return Err(SimError::invalid(format!(
                "max has {} rows but allocated has {}",
                max.len(),
                allocated.len()
            )));
        }
        let mut state = Self::new(max.len(), available.len())?;
        for (r, &units) in available.iter().enumerate() {
            state.set_available(r, units)?;
        }
        for (pid, (max_row, alloc_row)) in max.iter().zip(allocated).enumerate() {
            state.check_row(pid, max_row)?;
            state.check_row(pid, alloc_row)?;
            for r in 0..available.len() {
                state.set_max(pid, r, max_row[r])?;
                state.set_allocated(pid, r, alloc_row[r])?;
            }
        }
        Ok(state)
    }

    /// The five-process, three-resource instance found in most textbooks.
    /// It is safe, with available `[3, 3, 2]`.
    pub fn textbook() -> Self {
        let max = [
            vec![7, 5, 3],
            vec![3, 2, 2],
            vec![9, 0, 2],
            vec![2, 2, 2],
            vec![4, 3, 3],
        ];
        let allocated = [
            vec![0, 1, 0],
            vec![2, 0, 0],
            vec![3, 0, 2],
            vec![2, 1, 1],
            vec![0, 0, 2],
        ];
        let processes = max
            .into_iter()
            .zip(allocated)
            .map(|(max, allocated)| {
                let need = max.iter().zip(&allocated).map(|(m, a)| m - a).collect();
                ProcessResources {
                    max,
                    allocated,
                    need,
                }
            })
            .collect();
        ResourceState {
            processes,
            available: vec![3, 3, 2],
        }
    }

    pub fn num_processes(&self) -> usize {
        self.processes.len()
    }

    pub fn num_resources(&self) -> usize {
        self.available.len()
    }

    pub fn processes(&self) -> &[ProcessResources] {
        &self.processes
    }

    pub fn process(&self, pid: usize) -> Option<&ProcessResources> {
        self.processes.get(pid)
    }

    pub fn available(&self) -> &[u32] {
        &self.available
    }

    /// Set the declared maximum claim. It may not drop below the allocation.
    pub fn set_max(&mut self, pid: usize, resource: usize, units: u32) -> Result<()> {
        self.check_cell(pid, resource)?;
        let p = &mut self.processes[pid];
        if units < p.allocated[resource] {
            return Err(SimError::invalid(format!(
                "max {units} for P{pid}/R{resource} is below its allocation {}",
                p.allocated[resource]
            )));
        }
        p.max[resource] = units;
        p.need[resource] = units - p.allocated[resource];
        Ok(())
    }

    /// Set the current allocation. It may not exceed the maximum claim.
    pub fn set_allocated(&mut self, pid: usize, resource: usize, units: u32) -> Result<()> {
        self.check_cell(pid, resource)?;
        let p = &mut self.processes[pid];
        if units > p.max[resource] {
            return Err(SimError::invalid(format!(
                "allocation {units} for P{pid}/R{resource} exceeds its max {}",
                p.max[resource]
            )));
        }
        p.allocated[resource] = units;
        p.need[resource] = p.max[resource] - units;
        Ok(())
    }

    pub fn set_available(&mut self, resource: usize, units: u32) -> Result<()> {
        if resource >= self.available.len() {
            return Err(SimError::contract(format!("no resource R{resource}")));
        }
        self.available[resource] = units;
        Ok(())
    }

    /// Ask for `request` units on behalf of `pid`.
    ///
    /// The request is applied tentatively and kept only if the resulting
    /// state is safe.
    pub fn request(&mut self, pid: usize, request: &[u32]) -> Result<RequestOutcome> {
        if pid >= self.processes.len() {
            return Err(SimError::contract(format!("no process P{pid}")));
        }
        self.check_row(pid, request)?;

        for (r, &units) in request.iter().enumerate() {
            if units > self.processes[pid].need[r] {
                debug!(pid, resource = r, units, "request exceeds need");
                return Ok(RequestOutcome::Rejected(RejectReason::ExceedsNeed {
                    resource: r,
                }));
            }
            if units > self.available[r] {
                debug!(pid, resource = r, units, "request exceeds available");
                return Ok(RequestOutcome::Rejected(
                    RejectReason::ExceedsAvailable { resource: r },
                ));
            }
        }

        let mut tentative = self.clone();
        let p = &mut tentative.processes[pid];
        for (r, &units) in request.iter().enumerate() {
            tentative.available[r] -= units;
            p.allocated[r] += units;
            p.need[r] -= units;
        }

        let report = check_safety(&tentative);
        if !report.safe {
            info!(pid, ?request, "request denied: unsafe state");
            return Ok(RequestOutcome::Rejected(RejectReason::Unsafe));
        }
        *self = tentative;
        info!(pid, ?request, sequence = ?report.sequence, "request granted");
        Ok(RequestOutcome::Granted {
            sequence: report.sequence,
        })
    }

    fn check_cell(&self, pid: usize, resource: usize) -> Result<()> {
        if pid >= self.processes.len() {
            return Err(SimError::contract(format!("no process P{pid}")));
        }
        if resource >= self.available.len() {
            return Err(SimError::contract(format!("no resource R{resource}")));
        }
        Ok(())
    }

    fn check_row(&self, pid: usize, row: &[u32]) -> Result<()> {
        if row.len() != self.available.len() {
            return Err(SimError::invalid(format!(
                "P{pid}: expected {} resource values, got {}",
                self.available.len(),
                row.len()
            )));
        }
        Ok(())
    }
}

/// Run the safety algorithm on `state`.
///
/// `work` is tracked in `u64`, since available plus every allocation can
/// exceed `u32::MAX`.
pub fn check_safety(state: &ResourceState) -> SafetyReport {
    let mut work: Vec<u64> = state.available.iter().map(|&a| u64::from(a)).collect();
    let mut finish = vec![false; state.processes.len()];
    let mut sequence = Vec::with_capacity(state.processes.len());

    'scan: loop {
        for (i, p) in state.processes.iter().enumerate() {
            if finish[i] || !fits(&p.need, &work) {
                continue;
            }
            for (w, a) in work.iter_mut().zip(&p.allocated) {
                *w += u64::from(*a);
            }
            finish[i] = true;
            sequence.push(i);
            continue 'scan;
        }
        break;
    }

    let safe = finish.iter().all(|&f| f);
    debug!(safe, ?sequence, "safety check");
    SafetyReport { safe, sequence }
}

/// `need ≤ work`, component-wise.
fn fits(need: &[u32], work: &[u64]) -> bool {
    need.iter().zip(work).all(|(&n, &w)| u64::from(n) <= w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_need_tracks_edits() {
        let mut s = ResourceState::new(1, 2).unwrap();
        s.set_max(0, 0, 5).unwrap();
        s.set_allocated(0, 0, 2).unwrap();
        assert_eq!(s.process(0).unwrap().need, vec![3, 0]);
        s.set_max(0, 0, 4).unwrap();
        assert_eq!(s.process(0).unwrap().need, vec![2, 0]);
        assert!(s.set_max(0, 0, 1).is_err());
        assert!(s.set_allocated(0, 1, 1).is_err());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(ResourceState::new(0, 3).is_err());
        assert!(ResourceState::new(3, 0).is_err());
    }

    #[test]
    fn test_restart_from_top() {
        let s = ResourceState::textbook();
        assert_eq!(check_safety(&s).sequence, vec![1, 3, 0, 2, 4]);
    }
}
