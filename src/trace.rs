//! Execution timeline recording for the CPU scheduler.
//!
//! Every scheduling decision appends one `ExecutionInterval` (a Gantt chart
//! entry). Intervals are contiguous: each starts where the previous ended.

use crate::fmt::FmtTick;
use crate::types::{Pid, Tick};

/// What occupied the CPU during an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The given process ran.
    Run(Pid),
    /// No process had arrived (or all remaining ones had not arrived yet).
    Idle,
}

/// A single Gantt chart entry, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionInterval {
    pub slot: Slot,
    pub start: Tick,
    pub end: Tick,
}

impl ExecutionInterval {
    /// The process that ran, or `None` for an idle interval.
    pub fn pid(&self) -> Option<Pid> {
        match self.slot {
            Slot::Run(pid) => Some(pid),
            Slot::Idle => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.slot == Slot::Idle
    }

    /// Length of the interval in ticks.
    pub fn duration(&self) -> Tick {
        self.end - self.start
    }
}

/// The complete, append-only timeline of a CPU scheduling run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    intervals: Vec<ExecutionInterval>,
}

impl Timeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, slot: Slot, start: Tick, end: Tick) -> ExecutionInterval {
        debug_assert!(start < end, "empty interval [{start}, {end})");
        debug_assert_eq!(start, self.end(), "timeline gap or overlap at {start}");
        let interval = ExecutionInterval { slot, start, end };
        self.intervals.push(interval);
        interval
    }

    /// All intervals in chronological order.
    pub fn intervals(&self) -> &[ExecutionInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// End of the last interval (0 for an empty timeline).
    pub fn end(&self) -> Tick {
        self.intervals.last().map_or(0, |i| i.end)
    }

    /// Total ticks the given process spent on the CPU.
    pub fn total_runtime(&self, pid: Pid) -> Tick {
        self.intervals
            .iter()
            .filter(|i| i.pid() == Some(pid))
            .map(ExecutionInterval::duration)
            .sum()
    }

    /// Number of separate dispatches of a process, counting back-to-back
    /// intervals of the same process as one.
    pub fn schedule_count(&self, pid: Pid) -> usize {
        self.coalesced()
            .iter()
            .filter(|i| i.pid() == Some(pid))
            .count()
    }

    /// Ticks during which the CPU was idle.
    pub fn idle_ticks(&self) -> Tick {
        self.intervals
            .iter()
            .filter(|i| i.is_idle())
            .map(ExecutionInterval::duration)
            .sum()
    }

    /// Ticks during which some process ran.
    pub fn busy_ticks(&self) -> Tick {
        self.end() - self.idle_ticks()
    }

    /// Order in which processes were dispatched, with back-to-back repeats
    /// collapsed.
    pub fn dispatch_order(&self) -> Vec<Pid> {
        self.coalesced().iter().filter_map(|i| i.pid()).collect()
    }

    /// Merge adjacent intervals with the same slot.
    ///
    /// Preemptive policies decide one tick at a time, so a process that keeps
    /// the CPU shows up as a run of 1-tick intervals. This view joins them.
    pub fn coalesced(&self) -> Vec<ExecutionInterval> {
        let mut merged: Vec<ExecutionInterval> = Vec::with_capacity(self.intervals.len());
        for interval in &self.intervals {
            match merged.last_mut() {
                Some(last) if last.slot == interval.slot && last.end == interval.start => {
                    last.end = interval.end;
                }
                _ => merged.push(*interval),
            }
        }
        merged
    }

    /// Pretty-print the timeline for debugging.
    pub fn dump(&self) {
        for interval in self.coalesced() {
            let desc = match interval.slot {
                Slot::Run(pid) => format!("RUN  {pid}"),
                Slot::Idle => "IDLE".to_string(),
            };
            eprintln!(
                "[{} .. {}] {}",
                FmtTick(interval.start),
                FmtTick(interval.end),
                desc
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_joins_same_slot() {
        let mut t = Timeline::new();
        t.record(Slot::Run(Pid(1)), 0, 1);
        t.record(Slot::Run(Pid(1)), 1, 2);
        t.record(Slot::Idle, 2, 3);
        t.record(Slot::Run(Pid(2)), 3, 5);
        t.record(Slot::Run(Pid(1)), 5, 6);

        let merged = t.coalesced();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0].duration(), 2);
        assert_eq!(t.dispatch_order(), vec![Pid(1), Pid(2), Pid(1)]);
        assert_eq!(t.schedule_count(Pid(1)), 2);
        assert_eq!(t.total_runtime(Pid(1)), 3);
        assert_eq!(t.idle_ticks(), 1);
        assert_eq!(t.busy_ticks(), 5);
        assert_eq!(t.end(), 6);
    }
}
