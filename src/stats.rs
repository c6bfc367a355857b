//! Run statistics for CPU scheduling.
//!
//! Averages cover completed processes only: a process still running has no
//! turnaround time yet. For each completed process
//! `turnaround = completion − arrival` and `waiting = turnaround − burst`.

use crate::cpu::Process;
use crate::trace::Timeline;
use crate::types::Tick;

/// Min, max, mean and population standard deviation of tick samples.
///
/// Spread is accumulated with Welford's update, so samples are not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionStats {
    pub count: usize,
    /// 0 until the first sample.
    pub min: Tick,
    pub max: Tick,
    pub sum: Tick,
    running_mean: f64,
    m2: f64,
}

impl DistributionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Tick) {
        if self.count == 0 {
            (self.min, self.max) = (value, value);
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;

        let x = value as f64;
        let delta = x - self.running_mean;
        self.running_mean += delta / self.count as f64;
        self.m2 += delta * (x - self.running_mean);
    }

    pub fn mean(&self) -> f64 {
        match self.count {
            0 => 0.0,
            n => self.sum as f64 / n as f64,
        }
    }

    pub fn stddev(&self) -> f64 {
        match self.count {
            0 | 1 => 0.0,
            n => (self.m2 / n as f64).sqrt(),
        }
    }
}

impl Extend<Tick> for DistributionStats {
    fn extend<I: IntoIterator<Item = Tick>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

impl FromIterator<Tick> for DistributionStats {
    fn from_iter<I: IntoIterator<Item = Tick>>(iter: I) -> Self {
        let mut stats = DistributionStats::new();
        stats.extend(iter);
        stats
    }
}

/// Statistics for a CPU scheduling run, complete or in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub total_processes: usize,
    pub completed_processes: usize,
    /// Waiting times of completed processes.
    pub waiting: DistributionStats,
    /// Turnaround times of completed processes.
    pub turnaround: DistributionStats,
    /// Ticks on which some process ran.
    pub busy_ticks: Tick,
    /// Ticks covered by the timeline.
    pub elapsed_ticks: Tick,
}

impl RunStats {
    pub fn from_run(processes: &[Process], timeline: &Timeline) -> Self {
        let mut stats = RunStats {
            total_processes: processes.len(),
            busy_ticks: timeline.busy_ticks(),
            elapsed_ticks: timeline.end(),
            ..Default::default()
        };
        for p in processes {
            let Some(turnaround) = p.turnaround_time() else {
                continue;
            };
            stats.completed_processes += 1;
            stats.turnaround.add(turnaround);
            stats.waiting.add(turnaround - p.burst_time);
        }
        stats
    }

    pub fn avg_waiting_time(&self) -> f64 {
        self.waiting.mean()
    }

    pub fn avg_turnaround_time(&self) -> f64 {
        self.turnaround.mean()
    }

    /// Fraction of elapsed ticks the CPU was busy (0 for an empty run).
    pub fn utilization(&self) -> f64 {
        if self.elapsed_ticks == 0 {
            0.0
        } else {
            self.busy_ticks as f64 / self.elapsed_ticks as f64
        }
    }
}
