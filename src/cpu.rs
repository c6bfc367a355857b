//! CPU process scheduling engine.
//!
//! The scheduler advances one decision per `step()`: it picks a process
//! according to the policy, runs it for as long as the policy allows (to
//! completion, one tick, or one quantum), charges waiting time to everyone
//! else that has arrived, and appends the interval to the timeline. When
//! nothing has arrived yet a step emits a 1-tick idle interval.
//!
//! The driver owns timing: it may call `step()` from a timer, or `run()` to
//! drain the whole workload at once. Between steps the state is always a
//! consistent snapshot, so stopping the driver never leaves a half-applied
//! decision behind.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::fmt::set_sim_tick;
use crate::stats::RunStats;
use crate::trace::{ExecutionInterval, Slot, Timeline};
use crate::types::{Pid, Tick};

/// Process selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuPolicy {
    /// First come, first served. Earliest arrival runs to completion.
    Fcfs,
    /// Shortest job first (non-preemptive), by burst time.
    Sjf,
    /// Shortest remaining time first. Re-evaluated every tick.
    Srtf,
    /// Lowest priority value runs to completion.
    Priority,
    /// Lowest priority value, re-evaluated every tick.
    PriorityPreemptive,
    /// Rotating cursor with a fixed time quantum.
    RoundRobin { quantum: Tick },
}

impl CpuPolicy {
    /// Whether a running process can lose the CPU before it finishes.
    pub fn is_preemptive(&self) -> bool {
        matches!(
            self,
            CpuPolicy::Srtf | CpuPolicy::PriorityPreemptive | CpuPolicy::RoundRobin { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CpuPolicy::Fcfs => "FCFS",
            CpuPolicy::Sjf => "SJF",
            CpuPolicy::Srtf => "SRTF",
            CpuPolicy::Priority => "Priority",
            CpuPolicy::PriorityPreemptive => "Priority (preemptive)",
            CpuPolicy::RoundRobin { .. } => "Round Robin",
        }
    }
}

impl fmt::Display for CpuPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuPolicy::RoundRobin { quantum } => write!(f, "Round Robin (quantum {quantum})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Definition of a process before it enters the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessDef {
    pub pid: Pid,
    pub arrival_time: Tick,
    pub burst_time: Tick,
    /// Lower value means higher priority.
    pub priority: u32,
}

impl ProcessDef {
    pub fn new(pid: u32, arrival_time: Tick, burst_time: Tick, priority: u32) -> Self {
        ProcessDef {
            pid: Pid(pid),
            arrival_time,
            burst_time,
            priority,
        }
    }
}

/// A process as tracked by the scheduler during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub pid: Pid,
    pub arrival_time: Tick,
    pub burst_time: Tick,
    pub priority: u32,
    /// Ticks of work left. Reaches 0 exactly once, at completion.
    pub remaining_time: Tick,
    /// Ticks spent arrived but not running.
    pub waiting_time: Tick,
    pub completion_time: Option<Tick>,
}

impl Process {
    fn from_def(def: &ProcessDef) -> Self {
        Process {
            pid: def.pid,
            arrival_time: def.arrival_time,
            burst_time: def.burst_time,
            priority: def.priority,
            remaining_time: def.burst_time,
            waiting_time: 0,
            completion_time: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_time == 0
    }

    /// Arrived by `clock` and still has work left.
    pub fn is_ready(&self, clock: Tick) -> bool {
        self.arrival_time <= clock && !self.is_finished()
    }

    /// `completion − arrival`, once completed.
    pub fn turnaround_time(&self) -> Option<Tick> {
        self.completion_time.map(|c| c - self.arrival_time)
    }

    fn reset(&mut self) {
        self.remaining_time = self.burst_time;
        self.waiting_time = 0;
        self.completion_time = None;
    }
}

/// Result of one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// The interval appended to the timeline by this step.
    pub interval: ExecutionInterval,
    /// The process that finished during this step, if any.
    pub completed: Option<Pid>,
}

/// Builder for constructing a scheduler, in the manner of a scenario builder.
pub struct CpuSchedulerBuilder {
    policy: CpuPolicy,
    processes: Vec<ProcessDef>,
    /// `None` once `u32::MAX` has been used.
    next_pid: Option<u32>,
    exhausted: bool,
}

impl CpuSchedulerBuilder {
    pub fn policy(mut self, policy: CpuPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a process with an explicit pid.
    pub fn process(mut self, def: ProcessDef) -> Self {
        self.next_pid = self
            .next_pid
            .and_then(|next| Some(next.max(def.pid.0.checked_add(1)?)));
        self.processes.push(def);
        self
    }

    /// Add a process with the next free pid.
    pub fn add_process(mut self, arrival_time: Tick, burst_time: Tick, priority: u32) -> Self {
        match self.next_pid {
            Some(pid) => self.process(ProcessDef::new(pid, arrival_time, burst_time, priority)),
            None => {
                self.exhausted = true;
                self
            }
        }
    }

    pub fn processes(mut self, defs: impl IntoIterator<Item = ProcessDef>) -> Self {
        for def in defs {
            self = self.process(def);
        }
        self
    }

    pub fn build(self) -> Result<CpuScheduler> {
        if self.exhausted {
            return Err(SimError::invalid("no pid left for a new process"));
        }
        CpuScheduler::new(self.policy, self.processes)
    }
}

/// Single-CPU scheduling engine.
#[derive(Debug, Clone)]
pub struct CpuScheduler {
    policy: CpuPolicy,
    processes: Vec<Process>,
    clock: Tick,
    /// Round-robin rotation index into `processes`.
    cursor: usize,
    /// Process that ran in the previous step and has not finished.
    running: Option<Pid>,
    timeline: Timeline,
}

impl CpuScheduler {
    pub fn builder() -> CpuSchedulerBuilder {
        CpuSchedulerBuilder {
            policy: CpuPolicy::Fcfs,
            processes: Vec::new(),
            next_pid: Some(1),
            exhausted: false,
        }
    }

    /// Create a scheduler over a fixed process set.
    ///
    /// Rejects zero burst times, duplicate pids and a zero quantum.
    pub fn new(policy: CpuPolicy, defs: Vec<ProcessDef>) -> Result<Self> {
        if let CpuPolicy::RoundRobin { quantum: 0 } = policy {
            return Err(SimError::invalid("round robin quantum must be at least 1"));
        }
        let mut seen = HashSet::new();
        for def in &defs {
            validate_def(def)?;
            if !seen.insert(def.pid) {
                return Err(SimError::invalid(format!("duplicate pid {}", def.pid)));
            }
        }
        Ok(CpuScheduler {
            policy,
            processes: defs.iter().map(Process::from_def).collect(),
            clock: 0,
            cursor: 0,
            running: None,
            timeline: Timeline::new(),
        })
    }

    pub fn policy(&self) -> CpuPolicy {
        self.policy
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    /// Current simulation clock.
    pub fn clock(&self) -> Tick {
        self.clock
    }

    /// Round-robin rotation cursor (always 0 for other policies).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// True once every process has `remaining_time == 0`.
    pub fn is_complete(&self) -> bool {
        self.processes.iter().all(Process::is_finished)
    }

    /// Upper bound on the ticks needed to drain the workload:
    /// `Σ burst + max(arrival)`.
    pub fn tick_bound(&self) -> Tick {
        let work: Tick = self.processes.iter().map(|p| p.burst_time).sum();
        let latest = self
            .processes
            .iter()
            .map(|p| p.arrival_time)
            .max()
            .unwrap_or(0);
        work + latest
    }

    /// Add a process to a scheduler that may already be running.
    ///
    /// The arrival must not lie in the simulated past, otherwise waiting
    /// time already elapsed could not be charged.
    pub fn add_process(&mut self, def: ProcessDef) -> Result<()> {
        validate_def(&def)?;
        if def.arrival_time < self.clock {
            return Err(SimError::invalid(format!(
                "{} arrives at {} but the clock is already at {}",
                def.pid, def.arrival_time, self.clock
            )));
        }
        if self.process(def.pid).is_some() {
            return Err(SimError::invalid(format!("duplicate pid {}", def.pid)));
        }
        self.processes.push(Process::from_def(&def));
        Ok(())
    }

    /// Make one scheduling decision. Returns `None` once the run is complete.
    pub fn step(&mut self) -> Option<StepOutcome> {
        if self.is_complete() {
            return None;
        }
        set_sim_tick(self.clock);
        let start = self.clock;

        let Some(idx) = self.select() else {
            let interval = self.timeline.record(Slot::Idle, start, start + 1);
            self.clock = start + 1;
            self.running = None;
            debug!("cpu idle");
            return Some(StepOutcome {
                interval,
                completed: None,
            });
        };

        let remaining = self.processes[idx].remaining_time;
        let slice = match self.policy {
            CpuPolicy::Fcfs | CpuPolicy::Sjf | CpuPolicy::Priority => remaining,
            CpuPolicy::Srtf | CpuPolicy::PriorityPreemptive => 1,
            CpuPolicy::RoundRobin { quantum } => remaining.min(quantum),
        };
        let end = start + slice;

        // Everyone else that is present during [start, end) waits for the part
        // of the slice after its own arrival.
        for (i, p) in self.processes.iter_mut().enumerate() {
            if i != idx && !p.is_finished() && p.arrival_time < end {
                p.waiting_time += end - p.arrival_time.max(start);
            }
        }

        let proc = &mut self.processes[idx];
        proc.remaining_time -= slice;
        let pid = proc.pid;
        let completed = if proc.is_finished() {
            proc.completion_time = Some(end);
            Some(pid)
        } else {
            None
        };

        if let CpuPolicy::RoundRobin { .. } = self.policy {
            self.cursor = (idx + 1) % self.processes.len();
        }
        self.running = if completed.is_some() { None } else { Some(pid) };

        let interval = self.timeline.record(Slot::Run(pid), start, end);
        self.clock = end;
        debug!(pid = pid.0, start, end, "dispatch");

        if completed.is_some() {
            let proc = &self.processes[idx];
            info!(
                pid = pid.0,
                turnaround = proc.turnaround_time().unwrap_or_default(),
                waiting = proc.waiting_time,
                "process completed"
            );
        }

        Some(StepOutcome {
            interval,
            completed,
        })
    }

    /// Step until every process has completed and return the timeline.
    pub fn run(&mut self) -> &Timeline {
        while self.step().is_some() {}
        &self.timeline
    }

    /// Restore every process to its initial state and rewind the clock.
    pub fn reset(&mut self) {
        for p in &mut self.processes {
            p.reset();
        }
        self.clock = 0;
        self.cursor = 0;
        self.running = None;
        self.timeline = Timeline::new();
        set_sim_tick(0);
    }

    /// Statistics over the processes completed so far.
    pub fn stats(&self) -> RunStats {
        RunStats::from_run(&self.processes, &self.timeline)
    }

    fn select(&self) -> Option<usize> {
        let picked = match self.policy {
            CpuPolicy::Fcfs => self.ready().min_by_key(|(_, p)| (p.arrival_time, p.pid)),
            CpuPolicy::Sjf => self.ready().min_by_key(|(_, p)| p.burst_time),
            CpuPolicy::Priority => self.ready().min_by_key(|(_, p)| p.priority),
            CpuPolicy::Srtf => self.ready().min_by_key(|(_, p)| {
                (p.remaining_time, Some(p.pid) != self.running, p.pid)
            }),
            CpuPolicy::PriorityPreemptive => self
                .ready()
                .min_by_key(|(_, p)| (p.priority, Some(p.pid) != self.running, p.pid)),
            CpuPolicy::RoundRobin { .. } => {
                let n = self.processes.len();
                return (0..n)
                    .map(|i| (self.cursor + i) % n)
                    .find(|&i| self.processes[i].is_ready(self.clock));
            }
        };
        picked.map(|(i, _)| i)
    }

    /// Arrived-and-unfinished processes in array order.
    fn ready(&self) -> impl Iterator<Item = (usize, &Process)> + '_ {
        let clock = self.clock;
        self.processes
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.is_ready(clock))
    }
}

fn validate_def(def: &ProcessDef) -> Result<()> {
    if def.burst_time == 0 {
        return Err(SimError::invalid(format!(
            "{} has a zero burst time",
            def.pid
        )));
    }
    Ok(())
}
