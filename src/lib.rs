//! os_sim - Deterministic simulation engines for classic OS resource management.
//!
//! Each engine turns a small, explicit input model into a deterministic trace
//! or verdict. The engines are independent of each other, and timing and
//! presentation belong to the caller.
//!
//! # Engines
//!
//! - **CPU scheduling** ([`cpu`]): FCFS, SJF, SRTF, priority (non-preemptive
//!   and preemptive) and round robin, one decision per `step()`
//! - **Disk scheduling** ([`disk`]): FCFS, SSTF, SCAN, C-SCAN, LOOK and C-LOOK
//!   as a single batch computation
//! - **Page replacement** ([`paging`]): clock / second chance over a
//!   caller-owned [`MemoryState`]
//! - **Deadlock avoidance** ([`bankers`]): Banker's safety check and request
//!   handling
//! - **Buddy allocation** ([`buddy`]): split and merge over an arena-backed
//!   block tree
//!
//! # Usage
//!
//! ```rust
//! use os_sim::*;
//!
//! let mut sched = CpuScheduler::builder()
//!     .policy(CpuPolicy::RoundRobin { quantum: 2 })
//!     .add_process(0, 5, 1)
//!     .add_process(1, 3, 2)
//!     .build()
//!     .unwrap();
//!
//! let timeline = sched.run();
//! assert_eq!(timeline.busy_ticks(), 8);
//! println!("avg wait {:.2}", sched.stats().avg_waiting_time());
//! ```

pub mod bankers;
pub mod buddy;
pub mod cpu;
pub mod disk;
pub mod error;
pub mod fmt;
pub mod paging;
pub mod stats;
pub mod trace;
pub mod types;
pub mod workload;

// Re-export the main public types for convenience.
pub use bankers::{
    check_safety, ProcessResources, RejectReason, RequestOutcome, ResourceState, SafetyReport,
};
pub use buddy::{AllocOutcome, BlockInfo, BuddyAllocator, BuddyConfig};
pub use cpu::{CpuPolicy, CpuScheduler, CpuSchedulerBuilder, Process, ProcessDef, StepOutcome};
pub use disk::{DiskGeometry, DiskPolicy, DiskSchedule};
pub use error::{Result, SimError};
pub use fmt::{sim_tick, FmtTick, SimFormat};
pub use paging::{
    AccessOutcome, AccessRecord, ClockReplacer, ClockStep, Frame, MemoryState, PageTableEntry,
    PagedProcess, PagingConfig, PagingStats, Vpn,
};
pub use stats::{DistributionStats, RunStats};
pub use trace::{ExecutionInterval, Slot, Timeline};
pub use types::{BlockId, Cylinder, FrameId, Pid, Tick};
pub use workload::{parse_seed, seed_from_env, ProcessGenerator, Workload, WorkloadError};
