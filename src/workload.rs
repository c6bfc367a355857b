//! Workload inputs: JSON workload files and seeded random generation.
//!
//! Each engine has a workload document (see the `*Workload` types). Numeric
//! fields are read as signed integers so that negative values are reported
//! as invalid input rather than as a JSON type error.

use std::fmt;
use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::bankers::ResourceState;
use crate::buddy::BuddyConfig;
use crate::cpu::ProcessDef;
use crate::disk::DiskGeometry;
use crate::error::SimError;
use crate::paging::{MemoryState, Vpn};
use crate::types::{Cylinder, Pid, Tick};

/// Default PRNG seed when none is specified.
pub const DEFAULT_SEED: u32 = 42;

/// Environment variable consulted by [`seed_from_env`].
pub const SEED_ENV: &str = "OSSIM_SEED";

/// Errors from loading a workload.
#[derive(Debug)]
pub enum WorkloadError {
    /// The file could not be read.
    Io(std::io::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Invalid field value.
    InvalidValue(String),
    /// The workload was well formed but an engine rejected it.
    Sim(SimError),
}

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadError::Io(e) => write!(f, "I/O error: {e}"),
            WorkloadError::Json(e) => write!(f, "JSON parse error: {e}"),
            WorkloadError::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            WorkloadError::Sim(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WorkloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkloadError::Io(e) => Some(e),
            WorkloadError::Json(e) => Some(e),
            WorkloadError::Sim(e) => Some(e),
            WorkloadError::InvalidValue(_) => None,
        }
    }
}

impl From<std::io::Error> for WorkloadError {
    fn from(e: std::io::Error) -> Self {
        WorkloadError::Io(e)
    }
}

impl From<serde_json::Error> for WorkloadError {
    fn from(e: serde_json::Error) -> Self {
        WorkloadError::Json(e)
    }
}

impl From<SimError> for WorkloadError {
    fn from(e: SimError) -> Self {
        WorkloadError::Sim(e)
    }
}

type Result<T> = std::result::Result<T, WorkloadError>;

/// Parse a seed string: a `u32`, or `"entropy"` for a random seed.
///
/// `None` and the empty string give [`DEFAULT_SEED`].
pub fn parse_seed(s: Option<&str>) -> Result<u32> {
    match s.map(str::trim) {
        None | Some("") => Ok(DEFAULT_SEED),
        Some(s) if s.eq_ignore_ascii_case("entropy") => {
            let seed: u32 = rand::thread_rng().gen();
            warn!(
                seed,
                "seed=entropy: seeding PRNG with OS randomness \
                 (set seed={seed} to reproduce this run)"
            );
            Ok(seed)
        }
        Some(s) => s.parse::<u32>().map_err(|_| {
            WorkloadError::InvalidValue(format!(
                "seed={s:?}: expected a u32 integer or \"entropy\""
            ))
        }),
    }
}

/// Resolve the PRNG seed from the `OSSIM_SEED` environment variable.
pub fn seed_from_env() -> Result<u32> {
    parse_seed(std::env::var(SEED_ENV).ok().as_deref())
}

/// Seeded generator for random demo workloads.
///
/// Processes get sequential pids starting at 1, a burst of 1..=5 ticks, a
/// priority of 1..=3 and an arrival up to 4 ticks after the given clock.
pub struct ProcessGenerator {
    rng: SmallRng,
    next_pid: u32,
}

impl ProcessGenerator {
    pub fn new(seed: u32) -> Self {
        ProcessGenerator {
            rng: SmallRng::seed_from_u64(seed as u64),
            next_pid: 1,
        }
    }

    pub fn next_process(&mut self, clock: Tick) -> ProcessDef {
        let pid = self.next_pid;
        self.next_pid += 1;
        ProcessDef::new(
            pid,
            clock + self.rng.gen_range(0..=4),
            self.rng.gen_range(1..=5),
            self.rng.gen_range(1..=3),
        )
    }

    pub fn processes(&mut self, count: usize, clock: Tick) -> Vec<ProcessDef> {
        (0..count).map(|_| self.next_process(clock)).collect()
    }

    /// Page count for a randomly generated paged process.
    pub fn page_count(&mut self) -> u32 {
        self.rng.gen_range(3..=5)
    }
}

/// A workload document that can be loaded from JSON.
pub trait Workload: Sized {
    fn from_json(json: &str) -> Result<Self>;

    fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

fn parse<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Convert a signed JSON number into an unsigned engine quantity.
fn unsigned<T: TryFrom<i64>>(field: &str, value: i64) -> Result<T> {
    if value < 0 {
        return Err(WorkloadError::InvalidValue(format!(
            "{field} must not be negative (got {value})"
        )));
    }
    T::try_from(value)
        .map_err(|_| WorkloadError::InvalidValue(format!("{field} out of range (got {value})")))
}

fn unsigned_all<T: TryFrom<i64>>(field: &str, values: &[i64]) -> Result<Vec<T>> {
    values.iter().map(|&v| unsigned(field, v)).collect()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProcess {
    pid: i64,
    arrival: i64,
    burst: i64,
    #[serde(default = "default_priority")]
    priority: i64,
}

fn default_priority() -> i64 {
    1
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCpu {
    processes: Vec<RawProcess>,
    #[serde(default)]
    quantum: Option<i64>,
}

/// `{"processes": [{"pid", "arrival", "burst", "priority"?}], "quantum"?}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuWorkload {
    pub processes: Vec<ProcessDef>,
    /// Round-robin quantum, if the file sets one.
    pub quantum: Option<Tick>,
}

impl Workload for CpuWorkload {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawCpu = parse(json)?;
        let processes = raw
            .processes
            .iter()
            .map(|p| -> Result<ProcessDef> {
                Ok(ProcessDef::new(
                    unsigned("pid", p.pid)?,
                    unsigned("arrival", p.arrival)?,
                    unsigned("burst", p.burst)?,
                    unsigned("priority", p.priority)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let quantum = raw.quantum.map(|q| unsigned("quantum", q)).transpose()?;
        Ok(CpuWorkload { processes, quantum })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDisk {
    requests: Vec<i64>,
    head: i64,
    #[serde(default)]
    lower: Option<i64>,
    #[serde(default)]
    upper: Option<i64>,
}

/// `{"requests": [...], "head", "lower"?, "upper"?}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskWorkload {
    pub requests: Vec<Cylinder>,
    pub head: Cylinder,
    pub geometry: DiskGeometry,
}

impl Workload for DiskWorkload {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawDisk = parse(json)?;
        let default = DiskGeometry::default();
        let lower = match raw.lower {
            Some(v) => unsigned("lower", v)?,
            None => default.lower,
        };
        let upper = match raw.upper {
            Some(v) => unsigned("upper", v)?,
            None => default.upper,
        };
        Ok(DiskWorkload {
            requests: unsigned_all("request", &raw.requests)?,
            head: unsigned("head", raw.head)?,
            geometry: DiskGeometry::new(lower, upper)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPagedProcess {
    pid: i64,
    pages: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaging {
    #[serde(default)]
    frames: Option<i64>,
    processes: Vec<RawPagedProcess>,
    accesses: Vec<String>,
}

/// `{"frames"?, "processes": [{"pid", "pages"}], "accesses": ["1-0", ...]}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingWorkload {
    pub frames: usize,
    pub processes: Vec<(Pid, u32)>,
    pub accesses: Vec<Vpn>,
}

impl PagingWorkload {
    /// Memory with every listed process registered and nothing resident.
    pub fn memory(&self) -> Result<MemoryState> {
        let mut mem = MemoryState::new(self.frames)?;
        for &(pid, pages) in &self.processes {
            mem.register_process(pid, pages)?;
        }
        Ok(mem)
    }
}

impl Workload for PagingWorkload {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawPaging = parse(json)?;
        let frames = match raw.frames {
            Some(v) => unsigned("frames", v)?,
            None => crate::paging::DEFAULT_FRAMES,
        };
        let processes = raw
            .processes
            .iter()
            .map(|p| -> Result<(Pid, u32)> {
                Ok((Pid(unsigned("pid", p.pid)?), unsigned("pages", p.pages)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let accesses = raw
            .accesses
            .iter()
            .map(|s| s.parse::<Vpn>().map_err(WorkloadError::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(PagingWorkload {
            frames,
            processes,
            accesses,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    pid: i64,
    vector: Vec<i64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBankers {
    available: Vec<i64>,
    max: Vec<Vec<i64>>,
    allocated: Vec<Vec<i64>>,
    #[serde(default)]
    requests: Vec<RawRequest>,
}

/// A resource request replayed against a [`ResourceState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub pid: usize,
    pub vector: Vec<u32>,
}

/// `{"available", "max", "allocated", "requests"?: [{"pid", "vector"}]}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankersWorkload {
    pub state: ResourceState,
    pub requests: Vec<ResourceRequest>,
}

impl Workload for BankersWorkload {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawBankers = parse(json)?;
        let matrix = |field: &str, rows: &[Vec<i64>]| -> Result<Vec<Vec<u32>>> {
            rows.iter().map(|row| unsigned_all(field, row)).collect()
        };
        let state = ResourceState::from_matrices(
            &matrix("max", &raw.max)?,
            &matrix("allocated", &raw.allocated)?,
            &unsigned_all("available", &raw.available)?,
        )?;
        let requests = raw
            .requests
            .iter()
            .map(|r| -> Result<ResourceRequest> {
                Ok(ResourceRequest {
                    pid: unsigned("pid", r.pid)?,
                    vector: unsigned_all("request", &r.vector)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BankersWorkload { state, requests })
    }
}

/// One buddy allocator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuddyOp {
    Alloc(u64),
    /// Free the block granted by the n-th `Alloc` in the list (0-based).
    Free(usize),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawBuddyOp {
    Alloc(i64),
    Free(i64),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuddy {
    #[serde(default)]
    pool: Option<i64>,
    #[serde(default)]
    min_block: Option<i64>,
    ops: Vec<RawBuddyOp>,
}

/// `{"pool"?, "min_block"?, "ops": [{"alloc": n} | {"free": k}]}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuddyWorkload {
    pub config: BuddyConfig,
    pub ops: Vec<BuddyOp>,
}

impl Workload for BuddyWorkload {
    fn from_json(json: &str) -> Result<Self> {
        let raw: RawBuddy = parse(json)?;
        let default = BuddyConfig::default();
        let config = BuddyConfig {
            pool_size: match raw.pool {
                Some(v) => unsigned("pool", v)?,
                None => default.pool_size,
            },
            min_block: match raw.min_block {
                Some(v) => unsigned("min_block", v)?,
                None => default.min_block,
            },
        };
        let mut allocs = 0usize;
        let mut ops = Vec::with_capacity(raw.ops.len());
        for op in &raw.ops {
            match *op {
                RawBuddyOp::Alloc(size) => {
                    ops.push(BuddyOp::Alloc(unsigned("alloc", size)?));
                    allocs += 1;
                }
                RawBuddyOp::Free(n) => {
                    let n: usize = unsigned("free", n)?;
                    if n >= allocs {
                        return Err(WorkloadError::InvalidValue(format!(
                            "free {n} refers to an allocation that has not happened yet"
                        )));
                    }
                    ops.push(BuddyOp::Free(n));
                }
            }
        }
        Ok(BuddyWorkload { config, ops })
    }
}
