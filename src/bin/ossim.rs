//! ossim - Run the OS resource-management engines from the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use os_sim::bankers::ResourceState;
use os_sim::buddy::AllocOutcome;
use os_sim::paging::DEFAULT_FRAMES;
use os_sim::workload::{
    BankersWorkload, BuddyOp, BuddyWorkload, CpuWorkload, DiskWorkload, PagingWorkload,
    ResourceRequest,
};
use os_sim::{
    check_safety, disk, parse_seed, seed_from_env, BuddyAllocator, BuddyConfig, ClockReplacer,
    CpuPolicy, CpuScheduler, DiskGeometry, DiskPolicy, FmtTick, MemoryState, PagingConfig,
    ProcessGenerator, RequestOutcome, SimFormat, Vpn, Workload,
};

/// Run OS resource-management simulations.
#[derive(Parser)]
#[command(name = "ossim")]
struct Cli {
    /// PRNG seed (u32 integer or "entropy" for OS randomness).
    ///
    /// Drives random workload generation. Falls back to OSSIM_SEED env var,
    /// then default (42).
    #[arg(long, global = true, env = "OSSIM_SEED")]
    seed: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// CPU process scheduling.
    Cpu {
        /// JSON workload file. Without one, random processes are generated.
        workload: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = CpuPolicyArg::Fcfs)]
        policy: CpuPolicyArg,

        /// Round-robin time quantum (overrides the workload file).
        #[arg(short, long)]
        quantum: Option<u64>,

        /// Number of random processes when no workload file is given.
        #[arg(short = 'n', long, default_value_t = 5)]
        processes: usize,

        /// Print the full execution timeline to stderr.
        #[arg(long)]
        dump_trace: bool,
    },
    /// Disk head scheduling.
    Disk {
        /// JSON workload file. Without one, the classic example queue is used.
        workload: Option<PathBuf>,

        /// Policy to run. All policies when omitted.
        #[arg(short, long, value_enum)]
        policy: Option<DiskPolicyArg>,
    },
    /// Clock page replacement.
    Paging {
        /// JSON workload file. Without one, random processes are generated.
        workload: Option<PathBuf>,

        /// Set the reference bit when a page is loaded.
        #[arg(long)]
        reference_on_load: bool,
    },
    /// Banker's deadlock avoidance.
    Bankers {
        /// JSON workload file. Without one, the textbook instance is used.
        workload: Option<PathBuf>,
    },
    /// Buddy memory allocation.
    Buddy {
        /// JSON workload file. Without one, a short demo sequence is used.
        workload: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CpuPolicyArg {
    Fcfs,
    Sjf,
    Srtf,
    Priority,
    PriorityPreemptive,
    Rr,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiskPolicyArg {
    Fcfs,
    Sstf,
    Scan,
    CScan,
    Look,
    CLook,
}

impl From<DiskPolicyArg> for DiskPolicy {
    fn from(arg: DiskPolicyArg) -> Self {
        match arg {
            DiskPolicyArg::Fcfs => DiskPolicy::Fcfs,
            DiskPolicyArg::Sstf => DiskPolicy::Sstf,
            DiskPolicyArg::Scan => DiskPolicy::Scan,
            DiskPolicyArg::CScan => DiskPolicy::CScan,
            DiskPolicyArg::Look => DiskPolicy::Look,
            DiskPolicyArg::CLook => DiskPolicy::CLook,
        }
    }
}

const DEFAULT_QUANTUM: u64 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let seed = match &cli.seed {
        Some(s) => parse_seed(Some(s.as_str())),
        None => seed_from_env(),
    }
    .context("invalid --seed")?;

    match cli.command {
        Command::Cpu {
            workload,
            policy,
            quantum,
            processes,
            dump_trace,
        } => run_cpu(workload.as_deref(), policy, quantum, processes, dump_trace, seed),
        Command::Disk { workload, policy } => run_disk(workload.as_deref(), policy),
        Command::Paging {
            workload,
            reference_on_load,
        } => run_paging(workload.as_deref(), reference_on_load, seed),
        Command::Bankers { workload } => run_bankers(workload.as_deref()),
        Command::Buddy { workload } => run_buddy(workload.as_deref()),
    }
}

fn load<W: Workload>(path: &Path) -> Result<W> {
    W::from_path(path).with_context(|| format!("failed to load {}", path.display()))
}

fn run_cpu(
    path: Option<&Path>,
    policy: CpuPolicyArg,
    quantum: Option<u64>,
    count: usize,
    dump_trace: bool,
    seed: u32,
) -> Result<()> {
    let (defs, file_quantum) = match path {
        Some(path) => {
            let w: CpuWorkload = load(path)?;
            (w.processes, w.quantum)
        }
        None => (ProcessGenerator::new(seed).processes(count, 0), None),
    };
    let quantum = quantum.or(file_quantum).unwrap_or(DEFAULT_QUANTUM);
    let policy = match policy {
        CpuPolicyArg::Fcfs => CpuPolicy::Fcfs,
        CpuPolicyArg::Sjf => CpuPolicy::Sjf,
        CpuPolicyArg::Srtf => CpuPolicy::Srtf,
        CpuPolicyArg::Priority => CpuPolicy::Priority,
        CpuPolicyArg::PriorityPreemptive => CpuPolicy::PriorityPreemptive,
        CpuPolicyArg::Rr => CpuPolicy::RoundRobin { quantum },
    };

    let mut sched = CpuScheduler::new(policy, defs).context("invalid CPU workload")?;
    sched.run();

    println!("{policy}");
    println!(
        "{:<6} {:>8} {:>6} {:>9} {:>8} {:>11}",
        "pid", "arrival", "burst", "priority", "waiting", "turnaround"
    );
    for p in sched.processes() {
        println!(
            "{:<6} {:>8} {:>6} {:>9} {:>8} {:>11}",
            p.pid.to_string(),
            p.arrival_time,
            p.burst_time,
            p.priority,
            p.waiting_time,
            p.turnaround_time().unwrap_or_default(),
        );
    }

    println!();
    for iv in sched.timeline().coalesced() {
        let label = iv.pid().map_or_else(|| "idle".to_string(), |pid| pid.to_string());
        println!("{} {} {label}", FmtTick(iv.start), FmtTick(iv.end));
    }

    let stats = sched.stats();
    println!();
    println!("avg waiting time:    {:.2}", stats.avg_waiting_time());
    println!("avg turnaround time: {:.2}", stats.avg_turnaround_time());
    println!("waiting stddev:      {:.2}", stats.waiting.stddev());
    println!("cpu utilization:     {:.1}%", stats.utilization() * 100.0);

    if dump_trace {
        sched.timeline().dump();
    }
    Ok(())
}

fn run_disk(path: Option<&Path>, policy: Option<DiskPolicyArg>) -> Result<()> {
    let w = match path {
        Some(path) => load(path)?,
        None => DiskWorkload {
            requests: vec![98, 183, 37, 122, 14, 124, 65, 67],
            head: 53,
            geometry: DiskGeometry::default(),
        },
    };
    let policies = match policy {
        Some(p) => vec![DiskPolicy::from(p)],
        None => DiskPolicy::ALL.to_vec(),
    };

    println!("requests: {:?}  head: {}", w.requests, w.head);
    for policy in policies {
        let schedule = disk::compute(policy, &w.requests, w.head, w.geometry)
            .with_context(|| format!("{policy} failed"))?;
        let path: Vec<String> = schedule.head_movement.iter().map(|c| c.to_string()).collect();
        println!(
            "{:<7} seek {:>5}  avg {:>7.2}  {}",
            policy.name(),
            schedule.total_seek,
            schedule.average_seek(w.requests.len()),
            path.join(" -> ")
        );
    }
    Ok(())
}

fn run_paging(path: Option<&Path>, reference_on_load: bool, seed: u32) -> Result<()> {
    let (mut mem, accesses) = match path {
        Some(path) => {
            let w: PagingWorkload = load(path)?;
            (w.memory().context("invalid paging workload")?, w.accesses)
        }
        None => demo_paging(seed)?,
    };

    let mut clock = ClockReplacer::new(PagingConfig { reference_on_load });
    for vpn in accesses {
        let out = clock.access(&mut mem, vpn).context("page access failed")?;
        let name = vpn.to_string();
        match (out.hit, out.evicted) {
            (true, _) => println!("{name:<6} hit   {}", out.frame),
            (false, Some(old)) => println!("{name:<6} fault {} (evicted {old})", out.frame),
            (false, None) => println!("{name:<6} fault {}", out.frame),
        }
    }

    let stats = clock.stats();
    println!();
    for frame in mem.frames() {
        let page = frame.page.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!("{:<9} {page:<6} ref={}", frame.id.to_string(), u8::from(frame.reference_bit));
    }
    println!("hand: {}", clock.hand());
    println!(
        "hits {} misses {} hit ratio {:.1}%",
        stats.hits,
        stats.misses,
        stats.hit_ratio() * 100.0
    );
    if mem.is_thrashing() {
        println!(
            "warning: page demand {} exceeds {} frames by more than {}x",
            mem.page_demand(),
            mem.frame_count(),
            os_sim::paging::THRASHING_FACTOR
        );
    }
    Ok(())
}

/// Three random processes and a reference string that walks their pages
/// twice.
fn demo_paging(seed: u32) -> Result<(MemoryState, Vec<Vpn>)> {
    let mut generator = ProcessGenerator::new(seed);
    let mut mem = MemoryState::new(DEFAULT_FRAMES)?;
    for _ in 0..3 {
        mem.create_process(generator.page_count())?;
    }
    let pages: Vec<Vpn> = mem.pages().collect();
    let accesses = pages.iter().chain(pages.iter().rev()).copied().collect();
    Ok((mem, accesses))
}

fn run_bankers(path: Option<&Path>) -> Result<()> {
    let BankersWorkload {
        mut state,
        requests,
    } = match path {
        Some(path) => load(path)?,
        None => BankersWorkload {
            state: ResourceState::textbook(),
            requests: vec![ResourceRequest {
                pid: 1,
                vector: vec![1, 0, 2],
            }],
        },
    };

    print_state(&state);
    let report = check_safety(&state);
    if report.safe {
        println!("safe, sequence {}", fmt_sequence(&report.sequence));
    } else {
        println!("UNSAFE, could finish {}", fmt_sequence(&report.sequence));
    }

    for req in requests {
        match state.request(req.pid, &req.vector).context("invalid request")? {
            RequestOutcome::Granted { sequence } => println!(
                "P{} requests {:?}: granted, sequence {}",
                req.pid,
                req.vector,
                fmt_sequence(&sequence)
            ),
            RequestOutcome::Rejected(reason) => {
                println!("P{} requests {:?}: denied, {reason}", req.pid, req.vector)
            }
        }
    }
    Ok(())
}

fn print_state(state: &ResourceState) {
    println!("{:<4} {:<16} {:<16} {:<16}", "", "max", "allocated", "need");
    for (i, p) in state.processes().iter().enumerate() {
        println!(
            "P{i:<3} {:<16} {:<16} {:<16}",
            format!("{:?}", p.max),
            format!("{:?}", p.allocated),
            format!("{:?}", p.need)
        );
    }
    println!("available {:?}", state.available());
}

fn fmt_sequence(seq: &[usize]) -> String {
    let names: Vec<String> = seq.iter().map(|i| format!("P{i}")).collect();
    names.join(" -> ")
}

fn run_buddy(path: Option<&Path>) -> Result<()> {
    let w = match path {
        Some(path) => load(path)?,
        None => BuddyWorkload {
            config: BuddyConfig::default(),
            ops: vec![
                BuddyOp::Alloc(10),
                BuddyOp::Alloc(30),
                BuddyOp::Alloc(64),
                BuddyOp::Free(0),
                BuddyOp::Alloc(40),
            ],
        },
    };

    let mut buddy = BuddyAllocator::new(w.config).context("invalid buddy configuration")?;
    // Outcome of each alloc op, in order; `Free(n)` indexes into this.
    let mut granted = Vec::new();
    for op in w.ops {
        match op {
            BuddyOp::Alloc(size) => {
                let out = buddy.allocate(size).context("invalid allocation")?;
                match out {
                    AllocOutcome::Granted { block, size: got } => {
                        println!("alloc {size:>4}: block {block} of {got}")
                    }
                    AllocOutcome::Insufficient { largest_free, .. } => println!(
                        "alloc {size:>4}: insufficient contiguous memory (largest free {largest_free})"
                    ),
                }
                granted.push(out.block());
            }
            BuddyOp::Free(n) => {
                let Some(block) = granted.get_mut(n).and_then(Option::take) else {
                    bail!("free {n}: allocation was refused or already freed");
                };
                buddy.free(block).context("invalid free")?;
                println!("free  {n:>4}: block {block}");
            }
        }
    }

    println!();
    for b in buddy.leaves() {
        let state = if b.allocated { "used" } else { "free" };
        println!("{:>5} +{:<4} {state}", b.offset, b.size);
    }
    println!(
        "used {} of {} ({:.1}%)",
        buddy.used(),
        buddy.config().pool_size,
        buddy.usage_percent()
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .event_format(SimFormat)
        .try_init();
}
