use clap::Parser;
use cn_worker_pool::config::{self, PoolConfig};
use cn_worker_pool::context::MemoryMode;
use cn_worker_pool::executor::{DaemonExecutor, Executor, NullExecutor};
use cn_worker_pool::kernel::Multiway;
use cn_worker_pool::kernel_ffi::{self, CryptonightFfiKernel};
use cn_worker_pool::pool::WorkerPool;
use cn_worker_pool::selftest;
use cn_worker_pool::work::WorkItem;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cn-worker-pool")]
#[command(about = "Multi-threaded CryptoNight-family CPU worker pool")]
struct Args {
    /// Path to a JSON pool config (thread count, per-thread multiway, affinity).
    /// Defaults to one unpinned single-width thread per logical CPU.
    #[arg(short, long)]
    config: Option<String>,

    /// Scratchpad memory policy: never, no-mlock, warn, always.
    #[arg(long, default_value = "warn")]
    mem_mode: String,

    /// Daemon RPC URL; solutions are logged only unless this is set.
    #[arg(short, long)]
    daemon: Option<String>,

    /// IPC mode: read jobs from stdin, write events to stdout (JSON lines).
    #[arg(long)]
    ipc: bool,

    /// Run for 20 seconds against a stalled-then-live synthetic job and
    /// report aggregate hashrate, then exit.
    #[arg(long)]
    benchmark: bool,
}

fn load_config(args: &Args) -> PoolConfig {
    match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config {path}: {e}"));
            PoolConfig::from_json(&text).unwrap_or_else(|e| panic!("{e}"))
        }
        None => PoolConfig::default_for_host(),
    }
}

fn make_kernel(width: usize) -> Box<dyn cn_worker_pool::kernel::MultiwayKernel> {
    Box::new(CryptonightFfiKernel::new(width))
}

fn run_selftest(pool_config: &PoolConfig) -> bool {
    let mut widths: Vec<usize> = pool_config
        .threads
        .iter()
        .map(|t| t.multiway.width())
        .collect();
    widths.sort_unstable();
    widths.dedup();
    if widths.is_empty() {
        widths.push(Multiway::Single.width());
    }

    for width in widths {
        let mut kernel = make_kernel(width);
        if let Err(e) = selftest::run(&mut *kernel) {
            log::error!("self-test failed for width {width}: {e}");
            return false;
        }
        log::info!("self-test passed for width {width}");

        // The double kernel has its own distinct KAT (spec §4.4/§8 S2) on
        // top of the generic N-repeated-single-vector check above.
        if width == 2 {
            if let Err(e) = selftest::run_double(kernel_ffi::double_hash) {
                log::error!("double-kernel self-test failed: {e}");
                return false;
            }
            log::info!("double-kernel self-test passed");
        }
    }
    true
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let pool_config = load_config(&args);
    let mem_mode: MemoryMode = config::parse_mem_mode(&args.mem_mode)
        .unwrap_or_else(|e| panic!("{e}"));

    if !cn_worker_pool::context::init(mem_mode) {
        log::error!("memory allocator readiness check failed for mode {:?}", mem_mode);
        std::process::exit(1);
    }

    if !run_selftest(&pool_config) {
        log::error!("self-test mismatch — bad compiler optimizations are the usual cause; mining will not start");
        std::process::exit(1);
    }

    let executor: Box<dyn Executor> = match &args.daemon {
        Some(url) => Box::new(DaemonExecutor::new(url)),
        None => Box::new(NullExecutor),
    };

    let pool = WorkerPool::start(&pool_config, mem_mode, make_kernel);
    executor.log(&format!("pool started with {} worker(s)", pool.thread_count()));

    if args.ipc {
        cn_worker_pool::ipc::run_ipc(pool);
        return;
    }

    if args.benchmark {
        let mut item = WorkItem::stalled();
        item.stall = false;
        item.target = 0; // no solutions will be "found"; pure throughput test
        item.work_size = cn_worker_pool::work::NONCE_OFFSET + 4 + 1;
        pool.switch_work(item);

        executor.log("benchmarking for 20s...");
        std::thread::sleep(Duration::from_secs(20));
        let hr = pool.total_hashrate(10_000);
        executor.log(&format!("benchmark result: {hr:.2} H/s aggregate"));
        pool.shutdown();
        return;
    }

    // Outside IPC/benchmark mode there is no job source wired up in this
    // crate (the network pool client is an external collaborator per
    // spec §1); park until shut down externally.
    loop {
        for solution in pool.try_recv_solutions() {
            executor.push_event(&solution);
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}
