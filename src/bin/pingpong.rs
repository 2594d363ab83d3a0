use clap::Parser;
use halosobel::comm::thread::LocalCluster;
use halosobel::probe::{self, DEFAULT_ITERATIONS};

/// Round-trip latency and bandwidth between ranks 0 and 1
#[derive(Parser)]
#[command(name = "pingpong", version)]
struct Cli {
    /// Message size in bytes
    msg_size: usize,

    /// Round trips to time
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Number of in-process ranks (at least 2)
    #[arg(long, default_value_t = 2)]
    ranks: usize,

    /// Run under MPI instead of in-process threads
    #[cfg(feature = "distributed")]
    #[arg(long)]
    mpi: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    #[cfg(feature = "distributed")]
    {
        if cli.mpi {
            let code = run_mpi(&cli);
            if code != 0 {
                std::process::exit(code);
            }
            return;
        }
    }

    let reports = LocalCluster::new(cli.ranks)
        .and_then(|cluster| cluster.run(|comm| probe::ping_pong(comm, cli.msg_size, cli.iterations)))
        .unwrap_or_else(|e| {
            eprintln!("{}", e);
            std::process::exit(1);
        });
    if let Some(report) = reports.first().copied().flatten() {
        println!("{}", report);
    }
}

#[cfg(feature = "distributed")]
fn run_mpi(cli: &Cli) -> i32 {
    use halosobel::comm::comm_mpi::MpiComm;
    use halosobel::comm::CommunicationBackend;

    let Some(_universe) = mpi::initialize() else {
        eprintln!("MPI was already initialized");
        return 1;
    };
    let comm = MpiComm::new();
    match probe::ping_pong(&comm, cli.msg_size, cli.iterations) {
        Ok(Some(report)) => {
            println!("{}", report);
            0
        }
        Ok(None) => 0,
        Err(e) => {
            eprintln!("{}", e);
            comm.abort(&e.to_string());
            1
        }
    }
}
