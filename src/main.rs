use clap::{CommandFactory, Parser};
use halosobel::error::{Result, SobelError};
use halosobel::image::GlobalImage;
use halosobel::output;
use halosobel::pipeline::{self, SobelConfig, SobelOutput};
use halosobel::stats::Stats;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

/// Distributed Sobel edge filter over a 2D process grid
#[derive(Parser)]
#[command(name = "halosobel", version)]
struct Cli {
    /// Side length N of the synthetic N×N input image
    n: Option<usize>,

    /// Rows Pr of the process grid; columns are P / Pr
    pr: Option<usize>,

    /// Number of in-process ranks P (defaults to Pr)
    #[arg(long)]
    ranks: Option<usize>,

    /// Run under MPI; the world size is P
    #[cfg(feature = "distributed")]
    #[arg(long)]
    mpi: bool,

    /// Print per-phase timings of the coordinator to stderr
    #[arg(long)]
    stats: bool,

    /// Write the filtered image as a binary PGM
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (Some(n), Some(pr)) = (cli.n, cli.pr) else {
        let _ = Cli::command().print_help();
        return;
    };
    let config = SobelConfig::new(n, pr);

    #[cfg(feature = "distributed")]
    {
        if cli.mpi {
            // `run_mpi` returns only after MPI is finalized.
            let code = run_mpi(&config, &cli);
            if code != 0 {
                std::process::exit(code);
            }
            return;
        }
    }

    let ranks = cli.ranks.unwrap_or(pr);
    let (result, stats) =
        pipeline::run_local(ranks, &config, || GlobalImage::synthetic(n), cli.stats)
            .unwrap_or_else(|e| exit_with(e));
    report(&result, stats.as_ref(), &cli).unwrap_or_else(|e| exit_with(e));
}

fn report(result: &SobelOutput, stats: Option<&Stats>, cli: &Cli) -> Result<()> {
    let mut stdout = io::stdout();
    output::write_summary(&mut stdout, result.image.n(), result.grid, result.time_ms)?;
    output::write_snippet(&mut stdout, &result.image)?;
    if let Some(path) = &cli.output {
        let mut file = BufWriter::new(File::create(path)?);
        output::write_pgm(&mut file, &result.image)?;
        tracing::info!(path = %path.display(), "wrote PGM");
    }
    if let Some(stats) = stats {
        stats.display();
    }
    Ok(())
}

fn exit_with(e: SobelError) -> ! {
    eprintln!("{}", e);
    std::process::exit(1);
}

/// Run this process's rank under MPI and return its exit status.
#[cfg(feature = "distributed")]
fn run_mpi(config: &SobelConfig, cli: &Cli) -> i32 {
    use halosobel::comm::comm_mpi::MpiComm;
    use halosobel::comm::{CommunicationBackend, ROOT_RANK};
    use halosobel::coordinator::Coordinator;

    let Some(_universe) = mpi::initialize() else {
        eprintln!("{}", SobelError::Communication("MPI was already initialized".into()));
        return 1;
    };
    let comm = MpiComm::new();

    let result = config
        .resolve(comm.num_ranks())
        .and_then(|_| {
            let coordinator = Coordinator::elect(&comm, || GlobalImage::synthetic(config.n));
            let mut stats = cli.stats.then(Stats::new);
            match pipeline::run_rank(&comm, config, coordinator.as_ref(), stats.as_mut())? {
                Some(result) => report(&result, stats.as_ref(), cli),
                None => Ok(()),
            }
        });

    match result {
        Ok(()) => 0,
        // Every rank rejects a bad configuration on its own; only the root reports it.
        Err(e @ SobelError::Configuration(_)) => {
            if comm.rank() == ROOT_RANK {
                eprintln!("{}", e);
            }
            1
        }
        Err(e) => {
            eprintln!("{}", e);
            comm.abort(&e.to_string());
            1
        }
    }
}
