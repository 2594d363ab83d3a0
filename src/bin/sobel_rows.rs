use clap::Parser;
use halosobel::image::GlobalImage;
use halosobel::output;
use halosobel::pipeline::{self, SobelConfig};
use std::io;

/// Distributed Sobel filter over horizontal strips, one per rank
#[derive(Parser)]
#[command(name = "sobel-rows", version)]
struct Cli {
    /// Side length N of the synthetic N×N input image; must be divisible by P
    n: usize,

    /// Number of in-process ranks P
    #[arg(long, default_value_t = 4)]
    ranks: usize,

    /// Print per-phase timings of the coordinator to stderr
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = SobelConfig::strips(cli.n, cli.ranks);
    let (result, stats) =
        pipeline::run_local(cli.ranks, &config, || GlobalImage::synthetic(cli.n), cli.stats)
            .unwrap_or_else(|e| {
                eprintln!("{}", e);
                std::process::exit(1);
            });

    println!(
        "MODE=ROWS N={} P={} time_ms={}",
        cli.n,
        result.grid.size(),
        result.time_ms
    );
    output::write_snippet(&mut io::stdout(), &result.image).unwrap_or_else(|e| {
        eprintln!("Output error: {}", e);
        std::process::exit(1);
    });
    if let Some(stats) = stats {
        stats.display();
    }
}
