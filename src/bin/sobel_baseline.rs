use clap::{Parser, ValueEnum};
use halosobel::baseline;
use halosobel::image::GlobalImage;
use halosobel::output;
use std::io;

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Single thread
    Seq,
    /// Rows spread over a rayon pool
    Par,
}

/// Whole-image Sobel filter without decomposition, for reference timings
#[derive(Parser)]
#[command(name = "sobel-baseline", version)]
struct Cli {
    #[arg(value_enum)]
    mode: Mode,

    /// Side length N of the synthetic N×N input image
    n: usize,

    /// Worker threads for `par` (0 lets rayon decide)
    #[arg(default_value_t = 0)]
    threads: usize,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let input = GlobalImage::synthetic(cli.n);
    let result = match cli.mode {
        Mode::Seq => {
            let (image, elapsed) = baseline::run_sequential(&input);
            println!(
                "MODE=SEQUENTIAL N={} time_ms={}",
                cli.n,
                elapsed.as_secs_f64() * 1e3
            );
            image
        }
        Mode::Par => {
            let (image, elapsed) = baseline::run_parallel(&input, cli.threads).unwrap_or_else(|e| {
                eprintln!("{}", e);
                std::process::exit(1);
            });
            let threads = if cli.threads == 0 {
                rayon::current_num_threads()
            } else {
                cli.threads
            };
            println!(
                "MODE=PARALLEL N={} threads={} time_ms={}",
                cli.n,
                threads,
                elapsed.as_secs_f64() * 1e3
            );
            image
        }
    };

    output::write_snippet(&mut io::stdout(), &result).unwrap_or_else(|e| {
        eprintln!("Output error: {}", e);
        std::process::exit(1);
    });
}
