use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = roiquant::Cli::parse();

    let default_level = match cli.verbose {
        0 => "roiquant=info",
        1 => "roiquant=debug",
        _ => "roiquant=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = roiquant::run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
