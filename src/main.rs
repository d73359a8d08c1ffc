//! Demo binary: seed + user token in, flat token/score sequence out.

use simrec::run_argv;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    match run_argv(&argv) {
        Ok(flat) => {
            for pair in flat.chunks(2) {
                println!("{} {}", pair[0], pair.get(1).map(String::as_str).unwrap_or(""));
            }
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
