pub mod api;
pub mod cli;
pub mod core;
pub mod error;
pub mod models;
pub mod schema;
pub mod storage;
pub mod tui;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    let center = match core::EnvCenter::new(&cli.dir) {
        Ok(center) => center,
        Err(e) => {
            eprintln!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if cli.tui {
        let mut app = tui::App::new(center, runtime.handle().clone());
        if let Err(e) = app.run() {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    } else if let Err(e) = runtime.block_on(api::serve(center, cli.port)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
