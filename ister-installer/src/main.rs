use clap::Parser;
use ister_core::{install_os, logging, Settings};
use ister_hal::LinuxHal;

mod cli;

fn main() {
    let _cli = cli::Cli::parse();
    logging::init();

    match run() {
        Ok(()) => println!("Installation complete"),
        Err(err) => {
            log::error!("installation failed: {:#}", err);
            eprintln!("Installation failed: {:#}", err);
            std::process::exit(-1);
        }
    }
}

fn run() -> anyhow::Result<()> {
    let settings = Settings::default();
    log::info!("ister {} starting with {:?}", env!("CARGO_PKG_VERSION"), settings);
    install_os(&LinuxHal::new(), &settings)
}
