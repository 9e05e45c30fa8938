use clap::Parser;
use log::{error, info};
use myoband::cli::Cli;
use myoband::error::AppRunError;
use myoband::{init_logging, run};

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();
    init_logging(&cli.log_config());
    info!(concat!("myoband ", env!("CARGO_PKG_VERSION")));

    let result = run(cli, |session, config| {
        let interface = config.interface.clone();
        session.on_emg(move |emg| println!("[{}] {}", interface, emg));
        let interface = config.interface.clone();
        session.on_imu(move |imu| println!("[{}] {}", interface, imu));
    }).await;

    match result {
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(()) => Ok(()),
    }
}
