use std::env;
use std::path::PathBuf;
use log::{info, warn, LevelFilter};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtleplugTransport;
use crate::device::session::DeviceSession;
use crate::device::transport::BleTransport;
use crate::error::{AppRunError, DeviceError};

pub mod cli;
pub mod config;
pub mod device;
pub mod error;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    /// Falls back to the LOG_FILE environment variable.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: LevelFilter::Info, file: None }
    }
}

pub fn init_logging(config: &LogConfig) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.level)
        .chain(std::io::stderr());

    let log_file = config.file.clone().or_else(|| env::var("LOG_FILE").ok().map(PathBuf::from));
    if let Some(log_file) = log_file {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open log file")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

/// Configure and subscribe a connected session, then pump notifications until `cancel` fires.
pub async fn stream<T: BleTransport>(
    session: &mut DeviceSession<T>,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<(), DeviceError> {
    session.configure(config.emg_mode, config.imu_mode, config.classifier_mode).await?;
    session.subscribe().await?;
    session.set_sleep_mode(config.sleep_mode).await?;

    info!("Streaming from {}", session.address().unwrap_or("UNKNOWN"));
    let timeout = config.notification_timeout();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                break;
            },
            result = session.pump(timeout) => {
                result?;
            },
        }
    }

    Ok(())
}

/// Run [`stream`], then close the session whatever happened.
///
/// A streaming error wins over a close error; the latter is only logged then.
pub async fn stream_and_close<T: BleTransport>(
    session: &mut DeviceSession<T>,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<(), DeviceError> {
    let result = stream(session, config, cancel).await;

    match session.close().await {
        Ok(()) => result,
        Err(err) if result.is_err() => {
            warn!("Failed to close the connection: {}", err);
            result
        },
        Err(err) => Err(err),
    }
}

/// Connect to the first band found and stream from it until Ctrl-C.
///
/// `register` installs the sample callbacks on the session before it connects.
pub async fn run<F>(cli: Cli, register: F) -> Result<(), AppRunError>
where
    F: FnOnce(&mut DeviceSession<BtleplugTransport>, &Config),
{
    let config_io = ConfigIO::new(cli.config.clone())?;
    let mut config = config_io.read().await?;
    cli.apply(&mut config);

    let transport = BtleplugTransport::new(&config.interface).await?;
    let mut session = DeviceSession::new(transport, config.session_options());
    register(&mut session, &config);

    session.discover().await?;
    session.connect().await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Stopping...");
        }
        ctrl_c_cancel.cancel();
    });

    stream_and_close(&mut session, &config, &cancel).await?;
    Ok(())
}
