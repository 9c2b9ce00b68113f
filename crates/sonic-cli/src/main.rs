//! Diagnostic command line for SonicAmp devices.
//!
//! Usage: sonic --port /dev/ttyUSB0 <command>

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sonic_control::{
    connection_from_config, Device, DeviceBuilder, Event, ProcedureArgs, ProcedureController, ProcedureType,
    ProtocolSelection, SessionConfig, TransportConfig, Updater,
};
use sonic_protocol::{Answer, Command as DeviceCommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sonic")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Session configuration (YAML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the configured transport.
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate used with --port.
    #[arg(long, global = true, default_value_t = 115_200)]
    baudrate: u32,

    /// Communicator: auto, sonic or legacy.
    #[arg(long, global = true, value_parser = parse_yaml::<ProtocolSelection>)]
    protocol: Option<ProtocolSelection>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what the device reports about itself.
    Info,
    /// Send requests as text, e.g. `?f` or `!g=100`.
    Send {
        #[arg(required = true)]
        requests: Vec<String>,
    },
    /// Print status updates until interrupted.
    Poll {
        /// Stop after this many updates.
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Poll interval in milliseconds.
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Set the device clock to the local time.
    SyncTime,
    /// Print the procedures the device offers.
    Procedures,
    /// Print the current arguments of a procedure as YAML.
    Fetch {
        #[arg(value_parser = parse_yaml::<ProcedureType>)]
        procedure: ProcedureType,
    },
    /// Run a procedure until it ends or is interrupted.
    Run {
        #[arg(value_parser = parse_yaml::<ProcedureType>)]
        procedure: ProcedureType,
        /// Procedure arguments (YAML); defaults are used otherwise.
        #[arg(short, long)]
        args: Option<PathBuf>,
    },
    /// Print the effective configuration.
    Config,
}

fn parse_yaml<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, String> {
    serde_yaml::from_str(text).map_err(|e| format!("invalid value '{}': {}", text, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            SessionConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    if let Some(port) = &args.port {
        config.transport = TransportConfig::Serial {
            port: port.clone(),
            baudrate: args.baudrate,
        };
    }
    if let Some(protocol) = args.protocol {
        config.protocol = protocol;
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .init();

    if let Command::Config = args.command {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let device = connect(&config).await?;
    let result = run_command(args.command, &config, &device).await;
    device.disconnect().await;
    result
}

async fn connect(config: &SessionConfig) -> Result<Arc<Device>> {
    let connection = connection_from_config(&config.transport);
    let device = DeviceBuilder::new(config.clone())
        .build(connection)
        .await
        .context("failed to connect to the device")?;
    info!(info = %device.protocol_info(), "connected");
    Ok(Arc::new(device))
}

async fn run_command(command: Command, config: &SessionConfig, device: &Arc<Device>) -> Result<()> {
    match command {
        Command::Info => print_info(device),
        Command::Send { requests } => {
            for request in requests {
                let answer = device
                    .send_text(&request)
                    .await
                    .with_context(|| format!("failed to send '{}'", request))?;
                print_answer(&answer);
            }
        }
        Command::Poll { count, interval } => {
            let interval = interval.map_or(config.updater.interval(), Duration::from_millis);
            poll(device, interval, count).await?;
        }
        Command::SyncTime => {
            let now = chrono::Local::now().naive_local();
            let answer = device.send(&DeviceCommand::set_datetime(&now)).await?;
            print_answer(&answer);
        }
        Command::Procedures => {
            let controller = controller(config, device);
            for procedure_type in controller.available() {
                println!("{}", procedure_type);
            }
        }
        Command::Fetch { procedure } => {
            let controller = controller(config, device);
            let args = controller.fetch_args(procedure).await?;
            print!("{}", serde_yaml::to_string(&args)?);
        }
        Command::Run { procedure, args } => {
            let args = match args {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    parse_yaml::<ProcedureArgs>(&text).map_err(anyhow::Error::msg)?
                }
                None => ProcedureArgs::default_for(procedure),
            };
            run_procedure(config, device, procedure, args).await?;
        }
        Command::Config => print!("{}", config.to_yaml()?),
    }
    Ok(())
}

fn controller(config: &SessionConfig, device: &Arc<Device>) -> ProcedureController {
    let updater = Arc::new(Updater::new(Arc::clone(device), config.updater.interval()));
    ProcedureController::new(Arc::clone(device), updater)
}

fn print_info(device: &Device) {
    let firmware = device.firmware();
    println!("device type:      {}", firmware.device_type);
    println!("protocol:         {}", firmware.protocol_version);
    println!("build:            {}", if firmware.is_release { "release" } else { "debug" });
    println!("communicator:     {:?}", device.communicator_kind());
    println!("hardware version: {}", firmware.hardware_version);
    println!("firmware version: {}", firmware.firmware_version);
    if let Some(hash) = &firmware.build_hash {
        println!("build hash:       {}", hash);
    }
    if let Some(date) = &firmware.build_date {
        println!("build date:       {}", date);
    }
    println!("commands:         {}", device.table().len());
}

fn print_answer(answer: &Answer) {
    let marker = if answer.is_error() {
        "error"
    } else if answer.valid {
        "ok"
    } else {
        "unvalidated"
    };
    println!("[{}] {}", marker, answer.message);
    for (name, value) in &answer.field_values {
        println!("  {} = {}", name, value);
    }
}

async fn poll(device: &Arc<Device>, interval: Duration, count: Option<usize>) -> Result<()> {
    let mut events = device.events().subscribe();
    let updater = Updater::new(Arc::clone(device), interval);
    updater.start();

    let mut seen = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(Event::Update(answer)) => {
                    print_answer(&answer);
                    seen += 1;
                    if count.map_or(false, |count| seen >= count) {
                        break;
                    }
                }
                Ok(Event::Disconnected) => bail!("device disconnected"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed status updates"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    updater.stop().await?;
    Ok(())
}

async fn run_procedure(
    config: &SessionConfig,
    device: &Arc<Device>,
    procedure: ProcedureType,
    args: ProcedureArgs,
) -> Result<()> {
    let updater = Arc::new(Updater::new(Arc::clone(device), config.updater.interval()));
    let controller = ProcedureController::new(Arc::clone(device), Arc::clone(&updater));
    updater.start();

    let mut running = controller.running_state();
    controller.execute_proc(procedure, args)?;
    info!(%procedure, "procedure started");
    let interrupted = tokio::select! {
        _ = running.wait_for(|active| active.is_none()) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    let result = if interrupted {
        info!(%procedure, "interrupted, stopping procedure");
        controller.stop_proc().await
    } else {
        controller.join_proc().await
    };
    if let Err(e) = updater.stop().await {
        warn!("updater ended with error: {}", e);
    }
    result?;
    info!(%procedure, "procedure finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let args = Args::try_parse_from(["sonic", "--port", "/dev/ttyUSB0", "run", "spectrum_measure"]).unwrap();
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
        match args.command {
            Command::Run { procedure, args } => {
                assert_eq!(procedure, ProcedureType::SpectrumMeasure);
                assert!(args.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_protocol_selection() {
        let args = Args::try_parse_from(["sonic", "info", "--protocol", "legacy"]).unwrap();
        assert_eq!(args.protocol, Some(ProtocolSelection::Legacy));
        assert!(Args::try_parse_from(["sonic", "info", "--protocol", "modbus"]).is_err());
    }

    #[test]
    fn test_send_needs_a_request() {
        assert!(Args::try_parse_from(["sonic", "send"]).is_err());
    }
}
