use clap::{Parser, Subcommand};
use serde::Serialize;
use serial_console::config::ConfigLoader;
use serial_console::{logging, Config, ReadMode, RetryPolicy, Session, SessionOptions};
use serialport::{available_ports, SerialPortType};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-console",
    version,
    about = "Drive an embedded board's shell over a serial console.",
    long_about = "Sends shell commands to a board over a serial line, waits for keywords in its output, checks its network health and mounts NFS shares. Settings come from serial-console.toml, SERIAL_CONSOLE_* environment variables and the flags below."
)]
struct Cli {
    /// Config file (overrides the standard search locations).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port or alias, e.g. /dev/ttyUSB0 or COM3.
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Per-read timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a shell command and print its output or keyword result.
    Exec {
        command: String,
        /// Report whether this text appeared.
        #[arg(short, long)]
        keyword: Option<String>,
        /// Read window in milliseconds.
        #[arg(short, long, default_value_t = 1000)]
        duration_ms: u64,
        /// Poll in half-second slices and stop as soon as the keyword appears.
        #[arg(short, long)]
        until: bool,
    },
    /// Capture console output for a while.
    Read {
        #[arg(short, long, default_value_t = 1000)]
        duration_ms: u64,
    },
    /// Capture console output until a keyword or timeout.
    ReadUntil {
        keyword: String,
        /// Give up after this many milliseconds.
        #[arg(short, long, default_value_t = 10_000)]
        wait_ms: u64,
    },
    /// Print the board's IPv4 address (-1 if none).
    Ip,
    /// Check the board's packet error counter.
    NetCheck,
    /// Wait for the board to report a healthy network.
    Status,
    /// Mount an NFS export on the board unless KEYWORD is already listed.
    MountNfs {
        ip: String,
        path: String,
        keyword: String,
    },
    /// Send Ctrl+C to the board.
    Interrupt,
    /// List serial ports on this machine.
    ListPorts,
}

#[derive(Serialize)]
struct PortEntry {
    name: String,
    kind: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?.into_config(),
        None => ConfigLoader::load()?.into_config(),
    };

    if let Some(port) = &cli.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }
    if let Some(ms) = cli.timeout_ms {
        config.serial.timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn emit<T>(json: bool, value: &T) -> Result<(), Box<dyn std::error::Error>>
where
    T: Serialize + std::fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::ListPorts = cli.command {
        return list_ports(cli.json);
    }

    let config = load_config(&cli)?;
    let port = config
        .serial
        .port
        .as_deref()
        .map(|p| config.serial.resolve_port(p))
        .ok_or("no serial port given; use --port or set [serial] port in the config")?;

    let options =
        SessionOptions::from_config(&config).with_dispatch(logging::dispatch(&config.logging));
    let mut session = Session::open_with(&port, options)?;

    match cli.command {
        Command::Exec {
            command,
            keyword,
            duration_ms,
            until,
        } => {
            let mode = if until { ReadMode::Until } else { ReadMode::Fixed };
            let exec = session.execute(
                &command,
                keyword.as_deref(),
                Duration::from_millis(duration_ms),
                mode,
            )?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&exec)?);
            } else {
                match exec.keyword_found {
                    Some(found) => println!("{found}"),
                    None => print!("{}", exec.output),
                }
            }
        }
        Command::Read { duration_ms } => {
            let text = session.read_port(Duration::from_millis(duration_ms))?;
            emit(cli.json, &text)?;
        }
        Command::ReadUntil { keyword, wait_ms } => {
            let text = session.read_until(&keyword, Duration::from_millis(wait_ms))?;
            emit(cli.json, &text)?;
        }
        Command::Ip => emit(cli.json, &session.get_ip()?)?,
        Command::NetCheck => emit(cli.json, &session.get_network_err()?)?,
        Command::Status => {
            let status = session.check_status(RetryPolicy::from_config(&config))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "ip={} errors={} attempts={}",
                    status.ip, status.error_count, status.attempts
                );
            }
        }
        Command::MountNfs { ip, path, keyword } => {
            let outcome = session.mount_nfs(&ip, &path, &keyword)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{outcome:?}");
            }
        }
        Command::Interrupt => session.ctrl_c()?,
        Command::ListPorts => list_ports(cli.json)?,
    }

    session.close();
    Ok(())
}

fn list_ports(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ports: Vec<PortEntry> = available_ports()?
        .into_iter()
        .map(|p| PortEntry {
            kind: match p.port_type {
                SerialPortType::UsbPort(usb) => format!(
                    "usb {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                SerialPortType::BluetoothPort => "bluetooth".to_string(),
                SerialPortType::PciPort => "pci".to_string(),
                SerialPortType::Unknown => "unknown".to_string(),
            },
            name: p.port_name,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        println!("No serial ports detected on this system");
    } else {
        for port in &ports {
            println!("{}\t{}", port.name, port.kind);
        }
    }
    Ok(())
}
