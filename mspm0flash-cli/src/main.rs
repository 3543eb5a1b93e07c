//! mspm0flash CLI - Command-line tool for the TI MSPM0 ROM bootloader.
//!
//! ## Features
//!
//! - Erase, program and verify raw binary images over I2C or UART
//! - Show bootloader and device information
//! - Read flash memory back
//! - Board control script hook (enter/leave the bootloader)
//! - Configuration file and environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use env_logger::Env;
use log::{debug, warn};
use mspm0flash::BaudRate;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod interface;
mod script;
mod session;

use config::Config;
use session::Session;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors raised by the CLI itself rather than the library.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid combination of arguments or settings.
    #[error("{0}")]
    Usage(String),
    /// The user interrupted the operation.
    #[error("{0}")]
    Cancelled(String),
    /// The control script reported a failure.
    #[error("{0}")]
    Script(String),
}

/// mspm0flash - Flash TI MSPM0 microcontrollers through the ROM bootloader.
///
/// Environment variables:
///   MSPM0FLASH_I2C          - Default I2C device
///   MSPM0FLASH_SERIAL       - Default serial device
///   MSPM0FLASH_I2C_ADDRESS  - Bootloader I2C address (default: 0x48)
///   MSPM0FLASH_BAUD         - Serial baud rate (default: 9600)
///   MSPM0FLASH_CTRL         - Control script (default: /etc/mspm0flash/ctrl)
#[derive(Parser, Debug)]
#[command(name = "mspm0flash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:
  mspm0flash -I /dev/i2c-1 info
  mspm0flash -S /dev/ttyUSB0 -s prog firmware.bin
  mspm0flash -S /dev/ttyUSB0 read --address 0x0 --count 1024 -o dump.bin")]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// I2C device the bootloader is attached to.
    #[arg(
        short = 'I',
        long = "i2c",
        global = true,
        env = "MSPM0FLASH_I2C",
        value_name = "DEV",
        conflicts_with = "serial"
    )]
    pub i2c: Option<String>,

    /// Serial device the bootloader is attached to.
    #[arg(
        short = 'S',
        long,
        global = true,
        env = "MSPM0FLASH_SERIAL",
        value_name = "DEV"
    )]
    pub serial: Option<String>,

    /// Bootloader I2C address (hex or decimal).
    #[arg(
        short = 'a',
        long,
        global = true,
        env = "MSPM0FLASH_I2C_ADDRESS",
        value_name = "ADDR",
        value_parser = parse_i2c_address
    )]
    pub i2c_address: Option<u16>,

    /// Serial baud rate.
    #[arg(short, long, global = true, env = "MSPM0FLASH_BAUD", value_name = "RATE")]
    pub baud: Option<u32>,

    /// Baud rate to switch the bootloader to after connecting (serial only).
    #[arg(long, global = true, value_name = "RATE", value_parser = parse_baud_rate)]
    pub target_baud: Option<BaudRate>,

    /// Enable XON/XOFF flow control on the serial port.
    #[arg(long, global = true)]
    pub software_flow_control: bool,

    /// Do not execute the init/exit control script.
    #[arg(short = 'n', long, global = true)]
    pub no_script: bool,

    /// Control script to run around the operation.
    #[arg(long, global = true, env = "MSPM0FLASH_CTRL", value_name = "PATH")]
    pub ctrl_script: Option<PathBuf>,

    /// Start the application after programming.
    #[arg(short, long, global = true)]
    pub start: bool,

    /// BSL unlock password (64 hex digits, default all 0xFF).
    #[arg(
        long,
        global = true,
        env = "MSPM0FLASH_PASSWORD",
        hide_env_values = true,
        value_name = "HEX"
    )]
    pub password: Option<String>,

    /// Retries for commands that fail at the transport level.
    #[arg(long, global = true, value_name = "N")]
    pub retries: Option<usize>,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Show bootloader and device information.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Mass erase the main flash.
    Erase,

    /// Erase, program and verify a raw binary image.
    #[command(visible_alias = "program")]
    Prog {
        /// Raw binary image.
        firmware: PathBuf,

        /// Verify this many bytes instead of the image rounded up to 1 KiB.
        #[arg(long, value_name = "LEN", value_parser = parse_u32)]
        crc_len: Option<u32>,
    },

    /// Compare the flash contents with a raw binary image.
    Verify {
        /// Raw binary image.
        firmware: PathBuf,

        /// Verify this many bytes instead of the image rounded up to 1 KiB.
        #[arg(long, value_name = "LEN", value_parser = parse_u32)]
        crc_len: Option<u32>,
    },

    /// Read flash memory back.
    Read {
        /// First address to read (hex or decimal).
        #[arg(long, value_name = "ADDR", value_parser = parse_u32)]
        address: u32,

        /// Number of bytes to read (hex or decimal).
        #[arg(long, value_name = "N", value_parser = parse_usize)]
        count: usize,

        /// Write the data to this file instead of a hex dump on stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Start the application.
    Start,
}

/// Parse an unsigned number (supports 0x prefix and underscores).
fn parse_u32(s: &str) -> Result<u32, String> {
    let s: String = s.trim().chars().filter(|c| *c != '_').collect();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| format!("Invalid number '{s}': {e}"))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    parse_u32(s).and_then(|n| usize::try_from(n).map_err(|e| e.to_string()))
}

/// Parse a 7-bit I2C address.
fn parse_i2c_address(s: &str) -> Result<u16, String> {
    let address = parse_u32(s)?;
    u16::try_from(address)
        .ok()
        .filter(|a| *a <= 0x7f)
        .ok_or_else(|| format!("I2C address {address:#x} is not a 7-bit address"))
}

/// Parse a baud rate the bootloader can switch to.
fn parse_baud_rate(s: &str) -> Result<BaudRate, String> {
    let rate = parse_u32(s)?;
    BaudRate::try_from(rate).map_err(|_| {
        let supported: Vec<String> = BaudRate::ALL
            .iter()
            .map(|r| r.bps().to_string())
            .collect();
        format!(
            "unsupported baud rate {rate} (supported: {})",
            supported.join(", ")
        )
    })
}

/// Map an error to the process exit code.
///
/// 2 usage, 3 transport, 4 device rejection, 130 interrupted, 1 otherwise.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return match cli_err {
                CliError::Usage(_) => 2,
                CliError::Cancelled(_) => 130,
                CliError::Script(_) => 1,
            };
        }
        if let Some(lib_err) = cause.downcast_ref::<mspm0flash::Error>() {
            return match lib_err {
                mspm0flash::Error::Interrupted => 130,
                e if e.is_transport() => 3,
                mspm0flash::Error::Serial(_) => 3,
                e if e.is_device_rejection() => 4,
                _ => 1,
            };
        }
        if cause.downcast_ref::<mspm0flash::TransportError>().is_some() {
            return 3;
        }
    }
    1
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            // Second Ctrl-C: give up waiting for the current exchange.
            std::process::exit(130);
        }
    });
    if let Err(e) = result {
        warn!("Failed to install Ctrl-C handler: {e}");
    }
    mspm0flash::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    let session = Session::new(cli, &config)?;

    match &cli.command {
        Commands::Info { json } => commands::info::cmd_info(&session, *json),
        Commands::Erase => commands::flash::cmd_erase(&session),
        Commands::Prog { firmware, crc_len } => {
            commands::flash::cmd_prog(&session.with_crc_len(*crc_len), firmware)
        },
        Commands::Verify { firmware, crc_len } => {
            commands::flash::cmd_verify(&session.with_crc_len(*crc_len), firmware)
        },
        Commands::Read {
            address,
            count,
            output,
        } => commands::read::cmd_read(&session, *address, *count, output.as_deref()),
        Commands::Start => commands::flash::cmd_start(&session),
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "mspm0flash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    install_interrupt_handler();

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}
