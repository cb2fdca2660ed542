mod bridge;
mod logging;
mod service;

use std::path::PathBuf;

use clap::Parser;

use crate::logging::{init_logging, LogFormat, LogLevel};

/// Offer a PPP modem on a serial port to the local network as a PPPoE
/// access concentrator.
#[derive(Parser, Debug)]
#[command(name = "pppbridge", version, about = "PPPoE to serial PPP bridge")]
struct Cli {
    /// Serial device the modem is attached to.
    #[arg(value_name = "DEVICE")]
    device: PathBuf,

    /// PPPoE Service-Name offered to hosts.
    #[arg(value_name = "SERVICE")]
    service_name: String,

    /// Ethernet interface to answer PPPoE discovery on.
    #[arg(value_name = "INTERFACE")]
    interface: String,

    /// Access concentrator name announced in PADO replies.
    #[arg(long, value_name = "NAME", default_value = "pppbridge")]
    ac_name: String,

    /// Chatscript run to bring the modem line up when a session starts.
    #[arg(long, value_name = "FILE")]
    chatscript: Option<PathBuf>,

    /// Serial line speed.
    #[arg(long, value_name = "BAUD", default_value_t = 115_200)]
    baud: u32,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", env = "PPPBRIDGE_LOG")]
    log_level: LogLevel,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    if let Err(err) = bridge::run(&cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
