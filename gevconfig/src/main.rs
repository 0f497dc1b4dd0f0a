use clap::Parser;
use gevconfig::{Driver, GvcpBus, GvcpBusConfig, SettleStrategy};
use std::{ffi::OsString, net::SocketAddrV4, time::Duration};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// GigE Vision camera IP configuration tool.
///
/// Lists every camera on the network, asks them all to renegotiate their
/// addresses, then stores each camera's current address as its persistent
/// static configuration (with a /24 mask, and the gateway at .1), and lists
/// them again.
///
/// Progress is written to stdout, and logs to stderr (see RUST_LOG).
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// Local address to send from.
    #[clap(long, default_value = "0.0.0.0:0")]
    pub bind: SocketAddrV4,

    /// Address to send discovery and FORCEIP commands to.
    #[clap(long, default_value = "255.255.255.255:3956")]
    pub broadcast: SocketAddrV4,

    /// How long to wait for cameras to answer discovery, in milliseconds.
    #[clap(long, default_value = "1000")]
    pub discovery_timeout_ms: u64,

    /// How long to wait for each acknowledgement, in milliseconds.
    #[clap(long, default_value = "500")]
    pub control_timeout_ms: u64,

    /// How many times to retransmit an unacknowledged command.
    #[clap(long, default_value = "0")]
    pub retries: u8,

    /// How long to wait for cameras to renegotiate their addresses, in
    /// seconds.
    #[clap(long, default_value = "5")]
    pub settle_secs: u64,

    /// Rescan every second until the number of cameras stops changing (up to
    /// --settle-secs), rather than waiting a fixed time.
    #[clap(long)]
    pub wait_stable: bool,
}

impl CliParser {
    /// Parses arguments. Errors and `--help` are printed here, and give
    /// [`None`], so the process still exits with status 0.
    fn parse_args<I, T>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(opts) => Some(opts),
            Err(e) => {
                if let Err(e) = e.print() {
                    error!("could not print usage: {e}");
                }
                None
            }
        }
    }

    fn bus_config(&self) -> GvcpBusConfig {
        GvcpBusConfig {
            bind: self.bind,
            broadcast: self.broadcast,
            port: self.broadcast.port(),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            control_timeout: Duration::from_millis(self.control_timeout_ms),
            retransmits: self.retries,
        }
    }

    fn settle(&self) -> SettleStrategy {
        let settle = Duration::from_secs(self.settle_secs);
        if self.wait_stable {
            SettleStrategy::UntilStable {
                interval: Duration::from_secs(1),
                timeout: settle,
            }
        } else {
            SettleStrategy::Fixed(settle)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
    let Some(opts) = CliParser::parse_args(std::env::args_os()) else {
        return;
    };

    // Without a socket there is nothing any phase could do.
    let mut bus = match GvcpBus::open(opts.bus_config()).await {
        Ok(bus) => bus,
        Err(e) => {
            error!("Could not bind {}: {e}", opts.bind);
            return;
        }
    };

    let summary = Driver::new(opts.settle())
        .run(&mut bus, &mut std::io::stdout().lock())
        .await;
    bus.close();

    info!(
        "Done: {} camera(s) configured, {} phase(s) failed",
        summary.assignments.len(),
        summary.failed_phases.len()
    );
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let opts = CliParser::parse_args(["gevconfig"]).unwrap();
        assert_eq!(GvcpBusConfig::default(), opts.bus_config());
        assert_eq!(SettleStrategy::default(), opts.settle());
    }

    #[test]
    fn options() {
        let opts = CliParser::parse_args([
            "gevconfig",
            "--bind",
            "192.168.1.2:0",
            "--retries",
            "2",
            "--settle-secs",
            "10",
            "--wait-stable",
        ])
        .unwrap();
        let config = opts.bus_config();
        assert_eq!("192.168.1.2:0".parse::<SocketAddrV4>().unwrap(), config.bind);
        assert_eq!(2, config.retransmits);
        assert_eq!(
            SettleStrategy::UntilStable {
                interval: Duration::from_secs(1),
                timeout: Duration::from_secs(10),
            },
            opts.settle()
        );
    }

    #[test]
    fn bad_arguments() {
        assert!(CliParser::parse_args(["gevconfig", "--bogus"]).is_none());
        assert!(CliParser::parse_args(["gevconfig", "--retries", "-1"]).is_none());
        assert!(CliParser::parse_args(["gevconfig", "--help"]).is_none());
    }
}
