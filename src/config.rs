use std::str::FromStr;

use clap::Parser;

/// A representation of an RTP stream: what a record is read from or
/// written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The `rtpplay1.0` binary capture format.
    Dump,
    /// A live UDP session.
    Net,
    /// Demultiplexed payload bytes, headers stripped.
    Raw,
    /// A human-readable trace, one line per record.
    Text,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "dump" => Self::Dump,
            "net" => Self::Net,
            "raw" => Self::Raw,
            "txt" => Self::Text,
            _ => return Err(format!("unknown format: {value}")),
        })
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Dump => "dump",
            Self::Net => "net",
            Self::Raw => "raw",
            Self::Text => "txt",
        })
    }
}

impl Format {
    /// Default format for a filesystem path, by suffix.
    pub fn from_suffix(path: &str) -> Option<Self> {
        match path.rsplit_once('.')?.1 {
            "rtp" => Some(Self::Dump),
            "raw" => Some(Self::Raw),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Config {
    ///
    /// Input format: dump, net or txt.
    ///
    /// Inferred from the input target when not given: net for
    /// `addr:port`, the suffix for a path, dump for stdin.
    ///
    #[arg(short = 'i', long, value_name = "FORMAT")]
    pub input_format: Option<Format>,
    ///
    /// Output format: dump, net, raw or txt.
    ///
    /// Inferred from the output target when not given: net for
    /// `addr:port`, the suffix for a path, txt for stdout.
    ///
    #[arg(short = 'o', long, value_name = "FORMAT")]
    pub output_format: Option<Format>,
    ///
    /// Treat every network address as remote, even one bound to a
    /// local interface. Useful for loopback sessions where both peers
    /// run on this host.
    ///
    #[arg(short, long)]
    pub remote: bool,
    ///
    /// Pace replay by the capture wall-clock offsets instead of the
    /// RTP timestamps and the payload's clock rate.
    ///
    #[arg(short = 't', long)]
    pub dump_time: bool,
    ///
    /// Socket receive timeout in seconds.
    ///
    /// Bounds the rendezvous wait for the first datagram and every
    /// streaming receive; without it an absent peer blocks forever.
    ///
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
    ///
    /// Log at debug level.
    ///
    #[arg(short, long)]
    pub verbose: bool,
    ///
    /// Input: a file path, `-` for stdin, or `addr:port` for UDP.
    ///
    #[arg(default_value = "-")]
    pub input: String,
    ///
    /// Output: a file path, `-` for stdout, or `addr:port` for UDP.
    ///
    #[arg(default_value = "-")]
    pub output: String,
}

impl Config {
    pub fn log_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Debug
        } else {
            log::Level::Info
        }
    }
}
