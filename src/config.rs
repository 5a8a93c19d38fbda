use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;

use crate::frame::FrameLimits;
use crate::logging::LogLevel;

pub const PORT: u16 = 6379;

#[derive(Parser, Debug)]
#[command(name = "kvwire", version, about = "A RESP speaking server answering PING and ECHO")]
pub struct Args {
    /// The address to bind to
    #[arg(long, env = "KVWIRE_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// The port to listen on
    #[arg(short, long, env = "KVWIRE_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Log verbosity: DEBUG, INFO, WARNING (or WARN) or ERROR. Other values keep the default
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Maximum number of bytes taken from the socket by a single read
    #[arg(long, default_value = "4096")]
    pub read_buffer_size: NonZeroUsize,

    /// Maximum declared length of a bulk string. A frame must arrive within a single read, so
    /// this only takes effect when it is below --read-buffer-size
    #[arg(long, default_value_t = FrameLimits::default().max_bulk_len)]
    pub max_bulk_len: usize,

    /// Maximum declared number of array elements
    #[arg(long, default_value_t = FrameLimits::default().max_array_len)]
    pub max_array_len: usize,

    /// Maximum array nesting
    #[arg(long, default_value_t = FrameLimits::default().max_depth)]
    pub max_depth: usize,

    /// Consecutive failed reads after which a connection is closed
    #[arg(long, default_value = "16")]
    pub max_read_errors: NonZeroU32,

    /// Close connections that send nothing for this many seconds
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Answer malformed and failed commands with an error reply instead of silence
    #[arg(long)]
    pub error_replies: bool,
}

/// Server settings, resolved once at startup and shared read-only by every connection task.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub log_level: LogLevel,
    pub read_buffer_size: usize,
    pub limits: FrameLimits,
    pub max_read_errors: u32,
    pub idle_timeout: Option<Duration>,
    pub error_replies: bool,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: PORT,
            log_level: LogLevel::default(),
            read_buffer_size: 4096,
            limits: FrameLimits::default(),
            max_read_errors: 16,
            idle_timeout: None,
            error_replies: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let log_level = args
            .log_level
            .as_deref()
            .and_then(LogLevel::from_name)
            .unwrap_or_default();

        Self {
            bind: args.bind,
            port: args.port,
            log_level,
            read_buffer_size: args.read_buffer_size.get(),
            limits: FrameLimits {
                max_bulk_len: args.max_bulk_len,
                max_array_len: args.max_array_len,
                max_depth: args.max_depth,
            },
            max_read_errors: args.max_read_errors.get(),
            idle_timeout: args.idle_timeout_secs.map(Duration::from_secs),
            error_replies: args.error_replies,
        }
    }
}
