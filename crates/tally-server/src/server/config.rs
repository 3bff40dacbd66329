use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;

/// Which loop this process runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Serve visit counts over HTTP.
    #[value(alias = "serving")]
    Web,
    /// Consume the work queue.
    Worker,
}

/// Runtime configuration for the `tally-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (after
/// loading an optional `.env` file). Web and worker processes share the same
/// binary and configuration surface; `ROLE` picks the loop.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally-server",
    version,
    about = "Visit counters and a work-queue worker coordinating through a shared store"
)]
pub struct CliArgs {
    /// Loop to run: `web` serves HTTP, `worker` consumes the queue.
    ///
    /// Environment variable: `ROLE`
    #[arg(long, env = "ROLE", value_enum, default_value_t = Role::Web)]
    pub role: Role,

    /// Store endpoint, either `host:port` or a full `redis://` URL.
    ///
    /// Environment variable: `STORE_ADDR`
    #[arg(long, env = "STORE_ADDR", default_value_t = String::from("redis:6379"))]
    pub store_addr: String,

    /// Logical database within the store. Ignored when `STORE_ADDR` is a URL.
    ///
    /// Environment variable: `STORE_INDEX`
    #[arg(long, env = "STORE_INDEX", default_value_t = 0)]
    pub store_index: u32,

    /// Port the web role listens on (all interfaces).
    ///
    /// Environment variable: `PORT`
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Host identifier reported as `served_by` and in worker logs. Falls back
    /// to the operating system host name when unset.
    ///
    /// Environment variable: `HOSTNAME`
    #[arg(long, env = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Name of the work queue.
    ///
    /// Environment variable: `QUEUE`
    #[arg(long, env = "QUEUE", default_value_t = String::from("jobs"))]
    pub queue: String,

    /// Upper bound on one blocking pop, in milliseconds. A stopping worker
    /// exits within this interval.
    ///
    /// Environment variable: `POP_TIMEOUT_MS`
    #[arg(long, env = "POP_TIMEOUT_MS", default_value_t = 1000)]
    pub pop_timeout_ms: u64,

    /// How long to wait for the startup liveness check before giving up.
    ///
    /// Environment variable: `STARTUP_TIMEOUT_SECS`
    #[arg(long, env = "STARTUP_TIMEOUT_SECS", default_value_t = 5)]
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub role: Role,
    pub store_addr: String,
    pub store_index: u32,
    pub port: u16,
    pub hostname: String,
    pub queue: String,
    pub pop_timeout: Duration,
    pub startup_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.role == Role::Web && args.port == 0 {
            bail!("PORT must be greater than 0");
        }

        if args.queue.trim().is_empty() {
            bail!("QUEUE must not be empty");
        }

        if args.pop_timeout_ms == 0 {
            bail!("POP_TIMEOUT_MS must be greater than 0");
        }

        if args.startup_timeout_secs == 0 {
            bail!("STARTUP_TIMEOUT_SECS must be greater than 0");
        }

        Ok(Self {
            role: args.role,
            store_addr: args.store_addr,
            store_index: args.store_index,
            port: args.port,
            hostname: resolve_hostname(args.hostname),
            queue: args.queue,
            pop_timeout: Duration::from_millis(args.pop_timeout_ms),
            startup_timeout: Duration::from_secs(args.startup_timeout_secs),
        })
    }
}

/// Picks the configured host identifier, else the OS host name, else
/// `unknown`.
fn resolve_hostname(configured: Option<String>) -> String {
    configured
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            gethostname::gethostname()
                .into_string()
                .ok()
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| String::from("unknown"))
}
