//! Provides a means to read, parse and hold configuration options for scans.
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_derive::Deserialize;

use crate::error::ScanError;
use crate::scanner::{MAX_WORKERS, MIN_WORKERS};
use crate::target::ScanRequest;

/// Port Minecraft Java Edition servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 25565;

fn parse_workers(input: &str) -> Result<usize, String> {
    let workers: usize = input
        .trim()
        .parse()
        .map_err(|_| format!("Invalid worker count '{input}'"))?;

    if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
        return Err(format!(
            "Worker count {workers} must be between {MIN_WORKERS} and {MAX_WORKERS}",
        ));
    }

    Ok(workers)
}

fn parse_ipv4(input: &str) -> Result<Ipv4Addr, ScanError> {
    Ipv4Addr::from_str(input.trim()).map_err(|_| {
        ScanError::InvalidRequest(format!("'{input}' is not a dotted-quad IPv4 address"))
    })
}

/// What to do. Mirrors the entries of the scanner's menu.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scan a range of IPv4 addresses on one port.
    /// START may also be a CIDR block such as 192.168.0.0/24, in which case END is omitted.
    Range {
        start: String,
        end: Option<String>,
        /// The port to probe on every address.
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Scan a range of ports on one host. The host may be an IP address or a domain name.
    Ports {
        host: String,
        start_port: u16,
        end_port: u16,
    },

    /// Query the status of a single Minecraft server. Example: mc.example.org:25565
    Status { address: String },
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mcscan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nCOMMANDS:\n{subcommands}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Concurrent TCP reachability scanner that can identify Minecraft servers.
/// WARNING Only scan networks and servers you are authorised to test.
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,

    /// Number of concurrent workers, between 1 and 200.
    #[arg(short, long, global = true, default_value = "50", value_parser = parse_workers)]
    pub workers: usize,

    /// The timeout in milliseconds of the first connect attempt.
    #[arg(long, global = true, default_value = "200")]
    pub fast_timeout: u64,

    /// The timeout in milliseconds of the single retry after a first attempt times out.
    #[arg(long, global = true, default_value = "1000")]
    pub slow_timeout: u64,

    /// Query every open port for Minecraft server status.
    #[arg(long, global = true)]
    pub classify: bool,

    /// The timeout in milliseconds of each status query.
    #[arg(long, global = true, default_value = "2000")]
    pub classify_timeout: u64,

    /// Greppable mode. Only output host:port of open targets.
    #[arg(short, long, global = true)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long, global = true)]
    pub accessible: bool,

    /// Print the results as JSON once the scan finishes.
    #[arg(long, global = true)]
    pub json: bool,

    /// Hide the banner
    #[arg(long, global = true)]
    pub no_banner: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long, global = true)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, global = true, value_parser)]
    pub config_path: Option<PathBuf>,

    /// A comma-delimited list or file of DNS resolvers.
    #[arg(long, global = true)]
    pub resolver: Option<String>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long, global = true)]
    pub ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    #[must_use]
    pub fn read() -> Self {
        Self::parse()
    }

    /// Merges values found within the user configuration file.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            workers, fast_timeout, slow_timeout, classify, classify_timeout, greppable,
            accessible
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(resolver, ulimit);
    }

    #[must_use]
    pub const fn fast_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_timeout)
    }

    #[must_use]
    pub const fn slow_timeout(&self) -> Duration {
        Duration::from_millis(self.slow_timeout)
    }

    #[must_use]
    pub const fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout)
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            command: Command::Status {
                address: String::new(),
            },
            workers: 50,
            fast_timeout: 200,
            slow_timeout: 1000,
            classify: false,
            classify_timeout: 2000,
            greppable: true,
            accessible: false,
            json: false,
            no_banner: false,
            no_config: true,
            config_path: None,
            resolver: None,
            ulimit: None,
        }
    }
}

/// Builds the request of a `range` command.
pub fn range_request(start: &str, end: Option<&str>, port: u16) -> Result<ScanRequest, ScanError> {
    match end {
        Some(end) => ScanRequest::range(parse_ipv4(start)?, parse_ipv4(end)?, port),
        None if start.contains('/') => ScanRequest::from_cidr(start, port),
        None => {
            let ip = parse_ipv4(start)?;
            ScanRequest::range(ip, ip, port)
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    workers: Option<usize>,
    fast_timeout: Option<u64>,
    slow_timeout: Option<u64>,
    classify: Option<bool>,
    classify_timeout: Option<u64>,
    greppable: Option<bool>,
    accessible: Option<bool>,
    resolver: Option<String>,
    ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty configuration.
    ///
    /// # Format
    ///
    /// workers = 100
    /// fast_timeout = 300
    /// slow_timeout = 1500
    /// classify = true
    /// greppable = false
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, ScanError> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ScanError::Config(format!("{}: {e}", config_path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ScanError> {
        toml::from_str(content).map_err(|e| ScanError::Config(e.to_string()))
    }
}

/// Constructs default path to config toml
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".mcscan.toml");
    Some(config_path)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use parameterized::parameterized;

    use super::{parse_workers, range_request, Command, Config, Opts, DEFAULT_PORT};
    use crate::error::ScanError;
    use crate::target::ScanRequest;

    impl Config {
        fn sample() -> Self {
            Self {
                workers: Some(120),
                fast_timeout: Some(300),
                slow_timeout: Some(1500),
                classify: Some(true),
                classify_timeout: None,
                greppable: Some(false),
                accessible: Some(true),
                resolver: Some("1.1.1.1".to_owned()),
                ulimit: Some(5000),
            }
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[parameterized(input = {
        vec!["mcscan", "range", "192.168.0.1", "192.168.0.254"],
        vec!["mcscan", "range", "192.168.0.0/24", "-p", "25566"],
        vec!["mcscan", "ports", "mc.example.org", "25560", "25570"],
        vec!["mcscan", "status", "mc.example.org:25565"],
    }, command = {
        Command::Range { start: "192.168.0.1".to_owned(), end: Some("192.168.0.254".to_owned()), port: DEFAULT_PORT },
        Command::Range { start: "192.168.0.0/24".to_owned(), end: None, port: 25566 },
        Command::Ports { host: "mc.example.org".to_owned(), start_port: 25560, end_port: 25570 },
        Command::Status { address: "mc.example.org:25565".to_owned() },
    })]
    fn parse_subcommands(input: Vec<&str>, command: Command) {
        let opts = Opts::parse_from(input);
        assert_eq!(opts.command, command);
        assert_eq!(opts.workers, 50);
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let opts = Opts::parse_from([
            "mcscan", "range", "10.0.0.1", "10.0.0.9", "--classify", "-w", "120", "--fast-timeout", "150",
        ]);
        assert!(opts.classify);
        assert_eq!(opts.workers, 120);
        assert_eq!(opts.fast_timeout, 150);
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(parse_workers("1"), Ok(1));
        assert_eq!(parse_workers("200"), Ok(200));
        assert!(parse_workers("0").unwrap_err().contains("between 1 and 200"));
        assert!(parse_workers("201").is_err());
        assert!(parse_workers("many").unwrap_err().contains("Invalid worker count"));
        assert!(Opts::try_parse_from(["mcscan", "-w", "500", "status", "x"]).is_err());
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        opts.merge(&Config::sample());

        assert_eq!(opts.workers, 50);
        assert!(!opts.classify);
        assert!(opts.resolver.is_none());
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = Config::sample();

        opts.merge_required(&config);

        assert_eq!(opts.workers, 120);
        assert_eq!(opts.fast_timeout, 300);
        assert_eq!(opts.slow_timeout, 1500);
        assert_eq!(opts.classify_timeout, 2000);
        assert!(opts.classify);
        assert!(!opts.greppable);
        assert!(opts.accessible);
    }

    #[test]
    fn opts_merge_optional_arguments() {
        let mut opts = Opts::default();
        opts.merge_optional(&Config::sample());

        assert_eq!(opts.resolver.as_deref(), Some("1.1.1.1"));
        assert_eq!(opts.ulimit, Some(5000));
    }

    #[test]
    fn config_reads_toml() {
        let config = Config::from_toml("workers = 10\nclassify = true\n").unwrap();
        assert_eq!(config.workers, Some(10));
        assert_eq!(config.classify, Some(true));
        assert!(config.fast_timeout.is_none());
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(
            Config::from_toml("workers = \"lots\""),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn range_requests_from_arguments() {
        assert_eq!(
            range_request("10.0.0.1", Some("10.0.0.3"), 80).unwrap(),
            ScanRequest::RangeScan {
                start: "10.0.0.1".parse().unwrap(),
                end: "10.0.0.3".parse().unwrap(),
                port: 80
            }
        );
        assert_eq!(
            range_request("10.0.0.0/31", None, 80).unwrap(),
            ScanRequest::RangeScan {
                start: "10.0.0.0".parse().unwrap(),
                end: "10.0.0.1".parse().unwrap(),
                port: 80
            }
        );
        assert!(range_request("10.0.0.3", Some("10.0.0.1"), 80).is_err());
        assert!(range_request("10.0.0.256", Some("10.0.0.1"), 80).is_err());
        assert!(range_request("mc.example.org", None, 80).is_err());
    }
}
