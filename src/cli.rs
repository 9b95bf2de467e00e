use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "curlcheck")]
#[command(about = "Test HTTP APIs from curl commands and compare status codes", long_about = None)]
#[command(version)]
pub struct Args {
    /// curl command to inspect, execute or generate test cases from
    #[arg(value_name = "CURL")]
    pub curl: Option<String>,

    /// Print the URL, headers and body extracted from the curl command and exit
    #[arg(long = "parse-only")]
    pub parse_only: bool,

    /// Expected status code for an ad-hoc run
    #[arg(short = 'e', long = "expect")]
    pub expected_status: Option<String>,

    /// Test suite file (YAML, or JSON with a .json extension)
    #[arg(long = "suite")]
    pub suite: Option<PathBuf>,

    /// Run only the test case at this position (1-based) of the suite
    #[arg(long = "case", requires = "suite")]
    pub case: Option<usize>,

    /// Generate test cases from the curl command
    #[arg(long = "generate")]
    pub generate: bool,

    /// Execute generated test cases instead of printing them
    #[arg(long = "run", requires = "generate")]
    pub run_generated: bool,

    /// Base URL of the test case generation service; local generation when absent
    #[arg(long = "generator-url", env = "CURLCHECK_GENERATOR_URL")]
    pub generator_url: Option<String>,

    /// Base URL of the execution backend
    #[arg(long = "backend-url", env = "CURLCHECK_BACKEND_URL", default_value = "http://127.0.0.1:5000")]
    pub backend_url: String,

    /// Timeout for calls to the backends (e.g. 30s); waits indefinitely when absent
    #[arg(long = "backend-timeout")]
    pub backend_timeout: Option<String>,

    /// Report format: text, csv, json
    #[arg(long = "report", default_value = "text")]
    pub report: String,

    /// Run the execution backend server
    #[arg(long = "serve")]
    pub serve: bool,

    /// Address the execution backend binds to
    #[arg(long = "bind", default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Port the execution backend listens on
    #[arg(short = 'p', long = "port", default_value = "5000")]
    pub port: u16,

    /// Timeout for requests performed by the execution backend
    #[arg(long = "request-timeout", default_value = "30s")]
    pub request_timeout: String,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    pub fn parse_backend_timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.backend_timeout
            .as_deref()
            .map(parse_duration_string)
            .transpose()
    }

    pub fn parse_request_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration_string(&self.request_timeout)
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse_duration_string(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();

    if let Some(num) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(num.parse()?))
    } else if let Some(num) = s.strip_suffix('s') {
        Ok(Duration::from_secs(num.parse()?))
    } else if let Some(num) = s.strip_suffix('m') {
        Ok(Duration::from_secs(scaled_secs(num, 60)?))
    } else if let Some(num) = s.strip_suffix('h') {
        Ok(Duration::from_secs(scaled_secs(num, 3600)?))
    } else {
        // Default to seconds
        Ok(Duration::from_secs(s.parse()?))
    }
}

fn scaled_secs(num: &str, unit: u64) -> anyhow::Result<u64> {
    let num: u64 = num.parse()?;
    num.checked_mul(unit)
        .ok_or_else(|| anyhow::anyhow!("Duration too large: {}", num))
}
