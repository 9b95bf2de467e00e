mod backend;
mod backend_server;
mod cli;
mod curl_parser;
mod engine;
mod error;
mod http_client;
mod invocation;
mod provider;
mod session;
mod test_case;

use anyhow::{anyhow, Result};
use backend::HttpExecutionBackend;
use clap::Parser;
use cli::Args;
use engine::{ExecutionResult, TestExecutionEngine};
use provider::{BasicTestCaseProvider, HttpTestCaseProvider, TestCaseProvider};
use session::TestSession;
use test_case::{ExpectedStatus, TestCase};
use tracing::{debug, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    // Handle different modes
    if args.serve {
        backend_server::run(backend_server::ServerConfig {
            addr: args.server_addr(),
            request_timeout: args.parse_request_timeout()?,
        })
        .await?;
    } else if args.parse_only {
        print_descriptor(&args)?;
    } else if let Some(path) = &args.suite {
        let session = TestSession::load(path)?;
        let engine = build_engine(&args)?;
        match args.case {
            Some(position) => {
                let index = position
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("Test case positions start at 1"))?;
                let result = session::run_one(&engine, &session, index).await?;
                let expected = session
                    .get(index)
                    .and_then(|c| c.expected_status_code.as_ref());
                print_result(&args, &result, expected)?;
            }
            None => session::run_session(&engine, &session, &args.report).await?,
        }
    } else if args.generate {
        generate(&args).await?;
    } else {
        run_adhoc(&args).await?;
    }

    Ok(())
}

fn require_curl(args: &Args) -> Result<&str> {
    args.curl
        .as_deref()
        .ok_or_else(|| anyhow!("No curl command provided"))
}

fn build_engine(args: &Args) -> Result<TestExecutionEngine<HttpExecutionBackend>> {
    let backend = HttpExecutionBackend::new(&args.backend_url, args.parse_backend_timeout()?)?;
    Ok(TestExecutionEngine::new(backend))
}

fn print_descriptor(args: &Args) -> Result<()> {
    let descriptor = curl_parser::parse_curl_command(args.curl.as_deref());
    if descriptor.is_empty() {
        warn!("Nothing recognised in the curl command");
    }
    debug!("Rendered: {}", descriptor.to_curl_command());
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

async fn run_adhoc(args: &Args) -> Result<()> {
    let test_case = TestCase::new(
        "Ad-hoc request",
        "adhoc",
        require_curl(args)?,
        args.expected_status.as_deref().map(ExpectedStatus::from),
    );

    let engine = build_engine(args)?;
    let result = engine.execute(&test_case).await;

    print_result(args, &result, test_case.expected_status_code.as_ref())
}

fn print_result(args: &Args, result: &ExecutionResult, expected: Option<&ExpectedStatus>) -> Result<()> {
    match args.report.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(result)?),
        _ => {
            println!("{}", result.report());
            if let (Some(expected), Some(classification)) = (expected, result.classification) {
                println!("\nExpected {}: {}", expected, classification);
            }
        }
    }
    Ok(())
}

async fn generate(args: &Args) -> Result<()> {
    let curl = require_curl(args)?;

    let cases = match &args.generator_url {
        Some(url) => {
            let provider = HttpTestCaseProvider::new(url, args.parse_backend_timeout()?)?;
            provider.generate(curl).await?
        }
        None => BasicTestCaseProvider::default().generate(curl).await?,
    };
    let session = TestSession::new(cases);

    if args.run_generated {
        session::run_session(&build_engine(args)?, &session, &args.report).await
    } else {
        print!("{}", session.to_yaml()?);
        Ok(())
    }
}
