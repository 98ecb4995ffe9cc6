//! edgevcl CLI - run VCL programs locally
//!
//! Loads a program serialised as JSON and either serves one synthetic request
//! through the full lifecycle or runs a single subroutine.

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use edgevcl::ast::Program;
use edgevcl::{Interpreter, InterpreterConfig};
use http::Request;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "edgevcl")]
#[command(about = "Local runtime for Fastly VCL programs", long_about = None)]
struct Cli {
    /// Interpreter configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one request and print the response and process record
    Serve {
        /// Program file (JSON syntax tree)
        program: PathBuf,

        /// Request method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Request URL
        #[arg(long, default_value = "http://localhost/")]
        url: String,

        /// Extra request headers as `Name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Client address
        #[arg(long, default_value = "127.0.0.1:50000")]
        client: SocketAddr,
    },

    /// Run one subroutine against a fresh request context
    Run {
        /// Program file (JSON syntax tree)
        program: PathBuf,

        /// Subroutine name
        subroutine: String,

        /// Enable the assert.* functions
        #[arg(long)]
        testing: bool,
    },

    /// Print the default configuration
    Config,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => InterpreterConfig::load(path)?,
        None => InterpreterConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            program,
            method,
            url,
            headers,
            client,
        } => {
            let interpreter = Interpreter::new(&load_program(&program)?, config)?;
            let mut builder = Request::builder().method(method.as_str()).uri(url.as_str());
            for header in &headers {
                let Some((name, value)) = header.split_once(':') else {
                    bail!("header {header:?} is not in `Name: value` form");
                };
                builder = builder.header(name.trim(), value.trim());
            }
            let request = builder
                .body(String::new())
                .context("Failed to build request")?;

            let (response, process) = interpreter.serve(request, client);
            println!("{:?} {}", response.version(), response.status());
            for (name, value) in response.headers() {
                println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            println!();
            println!("{}", response.body());
            println!();
            println!("{}", process.to_json()?);
        }

        Commands::Run {
            program,
            subroutine,
            testing,
        } => {
            let config = InterpreterConfig {
                testing: testing || config.testing,
                ..config
            };
            let interpreter = Interpreter::new(&load_program(&program)?, config)?;
            let request = Request::builder()
                .uri("http://localhost/")
                .body(String::new())
                .context("Failed to build request")?;
            let mut ctx = interpreter.context(request, SocketAddr::from(([127, 0, 0, 1], 50000)));
            let ending = interpreter.run_subroutine(&mut ctx, &subroutine)?;
            println!("{}", serde_json::to_string_pretty(&ending)?);
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_program(path: &Path) -> Result<Program> {
    let data = fs::read(path).with_context(|| format!("Failed to read program {}", path.display()))?;
    serde_json::from_slice(&data).context("Failed to deserialize program")
}
