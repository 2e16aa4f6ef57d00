mod echo_tool;
mod exit_codes;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use warden_common::ServerInfo;
use warden_core::transport::{self, Line};
use warden_core::{DispatcherBuilder, HandlerOutcome, SecurityEngine, Server};
use warden_policy::Policy;

/// Local-only MCP security broker. Reads newline-delimited JSON-RPC on
/// stdin, writes responses on stdout, diagnostics on stderr.
#[derive(Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    /// Path to the policy YAML file. Defaults to a loopback-only policy
    /// when omitted.
    #[arg(long)]
    policy: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let policy = load_policy(cli.policy.as_deref()).unwrap_or_else(|e| {
        eprintln!("fatal: failed to load policy: {e}");
        std::process::exit(exit_codes::EXIT_CONFIG_ERROR);
    });

    let security = SecurityEngine::open(Arc::clone(&policy)).unwrap_or_else(|e| {
        eprintln!("fatal: failed to open audit log: {e}");
        std::process::exit(exit_codes::EXIT_CONFIG_ERROR);
    });

    let dispatcher = DispatcherBuilder::new()
        .register(Box::new(echo_tool::EchoTool))
        .build();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("fatal: failed to start async runtime: {e}");
            std::process::exit(exit_codes::EXIT_INFRA_ERROR);
        });

    let server = Server::new(
        dispatcher,
        security,
        ServerInfo {
            name: "warden".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        runtime.handle().clone(),
    );

    run(&server);
}

fn load_policy(path: Option<&std::path::Path>) -> Result<Arc<Policy>, warden_policy::PolicyLoadError> {
    let policy = match path {
        Some(path) => Policy::from_file(path)?,
        None => Policy::from_str("version: \"1\"\n").expect("built-in default policy is valid"),
    };
    Ok(Arc::new(policy))
}

fn run(server: &Server) {
    let rx = transport::spawn_stdin_reader();
    for line in rx {
        match line {
            Line::Data(bytes) => match server.handle(&bytes) {
                HandlerOutcome::Response(out) => transport::write_line(&out),
                HandlerOutcome::Notification | HandlerOutcome::None => {}
            },
            Line::Eof => {
                server.handle_eof();
                break;
            }
        }
    }
}
