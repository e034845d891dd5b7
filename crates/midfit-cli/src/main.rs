use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use midfit_contracts::GenerationRequest;
use midfit_engine::{serve, GenerationProxy, ProxyConfig, ServerState};
use midfit_studio::transport::interpret_response;
use midfit_studio::{
    Generated, GenerationTransport, HttpTransport, SelectedFile, SlotIndex, WorkflowController,
    WorkflowStatus,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "midfit", version, about = "Virtual outfit try-on proxy and client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host the generation proxy over HTTP.
    Serve(ServeArgs),
    /// Compose a person photo with an outfit photo and write the result.
    TryOn(TryOnArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, env = "MIDFIT_BIND")]
    bind: Option<SocketAddr>,
    #[arg(long, env = "MIDFIT_MODEL")]
    model: Option<String>,
    #[arg(long, env = "MIDFIT_MAX_DURATION_SECS")]
    max_duration_secs: Option<u64>,
    #[arg(long, env = "MIDFIT_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,
    #[arg(long, env = "MIDFIT_EVENTS")]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct TryOnArgs {
    #[arg(long)]
    person: PathBuf,
    #[arg(long)]
    outfit: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// Base URL of a running `midfit serve`; without it the proxy runs in-process.
    #[arg(long, conflicts_with = "model")]
    server: Option<String>,
    /// Model for the in-process proxy; defaults to MIDFIT_MODEL.
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("midfit error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::TryOn(args) => run_try_on(args),
    }
}

fn serve_config(args: &ServeArgs) -> Result<ProxyConfig> {
    let mut config = ProxyConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(model) = args.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        config.model = model.to_string();
    }
    if let Some(secs) = args.max_duration_secs {
        config.max_duration = Duration::from_secs(secs.max(1));
    }
    if let Some(bytes) = args.max_body_bytes {
        config.max_body_bytes = bytes;
    }
    if let Some(events) = args.events.clone() {
        config.events_path = Some(events);
    }
    Ok(config)
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let config = serve_config(&args)?;
    // Built outside the runtime: providers hold blocking HTTP clients, and
    // the last handle must also be dropped outside it.
    let proxy = Arc::new(GenerationProxy::from_config(&config)?);
    let state = ServerState::new(Arc::clone(&proxy), config.max_duration)
        .with_max_body_bytes(config.max_body_bytes);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(serve(state, config.bind))?;
    drop(runtime);
    drop(proxy);
    Ok(0)
}

/// Runs the proxy in this process instead of over HTTP.
struct LocalTransport {
    proxy: GenerationProxy,
}

impl GenerationTransport for LocalTransport {
    fn send(&self, request: &GenerationRequest) -> Result<Generated> {
        let reply = self.proxy.handle(request);
        let body = serde_json::to_string(&reply.body).context("failed to encode proxy reply")?;
        interpret_response(reply.status, &body)
    }
}

fn local_transport(model: Option<&str>) -> Result<LocalTransport> {
    let mut config = ProxyConfig::from_env()?;
    if let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) {
        config.model = model.to_string();
    }
    Ok(LocalTransport {
        proxy: GenerationProxy::from_config(&config)?,
    })
}

fn run_try_on(args: TryOnArgs) -> Result<i32> {
    let timeout = Duration::from_secs(args.timeout_secs.max(1));
    let transport: Arc<dyn GenerationTransport> = match args.server.as_deref() {
        Some(server) => Arc::new(HttpTransport::new(server, timeout)),
        None => Arc::new(local_transport(args.model.as_deref())?),
    };
    try_on(transport, &args.person, &args.outfit, &args.out, timeout)
}

fn try_on(
    transport: Arc<dyn GenerationTransport>,
    person: &Path,
    outfit: &Path,
    out: &Path,
    timeout: Duration,
) -> Result<i32> {
    let mut controller = WorkflowController::new(transport);
    for (slot, path) in [(SlotIndex::Person, person), (SlotIndex::Outfit, outfit)] {
        let file = SelectedFile::read(path)?;
        controller
            .upload(slot.position(), file)
            .with_context(|| format!("{slot} image rejected"))?;
    }

    if let Some(token) = controller.generate() {
        info!(token, "waiting for generation");
    }
    match controller.wait(timeout) {
        WorkflowStatus::Succeeded { image, text } => {
            let bytes = image.decode()?;
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {}", out.display());
            if !text.trim().is_empty() {
                println!("{}", text.trim());
            }
            Ok(0)
        }
        WorkflowStatus::Failed { message } => {
            eprintln!("midfit: {message}");
            Ok(1)
        }
        WorkflowStatus::Generating { .. } => {
            eprintln!("midfit: no response after {}s", timeout.as_secs());
            Ok(1)
        }
        WorkflowStatus::Idle => bail!("generation did not start"),
    }
}
