use clap::Parser;
use logrelay::RelayError;
use logrelay::config::{Config, DEFAULT_CONFIG_FILE, SinkSelection};
use logrelay::oauth::BrowserLogin;
use logrelay::sink::{BulkIndexWriter, ConsoleWriter, LogWriter};
use logrelay::source::SourceClient;
use logrelay::sync::{StateFile, SyncEngine, SyncOptions};
use logrelay::utils::logging::{init_tracing, with_pretty_json_debug};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Relays app logs from the paginated logs API into a search index or stdout.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Print records to stdout instead of sending them anywhere else.
    #[arg(long)]
    console_output: bool,

    /// Where to save and restore the sync state.
    #[arg(long)]
    state_file: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if self.verbose {
            cfg.basic.loglevel = "debug".to_string();
        }
        if self.console_output {
            cfg.sink.console = true;
        }
        if let Some(path) = &self.state_file {
            cfg.basic.state_file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut cfg);
    init_tracing(&cfg.basic.loglevel);

    match run(cfg).await {
        Ok(()) => {
            info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Relay stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<(), RelayError> {
    cfg.validate()?;
    with_pretty_json_debug(&cfg.redacted(), |json| {
        debug!("Resolved configuration:\n{json}");
    });

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let state_file = cfg.basic.state_file.clone().map(StateFile::new);
    let saved_state = match &state_file {
        Some(file) => file.load().await?,
        None => None,
    };

    let interactive = BrowserLogin::from_config(&cfg.source);
    let source = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        client = SourceClient::connect(&cfg.source, saved_state.as_deref(), &interactive) => client?,
    };

    let writer: Box<dyn LogWriter> = match cfg.sink.selected() {
        Some(SinkSelection::Elasticsearch(es)) => {
            info!(index = %es.index, nodes = es.nodes.len(), "Writing to Elasticsearch");
            Box::new(BulkIndexWriter::new(es)?)
        }
        Some(SinkSelection::Console) | None => {
            info!("Writing to stdout");
            Box::new(ConsoleWriter::stdout())
        }
    };

    let mut engine = SyncEngine::new(
        source,
        writer,
        state_file,
        SyncOptions::from_config(&cfg.basic),
    );
    let result = engine.run(&cancel).await;

    let (_, mut writer) = engine.into_parts();
    match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Failed to flush sink on exit"),
        Err(_) => warn!("Timed out flushing sink on exit"),
    }

    result
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
    cancel.cancel();
}
