use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_lsp::{LspService, Server};

use gscls_language::api::{self, ApiStore};
use gscls_language::LanguageId;
use gscls_lsp::manager::ScriptManager;
use gscls_lsp::server::GscServer;

/// Language server for GSC/CSC game scripts.
#[derive(Parser, Debug)]
#[command(name = "gscls", version, about)]
struct Args {
    /// Communicate over stdio (the default transport).
    #[arg(long)]
    stdio: bool,

    /// Communicate over a named pipe (unix socket) at the given path.
    #[arg(long, conflicts_with = "stdio")]
    pipe: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,

    /// Directory holding shared scripts referenced by `#using`.
    #[arg(long)]
    shared_scripts: Option<PathBuf>,

    /// Directory with the per-language API JSON libraries
    /// (`gsc.json` / `csc.json`).
    #[arg(long)]
    api_dir: Option<PathBuf>,

    /// Base URL of the API feed; tried before the local files.
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.debug { "debug" } else { "info" }),
    )
    .init();

    load_api_libraries(&args).await;

    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let manager = Arc::new(ScriptManager::new(root));
    manager.set_shared_scripts(args.shared_scripts.clone());

    let (service, socket) = LspService::new({
        let manager = Arc::clone(&manager);
        move |client| GscServer::new(client, Arc::clone(&manager))
    });

    match args.pipe {
        Some(path) => serve_pipe(path, service, socket).await,
        None => {
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();
            Server::new(stdin, stdout, socket).serve(service).await;
        }
    }
}

#[cfg(unix)]
async fn serve_pipe(
    path: PathBuf,
    service: LspService<GscServer>,
    socket: tower_lsp::ClientSocket,
) {
    let listener = match tokio::net::UnixListener::bind(&path) {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("failed to bind pipe {}: {err}", path.display());
            std::process::exit(1);
        }
    };
    log::info!("listening on pipe {}", path.display());
    match listener.accept().await {
        Ok((stream, _)) => {
            let (read, write) = tokio::io::split(stream);
            Server::new(read, write, socket).serve(service).await;
        }
        Err(err) => {
            log::error!("pipe accept failed: {err}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(unix))]
async fn serve_pipe(
    path: PathBuf,
    _service: LspService<GscServer>,
    _socket: tower_lsp::ClientSocket,
) {
    log::error!(
        "named pipe transport is not supported on this platform: {}",
        path.display()
    );
    std::process::exit(1);
}

/// Loads both language libraries into the process-wide store. A configured
/// source that fails to load aborts startup; no configured source at all
/// just leaves the built-in table empty.
async fn load_api_libraries(args: &Args) {
    let mut store = ApiStore::new();
    for language in [LanguageId::Gsc, LanguageId::Csc] {
        let file = args
            .api_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", language.as_str())));
        let url = args
            .api_url
            .as_ref()
            .map(|base| format!("{}/{}.json", base.trim_end_matches('/'), language.as_str()));
        let Some(file) = file else {
            if url.is_none() {
                log::warn!("no api source configured for {}", language.as_str());
            }
            continue;
        };
        match api::load_library(url.as_deref(), &file).await {
            Ok(library) => store.install(library),
            Err(err) => {
                log::error!("failed to load {} api library: {err}", language.as_str());
                std::process::exit(1);
            }
        }
    }
    api::install_global(store);
}
