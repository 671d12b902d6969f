//! Fable language server binary entry point
//!
//! Run with: fable-lsp
//!
//! The LSP communicates via stdin/stdout using the Language Server Protocol;
//! logging goes to stderr so it never corrupts the protocol stream.

use fable::lsp::FableLanguageServer;
use tower_lsp::{LspService, Server};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(FableLanguageServer::new);

    Server::new(stdin, stdout, socket).serve(service).await;
}
