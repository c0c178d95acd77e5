//! Editor-facing language server.
//!
//! Only the document lifecycle notifications are handled. Each one is turned
//! into a [`DocumentSnapshot`] and handed to the [`RelayManager`], which
//! publishes diagnostics back through the same [`Client`].

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, InitializeParams, InitializeResult, InitializedParams, MessageType,
    ServerInfo,
};
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::capabilities::server_capabilities;
use crate::clock::SystemClock;
use crate::documents::DocumentStore;
use crate::invoker::ProcessAnalyzer;
use crate::manager::RelayManager;
use crate::types::RelaySettings;

pub const SERVER_NAME: &str = "helix-diag";

type ClientRelay = RelayManager<ProcessAnalyzer, SystemClock, Client>;

pub struct HelixLanguageServer {
    client: Client,
    documents: Arc<RwLock<DocumentStore>>,
    relay: ClientRelay,
    analyzer: ProcessAnalyzer,
}

impl HelixLanguageServer {
    #[must_use]
    pub fn new(client: Client, settings: &RelaySettings) -> Self {
        let analyzer = ProcessAnalyzer::new(settings);
        Self {
            relay: RelayManager::new(
                analyzer.clone(),
                SystemClock,
                client.clone(),
                settings.debounce,
            ),
            client,
            documents: Arc::new(RwLock::new(DocumentStore::new())),
            analyzer,
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for HelixLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(info) = params.client_info {
            tracing::info!(
                client = %info.name,
                version = info.version.as_deref().unwrap_or("unknown"),
                "Editor connected"
            );
        }
        Ok(InitializeResult {
            capabilities: server_capabilities(),
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        match self.analyzer.resolve_binary() {
            Ok(binary) => {
                tracing::info!(analyzer = %binary.display(), "Relay ready");
                self.client
                    .log_message(
                        MessageType::INFO,
                        format!("helix-diag ready (analyzer: {})", binary.display()),
                    )
                    .await;
            }
            Err(e) => {
                // Not fatal: the binary may appear later, and every pass
                // re-resolves it.
                tracing::warn!("{e}");
                self.client
                    .log_message(MessageType::WARNING, format!("helix-diag: {e}"))
                    .await;
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutdown requested");
        self.relay.shutdown();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        let snapshot = {
            let mut documents = self.documents.write().await;
            documents.open(doc.uri.as_str(), doc.text, doc.version)
        };
        tracing::debug!(document = %snapshot, "didOpen");
        self.relay.on_open(snapshot);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // Full sync: the last change carries the whole text.
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let snapshot = {
            let mut documents = self.documents.write().await;
            documents.change(uri.as_str(), change.text, version)
        };
        if let Some(snapshot) = snapshot {
            self.relay.on_change(snapshot);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let snapshot = self.documents.read().await.snapshot(uri.as_str());
        match snapshot {
            Some(snapshot) => {
                self.relay.on_save(snapshot);
            }
            None => tracing::debug!(uri = %uri, "didSave for a document that is not open"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.close(uri.as_str());
        self.relay.on_close(uri.as_str()).await;
    }
}

/// Serve one editor session over the given byte streams.
pub async fn serve<I, O>(input: I, output: O, settings: RelaySettings)
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (service, socket) =
        LspService::new(move |client| HelixLanguageServer::new(client, &settings));
    Server::new(input, output, socket).serve(service).await;
    tracing::info!("Editor session ended");
}

/// Serve over the process's stdin/stdout.
pub async fn run_stdio(settings: RelaySettings) {
    serve(tokio::io::stdin(), tokio::io::stdout(), settings).await;
}
