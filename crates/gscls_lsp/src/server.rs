//! The tower-lsp server: request fan-out over the script manager.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use gscls_language::LanguageId;

use crate::manager::ScriptManager;
use crate::{
    completion, definition, diagnostics, document_symbols, folding, hover, references,
    semantic_tokens, signature_help,
};

pub struct GscServer {
    client: Client,
    manager: Arc<ScriptManager>,
    /// Parent token for workspace indexing; cancelled on shutdown.
    lifetime: CancellationToken,
}

impl GscServer {
    pub fn new(client: Client, manager: Arc<ScriptManager>) -> Self {
        GscServer {
            client,
            manager,
            lifetime: CancellationToken::new(),
        }
    }

    /// Publishes a single consistent revision: diagnostics, line index and
    /// version all snapshotted under one read lock.
    async fn publish_diagnostics(&self, uri: &Url) {
        let Some(script) = self.manager.get(uri) else {
            return;
        };
        let (converted, version) = {
            let guard = script.read().await;
            (
                diagnostics::convert(&guard.diagnostics, &guard.line_index),
                guard.revision,
            )
        };
        self.client
            .publish_diagnostics(uri.clone(), converted, Some(version))
            .await;
    }

    fn language_of(document: &TextDocumentItem) -> LanguageId {
        LanguageId::from_id(&document.language_id)
            .or_else(|| {
                std::path::Path::new(document.uri.path())
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(LanguageId::from_extension)
            })
            .unwrap_or(LanguageId::Gsc)
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for GscServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        if let Some(root) = params.root_uri.as_ref().and_then(|u| u.to_file_path().ok()) {
            self.manager.set_root(root);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: semantic_tokens::legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: None,
                            ..Default::default()
                        },
                    ),
                ),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![":".to_string(), ".".to_string()]),
                    ..Default::default()
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "gscls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("gscls initialized");
        // Index the workspace in the background; editor requests contend on
        // the same per-URI locks, so neither publishes stale diagnostics.
        let manager = Arc::clone(&self.manager);
        let client = self.client.clone();
        let token = self.lifetime.child_token();
        tokio::spawn(async move {
            let root = manager.root();
            let published = Arc::clone(&manager).index_workspace(root, token).await;
            for (uri, diags) in published {
                let Some(script) = manager.get(&uri) else {
                    continue;
                };
                let converted = {
                    let guard = script.read().await;
                    diagnostics::convert(&diags, &guard.line_index)
                };
                client.publish_diagnostics(uri, converted, None).await;
            }
        });
    }

    async fn shutdown(&self) -> Result<()> {
        self.lifetime.cancel();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let language = Self::language_of(&params.text_document);
        self.manager
            .add_editor(
                uri.clone(),
                language,
                params.text_document.text,
                params.text_document.version,
                self.lifetime.child_token(),
            )
            .await;
        self.publish_diagnostics(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        self.manager
            .update_editor(
                &uri,
                &params.content_changes,
                params.text_document.version,
                self.lifetime.child_token(),
            )
            .await;
        self.publish_diagnostics(&uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.manager.remove_editor(&params.text_document.uri).await;
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let Some(script) = self.manager.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        let data = semantic_tokens::encode(&guard, &guard.line_index);
        Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
            result_id: None,
            data,
        })))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position_params = params.text_document_position_params;
        let Some(script) = self.manager.get(&position_params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        Ok(hover::hover(&guard, position_params.position))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position_params = params.text_document_position;
        let Some(script) = self.manager.get(&position_params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        Ok(completion::completions(&guard, position_params.position))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let position_params = params.text_document_position_params;
        let Some(script) = self.manager.get(&position_params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        Ok(signature_help::signature_help(&guard, position_params.position))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position_params = params.text_document_position_params;
        let Some(script) = self.manager.get(&position_params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        Ok(definition::goto_definition(&self.manager, &guard, position_params.position).await)
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let position_params = params.text_document_position;
        let Some(script) = self.manager.get(&position_params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        let locations = references::find_references(
            &self.manager,
            &guard,
            position_params.position,
            params.context.include_declaration,
        )
        .await;
        Ok((!locations.is_empty()).then_some(locations))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let Some(script) = self.manager.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        let symbols = document_symbols::document_symbols(&guard);
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        let Some(script) = self.manager.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let guard = script.read().await;
        let ranges = folding::folding_ranges(&guard);
        Ok((!ranges.is_empty()).then_some(ranges))
    }
}
