//! LSP backend: document lifecycle, analysis, and the editor features.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::analysis::position::{ByteSpan, LineIndex};
use crate::analysis::table::{find_definition, variables_at_line, VariableDefinition};
use crate::analysis::{analyze, semantic, Analysis, Dialect};
use crate::lsp::diagnostics::{from_lsp_position, to_lsp_diagnostic, to_lsp_range};
use crate::registry::{RegistrySnapshot, SchemaSet, KEYWORDS};

/// Per-document state: the last analyzed source and its analysis.
#[derive(Debug)]
pub struct DocumentState {
    pub source: String,
    pub version: i32,
    pub analysis: Analysis,
}

/// The language server. Documents are re-analyzed whole on every change;
/// the registry snapshot is immutable and swapped as a unit when rebuilt.
pub struct FableLanguageServer {
    client: Client,
    documents: Arc<RwLock<HashMap<Url, DocumentState>>>,
    registry: RwLock<Arc<RegistrySnapshot>>,
    root: RwLock<Option<PathBuf>>,
}

impl FableLanguageServer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(HashMap::new())),
            registry: RwLock::new(Arc::new(RegistrySnapshot::with_defaults())),
            root: RwLock::new(None),
        }
    }

    /// Build a fresh snapshot from the workspace: schema files from a
    /// `schemas/` directory plus the project skill scan, on top of the
    /// embedded catalog. Swapped whole so in-flight analyses keep their
    /// consistent old snapshot.
    async fn rebuild_registry(&self) {
        let root = self.root.read().await.clone();
        let Some(root) = root else { return };

        let schemas = SchemaSet::load(&root.join("schemas"));
        let snapshot = schemas.snapshot(Some(&root));
        let skills = snapshot.skill_count();
        *self.registry.write().await = Arc::new(snapshot);

        self.client
            .log_message(MessageType::INFO, format!("skill index built: {skills} skills"))
            .await;
    }

    async fn analyze_document(&self, uri: &Url, source: &str, version: i32) {
        let registry = self.registry.read().await.clone();
        let path = document_path(uri);
        let dialect = Dialect::from_path(&path);
        let skill_params = enclosing_skill_params(&registry, &path);

        let analysis = analyze(source, &registry, dialect, &skill_params);
        let diagnostics = analysis.diagnostics.iter().map(to_lsp_diagnostic).collect();

        {
            let mut docs = self.documents.write().await;
            docs.insert(
                uri.clone(),
                DocumentState { source: source.to_string(), version, analysis },
            );
        }

        self.client
            .publish_diagnostics(uri.clone(), diagnostics, Some(version))
            .await;
    }
}

/// Filesystem path of a document, falling back to the raw URI path for
/// untitled buffers.
fn document_path(uri: &Url) -> PathBuf {
    uri.to_file_path().unwrap_or_else(|_| PathBuf::from(uri.path()))
}

/// Declared parameters of the skill this document implements, when the
/// registry knows the file by its stem.
fn enclosing_skill_params(registry: &RegistrySnapshot, path: &Path) -> Vec<String> {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    registry
        .resolve_skill(stem)
        .map(|skill| skill.parameters.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_default()
}

/// Identifier under the cursor, with its byte span.
fn word_at(
    text: &str,
    lines: &LineIndex,
    pos: crate::analysis::position::Position,
) -> Option<(String, ByteSpan)> {
    let line_start = lines.line_start(pos.line)?;
    let offset = (line_start + pos.column as usize - 1).min(text.len());
    let bytes = text.as_bytes();

    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut start = offset;
    while start > 0 && is_word(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = offset;
    while end < bytes.len() && is_word(bytes[end]) {
        end += 1;
    }
    if start == end || bytes[start].is_ascii_digit() {
        return None;
    }
    Some((text[start..end].to_string(), ByteSpan::new(start, end)))
}

fn variable_hover(def: &VariableDefinition) -> String {
    let mut text = format!(
        "```fable\n{}: {}\n```\n*{}*, line {}",
        def.name,
        def.inferred_type.describe(),
        def.source.describe(),
        def.line
    );
    if !def.literal_values.is_empty() {
        let values: Vec<String> =
            def.literal_values.iter().map(|v| format!("\"{v}\"")).collect();
        text.push_str(&format!("\n\nValues: {}", values.join(" | ")));
    }
    match def.scope_end_line {
        None => text.push_str("\n\nScope: whole file"),
        Some(end) => text.push_str(&format!("\n\nScope: lines {} to {}", def.line, end)),
    }
    text
}

fn semantic_legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: semantic::TOKEN_TYPES
            .iter()
            .copied()
            .map(SemanticTokenType::new)
            .collect(),
        token_modifiers: semantic::TOKEN_MODIFIERS
            .iter()
            .copied()
            .map(SemanticTokenModifier::new)
            .collect(),
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for FableLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let root = params.root_uri.and_then(|uri| uri.to_file_path().ok());
        *self.root.write().await = root;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), "(".to_string()]),
                    ..Default::default()
                }),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: semantic_legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: None,
                            work_done_progress_options: Default::default(),
                        },
                    ),
                ),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "fable-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.rebuild_registry().await;
        self.client
            .log_message(MessageType::INFO, "fable LSP initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.analyze_document(&uri, &params.text_document.text, params.text_document.version)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        // FULL sync: one change carrying the whole document.
        if let Some(change) = params.content_changes.into_iter().next() {
            self.analyze_document(&uri, &change.text, version).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.remove(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let pos = from_lsp_position(params.text_document_position_params.position);

        let docs = self.documents.read().await;
        let Some(doc) = docs.get(uri) else { return Ok(None) };
        let Some((word, span)) = word_at(&doc.source, &doc.analysis.doc.lines, pos) else {
            return Ok(None);
        };

        let registry = self.registry.read().await.clone();
        let markdown = if let Some(action) = registry.builtin(&word) {
            let mut text = format!("```fable\n{}\n```\n{}", action.syntax, action.doc);
            if !action.required_params.is_empty() {
                text.push_str(&format!(
                    "\n\nRequired: {}",
                    action.required_params.join(", ")
                ));
            }
            text
        } else if let Some(def) = find_definition(&doc.analysis.table, &word, pos.line) {
            variable_hover(def)
        } else {
            return Ok(None);
        };

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: markdown,
            }),
            range: Some(to_lsp_range(doc.analysis.doc.lines.range(span))),
        }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let pos = from_lsp_position(params.text_document_position_params.position);

        let docs = self.documents.read().await;
        let Some(doc) = docs.get(uri) else { return Ok(None) };
        let Some((word, _)) = word_at(&doc.source, &doc.analysis.doc.lines, pos) else {
            return Ok(None);
        };
        let Some(def) = find_definition(&doc.analysis.table, &word, pos.line) else {
            return Ok(None);
        };

        let start = Position::new(def.line - 1, def.column - 1);
        let end = Position::new(def.line - 1, def.column - 1 + def.name.len() as u32);
        Ok(Some(GotoDefinitionResponse::Scalar(Location {
            uri: uri.clone(),
            range: Range::new(start, end),
        })))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let pos = from_lsp_position(params.text_document_position.position);

        let docs = self.documents.read().await;
        let Some(doc) = docs.get(uri) else { return Ok(None) };
        let registry = self.registry.read().await.clone();

        let mut items = Vec::new();

        for keyword in KEYWORDS.iter() {
            items.push(CompletionItem {
                label: (*keyword).to_string(),
                kind: Some(CompletionItemKind::KEYWORD),
                ..Default::default()
            });
        }

        for action in registry.builtins() {
            items.push(CompletionItem {
                label: action.name.clone(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some(action.syntax.clone()),
                ..Default::default()
            });
        }

        for name in registry.skill_names() {
            items.push(CompletionItem {
                label: name.to_string(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some("skill".to_string()),
                ..Default::default()
            });
        }

        for def in variables_at_line(&doc.analysis.table, pos.line) {
            items.push(CompletionItem {
                label: def.name.clone(),
                kind: Some(CompletionItemKind::VARIABLE),
                detail: Some(format!("{} ({})", def.inferred_type.describe(), def.source.describe())),
                ..Default::default()
            });
        }

        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = &params.text_document.uri;

        let docs = self.documents.read().await;
        let Some(doc) = docs.get(uri) else { return Ok(None) };
        let registry = self.registry.read().await.clone();

        let tokens = semantic::classify(&doc.analysis.doc, &doc.analysis.table, &registry);
        let data = semantic::encode(&tokens)
            .chunks(5)
            .map(|c| SemanticToken {
                delta_line: c[0],
                delta_start: c[1],
                length: c[2],
                token_type: c[3],
                token_modifiers_bitset: c[4],
            })
            .collect();

        Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
            result_id: None,
            data,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::position::Position as CorePosition;

    #[test]
    fn word_at_cursor_positions() {
        let text = "{{ greeting }}\n{% set x = 1 %}";
        let lines = LineIndex::new(text);
        let (word, span) = word_at(text, &lines, CorePosition::new(1, 5)).unwrap();
        assert_eq!(word, "greeting");
        assert_eq!(span, ByteSpan::new(3, 11));
        // Cursor at the end of the word still matches it.
        let (word, _) = word_at(text, &lines, CorePosition::new(1, 12)).unwrap();
        assert_eq!(word, "greeting");
        assert!(word_at(text, &lines, CorePosition::new(1, 1)).is_none());
    }

    #[test]
    fn skill_params_resolved_by_file_stem() {
        use crate::registry::{SkillInfo, SkillParam, SkillRunner};
        let mut registry = RegistrySnapshot::with_defaults();
        registry.add_skill(SkillInfo {
            name: "GreetSkill".into(),
            parameters: vec![SkillParam { name: "tone".into(), required: true }],
            path: None,
            runner: SkillRunner::Jinja,
        });
        let params =
            enclosing_skill_params(&registry, Path::new("/flows/main/GreetSkill/GreetSkill.jinja"));
        assert_eq!(params, vec!["tone"]);
        assert!(enclosing_skill_params(&registry, Path::new("/tmp/Other.jinja")).is_empty());
    }

    #[test]
    fn legend_matches_vocabularies() {
        let legend = semantic_legend();
        assert_eq!(legend.token_types.len(), semantic::TOKEN_TYPES.len());
        assert_eq!(legend.token_modifiers.len(), semantic::TOKEN_MODIFIERS.len());
    }
}
