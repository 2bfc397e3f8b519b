//! Go-to-definition.
//!
//! Senses carry their definition location when the signature or data-flow
//! pass resolved one; otherwise the identifier under the cursor is looked
//! up across every cached script's definitions table, preferring the
//! namespace qualifier written at the use site.

use tower_lsp::lsp_types::{GotoDefinitionResponse, Location, Position, Url};

use gscls_language::token::TokenKind;

use crate::manager::ScriptManager;
use crate::script::Script;

pub async fn goto_definition(
    manager: &ScriptManager,
    script: &Script,
    position: Position,
) -> Option<GotoDefinitionResponse> {
    let offset = script.line_index.offset(position);

    // Fast path: the analysis already attached a definition.
    if let Some(sense) = script.senses.at(offset) {
        if let Some((uri, span)) = &sense.definition {
            let location = resolve_location(manager, script, uri, *span).await?;
            return Some(GotoDefinitionResponse::Scalar(location));
        }
    }

    // Fallback: resolve the identifier text across the workspace cache.
    let token = script
        .tokens
        .iter()
        .find(|t| t.span.contains(offset) && t.kind == TokenKind::Identifier)?;
    let name = script.interner.resolve(token.lexeme).to_string();
    let namespace = namespace_qualifier(script, token.span.start);

    // This document's merged table already knows everything it imports.
    let lower = name.to_ascii_lowercase();
    let local_hit = match &namespace {
        Some(ns) => script.merged_defs.function(ns, &lower),
        None => script
            .merged_defs
            .function(&script.merged_defs.namespace, &lower)
            .or_else(|| script.merged_defs.function_any_namespace(&lower)),
    }
    .map(|f| f.location.clone())
    .or_else(|| script.merged_defs.class(&lower).map(|c| c.location.clone()));
    if let Some(location) = local_hit {
        let resolved = resolve_location(manager, script, &location.uri, location.span).await?;
        return Some(GotoDefinitionResponse::Scalar(resolved));
    }

    // Workspace-wide scan; the current document is excluded because its
    // read lock is already held by the caller.
    let (uri, span) = manager
        .find_symbol_location_excluding(namespace.as_deref(), &name, Some(&script.uri))
        .await?;
    let target = manager.get(&uri)?;
    let guard = target.read().await;
    let range = guard.line_index.range(span);
    Some(GotoDefinitionResponse::Scalar(Location { uri, range }))
}

async fn resolve_location(
    manager: &ScriptManager,
    current: &Script,
    uri: &str,
    span: gscls_base::Span,
) -> Option<Location> {
    let uri = Url::parse(uri).ok()?;
    let range = if uri == current.uri {
        current.line_index.range(span)
    } else {
        let script = manager.get(&uri)?;
        let guard = script.read().await;
        guard.line_index.range(span)
    };
    Some(Location { uri, range })
}

/// If the identifier is preceded by `ns::`, returns `ns`.
fn namespace_qualifier(script: &Script, identifier_start: usize) -> Option<String> {
    let mut significant = script
        .tokens
        .iter()
        .filter(|t| !t.kind.is_trivia())
        .collect::<Vec<_>>();
    significant.retain(|t| t.span.end <= identifier_start);
    let mut rev = significant.iter().rev();
    let scope = rev.next()?;
    if scope.kind != TokenKind::ScopeResolution {
        return None;
    }
    let ns = rev.next()?;
    if ns.kind == TokenKind::Identifier {
        Some(script.interner.resolve(ns.lexeme).to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ScriptManager;
    use gscls_language::LanguageId;
    use std::fs;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn cross_file_goto_definition_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("lib.gsc"), "#namespace lib;\nfunction helper() {}\n").unwrap();
        let a_path = dir.path().join("a.gsc");
        let a_source = "#using scripts\\lib;\n#namespace a;\nfunction f() { lib::helper(); }\n";
        fs::write(&a_path, a_source).unwrap();

        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let a_uri = Url::from_file_path(&a_path).unwrap();
        manager
            .add_editor(
                a_uri.clone(),
                LanguageId::Gsc,
                a_source.to_string(),
                1,
                CancellationToken::new(),
            )
            .await;

        let script = manager.get(&a_uri).unwrap();
        let guard = script.read().await;
        let offset = guard.source.find("helper()").unwrap();
        let position = guard.line_index.position(offset + 1);

        let response = goto_definition(&manager, &guard, position)
            .await
            .expect("definition should resolve");
        match response {
            GotoDefinitionResponse::Scalar(location) => {
                assert!(location.uri.as_str().ends_with("lib.gsc"));
                assert_eq!(location.range.start.line, 1, "helper is on line 1 of lib");
            }
            other => panic!("expected scalar response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_function_definition_resolves_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let uri = Url::parse("file:///mem.gsc").unwrap();
        let source = "#namespace m;\nfunction target() {}\nfunction f() { target(); }\n";
        manager
            .add_editor(
                uri.clone(),
                LanguageId::Gsc,
                source.to_string(),
                1,
                CancellationToken::new(),
            )
            .await;
        let script = manager.get(&uri).unwrap();
        let guard = script.read().await;
        let offset = guard.source.find("target();").unwrap();
        let position = guard.line_index.position(offset + 1);
        let response = goto_definition(&manager, &guard, position).await;
        assert!(response.is_some(), "local call should resolve to its definition");
    }
}
