//! Find references: case-insensitive identifier matches across the cache.

use tower_lsp::lsp_types::{Location, Position, Url};

use gscls_language::token::TokenKind;

use crate::manager::ScriptManager;
use crate::script::Script;

pub async fn find_references(
    manager: &ScriptManager,
    script: &Script,
    position: Position,
    include_declaration: bool,
) -> Vec<Location> {
    let offset = script.line_index.offset(position);
    let Some(target) = script
        .tokens
        .iter()
        .find(|t| t.span.contains(offset) && t.kind == TokenKind::Identifier)
    else {
        return Vec::new();
    };
    let needle = script.interner.resolve(target.lexeme).to_ascii_lowercase();

    // Function and class names are visible workspace-wide; anything else
    // (locals, parameters) only within the current file.
    let cross_file = script.merged_defs.function_any_namespace(&needle).is_some()
        || script.defs.function_any_namespace(&needle).is_some()
        || script.defs.class(&needle).is_some();

    let mut locations = Vec::new();
    if cross_file {
        for (uri, other) in manager.scripts() {
            // The caller holds a read lock on the current document already.
            if uri == script.uri {
                collect_in_script(script, &uri, &needle, include_declaration, &mut locations);
                continue;
            }
            let guard = other.read().await;
            collect_in_script(&guard, &uri, &needle, include_declaration, &mut locations);
        }
    } else {
        collect_in_script(
            script,
            &script.uri,
            &needle,
            include_declaration,
            &mut locations,
        );
    }
    locations
}

fn collect_in_script(
    script: &Script,
    uri: &Url,
    needle: &str,
    include_declaration: bool,
    out: &mut Vec<Location>,
) {
    for token in &script.tokens {
        if token.kind != TokenKind::Identifier {
            continue;
        }
        if !script
            .interner
            .resolve(token.lexeme)
            .eq_ignore_ascii_case(needle)
        {
            continue;
        }
        if !include_declaration {
            let is_declaration = script
                .senses
                .get(token.span)
                .map(|s| s.declaration)
                .unwrap_or(false);
            if is_declaration {
                continue;
            }
        }
        out.push(Location {
            uri: uri.clone(),
            range: script.line_index.range(token.span),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ScriptManager;
    use gscls_language::LanguageId;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn open(manager: &Arc<ScriptManager>, uri: &str, source: &str) -> Url {
        let uri = Url::parse(uri).unwrap();
        manager
            .add_editor(
                uri.clone(),
                LanguageId::Gsc,
                source.to_string(),
                1,
                CancellationToken::new(),
            )
            .await;
        uri
    }

    #[tokio::test]
    async fn references_include_all_call_sites() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let uri = open(
            &manager,
            "file:///r.gsc",
            "#namespace r;\nfunction target() {}\nfunction f() { target(); target(); }\n",
        )
        .await;

        let script = manager.get(&uri).unwrap();
        let guard = script.read().await;
        let offset = guard.source.find("target()").unwrap();
        let position = guard.line_index.position(offset + 2);

        let with_decl = find_references(&manager, &guard, position, true).await;
        assert_eq!(with_decl.len(), 3);

        let without_decl = find_references(&manager, &guard, position, false).await;
        assert_eq!(without_decl.len(), 2, "declaration excluded");
    }

    #[tokio::test]
    async fn local_variable_references_stay_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let uri = open(
            &manager,
            "file:///a.gsc",
            "#namespace a;\nfunction f() { count = 1; count = count + 1; }\n",
        )
        .await;
        // A second file with the same local name must not leak in.
        open(
            &manager,
            "file:///b.gsc",
            "#namespace b;\nfunction g() { count = 9; }\n",
        )
        .await;

        let script = manager.get(&uri).unwrap();
        let guard = script.read().await;
        let offset = guard.source.find("count").unwrap();
        let position = guard.line_index.position(offset + 1);
        let refs = find_references(&manager, &guard, position, true).await;
        assert_eq!(refs.len(), 3);
        assert!(refs.iter().all(|l| l.uri.as_str() == "file:///a.gsc"));
    }

    #[tokio::test]
    async fn matching_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let uri = open(
            &manager,
            "file:///c.gsc",
            "#namespace c;\nfunction Helper() {}\nfunction f() { HELPER(); helper(); }\n",
        )
        .await;
        let script = manager.get(&uri).unwrap();
        let guard = script.read().await;
        let offset = guard.source.find("HELPER").unwrap();
        let position = guard.line_index.position(offset + 1);
        let refs = find_references(&manager, &guard, position, true).await;
        assert_eq!(refs.len(), 3);
    }
}
