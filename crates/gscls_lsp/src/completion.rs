//! Context-aware completion: keywords, script symbols, macros, built-ins.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, Documentation, MarkupContent,
    MarkupKind, Position,
};

use gscls_language::api;
use gscls_language::token::TokenKind;

use crate::script::Script;

const KEYWORDS: &[&str] = &[
    "function", "class", "if", "else", "while", "do", "for", "foreach", "in", "switch", "case",
    "default", "break", "continue", "return", "thread", "new", "const", "private", "autoexec",
    "constructor", "destructor", "var", "true", "false", "undefined", "wait", "waittill",
    "waittillmatch", "waittillframeend", "waitrealtime", "self", "level", "game", "anim",
];

pub fn completions(script: &Script, position: Position) -> Option<CompletionResponse> {
    let offset = script.line_index.offset(position);
    let mut items = Vec::new();

    // After `ns::` only that namespace's functions make sense.
    if let Some(namespace) = namespace_before(script, offset) {
        let ns = namespace.to_ascii_lowercase();
        if ns == "sys" {
            if let Some(store) = api::global() {
                for function in store.functions(script.language) {
                    items.push(api_item(function));
                }
            }
        } else {
            for entry in script.merged_defs.functions.values() {
                if entry.namespace == ns {
                    items.push(function_item(
                        &entry.display_name,
                        entry.doc.clone(),
                        &entry.params,
                    ));
                }
            }
        }
        if items.is_empty() {
            return None;
        }
        return Some(CompletionResponse::Array(items));
    }

    for keyword in KEYWORDS {
        items.push(CompletionItem {
            label: (*keyword).to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            ..Default::default()
        });
    }

    let mut seen_functions = std::collections::HashSet::new();
    for entry in script.merged_defs.functions.values() {
        if seen_functions.insert(entry.name.clone()) {
            items.push(function_item(
                &entry.display_name,
                entry.doc.clone(),
                &entry.params,
            ));
        }
    }
    for entry in script.merged_defs.classes.values() {
        items.push(CompletionItem {
            label: entry.display_name.clone(),
            kind: Some(CompletionItemKind::CLASS),
            ..Default::default()
        });
    }
    for outline in &script.macro_outlines {
        items.push(CompletionItem {
            label: outline.name.clone(),
            kind: Some(CompletionItemKind::CONSTANT),
            detail: Some("macro".to_string()),
            ..Default::default()
        });
    }
    if let Some(store) = api::global() {
        for function in store.functions(script.language) {
            items.push(api_item(function));
        }
    }

    Some(CompletionResponse::Array(items))
}

fn function_item(name: &str, doc: Option<String>, params: &[String]) -> CompletionItem {
    CompletionItem {
        label: name.to_string(),
        kind: Some(CompletionItemKind::FUNCTION),
        detail: Some(format!("function {}({})", name, params.join(", "))),
        documentation: doc.map(|value| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            })
        }),
        ..Default::default()
    }
}

fn api_item(function: &gscls_language::api::ScrFunction) -> CompletionItem {
    CompletionItem {
        label: function.name.clone(),
        kind: Some(CompletionItemKind::FUNCTION),
        detail: Some("built-in".to_string()),
        documentation: Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: function.to_markdown(),
        })),
        ..Default::default()
    }
}

/// The namespace written immediately before the cursor as `ns::`.
fn namespace_before(script: &Script, offset: usize) -> Option<String> {
    let significant: Vec<_> = script
        .tokens
        .iter()
        .filter(|t| !t.kind.is_trivia() && t.span.end <= offset)
        .collect();
    let mut rev = significant.iter().rev();
    let mut last = *rev.next()?;
    // Cursor may sit in the middle of the identifier being typed.
    if last.kind == TokenKind::Identifier {
        last = *rev.next()?;
    }
    if last.kind != TokenKind::ScopeResolution {
        return None;
    }
    let ns = rev.next()?;
    (ns.kind == TokenKind::Identifier)
        .then(|| script.interner.resolve(ns.lexeme).to_string())
}
