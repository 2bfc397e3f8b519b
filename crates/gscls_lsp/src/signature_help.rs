//! Signature help for the call under the cursor.
//!
//! Walks the raw token stream backwards from the cursor to the innermost
//! unclosed `(`, counting top-level commas for the active parameter, then
//! resolves the callee through the script's merged definitions and the
//! built-in API.

use tower_lsp::lsp_types::{
    Documentation, MarkupContent, MarkupKind, ParameterInformation, ParameterLabel, Position,
    SignatureHelp, SignatureInformation,
};

use gscls_language::api;
use gscls_language::token::TokenKind;

use crate::script::Script;

pub fn signature_help(script: &Script, position: Position) -> Option<SignatureHelp> {
    let offset = script.line_index.offset(position);
    let (callee, namespace, active_parameter) = enclosing_call(script, offset)?;

    // Script-defined functions first, built-ins second.
    let entry = match &namespace {
        Some(ns) => script.merged_defs.function(ns, &callee),
        None => script
            .merged_defs
            .function(&script.merged_defs.namespace, &callee)
            .or_else(|| script.merged_defs.function_any_namespace(&callee)),
    };
    if let Some(entry) = entry {
        let label = format!(
            "{}({})",
            entry.display_name,
            entry.params.join(", ")
        );
        let parameters: Vec<ParameterInformation> = entry
            .params
            .iter()
            .map(|p| ParameterInformation {
                label: ParameterLabel::Simple(p.clone()),
                documentation: None,
            })
            .collect();
        return Some(SignatureHelp {
            signatures: vec![SignatureInformation {
                label,
                documentation: entry.doc.clone().map(|value| {
                    Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value,
                    })
                }),
                parameters: Some(parameters),
                active_parameter: Some(active_parameter),
            }],
            active_signature: Some(0),
            active_parameter: Some(active_parameter),
        });
    }

    let function = api::global()?.function(script.language, &callee)?;
    let signatures: Vec<SignatureInformation> = function
        .overloads
        .iter()
        .map(|overload| {
            let params: Vec<String> = overload
                .parameters
                .iter()
                .map(|p| {
                    if p.mandatory {
                        format!("<{}>", p.name)
                    } else {
                        format!("[{}]", p.name)
                    }
                })
                .collect();
            SignatureInformation {
                label: format!("{}({})", function.name, params.join(", ")),
                documentation: function.description.clone().map(|value| {
                    Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value,
                    })
                }),
                parameters: Some(
                    overload
                        .parameters
                        .iter()
                        .map(|p| ParameterInformation {
                            label: ParameterLabel::Simple(p.name.clone()),
                            documentation: p.description.clone().map(|value| {
                                Documentation::MarkupContent(MarkupContent {
                                    kind: MarkupKind::Markdown,
                                    value,
                                })
                            }),
                        })
                        .collect(),
                ),
                active_parameter: Some(active_parameter),
            }
        })
        .collect();
    if signatures.is_empty() {
        return None;
    }
    Some(SignatureHelp {
        signatures,
        active_signature: Some(0),
        active_parameter: Some(active_parameter),
    })
}

/// Finds the innermost unclosed `(` before `offset` and its callee name.
/// Returns `(name, namespace, active_parameter)`.
fn enclosing_call(script: &Script, offset: usize) -> Option<(String, Option<String>, u32)> {
    let significant: Vec<_> = script
        .tokens
        .iter()
        .filter(|t| !t.kind.is_trivia() && !t.kind.is_comment() && t.span.end <= offset)
        .collect();

    let mut depth = 0i32;
    let mut commas = 0u32;
    let mut open_index = None;
    for (i, token) in significant.iter().enumerate().rev() {
        match token.kind {
            TokenKind::CloseParen | TokenKind::CloseBracket => depth += 1,
            TokenKind::OpenParen if depth == 0 => {
                open_index = Some(i);
                break;
            }
            TokenKind::OpenParen | TokenKind::OpenBracket => depth -= 1,
            TokenKind::Comma if depth == 0 => commas += 1,
            TokenKind::Semicolon | TokenKind::OpenBrace | TokenKind::CloseBrace if depth == 0 => {
                return None
            }
            _ => {}
        }
    }
    let open = open_index?;
    let name_token = significant.get(open.checked_sub(1)?)?;
    if name_token.kind != TokenKind::Identifier {
        return None;
    }
    let name = script.interner.resolve(name_token.lexeme).to_string();

    let namespace = open
        .checked_sub(3)
        .and_then(|i| {
            let scope = significant.get(open - 2)?;
            let ns = significant.get(i)?;
            (scope.kind == TokenKind::ScopeResolution && ns.kind == TokenKind::Identifier)
                .then(|| script.interner.resolve(ns.lexeme).to_string())
        });

    Some((name, namespace, commas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gscls_language::preproc::FsProvider;
    use gscls_language::signature::ScriptResolver;
    use gscls_language::LanguageId;
    use tower_lsp::lsp_types::Url;

    fn analysed(source: &str) -> Script {
        let uri = Url::parse("file:///t.gsc").unwrap();
        let mut script = Script::new(LanguageId::Gsc, uri, source.to_string(), 1);
        script.parse(&ScriptResolver::new("/nonexistent"), &FsProvider);
        script.analyse(&[], None);
        script
    }

    fn help_at(script: &Script, needle: &str, delta: usize) -> Option<SignatureHelp> {
        let offset = script.source.find(needle).unwrap() + delta;
        signature_help(script, script.line_index.position(offset))
    }

    #[test]
    fn shows_script_function_signature() {
        let script = analysed(
            "#namespace t;\nfunction spawn_wave(origin, count) {}\nfunction f() { spawn_wave( }\n",
        );
        let help = help_at(&script, "spawn_wave( ", "spawn_wave(".len()).expect("signature help");
        assert_eq!(help.signatures.len(), 1);
        assert!(help.signatures[0].label.contains("spawn_wave(origin, count)"));
        assert_eq!(help.active_parameter, Some(0));
    }

    #[test]
    fn comma_advances_active_parameter() {
        let script = analysed(
            "#namespace t;\nfunction g(a, b, c) {}\nfunction f() { g(1, 2, }\n",
        );
        let help = help_at(&script, "g(1, 2, ", "g(1, 2, ".len()).expect("signature help");
        assert_eq!(help.active_parameter, Some(2));
    }

    #[test]
    fn nested_call_reports_inner_function() {
        let script = analysed(
            "#namespace t;\nfunction outer(a) {}\nfunction inner(b) {}\nfunction f() { outer(inner( }\n",
        );
        let help = help_at(&script, "inner( ", "inner(".len()).expect("signature help");
        assert!(help.signatures[0].label.contains("inner"));
    }

    #[test]
    fn no_help_outside_calls() {
        let script = analysed("#namespace t;\nfunction f() { x = 1; }\n");
        let offset = script.source.find("1;").unwrap();
        assert!(signature_help(&script, script.line_index.position(offset)).is_none());
    }
}
