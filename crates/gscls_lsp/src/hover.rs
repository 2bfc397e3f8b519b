//! Hover: sense-backed markdown, with keyword fallbacks.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use gscls_language::token::TokenKind;

use crate::script::Script;

pub fn hover(script: &Script, position: Position) -> Option<Hover> {
    let offset = script.line_index.offset(position);

    if let Some(sense) = script.senses.at(offset) {
        if let Some(markdown) = &sense.hover {
            return Some(markdown_hover(
                markdown.clone(),
                script.line_index.range(sense.span),
            ));
        }
    }

    // Keyword documentation fallback.
    let token = script
        .tokens
        .iter()
        .find(|t| t.span.contains(offset))?;
    let text = keyword_documentation(token.kind)?;
    Some(markdown_hover(
        text.to_string(),
        script.line_index.range(token.span),
    ))
}

fn markdown_hover(value: String, range: tower_lsp::lsp_types::Range) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(range),
    }
}

fn keyword_documentation(kind: TokenKind) -> Option<&'static str> {
    let text = match kind {
        TokenKind::Wait => {
            "**wait** — Suspends the thread for a duration in seconds.\n\n```gsc\nwait 0.05;\n```"
        }
        TokenKind::Waitrealtime => {
            "**waitrealtime** — Suspends the thread for wall-clock seconds, ignoring timescale.\n\n```gsc\nwaitrealtime 1;\n```"
        }
        TokenKind::Waittill => {
            "**waittill** — Blocks until the entity is notified.\n\n```gsc\nself waittill(\"spawned\");\n```"
        }
        TokenKind::Waittillmatch => {
            "**waittillmatch** — Blocks until a notify with a matching argument arrives.\n\n```gsc\nself waittillmatch(\"damage\", \"head\");\n```"
        }
        TokenKind::Waittillframeend => {
            "**waittillframeend** — Yields until every other thread has run this frame.\n\n```gsc\nwaittillframeend;\n```"
        }
        TokenKind::Thread => {
            "**thread** — Starts the call in a new thread and continues immediately.\n\n```gsc\nself thread watch_damage();\n```"
        }
        TokenKind::Foreach => {
            "**foreach** — Iterates an array.\n\n```gsc\nforeach (player in players) {\n}\n```"
        }
        TokenKind::Autoexec => {
            "**autoexec** — Runs the function automatically at level start."
        }
        TokenKind::Private => {
            "**private** — Restricts the function to this file; it is not exported to `#using` dependents."
        }
        TokenKind::Const => {
            "**const** — Binds a name to a value that cannot be reassigned.\n\n```gsc\nconst max_players = 4;\n```"
        }
        TokenKind::Undefined => "**undefined** — The absent value; test with `isdefined`.",
        _ => return None,
    };
    Some(text)
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

    fn hover_markdown(script: &Script, line: u32, character: u32) -> Option<String> {
        hover(script, Position::new(line, character)).map(|h| match h.contents {
            HoverContents::Markup(m) => m.value,
            other => panic!("expected markup, got {other:?}"),
        })
    }

    #[test]
    fn function_declaration_hover_shows_signature_and_doc() {
        let script = analysed(
            "#namespace t;\n/@ Summary: Greets the player. @/\nfunction greet(who) {}\n",
        );
        // Position on the function name, line 2.
        let md = hover_markdown(&script, 2, 10).expect("hover on declaration");
        assert!(md.contains("function greet(who)"));
        assert!(md.contains("Greets the player."));
    }

    #[test]
    fn variable_hover_shows_inferred_type() {
        let script = analysed("#namespace t;\nfunction f() { count = 3; }\n");
        let offset = script.source.find("count").unwrap();
        let pos = script.line_index.position(offset);
        let md = hover_markdown(&script, pos.line, pos.character).expect("hover on variable");
        assert!(md.contains("count: int"), "got {md}");
    }

    #[test]
    fn wait_keyword_hover_falls_back_to_documentation() {
        let script = analysed("#namespace t;\nfunction f() { wait 0.05; }\n");
        let offset = script.source.find("wait").unwrap();
        let pos = script.line_index.position(offset);
        let md = hover_markdown(&script, pos.line, pos.character).expect("keyword hover");
        assert!(md.contains("wait"));
    }

    #[test]
    fn no_hover_on_plain_punctuation() {
        let script = analysed("#namespace t;\nfunction f() { x = 1; }\n");
        let offset = script.source.find(';').unwrap();
        let pos = script.line_index.position(offset);
        assert!(hover_markdown(&script, pos.line, pos.character).is_none());
    }
}
