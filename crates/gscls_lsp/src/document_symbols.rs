//! Document outline: functions, classes with nested members, macros.

use tower_lsp::lsp_types::{DocumentSymbol, Position, Range, SymbolKind};

use gscls_language::ast::{ClassMember, ScriptItem};

use crate::script::Script;

pub fn document_symbols(script: &Script) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();
    let Some(ast) = &script.ast else {
        return symbols;
    };

    collect_items(script, &ast.items, &mut symbols);

    for outline in &script.macro_outlines {
        let range = script.line_index.range(outline.span);
        symbols.push(symbol(
            outline.name.clone(),
            Some("macro".to_string()),
            SymbolKind::CONSTANT,
            range,
            range,
            Vec::new(),
        ));
    }

    symbols.sort_by_key(|s| (s.range.start.line, s.range.start.character));
    symbols
}

fn collect_items(script: &Script, items: &[ScriptItem], out: &mut Vec<DocumentSymbol>) {
    for item in items {
        match item {
            ScriptItem::Namespace { name, span } => {
                out.push(symbol(
                    name.name.clone(),
                    Some("namespace".to_string()),
                    SymbolKind::NAMESPACE,
                    script.line_index.range(*span),
                    script.line_index.range(name.span),
                    Vec::new(),
                ));
            }
            ScriptItem::Function(def) => {
                let Some(name) = &def.name else { continue };
                out.push(symbol(
                    name.name.clone(),
                    Some(format!(
                        "function({})",
                        def.params
                            .iter()
                            .map(|p| p.name.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
                    SymbolKind::FUNCTION,
                    script.line_index.range(def.span),
                    script.line_index.range(name.span),
                    Vec::new(),
                ));
            }
            ScriptItem::Class(def) => {
                let Some(name) = &def.name else { continue };
                let mut children = Vec::new();
                for member in &def.members {
                    match member {
                        ClassMember::Field { name, span, .. } => {
                            children.push(symbol(
                                name.name.clone(),
                                None,
                                SymbolKind::FIELD,
                                script.line_index.range(*span),
                                script.line_index.range(name.span),
                                Vec::new(),
                            ));
                        }
                        ClassMember::Method(m)
                        | ClassMember::Constructor(m)
                        | ClassMember::Destructor(m) => {
                            let Some(method_name) = &m.name else { continue };
                            let kind = match member {
                                ClassMember::Constructor(_) => SymbolKind::CONSTRUCTOR,
                                _ => SymbolKind::METHOD,
                            };
                            children.push(symbol(
                                method_name.name.clone(),
                                None,
                                kind,
                                script.line_index.range(m.span),
                                script.line_index.range(method_name.span),
                                Vec::new(),
                            ));
                        }
                    }
                }
                out.push(symbol(
                    name.name.clone(),
                    def.parent.as_ref().map(|p| format!(": {}", p.name)),
                    SymbolKind::CLASS,
                    script.line_index.range(def.span),
                    script.line_index.range(name.span),
                    children,
                ));
            }
            ScriptItem::DevBlock { items, .. } => collect_items(script, items, out),
            ScriptItem::Precache { .. } | ScriptItem::UsingAnimtree { .. } => {}
        }
    }
}

fn symbol(
    name: String,
    detail: Option<String>,
    kind: SymbolKind,
    range: Range,
    selection_range: Range,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    #[allow(deprecated)]
    DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range: widen(range, selection_range),
        selection_range,
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

/// The full range must contain the selection range.
fn widen(range: Range, selection: Range) -> Range {
    Range {
        start: min_pos(range.start, selection.start),
        end: max_pos(range.end, selection.end),
    }
}

fn min_pos(a: Position, b: Position) -> Position {
    if (a.line, a.character) <= (b.line, b.character) {
        a
    } else {
        b
    }
}

fn max_pos(a: Position, b: Position) -> Position {
    if (a.line, a.character) >= (b.line, b.character) {
        a
    } else {
        b
    }
}
