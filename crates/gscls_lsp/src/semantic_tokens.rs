//! Semantic token legend and delta encoding.

use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokensLegend,
};

use gscls_language::sense::SenseKind;

use crate::line_index::LineIndex;
use crate::script::Script;

pub const TOKEN_TYPES: &[SemanticTokenType] = &[
    SemanticTokenType::FUNCTION,  // 0
    SemanticTokenType::METHOD,    // 1
    SemanticTokenType::CLASS,     // 2
    SemanticTokenType::PARAMETER, // 3
    SemanticTokenType::VARIABLE,  // 4
    SemanticTokenType::NAMESPACE, // 5
    SemanticTokenType::MACRO,     // 6
    SemanticTokenType::PROPERTY,  // 7
];

pub const TOKEN_MODIFIERS: &[SemanticTokenModifier] = &[
    SemanticTokenModifier::DECLARATION, // bit 0
    SemanticTokenModifier::READONLY,    // bit 1
];

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES.to_vec(),
        token_modifiers: TOKEN_MODIFIERS.to_vec(),
    }
}

fn classify(kind: SenseKind) -> (u32, u32) {
    match kind {
        SenseKind::Function => (0, 0),
        SenseKind::Method => (1, 0),
        SenseKind::Class => (2, 0),
        SenseKind::Parameter => (3, 0),
        SenseKind::Variable => (4, 0),
        SenseKind::Namespace => (5, 0),
        SenseKind::Macro => (6, 0),
        SenseKind::Property => (7, 0),
        SenseKind::Constant => (4, 0b10), // variable + readonly
    }
}

/// Encodes the script's senses as LSP semantic tokens (relative integers).
pub fn encode(script: &Script, index: &LineIndex) -> Vec<SemanticToken> {
    let senses = script.senses.sorted();
    let mut out = Vec::with_capacity(senses.len());
    let mut prev_line = 0u32;
    let mut prev_start = 0u32;

    for sense in senses {
        let length = index.utf16_len(sense.span);
        if length == 0 {
            continue;
        }
        let (token_type, mut modifiers) = classify(sense.kind);
        if sense.declaration {
            modifiers |= 0b01;
        }
        let pos = index.position(sense.span.start);
        let delta_line = pos.line - prev_line;
        let delta_start = if delta_line == 0 {
            pos.character - prev_start
        } else {
            pos.character
        };
        out.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: modifiers,
        });
        prev_line = pos.line;
        prev_start = pos.character;
    }
    out
}
