//! Folding ranges: core regions filtered to multi-line spans.

use tower_lsp::lsp_types::{FoldingRange, FoldingRangeKind};

use gscls_language::folding::FoldKind;

use crate::script::Script;

pub fn folding_ranges(script: &Script) -> Vec<FoldingRange> {
    let mut ranges = Vec::new();
    for region in &script.folds {
        let start = script.line_index.position(region.span.start);
        let end = script.line_index.position(region.span.end);
        if end.line <= start.line {
            continue; // single-line regions do not fold
        }
        let kind = match region.kind {
            FoldKind::Comment => Some(FoldingRangeKind::Comment),
            FoldKind::Region | FoldKind::DevBlock => Some(FoldingRangeKind::Region),
        };
        ranges.push(FoldingRange {
            start_line: start.line,
            start_character: Some(start.character),
            end_line: end.line,
            end_character: Some(end.character),
            kind,
            collapsed_text: None,
        });
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use gscls_language::preproc::FsProvider;
    use gscls_language::signature::ScriptResolver;
    use gscls_language::LanguageId;
    use tower_lsp::lsp_types::Url;

    fn parsed(source: &str) -> Script {
        let uri = Url::parse("file:///t.gsc").unwrap();
        let mut script = Script::new(LanguageId::Gsc, uri, source.to_string(), 1);
        script.parse(&ScriptResolver::new("/nonexistent"), &FsProvider);
        script
    }

    #[test]
    fn multi_line_function_body_folds() {
        let script = parsed("#namespace t;\nfunction f() {\n    x = 1;\n    y = 2;\n}\n");
        let ranges = folding_ranges(&script);
        assert!(!ranges.is_empty());
        assert!(ranges.iter().all(|r| r.end_line > r.start_line));
    }

    #[test]
    fn single_line_body_does_not_fold() {
        let script = parsed("#namespace t;\nfunction f() { x = 1; }\n");
        let ranges = folding_ranges(&script);
        assert!(
            ranges.iter().all(|r| r.kind != Some(FoldingRangeKind::Region)),
            "{ranges:?}"
        );
    }

    #[test]
    fn comment_blocks_fold_as_comment_kind() {
        let script = parsed("/*\n header\n*/\n#namespace t;\nfunction f() {}\n");
        let ranges = folding_ranges(&script);
        assert!(ranges
            .iter()
            .any(|r| r.kind == Some(FoldingRangeKind::Comment)));
    }
}
