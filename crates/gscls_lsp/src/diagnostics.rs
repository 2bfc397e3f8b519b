//! Core diagnostics → LSP diagnostics.

use tower_lsp::lsp_types::{
    Diagnostic as LspDiagnostic, DiagnosticSeverity, DiagnosticTag, NumberOrString,
};

use gscls_language::diag::{Diagnostic, Severity};

use crate::line_index::LineIndex;

pub fn convert(diagnostics: &[Diagnostic], index: &LineIndex) -> Vec<LspDiagnostic> {
    diagnostics
        .iter()
        .map(|d| to_lsp(d, index))
        .collect()
}

fn to_lsp(diagnostic: &Diagnostic, index: &LineIndex) -> LspDiagnostic {
    let severity = match diagnostic.severity() {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    };
    let tags = if diagnostic.unnecessary() {
        Some(vec![DiagnosticTag::UNNECESSARY])
    } else {
        None
    };
    LspDiagnostic {
        range: index.range(diagnostic.span),
        severity: Some(severity),
        code: Some(NumberOrString::Number(diagnostic.code.code() as i32)),
        source: Some("gscls".to_string()),
        message: diagnostic.message.clone(),
        tags,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gscls_base::Span;
    use gscls_language::diag::DiagCode;

    #[test]
    fn converts_code_severity_and_range() {
        let index = LineIndex::new("abc\ndef\n");
        let diags = vec![Diagnostic::new(DiagCode::NotDefined, Span::new(4, 7), &["def"])];
        let lsp = convert(&diags, &index);
        assert_eq!(lsp.len(), 1);
        assert_eq!(lsp[0].code, Some(NumberOrString::Number(3000)));
        assert_eq!(lsp[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(lsp[0].range.start.line, 1);
        assert_eq!(lsp[0].source.as_deref(), Some("gscls"));
        assert!(lsp[0].message.contains("def"));
    }

    #[test]
    fn unnecessary_diag_carries_tag() {
        let index = LineIndex::new("code\n");
        let diags = vec![Diagnostic::new(
            DiagCode::InactivePreprocessorBranch,
            Span::new(0, 4),
            &[],
        )];
        let lsp = convert(&diags, &index);
        assert_eq!(lsp[0].tags, Some(vec![DiagnosticTag::UNNECESSARY]));
        assert_eq!(lsp[0].severity, Some(DiagnosticSeverity::HINT));
    }
}
