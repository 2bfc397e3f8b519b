//! Folding regions from a token scan.
//!
//! Runs over the raw (pre-expansion) token stream so the regions match what
//! the user actually sees: brace pairs, dev blocks, block and doc comments,
//! runs of consecutive line comments, and `#insert` splice sites.
//! Single-line regions are kept here; the editor layer drops folds that do
//! not span at least two lines, since only it knows line boundaries.

use gscls_base::Span;

use crate::preproc::InsertRegion;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldKind {
    Comment,
    Region,
    DevBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldRegion {
    pub span: Span,
    pub kind: FoldKind,
}

pub fn folding_regions(tokens: &[Token], inserts: &[InsertRegion]) -> Vec<FoldRegion> {
    let mut regions = Vec::new();
    let mut brace_stack: Vec<usize> = Vec::new();
    let mut dev_stack: Vec<usize> = Vec::new();
    // Start of the current run of line comments, plus the end of its last
    // member so interleaved code breaks the run.
    let mut comment_run: Option<(usize, usize)> = None;

    for token in tokens {
        match token.kind {
            TokenKind::LineComment => {
                comment_run = match comment_run {
                    Some((start, _)) => Some((start, token.span.end)),
                    None => Some((token.span.start, token.span.end)),
                };
                continue;
            }
            TokenKind::Whitespace | TokenKind::LineBreak => continue,
            _ => flush_comment_run(&mut comment_run, &mut regions),
        }

        match token.kind {
            TokenKind::BlockComment | TokenKind::DocComment => {
                regions.push(FoldRegion {
                    span: token.span,
                    kind: FoldKind::Comment,
                });
            }
            TokenKind::OpenBrace => brace_stack.push(token.span.start),
            TokenKind::CloseBrace => {
                if let Some(start) = brace_stack.pop() {
                    regions.push(FoldRegion {
                        span: Span::new(start, token.span.end),
                        kind: FoldKind::Region,
                    });
                }
            }
            TokenKind::OpenDevBlock => dev_stack.push(token.span.start),
            TokenKind::CloseDevBlock => {
                if let Some(start) = dev_stack.pop() {
                    regions.push(FoldRegion {
                        span: Span::new(start, token.span.end),
                        kind: FoldKind::DevBlock,
                    });
                }
            }
            _ => {}
        }
    }
    flush_comment_run(&mut comment_run, &mut regions);

    for insert in inserts {
        regions.push(FoldRegion {
            span: insert.span,
            kind: FoldKind::Region,
        });
    }

    regions.sort_by_key(|r| (r.span.start, r.span.end));
    regions
}

fn flush_comment_run(run: &mut Option<(usize, usize)>, regions: &mut Vec<FoldRegion>) {
    if let Some((start, end)) = run.take() {
        regions.push(FoldRegion {
            span: Span::new(start, end),
            kind: FoldKind::Comment,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use gscls_base::Interner;

    fn regions(source: &str) -> Vec<FoldRegion> {
        let mut interner = Interner::new();
        let lexed = Lexer::new(source, &mut interner).tokenize();
        folding_regions(&lexed.tokens, &[])
    }

    #[test]
    fn brace_pairs_fold() {
        let source = "function f() {\n    x = 1;\n}\n";
        let open = source.find('{').unwrap();
        let close = source.find('}').unwrap();
        let folds = regions(source);
        assert!(folds
            .iter()
            .any(|r| r.kind == FoldKind::Region && r.span == Span::new(open, close + 1)));
    }

    #[test]
    fn nested_braces_fold_independently() {
        let folds = regions("function f() {\n    if (1) {\n        a();\n    }\n}\n");
        let brace_folds = folds
            .iter()
            .filter(|r| r.kind == FoldKind::Region)
            .count();
        assert_eq!(brace_folds, 2);
    }

    #[test]
    fn block_and_doc_comments_fold() {
        let folds = regions("/* one\ntwo */\n/@ Name: f\nSummary: s @/\nfunction f() {}\n");
        let comments = folds
            .iter()
            .filter(|r| r.kind == FoldKind::Comment)
            .count();
        assert_eq!(comments, 2);
    }

    #[test]
    fn consecutive_line_comments_fold_as_one_run() {
        let folds = regions("// a\n// b\n// c\nx = 1;\n// separate\n");
        let comment_folds: Vec<_> = folds
            .iter()
            .filter(|r| r.kind == FoldKind::Comment)
            .collect();
        assert_eq!(comment_folds.len(), 2);
        // The first run covers all three lines.
        assert!(comment_folds[0].span.len() > "// a".len());
    }

    #[test]
    fn dev_blocks_fold_with_their_own_kind() {
        let folds = regions("/#\nx = 1;\n#/\n");
        assert!(folds.iter().any(|r| r.kind == FoldKind::DevBlock));
    }

    #[test]
    fn unbalanced_close_brace_is_ignored() {
        let folds = regions("}\n");
        assert!(folds.iter().all(|r| r.kind != FoldKind::Region));
    }

    #[test]
    fn insert_regions_become_folds() {
        let mut interner = Interner::new();
        let lexed = Lexer::new("x = 1;\n", &mut interner).tokenize();
        let inserts = vec![InsertRegion {
            span: Span::new(0, 6),
            path: "scripts\\a.gsh".into(),
            resolved: None,
        }];
        let folds = folding_regions(&lexed.tokens, &inserts);
        assert!(folds
            .iter()
            .any(|r| r.kind == FoldKind::Region && r.span == Span::new(0, 6)));
    }
}
