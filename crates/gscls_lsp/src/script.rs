//! Per-file script state and pipeline orchestration.
//!
//! A [`Script`] is either empty, parsed, or parsed+analysed; the transition
//! is monotonic within a revision and resets on every edit. `parse` runs
//! lexer → preprocessor → parser → signature → regions; `analyse` builds
//! CFGs and runs the data-flow pass against the merged symbol table.
//!
//! No stage failure may take the server down: every stage runs under
//! `catch_unwind` and an unexpected panic becomes a 9xxx sentinel
//! diagnostic, leaving best-effort outputs from earlier stages in place.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tower_lsp::lsp_types::Url;

use gscls_base::{Interner, Span};
use gscls_language::api::ApiStore;
use gscls_language::ast::{Ast, ClassMember, ScriptItem};
use gscls_language::cfg;
use gscls_language::dataflow::{self, AnalysisContext};
use gscls_language::diag::{DiagCode, Diagnostic};
use gscls_language::folding::{folding_regions, FoldRegion};
use gscls_language::lexer::Lexer;
use gscls_language::parser::Parser;
use gscls_language::preproc::{InsertRegion, MacroOutline, Preprocessor, SourceProvider};
use gscls_language::sense::SenseMap;
use gscls_language::signature::{self, DefinitionsTable, ScriptResolver};
use gscls_language::token::Token;
use gscls_language::LanguageId;

use crate::line_index::LineIndex;

pub struct Script {
    pub language: LanguageId,
    pub uri: Url,
    pub source: String,
    pub line_index: LineIndex,
    pub revision: i32,

    pub parsed: bool,
    pub analysed: bool,

    /// Raw lexed tokens, trivia included (folding, references, hovers).
    pub tokens: Vec<Token>,
    /// Post-preprocessor tokens, what the parser consumed.
    pub expanded: Vec<Token>,
    pub interner: Interner,
    pub ast: Option<Ast>,
    /// This file's own definitions.
    pub defs: DefinitionsTable,
    /// Own definitions plus dependency exports; valid once analysed.
    pub merged_defs: DefinitionsTable,
    pub diagnostics: Vec<Diagnostic>,
    pub senses: SenseMap,
    pub folds: Vec<FoldRegion>,
    pub macro_outlines: Vec<MacroOutline>,
    pub insert_regions: Vec<InsertRegion>,
}

impl Script {
    pub fn new(language: LanguageId, uri: Url, source: String, revision: i32) -> Self {
        let line_index = LineIndex::new(&source);
        Script {
            language,
            uri,
            source,
            line_index,
            revision,
            parsed: false,
            analysed: false,
            tokens: Vec::new(),
            expanded: Vec::new(),
            interner: Interner::new(),
            ast: None,
            defs: DefinitionsTable::default(),
            merged_defs: DefinitionsTable::default(),
            diagnostics: Vec::new(),
            senses: SenseMap::new(),
            folds: Vec::new(),
            macro_outlines: Vec::new(),
            insert_regions: Vec::new(),
        }
    }

    /// Replaces the source text and resets the revision's pipeline state.
    pub fn set_source(&mut self, source: String, revision: i32) {
        self.line_index = LineIndex::new(&source);
        self.source = source;
        self.revision = revision;
        self.parsed = false;
        self.analysed = false;
        self.tokens.clear();
        self.expanded.clear();
        self.interner = Interner::new();
        self.ast = None;
        self.defs = DefinitionsTable::default();
        self.merged_defs = DefinitionsTable::default();
        self.diagnostics.clear();
        self.senses = SenseMap::new();
        self.folds.clear();
        self.macro_outlines.clear();
        self.insert_regions.clear();
    }

    /// Lex → preprocess → parse → signature → regions.
    pub fn parse(&mut self, resolver: &ScriptResolver, provider: &dyn SourceProvider) {
        if self.parsed {
            return;
        }
        self.diagnostics.clear();
        self.senses = SenseMap::new();

        let mut interner = Interner::new();

        let lexed = match catch_unwind(AssertUnwindSafe(|| {
            Lexer::new(&self.source, &mut interner).tokenize()
        })) {
            Ok(out) => out,
            Err(payload) => {
                self.internal_failure(DiagCode::LexerFailure, payload);
                self.interner = interner;
                self.parsed = true;
                return;
            }
        };
        self.diagnostics.extend(lexed.diagnostics);
        self.tokens = lexed.tokens;

        let preprocessed = match catch_unwind(AssertUnwindSafe(|| {
            Preprocessor::new(&mut interner, provider, &resolver.root).run(&self.tokens)
        })) {
            Ok(out) => out,
            Err(payload) => {
                self.internal_failure(DiagCode::PreprocessorFailure, payload);
                self.interner = interner;
                self.parsed = true;
                return;
            }
        };
        self.diagnostics.extend(preprocessed.diagnostics);
        self.expanded = preprocessed.tokens;
        self.macro_outlines = preprocessed.macro_outlines;
        self.insert_regions = preprocessed.insert_regions;

        match catch_unwind(AssertUnwindSafe(|| {
            Parser::new(&self.expanded, &interner).parse()
        })) {
            Ok(out) => {
                self.diagnostics.extend(out.diagnostics);
                self.ast = Some(out.ast);
            }
            Err(payload) => self.internal_failure(DiagCode::ParserFailure, payload),
        }

        if let Some(ast) = &self.ast {
            match catch_unwind(AssertUnwindSafe(|| {
                signature::analyze(ast, self.uri.as_str(), self.language, resolver)
            })) {
                Ok(out) => {
                    self.diagnostics.extend(out.diagnostics);
                    for sense in out.senses.sorted() {
                        self.senses.attach(sense.clone());
                    }
                    self.defs = out.table;
                }
                Err(payload) => self.internal_failure(DiagCode::SignatureFailure, payload),
            }
        }

        match catch_unwind(AssertUnwindSafe(|| {
            folding_regions(&self.tokens, &self.insert_regions)
        })) {
            Ok(folds) => self.folds = folds,
            Err(payload) => self.internal_failure(DiagCode::FoldingFailure, payload),
        }

        self.interner = interner;
        self.parsed = true;
    }

    /// CFG construction and data-flow over every function and class, with
    /// dependency definition tables merged in. Requires `parse` first.
    pub fn analyse(&mut self, dependencies: &[DefinitionsTable], api: Option<&ApiStore>) {
        if !self.parsed || self.analysed {
            return;
        }
        let Some(ast) = self.ast.clone() else {
            self.analysed = true;
            return;
        };

        let mut merged = self.defs.clone();
        for dep in dependencies {
            merged.merge_exports(dep);
        }

        let default_namespace = self.defs.namespace.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            analyse_items(
                &ast,
                &merged,
                api,
                self.language,
                self.uri.as_str(),
                &default_namespace,
            )
        }));
        match outcome {
            Ok((diagnostics, senses)) => {
                self.diagnostics.extend(diagnostics);
                for sense in senses {
                    self.senses.attach(sense);
                }
            }
            Err(payload) => self.internal_failure(DiagCode::DataFlowFailure, payload),
        }

        self.merged_defs = merged;
        self.analysed = true;
    }

    fn internal_failure(&mut self, code: DiagCode, payload: Box<dyn std::any::Any + Send>) {
        let message = panic_message(payload);
        log::error!("{} in {}: {}", code.code(), self.uri, message);
        self.diagnostics
            .push(Diagnostic::new(code, Span::point(0), &[&message]));
    }
}

/// Walks script items in order, tracking the active `#namespace`, and runs
/// CFG + data-flow per function, method, constructor, destructor and class
/// body.
fn analyse_items(
    ast: &Ast,
    merged: &DefinitionsTable,
    api: Option<&ApiStore>,
    language: LanguageId,
    uri: &str,
    default_namespace: &str,
) -> (Vec<Diagnostic>, Vec<gscls_language::sense::SenseToken>) {
    let mut diagnostics = Vec::new();
    let mut senses = Vec::new();
    let mut namespace = default_namespace.to_string();

    let mut visit_items = |items: &[ScriptItem],
                           namespace: &mut String,
                           diagnostics: &mut Vec<Diagnostic>,
                           senses: &mut Vec<gscls_language::sense::SenseToken>| {
        for item in items {
            match item {
                ScriptItem::Namespace { name, .. } => {
                    *namespace = name.name.to_ascii_lowercase();
                }
                ScriptItem::Function(def) => {
                    let ctx = AnalysisContext {
                        defs: merged,
                        api,
                        language,
                        uri,
                        namespace: namespace.clone(),
                        class: None,
                    };
                    let built = cfg::build_function(def);
                    diagnostics.extend(built.diagnostics);
                    let out = dataflow::analyze_function(&built.graph, &def.params, &ctx);
                    diagnostics.extend(out.diagnostics);
                    senses.extend(out.senses.sorted().into_iter().cloned());
                }
                ScriptItem::Class(def) => {
                    let class_name = def.name.as_ref().map(|n| n.name.to_ascii_lowercase());
                    let class_ctx = AnalysisContext {
                        defs: merged,
                        api,
                        language,
                        uri,
                        namespace: namespace.clone(),
                        class: class_name.clone(),
                    };
                    let built = cfg::build_class(def);
                    diagnostics.extend(built.diagnostics);
                    let out = dataflow::analyze_class(&built.graph, &class_ctx);
                    diagnostics.extend(out.diagnostics);
                    senses.extend(out.senses.sorted().into_iter().cloned());

                    for member in &def.members {
                        let method = match member {
                            ClassMember::Method(m)
                            | ClassMember::Constructor(m)
                            | ClassMember::Destructor(m) => m,
                            ClassMember::Field { .. } => continue,
                        };
                        let ctx = AnalysisContext {
                            defs: merged,
                            api,
                            language,
                            uri,
                            namespace: namespace.clone(),
                            class: class_name.clone(),
                        };
                        let built = cfg::build_function(method);
                        diagnostics.extend(built.diagnostics);
                        let out = dataflow::analyze_function(&built.graph, &method.params, &ctx);
                        diagnostics.extend(out.diagnostics);
                        senses.extend(out.senses.sorted().into_iter().cloned());
                    }
                }
                ScriptItem::DevBlock { .. }
                | ScriptItem::Precache { .. }
                | ScriptItem::UsingAnimtree { .. } => {}
            }
        }
    };

    visit_items(&ast.items, &mut namespace, &mut diagnostics, &mut senses);
    // Dev blocks at script level hold ordinary definitions.
    for item in &ast.items {
        if let ScriptItem::DevBlock { items, .. } = item {
            visit_items(items, &mut namespace, &mut diagnostics, &mut senses);
        }
    }

    (diagnostics, senses)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gscls_language::preproc::FsProvider;

    fn parse_script(source: &str) -> Script {
        let uri = Url::parse("file:///ws/scripts/test_script.gsc").unwrap();
        let mut script = Script::new(LanguageId::Gsc, uri, source.to_string(), 1);
        let resolver = ScriptResolver::new("/nonexistent-root");
        script.parse(&resolver, &FsProvider);
        script
    }

    fn analysed_script(source: &str) -> Script {
        let mut script = parse_script(source);
        script.analyse(&[], None);
        script
    }

    #[test]
    fn parse_then_analyse_is_monotonic() {
        let mut script = parse_script("#namespace t;\nfunction f() { x = 1; }\n");
        assert!(script.parsed);
        assert!(!script.analysed);
        script.analyse(&[], None);
        assert!(script.analysed);
    }

    #[test]
    fn edit_resets_revision_state() {
        let mut script = analysed_script("#namespace t;\nfunction f() { x = 1; }\n");
        script.set_source("#namespace t;\nfunction g() { y = 2; }\n".to_string(), 2);
        assert!(!script.parsed);
        assert!(!script.analysed);
        assert!(script.diagnostics.is_empty());
        assert_eq!(script.revision, 2);
    }

    #[test]
    fn clean_script_has_no_diagnostics() {
        let script = analysed_script("#namespace t;\nfunction f(a) { return a + 1; }\n");
        assert!(script.diagnostics.is_empty(), "{:?}", script.diagnostics);
    }

    #[test]
    fn diagnostics_union_all_sources() {
        // Lexer error ($), preprocessor hint (#if), parser error (bad stmt),
        // semantic error (missing symbol) all in one file.
        let source = "#namespace t;\n#if X\n#endif\nfunction f() { $ = ; y = missing_fn(); }\n";
        let script = analysed_script(source);
        let sources: Vec<_> = script.diagnostics.iter().map(|d| d.source()).collect();
        use gscls_language::diag::DiagSource;
        assert!(sources.contains(&DiagSource::Lexer), "{sources:?}");
        assert!(sources.contains(&DiagSource::Preprocessor), "{sources:?}");
        assert!(sources.contains(&DiagSource::Parser), "{sources:?}");
        assert!(sources.contains(&DiagSource::DataFlow), "{sources:?}");
    }

    #[test]
    fn analyse_merges_dependency_exports() {
        let dep = analysed_script("#namespace lib;\nfunction helper() {}\n");
        let mut script = parse_script("#namespace t;\nfunction f() { lib::helper(); }\n");
        script.analyse(&[dep.defs.clone()], None);
        assert!(
            script
                .diagnostics
                .iter()
                .all(|d| d.code != DiagCode::UnknownNamespace),
            "{:?}",
            script.diagnostics
        );
    }

    #[test]
    fn missing_dependency_contributes_no_symbols() {
        let script = analysed_script("#namespace t;\nfunction f() { lib::helper(); }\n");
        assert!(script
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::UnknownNamespace));
    }

    #[test]
    fn private_dependency_function_is_invisible() {
        let dep = analysed_script("#namespace lib;\nprivate function secret() {}\n");
        let mut script = parse_script("#namespace t;\nfunction f() { lib::secret(); }\n");
        script.analyse(&[dep.defs.clone()], None);
        // The namespace itself is unknown here because nothing public came
        // from it; either way the call must not resolve.
        assert!(
            script.diagnostics.iter().any(|d| matches!(
                d.code,
                DiagCode::UnknownNamespace | DiagCode::NotDefined
            )),
            "{:?}",
            script.diagnostics
        );
    }

    #[test]
    fn macro_outlines_and_folds_survive_parse() {
        let script = parse_script(
            "#define LIMIT 4\n#namespace t;\nfunction f() {\n    x = LIMIT;\n}\n",
        );
        assert_eq!(script.macro_outlines.len(), 1);
        assert!(!script.folds.is_empty());
    }

    #[test]
    fn method_calls_resolve_against_own_class() {
        let source = "#namespace zoo;\nclass Dog {\n    function bark() {}\n    function greet() { bark(); }\n}\n";
        let script = analysed_script(source);
        assert!(script.diagnostics.is_empty(), "{:?}", script.diagnostics);
    }
}
