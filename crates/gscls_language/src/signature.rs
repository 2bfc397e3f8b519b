//! Signature analysis: one AST pass that populates the definitions table.
//!
//! For every function it records location, lowercased parameter names, flags
//! and doc markdown; functions defined inside a class are registered both
//! under the active namespace and under the class name as qualifier, so
//! `ns::method` and `Class::method` both resolve. Non-private functions are
//! pushed into the exported list, tagged with the active namespace; classes
//! are always exported.
//!
//! All keys are lowercased at insertion so cross-file lookups are O(1) and
//! case-insensitive.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use gscls_base::Span;

use crate::ast::*;
use crate::diag::{DiagCode, Diagnostic};
use crate::docs::DocComment;
use crate::sense::{SenseKind, SenseMap, SenseToken};
use crate::LanguageId;

/// Where a symbol is defined: the owning document plus the name's range.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub uri: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolFlags {
    pub private: bool,
    pub autoexec: bool,
    /// Declared in script, as opposed to the built-in API.
    pub userdefined: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    /// Lowercased namespace qualifier.
    pub namespace: String,
    /// Lowercased name.
    pub name: String,
    /// Name as written, for display.
    pub display_name: String,
    pub location: Location,
    /// Lowercased parameter names in order.
    pub params: Vec<String>,
    pub flags: SymbolFlags,
    /// Rendered doc markdown, when a `/@ … @/` block preceded the definition.
    pub doc: Option<String>,
    pub vararg: bool,
    /// Parameters without defaults.
    pub min_args: usize,
    /// All parameters; `usize::MAX` when vararg.
    pub max_args: usize,
}

#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub namespace: String,
    pub name: String,
    pub display_name: String,
    pub location: Location,
    /// Lowercased parent class name.
    pub inherits_from: Option<String>,
    /// Lowercased field names.
    pub fields: Vec<String>,
    /// Lowercased method names, constructor and destructor included.
    pub methods: Vec<String>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Class,
}

/// A symbol visible to files that `#using` this one.
#[derive(Debug, Clone)]
pub struct ExportedSymbol {
    pub namespace: String,
    pub name: String,
    pub kind: SymbolKind,
}

/// A `#using` dependency with its resolution result.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub written: String,
    pub resolved: Option<PathBuf>,
    pub span: Span,
}

/// Per-file symbol tables, case-insensitive by construction.
#[derive(Debug, Clone, Default)]
pub struct DefinitionsTable {
    pub functions: HashMap<(String, String), FunctionEntry>,
    pub classes: HashMap<(String, String), ClassEntry>,
    pub exported: Vec<ExportedSymbol>,
    pub dependencies: Vec<ResolvedDependency>,
    /// Lowercased names declared in this file.
    pub local_functions: HashSet<String>,
    pub local_classes: HashSet<String>,
    /// The namespace active at end of file.
    pub namespace: String,
}

impl DefinitionsTable {
    pub fn function(&self, namespace: &str, name: &str) -> Option<&FunctionEntry> {
        self.functions
            .get(&(namespace.to_ascii_lowercase(), name.to_ascii_lowercase()))
    }

    /// Any-namespace lookup, used as a fallback when the qualifier is absent.
    pub fn function_any_namespace(&self, name: &str) -> Option<&FunctionEntry> {
        let name = name.to_ascii_lowercase();
        self.functions.values().find(|f| f.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        let name = name.to_ascii_lowercase();
        self.classes.values().find(|c| c.name == name)
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.functions.keys().any(|(ns, _)| *ns == name)
            || self.classes.keys().any(|(ns, _)| *ns == name)
    }

    /// Merges another file's exported symbols into this table. Entries
    /// already present (including this file's own) win.
    pub fn merge_exports(&mut self, other: &DefinitionsTable) {
        for symbol in &other.exported {
            let key = (symbol.namespace.clone(), symbol.name.clone());
            match symbol.kind {
                SymbolKind::Function => {
                    if let Some(entry) = other.functions.get(&key) {
                        self.functions.entry(key).or_insert_with(|| entry.clone());
                    }
                }
                SymbolKind::Class => {
                    if let Some(entry) = other.classes.get(&key) {
                        self.classes.entry(key).or_insert_with(|| entry.clone());
                    }
                }
            }
        }
    }
}

/// Resolves `#using` paths against the workspace root and the shared-scripts
/// directory, matching the referring file's language id.
#[derive(Debug, Clone)]
pub struct ScriptResolver {
    pub root: PathBuf,
    pub shared: Option<PathBuf>,
}

impl ScriptResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ScriptResolver {
            root: root.into(),
            shared: None,
        }
    }

    pub fn with_shared(mut self, shared: impl Into<PathBuf>) -> Self {
        self.shared = Some(shared.into());
        self
    }

    pub fn resolve_using(&self, written: &str, language: LanguageId) -> Option<PathBuf> {
        let mut bases = vec![self.root.clone()];
        if let Some(shared) = &self.shared {
            bases.push(shared.clone());
        }
        for base in bases {
            let mut candidate = base;
            for part in written.split(['\\', '/']) {
                if part.is_empty() {
                    continue;
                }
                candidate.push(part);
            }
            if candidate.extension().is_none() {
                candidate.set_extension(language.extension());
            }
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

pub struct SignatureOutput {
    pub table: DefinitionsTable,
    pub diagnostics: Vec<Diagnostic>,
    pub senses: SenseMap,
}

/// Runs the pass. `uri` identifies the document for definition locations.
pub fn analyze(
    ast: &Ast,
    uri: &str,
    language: LanguageId,
    resolver: &ScriptResolver,
) -> SignatureOutput {
    let mut pass = SignaturePass {
        uri,
        table: DefinitionsTable {
            namespace: default_namespace(uri),
            ..Default::default()
        },
        diagnostics: Vec::new(),
        senses: SenseMap::new(),
        saw_namespace: false,
    };

    for dep in &ast.dependencies {
        let resolved = resolver.resolve_using(&dep.path, language);
        if resolved.is_none() {
            pass.diagnostics.push(Diagnostic::new(
                DiagCode::MissingUsingFile,
                dep.span,
                &[&dep.path],
            ));
        }
        pass.table.dependencies.push(ResolvedDependency {
            written: dep.path.clone(),
            resolved,
            span: dep.span,
        });
    }

    pass.visit_items(&ast.items);

    if !pass.saw_namespace {
        let has_definitions = pass.table.local_functions.len() + pass.table.local_classes.len() > 0;
        if has_definitions {
            let span = ast
                .items
                .first()
                .map(|item| match item {
                    ScriptItem::Function(f) => f.span,
                    ScriptItem::Class(c) => c.span,
                    ScriptItem::Namespace { span, .. }
                    | ScriptItem::Precache { span }
                    | ScriptItem::UsingAnimtree { span, .. }
                    | ScriptItem::DevBlock { span, .. } => *span,
                })
                .unwrap_or(ast.span);
            pass.diagnostics.push(Diagnostic::new(
                DiagCode::MissingNamespaceDirective,
                Span::new(span.start, span.start),
                &[],
            ));
        }
    }

    SignatureOutput {
        table: pass.table,
        diagnostics: pass.diagnostics,
        senses: pass.senses,
    }
}

/// Until a `#namespace` directive is seen, symbols are filed under the file
/// stem, matching the compiler's default.
fn default_namespace(uri: &str) -> String {
    Path::new(uri)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

struct SignaturePass<'a> {
    uri: &'a str,
    table: DefinitionsTable,
    diagnostics: Vec<Diagnostic>,
    senses: SenseMap,
    saw_namespace: bool,
}

impl SignaturePass<'_> {
    fn visit_items(&mut self, items: &[ScriptItem]) {
        for item in items {
            match item {
                ScriptItem::Namespace { name, .. } => {
                    self.saw_namespace = true;
                    self.table.namespace = name.name.to_ascii_lowercase();
                    self.senses.attach(
                        SenseToken::new(name.span, SenseKind::Namespace).declaration(),
                    );
                }
                ScriptItem::Function(def) => self.visit_function(def, None),
                ScriptItem::Class(def) => self.visit_class(def),
                ScriptItem::DevBlock { items, .. } => self.visit_items(items),
                ScriptItem::Precache { .. } | ScriptItem::UsingAnimtree { .. } => {}
            }
        }
    }

    fn visit_function(&mut self, def: &FunctionDef, class: Option<&str>) {
        let Some(name) = &def.name else {
            return; // recovery placeholder
        };

        let doc = def.doc.as_deref().map(|raw| DocComment::parse(raw).to_markdown());
        let params: Vec<String> = def
            .params
            .iter()
            .filter(|p| !p.vararg)
            .map(|p| p.name.name.to_ascii_lowercase())
            .collect();
        let vararg = def.params.iter().any(|p| p.vararg);
        let min_args = def
            .params
            .iter()
            .filter(|p| !p.vararg && p.default.is_none())
            .count();
        let max_args = if vararg { usize::MAX } else { params.len() };

        let entry = FunctionEntry {
            namespace: self.table.namespace.clone(),
            name: name.name.to_ascii_lowercase(),
            display_name: name.name.clone(),
            location: Location {
                uri: self.uri.to_string(),
                span: name.span,
            },
            params,
            flags: SymbolFlags {
                private: def.private,
                autoexec: def.autoexec,
                userdefined: true,
            },
            doc: doc.clone(),
            vararg,
            min_args,
            max_args,
        };

        let lower = entry.name.clone();
        self.table.local_functions.insert(lower.clone());
        if !def.private {
            self.table.exported.push(ExportedSymbol {
                namespace: entry.namespace.clone(),
                name: lower.clone(),
                kind: SymbolKind::Function,
            });
        }
        self.table
            .functions
            .insert((entry.namespace.clone(), lower.clone()), entry.clone());

        // Methods resolve through the class qualifier too.
        if let Some(class_name) = class {
            let mut qualified = entry.clone();
            qualified.namespace = class_name.to_ascii_lowercase();
            self.table
                .functions
                .insert((qualified.namespace.clone(), lower.clone()), qualified);
        }

        let kind = if class.is_some() {
            SenseKind::Method
        } else {
            SenseKind::Function
        };
        let hover = render_function_hover(&entry_signature(def, name), doc.as_deref());
        self.senses.attach(
            SenseToken::new(name.span, kind)
                .declaration()
                .with_hover(hover)
                .with_definition(self.uri, name.span),
        );

        for param in &def.params {
            self.senses
                .attach(SenseToken::new(param.name.span, SenseKind::Parameter).declaration());
        }
    }

    fn visit_class(&mut self, def: &ClassDef) {
        let Some(name) = &def.name else {
            return;
        };

        let doc = def.doc.as_deref().map(|raw| DocComment::parse(raw).to_markdown());
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        for member in &def.members {
            match member {
                ClassMember::Field { name: field, .. } => {
                    fields.push(field.name.to_ascii_lowercase());
                    self.senses
                        .attach(SenseToken::new(field.span, SenseKind::Property).declaration());
                }
                ClassMember::Method(m)
                | ClassMember::Constructor(m)
                | ClassMember::Destructor(m) => {
                    if let Some(method_name) = &m.name {
                        methods.push(method_name.name.to_ascii_lowercase());
                    }
                    self.visit_function(m, Some(&name.name));
                }
            }
        }

        let entry = ClassEntry {
            namespace: self.table.namespace.clone(),
            name: name.name.to_ascii_lowercase(),
            display_name: name.name.clone(),
            location: Location {
                uri: self.uri.to_string(),
                span: name.span,
            },
            inherits_from: def.parent.as_ref().map(|p| p.name.to_ascii_lowercase()),
            fields,
            methods,
            doc,
        };

        self.table.local_classes.insert(entry.name.clone());
        self.table.exported.push(ExportedSymbol {
            namespace: entry.namespace.clone(),
            name: entry.name.clone(),
            kind: SymbolKind::Class,
        });

        let hover = format!("```gsc\nclass {}\n```", name.name);
        self.senses.attach(
            SenseToken::new(name.span, SenseKind::Class)
                .declaration()
                .with_hover(hover)
                .with_definition(self.uri, name.span),
        );

        if let Some(parent) = &def.parent {
            self.senses
                .attach(SenseToken::new(parent.span, SenseKind::Class));
        }

        self.table
            .classes
            .insert((entry.namespace.clone(), entry.name.clone()), entry);
    }
}

/// Renders `function name(a, b = 1, ...)` for hovers.
fn entry_signature(def: &FunctionDef, name: &Ident) -> String {
    let mut parts = Vec::new();
    for p in &def.params {
        if p.vararg {
            parts.push("...".to_string());
        } else if p.default.is_some() {
            parts.push(format!("{} = …", p.name.name));
        } else if p.by_ref {
            parts.push(format!("&{}", p.name.name));
        } else {
            parts.push(p.name.name.clone());
        }
    }
    let mut modifiers = String::new();
    if def.private {
        modifiers.push_str("private ");
    }
    if def.autoexec {
        modifiers.push_str("autoexec ");
    }
    format!("{}function {}({})", modifiers, name.name, parts.join(", "))
}

fn render_function_hover(signature: &str, doc: Option<&str>) -> String {
    match doc {
        Some(doc) if !doc.is_empty() => format!("```gsc\n{signature}\n```\n\n---\n\n{doc}"),
        _ => format!("```gsc\n{signature}\n```"),
    }
}
