//! Forward data-flow analysis over control-flow graphs.
//!
//! A worklist iterates each function's CFG to a fixpoint. The state at a
//! node is a [`SymbolTable`]; the in-state is the join of predecessor
//! out-states filtered by `scope ≤ node.scope`, and two states are equal iff
//! every key maps to the same abstract value. The [`ScrData`] lattice is
//! finite-height, so the iteration terminates.
//!
//! Diagnostics and sense tokens are suppressed during iteration and emitted
//! in a single reporting pass once the fixpoint is reached, so editor
//! decorations never reflect an intermediate state.

use std::collections::VecDeque;

use gscls_base::Span;

use crate::api::{ApiStore, ScrFunction};
use crate::ast::*;
use crate::cfg::{CfgNodeId, CfgNodeKind, ControlFlowGraph};
use crate::diag::{DiagCode, Diagnostic};
use crate::scr::{
    is_builtin_global, is_reserved, FunctionHandle, ScrData, ScrVariable, SymbolTable, VarOrigin,
};
use crate::sense::{SenseKind, SenseMap, SenseToken};
use crate::signature::{DefinitionsTable, FunctionEntry};
use crate::LanguageId;

/// Everything the transfer functions need to resolve symbols.
pub struct AnalysisContext<'a> {
    /// This file's definitions, with dependency exports already merged in.
    pub defs: &'a DefinitionsTable,
    pub api: Option<&'a ApiStore>,
    pub language: LanguageId,
    pub uri: &'a str,
    /// Namespace active at the function being analysed (lowercased).
    pub namespace: String,
    /// Enclosing class for methods (lowercased).
    pub class: Option<String>,
}

pub struct DataFlowOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub senses: SenseMap,
}

/// Analyses one function (or method/constructor/destructor) body.
pub fn analyze_function(
    graph: &ControlFlowGraph,
    params: &[Param],
    ctx: &AnalysisContext,
) -> DataFlowOutput {
    let mut initial = SymbolTable::with_globals();
    for param in params {
        if param.vararg {
            continue;
        }
        initial.bind(ScrVariable {
            name: param.name.name.clone(),
            data: ScrData::Any,
            lexical_scope: 1,
            is_constant: false,
            origin: VarOrigin::Parameter,
            span: param.name.span,
        });
    }
    run(graph, initial, ctx)
}

/// Analyses a class body graph (field initialisers).
pub fn analyze_class(graph: &ControlFlowGraph, ctx: &AnalysisContext) -> DataFlowOutput {
    run(graph, SymbolTable::with_globals(), ctx)
}

fn run(graph: &ControlFlowGraph, initial: SymbolTable, ctx: &AnalysisContext) -> DataFlowOutput {
    let mut analyzer = Analyzer {
        ctx,
        diagnostics: Vec::new(),
        senses: SenseMap::new(),
        emit: false,
        cur_scope: 1,
        reserved_args: false,
    };

    let mut out_states: Vec<Option<SymbolTable>> = vec![None; graph.node_count()];
    let mut worklist: VecDeque<CfgNodeId> = VecDeque::new();
    worklist.push_back(graph.entry);

    // Change-driven iteration. The lattice is finite-height, so this
    // terminates; the pass budget is a backstop against transfer bugs.
    let budget = graph.node_count() * 64 + 256;
    let mut steps = 0usize;
    while let Some(id) = worklist.pop_front() {
        steps += 1;
        if steps > budget {
            log::warn!("data-flow fixpoint budget exhausted in {}", ctx.uri);
            break;
        }
        let in_state = in_state_for(graph, id, &out_states, &initial);
        let out = analyzer.transfer(graph, id, in_state);
        if out_states[id.index()].as_ref() != Some(&out) {
            out_states[id.index()] = Some(out);
            for &succ in &graph.node(id).outgoing {
                if !worklist.contains(&succ) {
                    worklist.push_back(succ);
                }
            }
        }
    }

    // Reporting pass over the stable states.
    analyzer.emit = true;
    for id in graph.ids() {
        if out_states[id.index()].is_none() && id != graph.entry {
            continue; // unreachable from entry
        }
        let in_state = in_state_for(graph, id, &out_states, &initial);
        analyzer.transfer(graph, id, in_state);
    }

    DataFlowOutput {
        diagnostics: analyzer.diagnostics,
        senses: analyzer.senses,
    }
}

fn in_state_for(
    graph: &ControlFlowGraph,
    id: CfgNodeId,
    out_states: &[Option<SymbolTable>],
    initial: &SymbolTable,
) -> SymbolTable {
    let node = graph.node(id);
    if node.incoming.is_empty() {
        return initial.clone();
    }
    let mut joined: Option<SymbolTable> = None;
    for &pred in &node.incoming {
        let Some(pred_out) = &out_states[pred.index()] else {
            continue;
        };
        joined = Some(match joined {
            // Symbols from deeper scopes drop at merges to outer scopes.
            Some(acc) => acc.join(pred_out, node.scope),
            None => pred_out.clone(),
        });
    }
    joined.unwrap_or_else(|| initial.clone())
}

/// What an unqualified call name resolved to.
enum Resolution<'a> {
    Reserved,
    Script(&'a FunctionEntry),
    Api(&'a ScrFunction),
}

struct Analyzer<'a> {
    ctx: &'a AnalysisContext<'a>,
    diagnostics: Vec<Diagnostic>,
    senses: SenseMap,
    /// False during fixpoint iteration; true for the reporting pass.
    emit: bool,
    cur_scope: u32,
    /// Inside the argument list of a reserved pseudo-function, unbound
    /// identifiers are not an error.
    reserved_args: bool,
}

impl<'a> Analyzer<'a> {
    fn diag(&mut self, code: DiagCode, span: Span, args: &[&str]) {
        if self.emit {
            self.diagnostics.push(Diagnostic::new(code, span, args));
        }
    }

    fn sense(&mut self, sense: SenseToken) {
        if self.emit {
            self.senses.attach(sense);
        }
    }

    fn transfer(
        &mut self,
        graph: &ControlFlowGraph,
        id: CfgNodeId,
        mut state: SymbolTable,
    ) -> SymbolTable {
        let node = graph.node(id);
        self.cur_scope = node.scope;
        match &node.kind {
            CfgNodeKind::FunctionEntry
            | CfgNodeKind::FunctionExit
            | CfgNodeKind::ClassEntry
            | CfgNodeKind::ClassExit => {}
            CfgNodeKind::ClassMembersBlock { fields } => {
                for (_, init) in fields {
                    if let Some(init) = init {
                        self.eval_expr(init, &mut state);
                    }
                }
            }
            CfgNodeKind::BasicBlock { statements } => {
                for stmt in statements {
                    self.eval_stmt(stmt, &mut state);
                }
            }
            CfgNodeKind::Decision { condition, .. } => {
                self.eval_expr(condition, &mut state);
            }
            CfgNodeKind::Iteration {
                init,
                condition,
                increment,
                ..
            } => {
                if let Some(init) = init {
                    self.eval_stmt(init, &mut state);
                }
                if let Some(condition) = condition {
                    self.eval_expr(condition, &mut state);
                }
                if let Some(increment) = increment {
                    self.eval_stmt(increment, &mut state);
                }
            }
            CfgNodeKind::Enumeration {
                key,
                value,
                iterable,
                ..
            } => {
                self.eval_expr(iterable, &mut state);
                if let Some(key) = key {
                    state.bind(ScrVariable {
                        name: key.name.clone(),
                        data: ScrData::Any,
                        lexical_scope: node.scope,
                        is_constant: false,
                        origin: VarOrigin::IterationVariable,
                        span: key.span,
                    });
                    self.sense(
                        SenseToken::new(key.span, SenseKind::Variable).declaration(),
                    );
                }
                state.bind(ScrVariable {
                    name: value.name.clone(),
                    data: ScrData::Any,
                    lexical_scope: node.scope,
                    is_constant: false,
                    origin: VarOrigin::IterationVariable,
                    span: value.span,
                });
                self.sense(SenseToken::new(value.span, SenseKind::Variable).declaration());
            }
            CfgNodeKind::Switch { subject, .. } => {
                self.eval_expr(subject, &mut state);
            }
            CfgNodeKind::SwitchCaseDecision { labels, .. } => {
                for label in labels {
                    if let CaseLabel::Expr { expr, .. } = label {
                        self.eval_expr(expr, &mut state);
                    }
                }
            }
        }
        state
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn eval_stmt(&mut self, stmt: &Stmt, state: &mut SymbolTable) {
        match stmt {
            Stmt::Expr { expr, .. } => {
                self.eval_expr(expr, state);
            }
            Stmt::Const { name, value, span } => {
                let data = self.eval_expr(value, state);
                if state.contains(&name.name) || is_reserved(&name.name) {
                    self.diag(DiagCode::RedefinitionOfSymbol, name.span, &[&name.name]);
                }
                state.bind(ScrVariable {
                    name: name.name.clone(),
                    data,
                    lexical_scope: self.cur_scope,
                    is_constant: true,
                    origin: VarOrigin::Constant,
                    span: *span,
                });
                self.sense(
                    SenseToken::new(name.span, SenseKind::Constant).declaration(),
                );
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.eval_expr(value, state);
                }
            }
            Stmt::Wait { duration, span } | Stmt::WaitRealtime { duration, span } => {
                let data = self.eval_expr(duration, state);
                if let Some(v) = data.known_number() {
                    if v <= 0.0 {
                        self.diag(DiagCode::CannotWaitNegativeDuration, *span, &[]);
                    } else if v < self.ctx.language.vm_refresh_period() {
                        let rounded = format!("{}", self.ctx.language.vm_refresh_period());
                        self.diag(DiagCode::BelowVmRefreshRate, *span, &[&rounded]);
                    }
                }
            }
            Stmt::WaittillFrameEnd { .. }
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Empty { .. } => {}
            // Control flow lives in its own CFG nodes; a stray nested
            // statement is still evaluated defensively.
            other => {
                if let Stmt::Block { body, .. } | Stmt::DevBlock { body, .. } = other {
                    for stmt in body {
                        self.eval_stmt(stmt, state);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_expr(&mut self, expr: &Expr, state: &mut SymbolTable) -> ScrData {
        match expr {
            Expr::Literal { kind, span, .. } => self.eval_literal(kind, *span),
            Expr::Identifier { name, span } => self.eval_identifier(name, *span, state),
            Expr::AnimRef { .. } => ScrData::Any,
            Expr::EmptyArray { .. } => ScrData::Array,
            Expr::Vector { components, span: _ } => {
                for component in components {
                    self.eval_expr(component, state);
                }
                ScrData::Vector
            }
            Expr::FunctionPtr {
                namespace,
                name,
                span,
            } => self.eval_function_ptr(namespace.as_ref(), name, *span),
            Expr::NamespacedRef {
                namespace, name, ..
            } => self.resolve_namespaced(namespace, name),
            Expr::Binary { op, lhs, rhs, span } => {
                let l = self.eval_expr(lhs, state);
                let r = self.eval_expr(rhs, state);
                self.check_binary(*op, &l, &r, *span)
            }
            Expr::Unary { op, operand, span } => self.eval_unary(*op, operand, *span, state),
            Expr::Increment { target, span, .. } => {
                if !target.is_assignable() {
                    self.diag(DiagCode::InvalidAssignmentTarget, *span, &[]);
                    return ScrData::Int(None);
                }
                if let Expr::Identifier { name, span: id_span } = target.as_ref() {
                    match state.get(name) {
                        Some(var) if var.is_constant => {
                            let shown = var.name.clone();
                            self.diag(DiagCode::CannotAssignToConstant, *id_span, &[&shown]);
                        }
                        Some(_) => {}
                        None => self.diag(DiagCode::NotDefined, *id_span, &[name]),
                    }
                } else {
                    self.eval_expr(target, state);
                }
                ScrData::Int(None)
            }
            Expr::Assign {
                target,
                op,
                value,
                span,
            } => self.eval_assign(target, *op, value, *span, state),
            Expr::Call(call) => self.eval_call(call, state),
            Expr::Thread { operand, span } => {
                self.diag(DiagCode::InvalidThreadCall, *span, &[]);
                self.eval_expr(operand, state);
                ScrData::Any
            }
            Expr::Member {
                object,
                property,
                span: _,
            } => {
                let obj = self.eval_expr(object, state);
                self.check_member(&obj, property);
                ScrData::Any
            }
            Expr::Index { object, index, .. } => {
                self.eval_expr(object, state);
                self.eval_expr(index, state);
                ScrData::Any
            }
            Expr::New { class, span, .. } => {
                let Some(class) = class else {
                    return ScrData::Any;
                };
                match self.ctx.defs.class(&class.name) {
                    Some(entry) => {
                        self.sense(
                            SenseToken::new(class.span, SenseKind::Class)
                                .with_definition(entry.location.uri.clone(), entry.location.span),
                        );
                        ScrData::Object {
                            class: Some(entry.name.clone()),
                        }
                    }
                    None => {
                        self.diag(DiagCode::NotDefined, *span, &[&class.name]);
                        ScrData::Object { class: None }
                    }
                }
            }
        }
    }

    fn eval_literal(&mut self, kind: &LitKind, span: Span) -> ScrData {
        match kind {
            LitKind::Int(v) => {
                if *v > i32::MAX as i64 {
                    self.diag(DiagCode::IntegerTooLarge, span, &[]);
                    ScrData::Int(None)
                } else if *v < i32::MIN as i64 {
                    self.diag(DiagCode::IntegerTooSmall, span, &[]);
                    ScrData::Int(None)
                } else {
                    ScrData::Int(Some(*v))
                }
            }
            LitKind::Float(v) => ScrData::Float(Some(*v)),
            LitKind::String => ScrData::String(None),
            LitKind::IString | LitKind::HashString => ScrData::String(None),
            LitKind::Bool(b) => ScrData::Bool(Some(*b)),
            LitKind::Undefined => ScrData::Undefined,
        }
    }

    fn eval_identifier(&mut self, name: &str, span: Span, state: &mut SymbolTable) -> ScrData {
        if name.is_empty() {
            return ScrData::Any; // parser placeholder, already reported
        }
        if is_reserved(name) {
            return ScrData::Function { target: None };
        }
        match state.get(name) {
            Some(var) => {
                let kind = if var.is_constant {
                    SenseKind::Constant
                } else {
                    SenseKind::Variable
                };
                let hover = format!("```gsc\n{}: {}\n```", var.name, var.data.type_name());
                let def_span = var.span;
                let data = var.data.copy();
                self.sense(
                    SenseToken::new(span, kind)
                        .with_hover(hover)
                        .with_definition(self.ctx.uri, def_span),
                );
                data
            }
            None => {
                if !self.reserved_args {
                    self.diag(DiagCode::NotDefined, span, &[name]);
                }
                ScrData::Any
            }
        }
    }

    fn eval_function_ptr(
        &mut self,
        namespace: Option<&Ident>,
        name: &Ident,
        span: Span,
    ) -> ScrData {
        let entry = match namespace {
            Some(ns) => {
                if !self.ctx.defs.is_namespace(&ns.name) && ns.name.to_ascii_lowercase() != "sys" {
                    self.diag(DiagCode::UnknownNamespace, ns.span, &[&ns.name]);
                    return ScrData::Function { target: None };
                }
                self.ctx.defs.function(&ns.name, &name.name)
            }
            None => self.lookup_script_function(&name.name),
        };
        match entry {
            Some(entry) => {
                self.sense(
                    SenseToken::new(name.span, SenseKind::Function)
                        .with_definition(entry.location.uri.clone(), entry.location.span),
                );
                ScrData::Function {
                    target: Some(FunctionHandle {
                        namespace: entry.namespace.clone(),
                        name: entry.name.clone(),
                    }),
                }
            }
            None => {
                if namespace.is_none()
                    && self
                        .ctx
                        .api
                        .is_some_and(|api| api.function(self.ctx.language, &name.name).is_some())
                {
                    return ScrData::Function { target: None };
                }
                self.diag(DiagCode::NotDefined, span, &[&name.name]);
                ScrData::Function { target: None }
            }
        }
    }

    fn eval_unary(
        &mut self,
        op: UnOp,
        operand: &Expr,
        span: Span,
        state: &mut SymbolTable,
    ) -> ScrData {
        // `-literal` range-checks the negated value, so i32::MIN is legal.
        if op == UnOp::Neg {
            if let Expr::Literal {
                kind: LitKind::Int(v),
                span: lit_span,
                ..
            } = operand
            {
                let negated = -*v;
                if negated < i32::MIN as i64 {
                    self.diag(DiagCode::IntegerTooSmall, *lit_span, &[]);
                    return ScrData::Int(None);
                }
                return ScrData::Int(Some(negated));
            }
        }
        let data = self.eval_expr(operand, state);
        match op {
            UnOp::Neg => match &data {
                ScrData::Int(v) => ScrData::Int(v.map(|v| -v)),
                ScrData::Float(v) => ScrData::Float(v.map(|v| -v)),
                ScrData::Vector | ScrData::Any | ScrData::Undefined => ScrData::Any,
                other => {
                    let shown = other.type_name();
                    self.diag(DiagCode::OperatorNotSupportedOn, span, &["-", shown]);
                    ScrData::Any
                }
            },
            UnOp::Not => ScrData::Bool(None),
            UnOp::BitNot => match &data {
                ScrData::Int(v) => ScrData::Int(v.map(|v| !v)),
                ScrData::Any | ScrData::Undefined => ScrData::Int(None),
                other => {
                    let shown = other.type_name();
                    self.diag(DiagCode::OperatorNotSupportedOn, span, &["~", shown]);
                    ScrData::Int(None)
                }
            },
        }
    }

    fn eval_assign(
        &mut self,
        target: &Expr,
        op: Option<BinOp>,
        value: &Expr,
        span: Span,
        state: &mut SymbolTable,
    ) -> ScrData {
        let value_data = self.eval_expr(value, state);

        if let Expr::Call(call) = value {
            if call.thread {
                self.diag(DiagCode::AssignOnThreadedFunction, span, &[]);
            }
        }

        match target {
            Expr::Identifier { name, span: target_span } => {
                if is_reserved(name) {
                    self.diag(DiagCode::RedefinitionOfSymbol, *target_span, &[name]);
                    return value_data;
                }
                let new_data = match (op, state.get(name)) {
                    (Some(op), Some(var)) => {
                        let current = var.data.clone();
                        self.check_binary(op, &current, &value_data, span)
                    }
                    (Some(op), None) => {
                        self.diag(DiagCode::NotDefined, *target_span, &[name]);
                        self.check_binary(op, &ScrData::Any, &value_data, span)
                    }
                    (None, _) => value_data.copy(),
                };
                if let Some(var) = state.get(name) {
                    if var.is_constant {
                        let shown = var.name.clone();
                        self.diag(DiagCode::CannotAssignToConstant, *target_span, &[&shown]);
                        return new_data;
                    }
                }
                let declaration = !state.contains(name) && !is_builtin_global(name);
                state.bind(ScrVariable {
                    name: name.clone(),
                    data: new_data.copy(),
                    lexical_scope: if is_builtin_global(name) {
                        0
                    } else {
                        self.cur_scope
                    },
                    is_constant: false,
                    origin: VarOrigin::Assignment,
                    span: *target_span,
                });
                let mut sense = SenseToken::new(*target_span, SenseKind::Variable).with_hover(
                    format!("```gsc\n{}: {}\n```", name, new_data.type_name()),
                );
                if declaration {
                    sense = sense.declaration();
                }
                self.sense(sense);
                new_data
            }
            Expr::Member {
                object, property, ..
            } => {
                let obj = self.eval_expr(object, state);
                self.check_member(&obj, property);
                value_data
            }
            Expr::Index { object, index, .. } => {
                self.eval_expr(object, state);
                self.eval_expr(index, state);
                value_data
            }
            other => {
                self.diag(DiagCode::InvalidAssignmentTarget, other.span(), &[]);
                value_data
            }
        }
    }

    /// Member access against a known class instance accepts declared
    /// members only; anything else is dynamic.
    fn check_member(&mut self, object: &ScrData, property: &Ident) {
        let ScrData::Object {
            class: Some(class_name),
        } = object
        else {
            return;
        };
        let prop = property.name.to_ascii_lowercase();
        // Walk the inheritance chain at lookup time; method tables are not
        // precomputed so late-loaded parents still work.
        let mut current = Some(class_name.clone());
        let mut hops = 0;
        while let Some(name) = current {
            let Some(entry) = self.ctx.defs.class(&name) else {
                return; // unknown ancestor: give up, stay dynamic
            };
            if entry.fields.contains(&prop) || entry.methods.contains(&prop) {
                return;
            }
            current = entry.inherits_from.clone();
            hops += 1;
            if hops > 32 {
                return; // inheritance cycle; bail out quietly
            }
        }
        self.diag(
            DiagCode::DoesNotContainMember,
            property.span,
            &[class_name, &property.name],
        );
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn eval_call(&mut self, call: &CallExpr, state: &mut SymbolTable) -> ScrData {
        if let Some(receiver) = &call.called_on {
            self.eval_expr(receiver, state);
        }

        match &call.callee {
            Expr::Identifier { name, span } => {
                let resolution = self.resolve_unqualified(name);
                match resolution {
                    Some(Resolution::Reserved) => {
                        let was = self.reserved_args;
                        self.reserved_args = true;
                        for arg in &call.args {
                            self.eval_expr(arg, state);
                        }
                        self.reserved_args = was;
                        return reserved_return(name);
                    }
                    Some(Resolution::Script(entry)) => {
                        let entry = entry.clone();
                        self.check_arity(&entry, call);
                        let hover = entry.doc.clone().unwrap_or_else(|| {
                            format!("```gsc\nfunction {}(…)\n```", entry.display_name)
                        });
                        self.sense(
                            SenseToken::new(*span, SenseKind::Function)
                                .with_hover(hover)
                                .with_definition(
                                    entry.location.uri.clone(),
                                    entry.location.span,
                                ),
                        );
                    }
                    Some(Resolution::Api(function)) => {
                        let (min, max) = function.arity_bounds();
                        let markdown = function.to_markdown();
                        let display = function.name.clone();
                        self.check_api_arity(&display, min, max, call);
                        self.sense(
                            SenseToken::new(*span, SenseKind::Function).with_hover(markdown),
                        );
                    }
                    None => {
                        if !name.is_empty() {
                            self.diag(DiagCode::NotDefined, *span, &[name]);
                        }
                    }
                }
            }
            Expr::NamespacedRef {
                namespace,
                name,
                span,
            } => {
                self.resolve_namespaced_call(namespace, name, *span, call);
            }
            other => {
                // Pointer or member call: evaluate the callee expression.
                self.eval_expr(other, state);
            }
        }

        for arg in &call.args {
            self.eval_expr(arg, state);
        }
        ScrData::Any
    }

    /// Resolves `ns::f(…)` in call position.
    fn resolve_namespaced_call(
        &mut self,
        namespace: &Ident,
        name: &Ident,
        span: Span,
        call: &CallExpr,
    ) {
        let ns_lower = namespace.name.to_ascii_lowercase();
        if ns_lower == "sys" {
            // `sys::` always resolves as a namespace.
            if let Some(function) = self
                .ctx
                .api
                .and_then(|api| api.function(self.ctx.language, &name.name))
            {
                let (min, max) = function.arity_bounds();
                let markdown = function.to_markdown();
                let display = function.name.clone();
                self.check_api_arity(&display, min, max, call);
                self.sense(SenseToken::new(name.span, SenseKind::Function).with_hover(markdown));
            } else {
                self.diag(DiagCode::NotDefined, name.span, &[&name.name]);
            }
            return;
        }

        let known_namespace =
            self.ctx.defs.is_namespace(&ns_lower) || self.ctx.defs.class(&ns_lower).is_some();
        if !known_namespace {
            self.diag(DiagCode::UnknownNamespace, namespace.span, &[&namespace.name]);
            return;
        }
        self.sense(SenseToken::new(namespace.span, SenseKind::Namespace));

        match self.ctx.defs.function(&ns_lower, &name.name) {
            Some(entry) => {
                let entry = entry.clone();
                self.check_arity(&entry, call);
                self.sense(
                    SenseToken::new(name.span, SenseKind::Function)
                        .with_definition(entry.location.uri.clone(), entry.location.span),
                );
            }
            None => {
                self.diag(DiagCode::NotDefined, span, &[&name.name]);
            }
        }
    }

    /// `ns::name` in value position.
    fn resolve_namespaced(&mut self, namespace: &Ident, name: &Ident) -> ScrData {
        let ns_lower = namespace.name.to_ascii_lowercase();
        if ns_lower != "sys"
            && !self.ctx.defs.is_namespace(&ns_lower)
            && self.ctx.defs.class(&ns_lower).is_none()
        {
            self.diag(DiagCode::UnknownNamespace, namespace.span, &[&namespace.name]);
            return ScrData::Any;
        }
        match self.ctx.defs.function(&ns_lower, &name.name) {
            Some(entry) => ScrData::Function {
                target: Some(FunctionHandle {
                    namespace: entry.namespace.clone(),
                    name: entry.name.clone(),
                }),
            },
            None => ScrData::Function { target: None },
        }
    }

    /// Lookup precedence for an unqualified call name; see the symbol
    /// resolution rules in the crate docs.
    fn resolve_unqualified(&self, name: &str) -> Option<Resolution<'a>> {
        if name.is_empty() {
            return None;
        }
        if is_reserved(name) {
            return Some(Resolution::Reserved);
        }
        // Methods of the enclosing class and its ancestors.
        if let Some(class) = &self.ctx.class {
            let mut current = Some(class.clone());
            let mut hops = 0;
            while let Some(class_name) = current {
                if let Some(entry) = self.ctx.defs.function(&class_name, name) {
                    return Some(Resolution::Script(entry));
                }
                current = self
                    .ctx
                    .defs
                    .class(&class_name)
                    .and_then(|c| c.inherits_from.clone());
                hops += 1;
                if hops > 32 {
                    break;
                }
            }
        }
        if let Some(entry) = self.lookup_script_function(name) {
            return Some(Resolution::Script(entry));
        }
        if let Some(function) = self
            .ctx
            .api
            .and_then(|api| api.function(self.ctx.language, name))
        {
            return Some(Resolution::Api(function));
        }
        None
    }

    /// Current namespace first, then any namespace (which also serves as
    /// the wrong-arity fallback: the entry comes back regardless, and the
    /// arity check fires at the call site).
    fn lookup_script_function(&self, name: &str) -> Option<&'a FunctionEntry> {
        self.ctx
            .defs
            .function(&self.ctx.namespace, name)
            .or_else(|| self.ctx.defs.function_any_namespace(name))
    }

    fn check_arity(&mut self, entry: &FunctionEntry, call: &CallExpr) {
        let supplied = call.args.len();
        if supplied > entry.max_args {
            let max = entry.max_args.to_string();
            self.diag(
                DiagCode::TooManyArguments,
                call.span,
                &[&entry.display_name, &max],
            );
        } else if supplied < entry.min_args {
            let min = entry.min_args.to_string();
            self.diag(
                DiagCode::TooFewArguments,
                call.span,
                &[&entry.display_name, &min],
            );
        }
    }

    /// Built-in signatures are known-imperfect, so arity mismatches on API
    /// functions only warn.
    fn check_api_arity(&mut self, name: &str, min: usize, max: usize, call: &CallExpr) {
        let supplied = call.args.len();
        if supplied > max {
            let max = max.to_string();
            self.diag(DiagCode::TooManyArgumentsUnverified, call.span, &[name, &max]);
        } else if supplied < min {
            let min = min.to_string();
            self.diag(DiagCode::TooFewArgumentsUnverified, call.span, &[name, &min]);
        }
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn check_binary(&mut self, op: BinOp, l: &ScrData, r: &ScrData, span: Span) -> ScrData {
        use BinOp::*;
        // Unknown operands opt out of checking.
        let lenient = matches!(l, ScrData::Any | ScrData::Undefined)
            || matches!(r, ScrData::Any | ScrData::Undefined);

        match op {
            And | Or => ScrData::Bool(None),
            Eq | Ne | Identity | NotIdentity => ScrData::Bool(None),
            Lt | Gt | Le | Ge => {
                if !lenient && !(l.is_numeric() && r.is_numeric()) {
                    self.report_binary(op, l, r, span);
                }
                ScrData::Bool(None)
            }
            BitAnd | BitOr | BitXor | ShiftLeft | ShiftRight => {
                if !lenient
                    && !(matches!(l, ScrData::Int(_)) && matches!(r, ScrData::Int(_)))
                {
                    self.report_binary(op, l, r, span);
                }
                ScrData::Int(None)
            }
            Add => {
                if lenient {
                    return ScrData::Any;
                }
                match (l, r) {
                    // String concatenation accepts strings and numbers.
                    (ScrData::String(_), ScrData::String(_) | ScrData::Int(_) | ScrData::Float(_))
                    | (ScrData::Int(_) | ScrData::Float(_), ScrData::String(_)) => {
                        ScrData::String(None)
                    }
                    (ScrData::Vector, ScrData::Vector) => ScrData::Vector,
                    _ if l.is_numeric() && r.is_numeric() => self.numeric_result(op, l, r, span),
                    _ => {
                        self.report_binary(op, l, r, span);
                        ScrData::Any
                    }
                }
            }
            Sub => {
                if lenient {
                    return ScrData::Any;
                }
                match (l, r) {
                    (ScrData::Vector, ScrData::Vector) => ScrData::Vector,
                    _ if l.is_numeric() && r.is_numeric() => self.numeric_result(op, l, r, span),
                    _ => {
                        self.report_binary(op, l, r, span);
                        ScrData::Any
                    }
                }
            }
            Mul => {
                if lenient {
                    return ScrData::Any;
                }
                match (l, r) {
                    (ScrData::Vector, v) | (v, ScrData::Vector) if v.is_numeric() => {
                        ScrData::Vector
                    }
                    _ if l.is_numeric() && r.is_numeric() => self.numeric_result(op, l, r, span),
                    _ => {
                        self.report_binary(op, l, r, span);
                        ScrData::Any
                    }
                }
            }
            Div => {
                if r.known_number() == Some(0.0) {
                    self.diag(DiagCode::DivisionByZero, span, &[]);
                    return ScrData::Any;
                }
                if lenient {
                    return ScrData::Any;
                }
                if l.is_numeric() && r.is_numeric() {
                    self.numeric_result(op, l, r, span)
                } else {
                    self.report_binary(op, l, r, span);
                    ScrData::Any
                }
            }
            Mod => {
                if r.known_number() == Some(0.0) {
                    self.diag(DiagCode::DivisionByZero, span, &[]);
                    return ScrData::Int(None);
                }
                if !lenient
                    && !(matches!(l, ScrData::Int(_)) && matches!(r, ScrData::Int(_)))
                {
                    self.report_binary(op, l, r, span);
                }
                ScrData::Int(None)
            }
        }
    }

    fn numeric_result(&mut self, op: BinOp, l: &ScrData, r: &ScrData, _span: Span) -> ScrData {
        use BinOp::*;
        let float = matches!(l, ScrData::Float(_)) || matches!(r, ScrData::Float(_));
        if float {
            let folded = match (l.known_number(), r.known_number()) {
                (Some(a), Some(b)) => match op {
                    Add => Some(a + b),
                    Sub => Some(a - b),
                    Mul => Some(a * b),
                    Div => Some(a / b),
                    _ => None,
                },
                _ => None,
            };
            ScrData::Float(folded)
        } else {
            let folded = match (l, r) {
                (ScrData::Int(Some(a)), ScrData::Int(Some(b))) => match op {
                    Add => a.checked_add(*b),
                    Sub => a.checked_sub(*b),
                    Mul => a.checked_mul(*b),
                    Div => a.checked_div(*b),
                    _ => None,
                },
                _ => None,
            };
            ScrData::Int(folded)
        }
    }

    fn report_binary(&mut self, op: BinOp, l: &ScrData, r: &ScrData, span: Span) {
        self.diag(
            DiagCode::OperatorNotSupportedOnTypes,
            span,
            &[op.symbol(), l.type_name(), r.type_name()],
        );
    }
}

/// Result value of a reserved pseudo-function.
fn reserved_return(name: &str) -> ScrData {
    match name.to_ascii_lowercase().as_str() {
        "isdefined" => ScrData::Bool(None),
        "vectorscale" => ScrData::Vector,
        _ => ScrData::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::signature::{self, ScriptResolver};
    use gscls_base::Interner;

    /// Full front half of the pipeline for one source file, then data-flow
    /// over the first function.
    fn analyze(source: &str) -> DataFlowOutput {
        analyze_with(source, None)
    }

    fn analyze_with(source: &str, api: Option<&ApiStore>) -> DataFlowOutput {
        let mut interner = Interner::new();
        let lexed = Lexer::new(source, &mut interner).tokenize();
        let parsed = Parser::new(&lexed.tokens, &interner).parse();
        let resolver = ScriptResolver::new("/nonexistent");
        let sig = signature::analyze(&parsed.ast, "file:///t.gsc", LanguageId::Gsc, &resolver);

        let function = parsed
            .ast
            .items
            .iter()
            .find_map(|item| match item {
                ScriptItem::Function(f) => Some(f),
                _ => None,
            })
            .expect("test source must define a function");

        let built = cfg::build_function(function);
        let ctx = AnalysisContext {
            defs: &sig.table,
            api,
            language: LanguageId::Gsc,
            uri: "file:///t.gsc",
            namespace: sig.table.namespace.clone(),
            class: None,
        };
        let mut out = analyze_function(&built.graph, &function.params, &ctx);
        out.diagnostics.extend(built.diagnostics);
        out
    }

    fn codes(out: &DataFlowOutput) -> Vec<DiagCode> {
        out.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn clean_function_has_no_diagnostics() {
        let out = analyze("#namespace t;\nfunction foo(a, b) { return a + b; }");
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn const_redefinition_then_const_assignment() {
        let out = analyze(
            "#namespace t;\nfunction f() { x = 1; const x = 2; x = 3; }",
        );
        let codes = codes(&out);
        assert!(
            codes.contains(&DiagCode::RedefinitionOfSymbol),
            "const after binding must be a redefinition: {:?}",
            out.diagnostics
        );
        assert!(
            codes.contains(&DiagCode::CannotAssignToConstant),
            "assignment after const must be rejected: {:?}",
            out.diagnostics
        );
    }

    #[test]
    fn undefined_variable_is_reported_once() {
        let out = analyze("#namespace t;\nfunction f() { x = missing + 1; }");
        let not_defined: Vec<_> = out
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagCode::NotDefined)
            .collect();
        assert_eq!(not_defined.len(), 1, "{:?}", out.diagnostics);
        assert!(not_defined[0].message.contains("missing"));
    }

    #[test]
    fn parameters_and_globals_resolve() {
        let out = analyze(
            "#namespace t;\nfunction f(who) { who.health = 1; level.round = 2; self.x = game; }",
        );
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn branch_merge_widens_to_join() {
        // x is an int on both paths; after the if it is still an int.
        let out = analyze(
            "#namespace t;\nfunction f(c) { if (c) { x = 1; } else { x = 2; } y = x + 1; }",
        );
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn loop_reaches_fixpoint_without_spurious_errors() {
        let out = analyze(
            "#namespace t;\nfunction f(n) { i = 0; while (i < n) { i = i + 1; } return i; }",
        );
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn division_by_known_zero() {
        let out = analyze("#namespace t;\nfunction f() { x = 1 / 0; }");
        assert!(codes(&out).contains(&DiagCode::DivisionByZero));
    }

    #[test]
    fn operator_type_mismatch_reported() {
        let out = analyze("#namespace t;\nfunction f() { x = \"s\" - 1; }");
        assert!(codes(&out).contains(&DiagCode::OperatorNotSupportedOnTypes));
    }

    #[test]
    fn string_concatenation_is_allowed() {
        let out = analyze("#namespace t;\nfunction f() { x = \"a\" + 1; y = \"b\" + \"c\"; }");
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn integer_literal_range_checks() {
        let out = analyze("#namespace t;\nfunction f() { x = 2147483648; }");
        assert!(codes(&out).contains(&DiagCode::IntegerTooLarge));

        let ok = analyze("#namespace t;\nfunction f() { x = -2147483648; }");
        assert!(
            ok.diagnostics.is_empty(),
            "i32::MIN written as a negated literal is legal: {:?}",
            ok.diagnostics
        );
    }

    #[test]
    fn wait_checks_duration() {
        let out = analyze("#namespace t;\nfunction f() { wait -1; }");
        assert!(codes(&out).contains(&DiagCode::CannotWaitNegativeDuration));

        let out = analyze("#namespace t;\nfunction f() { wait 0.01; }");
        assert!(codes(&out).contains(&DiagCode::BelowVmRefreshRate));

        let out = analyze("#namespace t;\nfunction f() { wait 0.05; }");
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn script_arity_mismatch_is_error() {
        let out = analyze(
            "#namespace t;\nfunction helper(a, b) {}\nfunction f() { helper(1); helper(1, 2, 3); }",
        );
        let codes = codes(&out);
        assert!(codes.contains(&DiagCode::TooFewArguments));
        assert!(codes.contains(&DiagCode::TooManyArguments));
    }

    #[test]
    fn api_arity_mismatch_is_warning() {
        let mut store = ApiStore::new();
        store.install(crate::api::ApiLibrary {
            language_id: "gsc".into(),
            game_id: "t7".into(),
            revision: 1,
            api: vec![serde_json::from_str(
                r#"{"name": "getplayers", "overloads": [{"parameters": [], "vararg": false}]}"#,
            )
            .unwrap()],
        });
        let out = analyze_with(
            "#namespace t;\nfunction f() { p = getplayers(1, 2); }",
            Some(&store),
        );
        assert!(codes(&out).contains(&DiagCode::TooManyArgumentsUnverified));
        assert!(!codes(&out).contains(&DiagCode::TooManyArguments));
    }

    #[test]
    fn unknown_namespace_and_sys_always_resolves() {
        let out = analyze("#namespace t;\nfunction f() { nope::thing(); }");
        assert!(codes(&out).contains(&DiagCode::UnknownNamespace));

        let mut store = ApiStore::new();
        store.install(crate::api::ApiLibrary {
            language_id: "gsc".into(),
            game_id: "t7".into(),
            revision: 1,
            api: vec![serde_json::from_str(r#"{"name": "print"}"#).unwrap()],
        });
        let out = analyze_with("#namespace t;\nfunction f() { sys::print(\"x\"); }", Some(&store));
        assert!(
            !codes(&out).contains(&DiagCode::UnknownNamespace),
            "sys:: must always resolve: {:?}",
            out.diagnostics
        );
    }

    #[test]
    fn reserved_functions_allow_untyped_arguments() {
        let out = analyze(
            "#namespace t;\nfunction f() { if (isdefined(maybe_unset)) { return; } self waittill(\"spawned\"); }",
        );
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn reserved_name_cannot_be_shadowed() {
        let out = analyze("#namespace t;\nfunction f() { waittill = 5; }");
        assert!(codes(&out).contains(&DiagCode::RedefinitionOfSymbol));
    }

    #[test]
    fn thread_requires_call() {
        let out = analyze("#namespace t;\nfunction f(x) { thread x; }");
        assert!(codes(&out).contains(&DiagCode::InvalidThreadCall));
    }

    #[test]
    fn assigning_threaded_call_warns() {
        let out = analyze(
            "#namespace t;\nfunction g() {}\nfunction f() { r = thread g(); }",
        );
        assert!(codes(&out).contains(&DiagCode::AssignOnThreadedFunction));
    }

    #[test]
    fn invalid_assignment_target() {
        let out = analyze("#namespace t;\nfunction g() {}\nfunction f() { g() = 5; }");
        assert!(codes(&out).contains(&DiagCode::InvalidAssignmentTarget));
    }

    #[test]
    fn class_member_access_checked_for_known_instances() {
        let source = "#namespace t;\nclass Dog { var name; function bark() {} }\nfunction f() { d = new Dog(); d.name = \"rex\"; d.bark(); d.age = 3; }";
        let mut interner = Interner::new();
        let lexed = Lexer::new(source, &mut interner).tokenize();
        let parsed = Parser::new(&lexed.tokens, &interner).parse();
        let resolver = ScriptResolver::new("/nonexistent");
        let sig = signature::analyze(&parsed.ast, "file:///t.gsc", LanguageId::Gsc, &resolver);
        let function = parsed
            .ast
            .items
            .iter()
            .find_map(|item| match item {
                ScriptItem::Function(f) if f.name.as_ref().map(|n| n.name.as_str()) == Some("f") => {
                    Some(f)
                }
                _ => None,
            })
            .unwrap();
        let built = cfg::build_function(function);
        let ctx = AnalysisContext {
            defs: &sig.table,
            api: None,
            language: LanguageId::Gsc,
            uri: "file:///t.gsc",
            namespace: sig.table.namespace.clone(),
            class: None,
        };
        let out = analyze_function(&built.graph, &function.params, &ctx);
        let member_errors: Vec<_> = out
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagCode::DoesNotContainMember)
            .collect();
        assert_eq!(member_errors.len(), 1, "{:?}", out.diagnostics);
        assert!(member_errors[0].message.contains("age"));
    }

    #[test]
    fn senses_reflect_final_state_only() {
        // During iteration x is first Int(1); at the fixpoint of the loop it
        // widens. The sense must carry the final, widened type.
        let out = analyze(
            "#namespace t;\nfunction f(n) { x = 1; while (x < n) { x = x + 1; } }",
        );
        let sense = out
            .senses
            .iter()
            .filter(|s| s.kind == SenseKind::Variable)
            .find(|s| s.hover.as_deref().is_some_and(|h| h.contains("x:")))
            .expect("x should have a sense");
        assert!(
            sense.hover.as_deref().unwrap().contains("int"),
            "hover: {:?}",
            sense.hover
        );
    }

    #[test]
    fn fixpoint_out_states_are_stable() {
        // Re-running transfer over the fixpoint must not add diagnostics
        // beyond the reporting pass (i.e. the analysis is deterministic).
        let source = "#namespace t;\nfunction f(n) { t = 0; for (i = 0; i < n; i++) { t = t + i; } return t; }";
        let a = analyze(source);
        let b = analyze(source);
        assert_eq!(codes(&a), codes(&b));
        assert!(a.diagnostics.is_empty(), "{:?}", a.diagnostics);
    }
}
