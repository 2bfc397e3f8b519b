//! Control-flow graph construction.
//!
//! Nodes live in a per-function arena (`Vec<CfgNode>`) addressed by
//! [`CfgNodeId`]; edges are index lists kept symmetric by [`ControlFlowGraph::connect`]
//! and [`ControlFlowGraph::disconnect`]. Loop back-edges are plain indices, so
//! dropping the graph drops everything.
//!
//! Construction threads a [`Targets`] record through the recursion:
//! `ret` (where `return` jumps), `cont` (innermost loop's continuation),
//! `brk` (innermost loop's or switch's exit) and `continuation` (where
//! straight-line code falls through). Each construct builds its continuation
//! first, so successors exist before predecessors are wired.
//!
//! Scope depth distinguishes only class body (0) from method body (1):
//! the scripting language has no lexical scoping inside functions, so
//! function-local brace blocks do not deepen the scope.

use gscls_base::Span;

use crate::ast::*;
use crate::diag::{DiagCode, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CfgNodeId(usize);

impl CfgNodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum CfgNodeKind {
    FunctionEntry,
    FunctionExit,
    ClassEntry,
    ClassExit,
    /// Field declarations of a class body, analysed once per class.
    ClassMembersBlock {
        fields: Vec<(Ident, Option<Expr>)>,
    },
    /// Maximal run of statements with no control flow.
    BasicBlock {
        statements: Vec<Stmt>,
    },
    /// `if`/`while`/`do-while` condition. Outgoing edge 0 is the true
    /// branch, edge 1 the false branch.
    Decision {
        condition: Expr,
        span: Span,
    },
    /// `for` head; the increment runs on the back-edge.
    Iteration {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        increment: Option<Box<Stmt>>,
        span: Span,
    },
    /// `foreach` head.
    Enumeration {
        key: Option<Ident>,
        value: Ident,
        iterable: Expr,
        span: Span,
    },
    /// `switch` head; its single outgoing edge is the first case decision
    /// (or the continuation when the switch is empty).
    Switch {
        subject: Expr,
        span: Span,
    },
    /// One case group; edge 0 (true) enters the body, edge 1 (false) the
    /// next case decision or the unmatched target.
    SwitchCaseDecision {
        labels: Vec<CaseLabel>,
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub struct CfgNode {
    pub kind: CfgNodeKind,
    pub scope: u32,
    pub incoming: Vec<CfgNodeId>,
    pub outgoing: Vec<CfgNodeId>,
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    nodes: Vec<CfgNode>,
    pub entry: CfgNodeId,
    pub exit: CfgNodeId,
}

impl ControlFlowGraph {
    fn with_sentinels(entry_kind: CfgNodeKind, exit_kind: CfgNodeKind, scope: u32) -> Self {
        let nodes = vec![
            CfgNode {
                kind: entry_kind,
                scope,
                incoming: Vec::new(),
                outgoing: Vec::new(),
            },
            CfgNode {
                kind: exit_kind,
                scope,
                incoming: Vec::new(),
                outgoing: Vec::new(),
            },
        ];
        ControlFlowGraph {
            nodes,
            entry: CfgNodeId(0),
            exit: CfgNodeId(1),
        }
    }

    pub fn add_node(&mut self, kind: CfgNodeKind, scope: u32) -> CfgNodeId {
        let id = CfgNodeId(self.nodes.len());
        self.nodes.push(CfgNode {
            kind,
            scope,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = CfgNodeId> {
        (0..self.nodes.len()).map(CfgNodeId)
    }

    /// Wires `from → to`, updating both edge lists.
    pub fn connect(&mut self, from: CfgNodeId, to: CfgNodeId) {
        self.nodes[from.0].outgoing.push(to);
        self.nodes[to.0].incoming.push(from);
    }

    /// Removes one `from → to` edge from both sides. Inverse of [`Self::connect`].
    pub fn disconnect(&mut self, from: CfgNodeId, to: CfgNodeId) {
        if let Some(pos) = self.nodes[from.0].outgoing.iter().position(|&n| n == to) {
            self.nodes[from.0].outgoing.remove(pos);
        }
        if let Some(pos) = self.nodes[to.0].incoming.iter().position(|&n| n == from) {
            self.nodes[to.0].incoming.remove(pos);
        }
    }
}

/// Jump targets threaded through construction.
#[derive(Clone, Copy)]
struct Targets {
    ret: CfgNodeId,
    brk: Option<CfgNodeId>,
    cont: Option<CfgNodeId>,
    continuation: CfgNodeId,
}

pub struct CfgOutput {
    pub graph: ControlFlowGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Builds the CFG for a function, method, constructor or destructor body.
pub fn build_function(def: &FunctionDef) -> CfgOutput {
    let mut builder = Builder {
        graph: ControlFlowGraph::with_sentinels(
            CfgNodeKind::FunctionEntry,
            CfgNodeKind::FunctionExit,
            1,
        ),
        diagnostics: Vec::new(),
        scope: 1,
    };
    let exit = builder.graph.exit;
    let entry = builder.graph.entry;
    let body_entry = builder.construct_sequence(
        &def.body,
        Targets {
            ret: exit,
            brk: None,
            cont: None,
            continuation: exit,
        },
    );
    builder.graph.connect(entry, body_entry);
    CfgOutput {
        graph: builder.graph,
        diagnostics: builder.diagnostics,
    }
}

/// Builds the CFG for a class body: entry → members block → exit. Methods
/// get their own function graphs.
pub fn build_class(def: &ClassDef) -> CfgOutput {
    let mut graph =
        ControlFlowGraph::with_sentinels(CfgNodeKind::ClassEntry, CfgNodeKind::ClassExit, 0);
    let fields: Vec<(Ident, Option<Expr>)> = def
        .members
        .iter()
        .filter_map(|m| match m {
            ClassMember::Field { name, init, .. } => Some((name.clone(), init.clone())),
            _ => None,
        })
        .collect();
    let members = graph.add_node(CfgNodeKind::ClassMembersBlock { fields }, 0);
    let entry = graph.entry;
    let exit = graph.exit;
    graph.connect(entry, members);
    graph.connect(members, exit);
    CfgOutput {
        graph,
        diagnostics: Vec::new(),
    }
}

struct Builder {
    graph: ControlFlowGraph,
    diagnostics: Vec<Diagnostic>,
    scope: u32,
}

impl Builder {
    /// Builds a statement sequence and returns its entry node.
    fn construct_sequence(&mut self, stmts: &[Stmt], t: Targets) -> CfgNodeId {
        if stmts.is_empty() {
            return t.continuation;
        }

        let mut simple: Vec<Stmt> = Vec::new();
        for (i, stmt) in stmts.iter().enumerate() {
            if stmt.is_jump() {
                // The jump closes the block; statements after it are
                // unreachable and deliberately not wired.
                simple.push(stmt.clone());
                let target = match stmt {
                    Stmt::Break { .. } => t.brk.unwrap_or(t.ret),
                    Stmt::Continue { .. } => t.cont.unwrap_or(t.ret),
                    _ => t.ret,
                };
                let block = self
                    .graph
                    .add_node(CfgNodeKind::BasicBlock { statements: simple }, self.scope);
                self.graph.connect(block, target);
                return block;
            }
            if stmt.is_control_flow() {
                // Continuation first: everything after the construct.
                let rest_entry = self.construct_sequence(&stmts[i + 1..], t);
                let construct_entry = self.construct_control(
                    stmt,
                    Targets {
                        continuation: rest_entry,
                        ..t
                    },
                );
                if simple.is_empty() {
                    return construct_entry;
                }
                let block = self
                    .graph
                    .add_node(CfgNodeKind::BasicBlock { statements: simple }, self.scope);
                self.graph.connect(block, construct_entry);
                return block;
            }
            simple.push(stmt.clone());
        }

        let block = self
            .graph
            .add_node(CfgNodeKind::BasicBlock { statements: simple }, self.scope);
        self.graph.connect(block, t.continuation);
        block
    }

    fn construct_control(&mut self, stmt: &Stmt, t: Targets) -> CfgNodeId {
        match stmt {
            Stmt::If {
                cond, then, els, span,
            } => {
                let decision = self.graph.add_node(
                    CfgNodeKind::Decision {
                        condition: cond.clone(),
                        span: *span,
                    },
                    self.scope,
                );
                let then_entry = self.construct_sequence(std::slice::from_ref(then), t);
                let else_entry = match els {
                    Some(els) => self.construct_sequence(std::slice::from_ref(els), t),
                    None => t.continuation,
                };
                self.graph.connect(decision, then_entry);
                self.graph.connect(decision, else_entry);
                decision
            }
            Stmt::While { cond, body, span } => {
                let decision = self.graph.add_node(
                    CfgNodeKind::Decision {
                        condition: cond.clone(),
                        span: *span,
                    },
                    self.scope,
                );
                let body_entry = self.construct_sequence(
                    std::slice::from_ref(body),
                    Targets {
                        cont: Some(decision),
                        brk: Some(t.continuation),
                        continuation: decision,
                        ..t
                    },
                );
                self.graph.connect(decision, body_entry);
                self.graph.connect(decision, t.continuation);
                decision
            }
            Stmt::DoWhile { body, cond, span } => {
                // Same wiring as while, but the body is the entry.
                let decision = self.graph.add_node(
                    CfgNodeKind::Decision {
                        condition: cond.clone(),
                        span: *span,
                    },
                    self.scope,
                );
                let body_entry = self.construct_sequence(
                    std::slice::from_ref(body),
                    Targets {
                        cont: Some(decision),
                        brk: Some(t.continuation),
                        continuation: decision,
                        ..t
                    },
                );
                self.graph.connect(decision, body_entry);
                self.graph.connect(decision, t.continuation);
                body_entry
            }
            Stmt::For {
                init,
                cond,
                incr,
                body,
                span,
            } => {
                let iteration = self.graph.add_node(
                    CfgNodeKind::Iteration {
                        init: init.clone(),
                        condition: cond.clone(),
                        increment: incr.clone(),
                        span: *span,
                    },
                    self.scope,
                );
                let body_entry = self.construct_sequence(
                    std::slice::from_ref(body),
                    Targets {
                        cont: Some(iteration),
                        brk: Some(t.continuation),
                        continuation: iteration,
                        ..t
                    },
                );
                self.graph.connect(iteration, body_entry);
                self.graph.connect(iteration, t.continuation);
                iteration
            }
            Stmt::Foreach {
                key,
                value,
                iterable,
                body,
                span,
            } => {
                let enumeration = self.graph.add_node(
                    CfgNodeKind::Enumeration {
                        key: key.clone(),
                        value: value.clone(),
                        iterable: iterable.clone(),
                        span: *span,
                    },
                    self.scope,
                );
                let body_entry = self.construct_sequence(
                    std::slice::from_ref(body),
                    Targets {
                        cont: Some(enumeration),
                        brk: Some(t.continuation),
                        continuation: enumeration,
                        ..t
                    },
                );
                self.graph.connect(enumeration, body_entry);
                self.graph.connect(enumeration, t.continuation);
                enumeration
            }
            Stmt::Switch {
                subject,
                cases,
                span,
            } => self.construct_switch(subject, cases, *span, t),
            Stmt::Block { body, .. } | Stmt::DevBlock { body, .. } => {
                // Brace blocks do not open a new scope; see module docs.
                self.construct_sequence(body, t)
            }
            other => {
                // Simple statement routed here; treat as a singleton block.
                let block = self.graph.add_node(
                    CfgNodeKind::BasicBlock {
                        statements: vec![other.clone()],
                    },
                    self.scope,
                );
                self.graph.connect(block, t.continuation);
                block
            }
        }
    }

    /// Chain of per-case decisions built right-to-left, so each decision's
    /// false edge points at the next case, and the last one at the unmatched
    /// target (the default-bearing body if present, else the continuation).
    fn construct_switch(
        &mut self,
        subject: &Expr,
        cases: &[SwitchCase],
        span: Span,
        t: Targets,
    ) -> CfgNodeId {
        let switch = self.graph.add_node(
            CfgNodeKind::Switch {
                subject: subject.clone(),
                span,
            },
            self.scope,
        );

        self.check_duplicate_labels(cases);

        if cases.is_empty() {
            self.graph.connect(switch, t.continuation);
            return switch;
        }

        // Bodies right-to-left: a body's continuation is the next body's
        // entry, giving fall-through for free.
        let mut body_entries = vec![t.continuation; cases.len()];
        let mut next_body = t.continuation;
        for (i, case) in cases.iter().enumerate().rev() {
            let entry = self.construct_sequence(
                &case.body,
                Targets {
                    brk: Some(t.continuation),
                    continuation: next_body,
                    ..t
                },
            );
            body_entries[i] = entry;
            next_body = entry;
        }

        let unmatched = cases
            .iter()
            .position(|c| c.labels.iter().any(|l| matches!(l, CaseLabel::Default { .. })))
            .map(|i| body_entries[i])
            .unwrap_or(t.continuation);

        let mut next_decision = unmatched;
        for (case, &body_entry) in cases.iter().zip(body_entries.iter()).rev() {
            let decision = self.graph.add_node(
                CfgNodeKind::SwitchCaseDecision {
                    labels: case.labels.clone(),
                    span: case.span,
                },
                self.scope,
            );
            self.graph.connect(decision, body_entry);
            self.graph.connect(decision, next_decision);
            next_decision = decision;
        }

        self.graph.connect(switch, next_decision);
        switch
    }

    fn check_duplicate_labels(&mut self, cases: &[SwitchCase]) {
        let mut default_seen = false;
        let mut seen: Vec<String> = Vec::new();
        for case in cases {
            for label in &case.labels {
                match label {
                    CaseLabel::Default { span } => {
                        if default_seen {
                            self.diagnostics.push(Diagnostic::new(
                                DiagCode::MultipleDefaultLabels,
                                *span,
                                &[],
                            ));
                        }
                        default_seen = true;
                    }
                    CaseLabel::Expr { expr, span } => {
                        if let Some(key) = case_label_key(expr) {
                            if seen.contains(&key) {
                                self.diagnostics.push(Diagnostic::new(
                                    DiagCode::DuplicateCaseLabel,
                                    *span,
                                    &[&key],
                                ));
                            } else {
                                seen.push(key);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Comparable key for a case label; non-constant labels opt out of the
/// duplicate check.
fn case_label_key(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal { text, .. } => Some(text.to_ascii_lowercase()),
        Expr::Unary {
            op: UnOp::Neg,
            operand,
            ..
        } => match operand.as_ref() {
            Expr::Literal { text, .. } => Some(format!("-{}", text.to_ascii_lowercase())),
            _ => None,
        },
        _ => None,
    }
}
