//! Static scope analysis: the bindings each scope introduces and what every
//! identifier reference resolves to.
//!
//! Scoping follows the evaluator. `var` names and parameters belong to the
//! nearest function (or the global scope); `let`, `const`, `class` and
//! function declarations belong to the enclosing block; a `for` head with a
//! lexical declaration gets a scope of its own. A scope's declarations are
//! collected before its references are resolved, so a use that precedes its
//! declaration still resolves, and a lexical binding used that way in its
//! own scope is flagged as a temporal-dead-zone reference. Names that
//! resolve nowhere become `implicit` bindings of the global scope.

use crate::ast::{
    var_declared_names, ClassDef, Element, Expr, ForBinding, ForInit, FunctionBody, FunctionDef,
    MemberProperty, Pattern, Program, Property, Stmt, TemplateElement, VarKind,
};
use crate::error::{LineIndex, Position, Span};
use crate::stack::ensure_sufficient_stack;
use serde_json::{json, Value};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    For,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Global => "Global",
            ScopeKind::Function => "Function",
            ScopeKind::Block => "Block",
            ScopeKind::For => "For",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Let,
    Const,
    Function,
    Param,
    Class,
    /// Assigned or read without any declaration in reach.
    Implicit,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Var => "var",
            SymbolKind::Let => "let",
            SymbolKind::Const => "const",
            SymbolKind::Function => "function",
            SymbolKind::Param => "param",
            SymbolKind::Class => "class",
            SymbolKind::Implicit => "implicit",
        }
    }

    /// Kinds that are unusable before their declaration runs.
    pub fn is_lexical(self) -> bool {
        matches!(self, SymbolKind::Let | SymbolKind::Const | SymbolKind::Class)
    }
}

impl From<VarKind> for SymbolKind {
    fn from(kind: VarKind) -> Self {
        match kind {
            VarKind::Var => SymbolKind::Var,
            VarKind::Let => SymbolKind::Let,
            VarKind::Const => SymbolKind::Const,
        }
    }
}

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolId {
    pub scope: ScopeId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    /// Binding of the same name in an enclosing scope.
    pub shadows: Option<SymbolId>,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub write: bool,
    pub tdz: bool,
    pub span: Span,
    pub resolved: Option<SymbolId>,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub span: Span,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub children: Vec<ScopeId>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, span: Span) -> Self {
        Self {
            kind,
            parent,
            span,
            symbols: Vec::new(),
            references: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Scopes of one program; the global scope is always id 0.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub const ROOT: ScopeId = 0;

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn root(&self) -> &Scope {
        self.scope(Self::ROOT)
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.scopes[id.scope].symbols[id.index]
    }

    /// Resolve `name` from `scope` outwards.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id];
            if let Some(index) = scope.symbols.iter().position(|symbol| symbol.name == name) {
                return Some(SymbolId { scope: id, index });
            }
            current = scope.parent;
        }
        None
    }

    /// Every scope as nested JSON objects with `type`, `bindings`,
    /// `references` and `children`.
    pub fn to_json(&self, source: &str) -> Value {
        let index = LineIndex::new(source);
        self.scope_json(Self::ROOT, &index)
    }

    fn scope_json(&self, id: ScopeId, index: &LineIndex) -> Value {
        let scope = &self.scopes[id];
        let bindings: Vec<Value> = scope
            .symbols
            .iter()
            .map(|symbol| {
                json!({
                    "name": symbol.name,
                    "kind": symbol.kind.as_str(),
                    "loc": position(index.position(symbol.span.start)),
                    "shadowed": symbol.shadows.map(|id| self.symbol(id).name.clone()),
                })
            })
            .collect();
        let references: Vec<Value> = scope
            .references
            .iter()
            .map(|reference| {
                json!({
                    "name": reference.name,
                    "write": reference.write,
                    "tdz": reference.tdz,
                    "loc": position(index.position(reference.span.start)),
                    "resolved": reference.resolved.map(|id| self.symbol(id).name.clone()),
                })
            })
            .collect();
        let children: Vec<Value> = scope
            .children
            .iter()
            .map(|child| ensure_sufficient_stack(|| self.scope_json(*child, index)))
            .collect();
        json!({
            "type": scope.kind.as_str(),
            "bindings": bindings,
            "references": references,
            "children": children,
        })
    }

    /// Indented text listing of every scope.
    pub fn dump(&self, source: &str) -> String {
        let index = LineIndex::new(source);
        let mut out = String::new();
        self.dump_scope(Self::ROOT, 0, &index, &mut out);
        out
    }

    fn dump_scope(&self, id: ScopeId, indent: usize, index: &LineIndex, out: &mut String) {
        let scope = &self.scopes[id];
        let pad = " ".repeat(indent);
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}Scope({})", pad, scope.kind.as_str());
        let _ = writeln!(out, "{}  Bindings:", pad);
        for symbol in &scope.symbols {
            let at = index.position(symbol.span.start);
            let _ = writeln!(
                out,
                "{}    {} [{}] @{}:{}",
                pad,
                symbol.name,
                symbol.kind.as_str(),
                at.line,
                at.column
            );
        }
        let _ = writeln!(out, "{}  References:", pad);
        for reference in &scope.references {
            let target = reference
                .resolved
                .map_or("<unresolved>", |id| self.symbol(id).name.as_str());
            let _ = writeln!(
                out,
                "{}    {} {}{} -> {}",
                pad,
                reference.name,
                if reference.write { "write" } else { "read" },
                if reference.tdz { " (TDZ)" } else { "" },
                target
            );
        }
        for child in &scope.children {
            ensure_sufficient_stack(|| self.dump_scope(*child, indent + 2, index, out));
        }
    }
}

fn position(position: Position) -> Value {
    json!({ "line": position.line, "column": position.column })
}

/// Build the scope tree of `program`.
pub fn analyze(program: &Program) -> ScopeTree {
    let mut analyzer = Analyzer {
        scopes: vec![Scope::new(ScopeKind::Global, None, Span::default())],
        current: ScopeTree::ROOT,
    };
    analyzer.hoist(&program.statements, true);
    for stmt in &program.statements {
        analyzer.statement(stmt);
    }
    let tree = ScopeTree {
        scopes: analyzer.scopes,
    };
    tracing::debug!(scopes = tree.scopes.len(), "analyzed scopes");
    tree
}

struct Analyzer {
    scopes: Vec<Scope>,
    current: ScopeId,
}

impl Analyzer {
    fn enter(&mut self, kind: ScopeKind, span: Span) {
        let id = self.scopes.len();
        self.scopes.push(Scope::new(kind, Some(self.current), span));
        self.scopes[self.current].children.push(id);
        self.current = id;
    }

    fn exit(&mut self) {
        self.current = self.scopes[self.current].parent.unwrap_or(ScopeTree::ROOT);
    }

    fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id];
            if let Some(index) = scope.symbols.iter().position(|symbol| symbol.name == name) {
                return Some(SymbolId { scope: id, index });
            }
            current = scope.parent;
        }
        None
    }

    /// Nearest function or global scope, where `var` lands.
    fn var_scope(&self) -> ScopeId {
        let mut id = self.current;
        while let Some(parent) = self.scopes[id].parent {
            if self.scopes[id].kind == ScopeKind::Function {
                break;
            }
            id = parent;
        }
        id
    }

    /// Add a binding unless `scope` already has one of that name.
    fn declare(&mut self, scope: ScopeId, name: &str, kind: SymbolKind, span: Span) -> SymbolId {
        if let Some(index) = self.scopes[scope].symbols.iter().position(|symbol| symbol.name == name) {
            return SymbolId { scope, index };
        }
        let shadows = self.scopes[scope].parent.and_then(|parent| self.lookup(parent, name));
        let symbols = &mut self.scopes[scope].symbols;
        symbols.push(Symbol {
            name: name.to_string(),
            kind,
            span,
            shadows,
        });
        SymbolId {
            scope,
            index: symbols.len() - 1,
        }
    }

    fn reference(&mut self, name: &str, span: Span, write: bool) {
        let resolved = match self.lookup(self.current, name) {
            Some(id) => id,
            None => self.declare(ScopeTree::ROOT, name, SymbolKind::Implicit, span),
        };
        let symbol = &self.scopes[resolved.scope].symbols[resolved.index];
        let tdz = resolved.scope == self.current && symbol.kind.is_lexical() && span.start < symbol.span.start;
        self.scopes[self.current].references.push(Reference {
            name: name.to_string(),
            write,
            tdz,
            span,
            resolved: Some(resolved),
        });
    }

    /// Declare what `statements` introduce in the current scope, plus their
    /// `var` names when this is a function or global body.
    fn hoist(&mut self, statements: &[Stmt], with_vars: bool) {
        if with_vars {
            let scope = self.var_scope();
            for (name, span) in var_declared_names(statements) {
                self.declare(scope, name, SymbolKind::Var, span);
            }
        }
        for stmt in statements {
            match stmt {
                Stmt::VariableDeclaration {
                    kind: kind @ (VarKind::Let | VarKind::Const),
                    declarations,
                    ..
                } => {
                    for declarator in declarations {
                        for (name, span) in declarator.target.bound_identifiers() {
                            self.declare(self.current, name, SymbolKind::from(*kind), span);
                        }
                    }
                }
                Stmt::FunctionDeclaration { function, span } => {
                    if let Some(name) = &function.name {
                        self.declare(self.current, name, SymbolKind::Function, *span);
                    }
                }
                Stmt::ClassDeclaration { class, span } => {
                    if let Some(name) = &class.name {
                        self.declare(self.current, name, SymbolKind::Class, *span);
                    }
                }
                _ => {}
            }
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.statement_inner(stmt))
    }

    fn statement_inner(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression { expr, .. } => self.expr(expr),
            Stmt::VariableDeclaration { declarations, .. } => {
                for declarator in declarations {
                    if let Some(init) = &declarator.init {
                        self.expr(init);
                    }
                    self.pattern(&declarator.target, false);
                }
            }
            Stmt::FunctionDeclaration { function, .. } => self.function(function, false),
            Stmt::ClassDeclaration { class, .. } => self.class(class, false),
            Stmt::Block { statements, span } => {
                self.enter(ScopeKind::Block, *span);
                self.hoist(statements, false);
                for stmt in statements {
                    self.statement(stmt);
                }
                self.exit();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.expr(condition);
                self.statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.statement(else_branch);
                }
            }
            Stmt::While { condition, body, .. } => {
                self.expr(condition);
                self.statement(body);
            }
            Stmt::DoWhile { body, condition, .. } => {
                self.statement(body);
                self.expr(condition);
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                span,
            } => {
                let lexical = match init {
                    Some(ForInit::Declaration { kind, declarations }) if *kind != VarKind::Var => {
                        self.enter(ScopeKind::For, *span);
                        for declarator in declarations {
                            for (name, name_span) in declarator.target.bound_identifiers() {
                                self.declare(self.current, name, SymbolKind::from(*kind), name_span);
                            }
                        }
                        true
                    }
                    _ => false,
                };
                match init {
                    Some(ForInit::Declaration { declarations, .. }) => {
                        for declarator in declarations {
                            if let Some(init) = &declarator.init {
                                self.expr(init);
                            }
                            self.pattern(&declarator.target, false);
                        }
                    }
                    Some(ForInit::Expression(expr)) => self.expr(expr),
                    None => {}
                }
                if let Some(condition) = condition {
                    self.expr(condition);
                }
                if let Some(update) = update {
                    self.expr(update);
                }
                self.statement(body);
                if lexical {
                    self.exit();
                }
            }
            Stmt::ForOf { left, right, body, span } | Stmt::ForIn { left, right, body, span } => {
                self.expr(right);
                match left {
                    ForBinding::Declaration { kind, target } if *kind != VarKind::Var => {
                        self.enter(ScopeKind::For, *span);
                        for (name, name_span) in target.bound_identifiers() {
                            self.declare(self.current, name, SymbolKind::from(*kind), name_span);
                        }
                        self.pattern(target, false);
                        self.statement(body);
                        self.exit();
                    }
                    ForBinding::Declaration { target, .. } => {
                        self.pattern(target, false);
                        self.statement(body);
                    }
                    ForBinding::Target(target) => {
                        self.pattern(target, true);
                        self.statement(body);
                    }
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. } => {}
        }
    }

    /// Walk a binding or assignment target. Identifiers are recorded as
    /// writes only for assignments; defaults and member targets are read.
    fn pattern(&mut self, pattern: &Pattern, assignment: bool) {
        match pattern {
            Pattern::Identifier { name, span } => {
                if assignment {
                    self.reference(name, *span, true);
                }
            }
            Pattern::Member { target, .. } => self.expr(target),
            Pattern::Array { elements, rest, .. } => {
                for element in elements.iter().flatten() {
                    self.pattern(&element.target, assignment);
                    if let Some(default) = &element.default {
                        self.expr(default);
                    }
                }
                if let Some(rest) = rest {
                    self.pattern(rest, assignment);
                }
            }
            Pattern::Object { properties, rest, .. } => {
                for property in properties {
                    self.pattern(&property.value.target, assignment);
                    if let Some(default) = &property.value.default {
                        self.expr(default);
                    }
                }
                if let Some(rest) = rest {
                    self.pattern(rest, assignment);
                }
            }
        }
    }

    /// Function scope with its parameters; a named function expression also
    /// sees its own name there.
    fn function(&mut self, function: &FunctionDef, binds_own_name: bool) {
        self.enter(ScopeKind::Function, function.span);
        if binds_own_name {
            if let Some(name) = &function.name {
                self.declare(self.current, name, SymbolKind::Function, function.span);
            }
        }
        let params = function.params.iter().map(|param| &param.target).chain(function.rest.iter());
        for target in params {
            for (name, span) in target.bound_identifiers() {
                self.declare(self.current, name, SymbolKind::Param, span);
            }
        }
        for param in &function.params {
            self.pattern(&param.target, false);
            if let Some(default) = &param.default {
                self.expr(default);
            }
        }
        match &function.body {
            FunctionBody::Block(statements) => {
                self.hoist(statements, true);
                for stmt in statements {
                    self.statement(stmt);
                }
            }
            FunctionBody::Expression(expr) => self.expr(expr),
        }
        self.exit();
    }

    /// Methods get function scopes; a named class expression binds its name
    /// in a block around them.
    fn class(&mut self, class: &ClassDef, is_expression: bool) {
        if let Some(superclass) = &class.superclass {
            self.expr(superclass);
        }
        let own_scope = match (&class.name, is_expression) {
            (Some(name), true) => {
                self.enter(ScopeKind::Block, class.span);
                self.declare(self.current, name, SymbolKind::Class, class.span);
                true
            }
            _ => false,
        };
        if let Some(constructor) = &class.constructor {
            self.function(constructor, false);
        }
        for method in &class.methods {
            self.function(&method.function, false);
        }
        if own_scope {
            self.exit();
        }
    }

    fn element(&mut self, element: &Element) {
        match element {
            Element::Expr(expr) | Element::Spread { argument: expr, .. } => self.expr(expr),
        }
    }

    fn member_property(&mut self, property: &MemberProperty) {
        if let MemberProperty::Computed(expr) = property {
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.expr_inner(expr))
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal { .. } | Expr::This { .. } => {}
            Expr::Identifier { name, span } => self.reference(name, *span, false),
            Expr::Template { elements, .. } => {
                for element in elements {
                    if let TemplateElement::Expr(expr) = element {
                        self.expr(expr);
                    }
                }
            }
            Expr::Array { elements, .. } => {
                for element in elements.iter().flatten() {
                    self.element(element);
                }
            }
            Expr::Object { properties, .. } => {
                for property in properties {
                    match property {
                        Property::Init { value, .. } => self.expr(value),
                        Property::Method { function, .. } => self.function(function, false),
                        Property::Spread { argument, .. } => self.expr(argument),
                    }
                }
            }
            Expr::Function { function, .. } => self.function(function, true),
            Expr::Arrow { function, .. } => self.function(function, false),
            Expr::Class { class, .. } => self.class(class, true),
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Update { target, .. } => match target.as_ref() {
                Expr::Identifier { name, span } => self.reference(name, *span, true),
                other => self.expr(other),
            },
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Conditional {
                condition,
                consequent,
                alternate,
                ..
            } => {
                self.expr(condition);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::Assign { target, value, .. } => {
                self.pattern(target, true);
                self.expr(value);
            }
            Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
                self.expr(callee);
                args.iter().for_each(|arg| self.element(arg));
            }
            Expr::Member { object, property, .. } => {
                self.expr(object);
                self.member_property(property);
            }
            Expr::SuperMember { property, .. } => self.member_property(property),
            Expr::SuperCall { args, .. } => args.iter().for_each(|arg| self.element(arg)),
            Expr::Await { argument, .. } => self.expr(argument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    fn analyze_source(source: &str) -> ScopeTree {
        analyze(&parse(source).unwrap())
    }

    fn bindings(scope: &Scope) -> Vec<(&str, SymbolKind)> {
        scope.symbols.iter().map(|symbol| (symbol.name.as_str(), symbol.kind)).collect()
    }

    fn resolved_scope(tree: &ScopeTree, reference: &Reference) -> Option<ScopeKind> {
        reference.resolved.map(|id| tree.scope(id.scope).kind)
    }

    #[test]
    fn var_and_params_live_in_the_function() {
        let tree = analyze_source("let x = 1; function f(a) { if (a) { var y = x + a; } return y; }");
        assert_eq!(bindings(tree.root()), vec![("x", SymbolKind::Let), ("f", SymbolKind::Function)]);
        let function = tree.scope(tree.root().children[0]);
        assert_eq!(function.kind, ScopeKind::Function);
        assert_eq!(bindings(function), vec![("a", SymbolKind::Param), ("y", SymbolKind::Var)]);

        let block = tree.scope(function.children[0]);
        assert_eq!(block.kind, ScopeKind::Block);
        assert!(block.symbols.is_empty());
        let names: Vec<(&str, Option<ScopeKind>)> = block
            .references
            .iter()
            .map(|reference| (reference.name.as_str(), resolved_scope(&tree, reference)))
            .collect();
        assert_eq!(names, vec![("x", Some(ScopeKind::Global)), ("a", Some(ScopeKind::Function))]);
    }

    #[test]
    fn use_before_lexical_declaration_is_tdz() {
        let tree = analyze_source("{ x; let x = 1; x; }");
        let block = tree.scope(tree.root().children[0]);
        let tdz: Vec<bool> = block.references.iter().map(|reference| reference.tdz).collect();
        assert_eq!(tdz, vec![true, false]);

        let tree = analyze_source("function g() { return y; } let y = 2;");
        let function = tree.scope(tree.root().children[0]);
        assert!(!function.references[0].tdz);
        assert_eq!(resolved_scope(&tree, &function.references[0]), Some(ScopeKind::Global));
    }

    #[test]
    fn undeclared_names_become_implicit_globals() {
        let tree = analyze_source("function f() { total = 1; console.log(total); }");
        assert_eq!(
            bindings(tree.root()),
            vec![
                ("f", SymbolKind::Function),
                ("total", SymbolKind::Implicit),
                ("console", SymbolKind::Implicit),
            ]
        );
        let function = tree.scope(tree.root().children[0]);
        assert!(function.references[0].write);
        assert!(!function.references[2].write);
    }

    #[test]
    fn inner_bindings_record_what_they_shadow() {
        let tree = analyze_source("let v = 1; { let v = 2; v; }");
        let block = tree.scope(tree.root().children[0]);
        assert_eq!(block.symbols[0].shadows, Some(SymbolId { scope: ScopeTree::ROOT, index: 0 }));
        assert_eq!(block.references[0].resolved, Some(SymbolId { scope: 1, index: 0 }));
        assert_eq!(tree.root().symbols[0].shadows, None);
    }

    #[test]
    fn lexical_for_heads_get_their_own_scope() {
        let tree = analyze_source("for (let i = 0; i < 3; i++) { const j = i; } for (var k of ks) {}");
        assert_eq!(bindings(tree.root()), vec![("k", SymbolKind::Var), ("ks", SymbolKind::Implicit)]);
        let head = tree.scope(tree.root().children[0]);
        assert_eq!(head.kind, ScopeKind::For);
        assert_eq!(bindings(head), vec![("i", SymbolKind::Let)]);
        let writes: Vec<bool> = head.references.iter().map(|reference| reference.write).collect();
        assert_eq!(writes, vec![false, true]);
        let body = tree.scope(head.children[0]);
        assert_eq!(bindings(body), vec![("j", SymbolKind::Const)]);
    }

    #[test]
    fn named_function_expression_sees_itself() {
        let tree = analyze_source("const f = function g(n) { return g; };");
        assert_eq!(bindings(tree.root()), vec![("f", SymbolKind::Const)]);
        let function = tree.scope(tree.root().children[0]);
        assert_eq!(bindings(function), vec![("g", SymbolKind::Function), ("n", SymbolKind::Param)]);
        assert_eq!(function.references[0].resolved, Some(SymbolId { scope: 1, index: 0 }));
    }

    #[test]
    fn classes_and_methods() {
        let tree = analyze_source("class A { m(p) { return A; } } const B = class C extends A {};");
        assert_eq!(
            bindings(tree.root()),
            vec![("A", SymbolKind::Class), ("B", SymbolKind::Const)]
        );
        let method = tree.scope(tree.root().children[0]);
        assert_eq!(bindings(method), vec![("p", SymbolKind::Param)]);
        let named = tree.scope(tree.root().children[1]);
        assert_eq!(named.kind, ScopeKind::Block);
        assert_eq!(bindings(named), vec![("C", SymbolKind::Class)]);
        assert_eq!(tree.root().references[0].name, "A");
    }

    #[test]
    fn json_dump_shape() {
        let source = "let a; a = 2;";
        assert_eq!(
            analyze_source(source).to_json(source),
            json!({
                "type": "Global",
                "bindings": [
                    { "name": "a", "kind": "let", "loc": { "line": 1, "column": 5 }, "shadowed": null }
                ],
                "references": [
                    {
                        "name": "a",
                        "write": true,
                        "tdz": false,
                        "loc": { "line": 1, "column": 8 },
                        "resolved": "a"
                    }
                ],
                "children": []
            })
        );
    }

    #[test]
    fn text_dump() {
        let source = "let a = 1;\n{ let a = b; }";
        assert_eq!(
            analyze_source(source).dump(source),
            "Scope(Global)\n  Bindings:\n    a [let] @1:5\n    b [implicit] @2:11\n  References:\n  Scope(Block)\n    Bindings:\n      a [let] @2:7\n    References:\n      b read -> b\n"
        );
    }
}
