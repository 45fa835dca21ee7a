use crate::error::Span;
use std::rc::Rc;

/// Syntax tree produced by the parser. Nodes own their children; function
/// and class definitions sit behind `Rc` so runtime closures can point at
/// their bodies without copying them.

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub target: Pattern,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expression {
        expr: Expr,
        span: Span,
    },
    VariableDeclaration {
        kind: VarKind,
        declarations: Vec<VariableDeclarator>,
        span: Span,
    },
    FunctionDeclaration {
        function: Rc<FunctionDef>,
        span: Span,
    },
    ClassDeclaration {
        class: Rc<ClassDef>,
        span: Span,
    },
    Block {
        statements: Vec<Stmt>,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
        span: Span,
    },
    For {
        init: Option<ForInit>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    ForOf {
        left: ForBinding,
        right: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    ForIn {
        left: ForBinding,
        right: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Empty {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expression { span, .. }
            | Stmt::VariableDeclaration { span, .. }
            | Stmt::FunctionDeclaration { span, .. }
            | Stmt::ClassDeclaration { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::ForOf { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Empty { span } => *span,
        }
    }
}

/// First clause of a three-part `for`.
#[derive(Debug, Clone)]
pub enum ForInit {
    Declaration {
        kind: VarKind,
        declarations: Vec<VariableDeclarator>,
    },
    Expression(Expr),
}

/// Left side of `for-of` / `for-in`.
#[derive(Debug, Clone)]
pub enum ForBinding {
    Declaration { kind: VarKind, target: Pattern },
    Target(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone)]
pub enum TemplateElement {
    Text(String),
    Expr(Expr),
}

/// Entry of an argument list or array literal.
#[derive(Debug, Clone)]
pub enum Element {
    Expr(Expr),
    Spread { argument: Expr, span: Span },
}

#[derive(Debug, Clone)]
pub enum Property {
    Init {
        key: String,
        value: Expr,
        shorthand: bool,
        span: Span,
    },
    Method {
        key: String,
        function: Rc<FunctionDef>,
        span: Span,
    },
    Spread {
        argument: Expr,
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Named(String),
    Computed(Box<Expr>),
}

/// Where a `super` expression appeared, recorded by the parser and checked
/// by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperContext {
    Outside,
    Method,
    Constructor,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },
    Identifier {
        name: String,
        span: Span,
    },
    Template {
        elements: Vec<TemplateElement>,
        span: Span,
    },
    Array {
        elements: Vec<Option<Element>>,
        span: Span,
    },
    Object {
        properties: Vec<Property>,
        span: Span,
    },
    Function {
        function: Rc<FunctionDef>,
        span: Span,
    },
    Arrow {
        function: Rc<FunctionDef>,
        span: Span,
    },
    Class {
        class: Rc<ClassDef>,
        span: Span,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Update {
        operator: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
        span: Span,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
        span: Span,
    },
    Conditional {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        span: Span,
    },
    Assign {
        operator: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Element>,
        span: Span,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Element>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: MemberProperty,
        span: Span,
    },
    This {
        span: Span,
    },
    SuperMember {
        property: MemberProperty,
        context: SuperContext,
        span: Span,
    },
    SuperCall {
        args: Vec<Element>,
        context: SuperContext,
        span: Span,
    },
    Await {
        argument: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Identifier { span, .. }
            | Expr::Template { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Function { span, .. }
            | Expr::Arrow { span, .. }
            | Expr::Class { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Update { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Member { span, .. }
            | Expr::This { span }
            | Expr::SuperMember { span, .. }
            | Expr::SuperCall { span, .. }
            | Expr::Await { span, .. } => *span,
        }
    }
}

/// Binding or assignment target.
#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier {
        name: String,
        span: Span,
    },
    Array {
        elements: Vec<Option<PatternElement>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    Object {
        properties: Vec<PatternProperty>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    /// `obj.x` or `obj[k]`; only valid as an assignment target.
    Member {
        target: Box<Expr>,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier { span, .. }
            | Pattern::Array { span, .. }
            | Pattern::Object { span, .. }
            | Pattern::Member { span, .. } => *span,
        }
    }

    /// Names this pattern binds, in source order.
    pub fn bound_names(&self) -> Vec<&str> {
        self.bound_identifiers().into_iter().map(|(name, _)| name).collect()
    }

    /// Bound names with the span of each identifier.
    pub fn bound_identifiers(&self) -> Vec<(&str, Span)> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<(&'a str, Span)>) {
        match self {
            Pattern::Identifier { name, span } => names.push((name, *span)),
            Pattern::Array { elements, rest, .. } => {
                for element in elements.iter().flatten() {
                    element.target.collect_names(names);
                }
                if let Some(rest) = rest {
                    rest.collect_names(names);
                }
            }
            Pattern::Object { properties, rest, .. } => {
                for property in properties {
                    property.value.target.collect_names(names);
                }
                if let Some(rest) = rest {
                    rest.collect_names(names);
                }
            }
            Pattern::Member { .. } => {}
        }
    }
}

/// `var` names declared by `statements`, looking into nested blocks and
/// loops but not into nested functions.
pub fn var_declared_names(statements: &[Stmt]) -> Vec<(&str, Span)> {
    let mut names = Vec::new();
    for stmt in statements {
        collect_var_names(stmt, &mut names);
    }
    names
}

fn collect_var_names<'a>(stmt: &'a Stmt, names: &mut Vec<(&'a str, Span)>) {
    match stmt {
        Stmt::VariableDeclaration {
            kind: VarKind::Var,
            declarations,
            ..
        } => {
            for declarator in declarations {
                names.extend(declarator.target.bound_identifiers());
            }
        }
        Stmt::Block { statements, .. } => {
            for stmt in statements {
                collect_var_names(stmt, names);
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_var_names(then_branch, names);
            if let Some(else_stmt) = else_branch {
                collect_var_names(else_stmt, names);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names(body, names),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Declaration {
                kind: VarKind::Var,
                declarations,
            }) = init
            {
                for declarator in declarations {
                    names.extend(declarator.target.bound_identifiers());
                }
            }
            collect_var_names(body, names);
        }
        Stmt::ForOf { left, body, .. } | Stmt::ForIn { left, body, .. } => {
            if let ForBinding::Declaration {
                kind: VarKind::Var,
                target,
            } = left
            {
                names.extend(target.bound_identifiers());
            }
            collect_var_names(body, names);
        }
        _ => {}
    }
}

/// Pattern slot with an optional default value.
#[derive(Debug, Clone)]
pub struct PatternElement {
    pub target: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct PatternProperty {
    pub key: String,
    pub value: PatternElement,
    pub shorthand: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    Constructor,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expression(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<PatternElement>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub kind: FunctionKind,
    pub is_async: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodDefinition {
    pub name: String,
    pub function: Rc<FunctionDef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Option<String>,
    pub superclass: Option<Box<Expr>>,
    pub constructor: Option<Rc<FunctionDef>>,
    pub methods: Vec<MethodDefinition>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Remainder => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::StrictEqual => "===",
            BinaryOp::StrictNotEqual => "!==",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::In => "in",
        }
    }

    /// Binding power; all binary operators are left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Remainder => PREC_MULTIPLICATIVE,
            BinaryOp::Add | BinaryOp::Subtract => PREC_ADDITIVE,
            BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::In => PREC_RELATIONAL,
            BinaryOp::Equal | BinaryOp::NotEqual | BinaryOp::StrictEqual | BinaryOp::StrictNotEqual => {
                PREC_EQUALITY
            }
        }
    }
}

pub const PREC_ASSIGNMENT: u8 = 1;
pub const PREC_CONDITIONAL: u8 = 2;
pub const PREC_LOGICAL_OR: u8 = 3;
pub const PREC_LOGICAL_AND: u8 = 4;
pub const PREC_EQUALITY: u8 = 5;
pub const PREC_RELATIONAL: u8 = 6;
pub const PREC_ADDITIVE: u8 = 7;
pub const PREC_MULTIPLICATIVE: u8 = 8;
pub const PREC_UNARY: u8 = 9;
pub const PREC_POSTFIX: u8 = 10;
pub const PREC_CALL: u8 = 11;
pub const PREC_PRIMARY: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    Typeof,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::Typeof => "typeof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            LogicalOp::And => PREC_LOGICAL_AND,
            LogicalOp::Or => PREC_LOGICAL_OR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Subtract => "-=",
            AssignOp::Multiply => "*=",
            AssignOp::Divide => "/=",
            AssignOp::Remainder => "%=",
        }
    }

    /// The arithmetic a compound assignment performs.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Subtract => Some(BinaryOp::Subtract),
            AssignOp::Multiply => Some(BinaryOp::Multiply),
            AssignOp::Divide => Some(BinaryOp::Divide),
            AssignOp::Remainder => Some(BinaryOp::Remainder),
        }
    }
}
