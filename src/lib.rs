// jsflow: a tree-walking engine for a subset of modern JavaScript
//
// Pipeline: lexer -> parser -> evaluator, with ariadne diagnostics for
// every stage and a printer that turns the AST back into source. The
// token stream, the tree and its scopes can also be dumped as JSON.

// Public modules
pub mod ast;
pub mod builtins;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod repl;
pub mod runner;
pub mod scope;
pub mod stack;
pub mod value;

use std::sync::Once;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use environment::{Env, Environment};
pub use error::{ErrorKind, JsError, JsResult, Span};
pub use evaluator::{Completion, Evaluator, EvaluatorOptions, Outcome, SharedOutput};
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use printer::Printer;
pub use value::Value;

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::{run, run_source, RunOptions};

/// Source text to tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> JsResult<Vec<Token>> {
    lexer::tokenize(source)
}

/// Source text to a syntax tree.
pub fn parse(source: &str) -> JsResult<Program> {
    parser::parse(lexer::tokenize(source)?)
}

/// Evaluate a program in a fresh evaluator writing to stdout.
pub fn evaluate(program: &Program) -> JsResult<Value> {
    Evaluator::new().evaluate_program(program)
}

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber when `RUST_LOG` is set.
///
/// `RUST_LOG=jsflow=debug` shows pipeline stages, `RUST_LOG=jsflow=trace`
/// adds every declaration and call.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
