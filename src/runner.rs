use crate::error::JsResult;
use crate::evaluator::{Evaluator, EvaluatorOptions, Outcome};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::Value;
use std::io::Write;
use std::ops::ControlFlow;

/// Limits applied to a single script run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many top-level statements.
    pub max_steps: Option<usize>,
    pub evaluator: EvaluatorOptions,
}

/// Tokenize, parse and evaluate `source`, sending console output to
/// `output`. The first error from any stage is returned unreported.
#[tracing::instrument(level = "debug", skip_all, fields(bytes = source.len()))]
pub fn run_source(source: &str, output: Box<dyn Write>, options: &RunOptions) -> JsResult<Value> {
    let tokens = Lexer::new(source).scan_tokens()?;
    tracing::debug!(tokens = tokens.len(), "lexed");

    let program = Parser::new(tokens).parse()?;
    tracing::debug!(statements = program.statements.len(), "parsed");

    let mut evaluator = Evaluator::with_options(options.evaluator.clone(), output);
    let max_steps = options.max_steps;
    let outcome = evaluator.evaluate_program_with(&program, |index| match max_steps {
        Some(limit) if index >= limit => ControlFlow::Break(()),
        _ => ControlFlow::Continue(()),
    })?;

    match outcome {
        Outcome::Completed(value) => Ok(value),
        Outcome::Halted { next } => {
            tracing::info!(
                next,
                total = program.statements.len(),
                "stopped before completion (--max-steps)"
            );
            Ok(Value::Undefined)
        }
    }
}

/// Run a script against stdout, reporting any error as a diagnostic.
/// Returns whether the script finished without error.
pub fn run(source: &str, filename: Option<&str>, options: &RunOptions) -> bool {
    match run_source(source, Box::new(std::io::stdout()), options) {
        Ok(_) => true,
        Err(error) => {
            error.report(source, filename);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::evaluator::SharedOutput;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_before_error_is_kept() {
        let output = SharedOutput::new();
        let error = run_source(
            "console.log('one'); console.log(missing);",
            Box::new(output.clone()),
            &RunOptions::default(),
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ReferenceError);
        assert_eq!(output.lines(), vec!["one"]);
    }

    #[test]
    fn parse_errors_stop_before_evaluation() {
        let output = SharedOutput::new();
        let error = run_source("console.log('never'); let = ;", Box::new(output.clone()), &RunOptions::default())
            .unwrap_err();
        assert!(error.is_syntax());
        assert_eq!(output.contents(), "");
    }

    #[test]
    fn max_steps_halts_between_statements() {
        let output = SharedOutput::new();
        let options = RunOptions {
            max_steps: Some(1),
            ..RunOptions::default()
        };
        run_source("console.log(1); console.log(2);", Box::new(output.clone()), &options).unwrap();
        assert_eq!(output.lines(), vec!["1"]);
    }
}
