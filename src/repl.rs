use crate::ast::{Expr, Program, Stmt};
use crate::error::JsResult;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use std::io::{self, Write};

/// Interactive loop. Declarations persist between lines because one
/// evaluator serves the whole session.
pub fn start() {
    println!("jsflow {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    let mut evaluator = Evaluator::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }
                match eval_line(line, &mut evaluator) {
                    Ok(Some(shown)) => println!("{}", shown),
                    Ok(None) => {}
                    Err(error) => error.report(line, None),
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

/// Evaluate one line. Returns the text to echo when the line ends in an
/// expression statement that is not an assignment.
pub fn eval_line(source: &str, evaluator: &mut Evaluator) -> JsResult<Option<String>> {
    let tokens = Lexer::new(source).scan_tokens()?;
    let program = Parser::new(tokens).parse()?;
    let value = evaluator.evaluate_program(&program)?;
    Ok(shows_value(&program).then(|| value.repr()))
}

fn shows_value(program: &Program) -> bool {
    matches!(
        program.statements.last(),
        Some(Stmt::Expression { expr, .. }) if !matches!(expr, Expr::Assign { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::SharedOutput;
    use pretty_assertions::assert_eq;

    fn session() -> (Evaluator, SharedOutput) {
        let output = SharedOutput::new();
        (Evaluator::with_output(Box::new(output.clone())), output)
    }

    #[test]
    fn state_persists_between_lines() {
        let (mut evaluator, _) = session();
        assert_eq!(eval_line("let x = 40;", &mut evaluator).unwrap(), None);
        assert_eq!(eval_line("function inc(n) { return n + 1; }", &mut evaluator).unwrap(), None);
        assert_eq!(eval_line("inc(x) + 1", &mut evaluator).unwrap(), Some("42".to_string()));
    }

    #[test]
    fn assignments_are_not_echoed() {
        let (mut evaluator, _) = session();
        eval_line("let s;", &mut evaluator).unwrap();
        assert_eq!(eval_line("s = 'hi'", &mut evaluator).unwrap(), None);
        assert_eq!(eval_line("s", &mut evaluator).unwrap(), Some("'hi'".to_string()));
    }

    #[test]
    fn console_output_goes_to_sink() {
        let (mut evaluator, output) = session();
        assert_eq!(
            eval_line("console.log('a', 1)", &mut evaluator).unwrap(),
            Some("undefined".to_string())
        );
        assert_eq!(output.lines(), vec!["a 1"]);
    }

    #[test]
    fn errors_leave_session_usable() {
        let (mut evaluator, _) = session();
        assert!(eval_line("nope", &mut evaluator).is_err());
        assert_eq!(eval_line("1 + 1", &mut evaluator).unwrap(), Some("2".to_string()));
    }
}
