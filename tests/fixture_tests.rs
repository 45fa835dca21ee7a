// Conformance runs over the sample scripts in tests/fixtures.

use jsflow::error::ErrorKind;
use jsflow::evaluator::SharedOutput;
use jsflow::json::program_to_json;
use jsflow::printer;
use jsflow::runner::{run_source, RunOptions};
use pretty_assertions::assert_eq;

const FIB: &str = include_str!("fixtures/fib.js");
const WITH_CONSOLE: &str = include_str!("fixtures/with_console.js");
const PHASE2_FEATURES: &str = include_str!("fixtures/phase2_features.js");
const PHASE2_WORKING: &str = include_str!("fixtures/phase2_working.js");

fn run_capture(source: &str) -> (jsflow::JsResult<jsflow::Value>, Vec<String>) {
    let output = SharedOutput::new();
    let result = run_source(source, Box::new(output.clone()), &RunOptions::default());
    (result, output.lines())
}

#[test]
fn fibonacci_values() {
    let source = format!("{}\nconsole.log(fibonacci(10), fibonacci(0), fibonacci(1), fibonacci(20));", FIB);
    let (result, lines) = run_capture(&source);
    result.unwrap();
    assert_eq!(lines, vec!["55 0 1 6765"]);
}

#[test]
fn fibonacci_defines_without_output() {
    let (result, lines) = run_capture(FIB);
    result.unwrap();
    assert!(lines.is_empty());
}

#[test]
fn with_console_prints_in_execution_order() {
    let (result, lines) = run_capture(WITH_CONSOLE);
    result.unwrap();
    assert_eq!(
        lines,
        vec![
            "x = 10",
            "y = 20",
            "Calculating...",
            "Result: 30",
            "Sum: 30",
            "Starting greet function",
            "Name is: World",
            "Message: Hello, World!",
            "Final greeting: Hello, World!",
        ]
    );
}

#[test]
fn phase2_fixtures_parse() {
    for (name, source) in [("phase2_features", PHASE2_FEATURES), ("phase2_working", PHASE2_WORKING)] {
        let program = jsflow::parse(source).unwrap_or_else(|error| panic!("{} failed to parse: {}", name, error));
        assert!(!program.statements.is_empty(), "{} parsed to nothing", name);
    }
}

#[test]
fn phase2_scripts_stop_at_first_free_name() {
    // Both scripts iterate over an `items` binding they never declare.
    for source in [PHASE2_FEATURES, PHASE2_WORKING] {
        let (result, lines) = run_capture(source);
        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ReferenceError);
        assert_eq!(error.message, "items is not defined");
        assert!(lines.is_empty());
    }
}

#[test]
fn phase2_features_run_with_bindings_supplied() {
    let prelude = "
        const items = ['a', 'b'];
        const object = { k: 1 };
        const point = { x: 1, y: 2 };
        const array = [10, 20];
        const fetch = (u) => ({ json: () => u });
        const url = 'u';
    ";
    let source = format!("{}\n{}\nconsole.log(greeting, arr2.length, sum(1, 2, 3), x + y, first + second);", prelude, PHASE2_FEATURES);
    let (result, lines) = run_capture(&source);
    result.unwrap();
    assert_eq!(lines, vec!["a", "b", "k 1", "Hello, World! 5 6 3 30"]);
}

#[test]
fn fixtures_print_stably() {
    for source in [FIB, WITH_CONSOLE, PHASE2_FEATURES, PHASE2_WORKING] {
        let first = printer::print(&jsflow::parse(source).unwrap());
        let second = printer::print(&jsflow::parse(&first).unwrap());
        assert_eq!(first, second);
    }
}

#[test]
fn fixtures_round_trip_structurally() {
    for source in [FIB, WITH_CONSOLE, PHASE2_FEATURES, PHASE2_WORKING] {
        let program = jsflow::parse(source).unwrap();
        let reparsed = jsflow::parse(&printer::print(&program)).unwrap();
        assert_eq!(program_to_json(&program, None), program_to_json(&reparsed, None));
    }
}
