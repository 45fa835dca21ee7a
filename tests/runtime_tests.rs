// End-to-end runtime behaviour through the public pipeline.

use jsflow::error::{ErrorKind, JsError};
use jsflow::evaluator::{Evaluator, EvaluatorOptions, SharedOutput};
use jsflow::runner::{run_source, RunOptions};
use jsflow::{Span, Value};
use pretty_assertions::assert_eq;

fn output_of(source: &str) -> Vec<String> {
    let output = SharedOutput::new();
    if let Err(error) = run_source(source, Box::new(output.clone()), &RunOptions::default()) {
        panic!("script failed: {}\n{}", error, error.render(source, None));
    }
    output.lines()
}

fn error_of(source: &str) -> (JsError, Vec<String>) {
    let output = SharedOutput::new();
    let error = run_source(source, Box::new(output.clone()), &RunOptions::default()).unwrap_err();
    (error, output.lines())
}

#[test]
fn inheritance_chains_super_calls() {
    let lines = output_of(
        r#"
        class Animal {
            constructor(name) { this.name = name; }
            speak() { return "sound"; }
        }
        class Dog extends Animal {
            speak() { return super.speak() + "+bark"; }
        }
        const d = new Dog("Rex");
        console.log(d.speak());
        console.log(d.name);
        "#,
    );
    assert_eq!(lines, vec!["sound+bark", "Rex"]);
}

#[test]
fn template_literals_in_methods() {
    let lines = output_of(
        r#"
        class Animal {
            constructor(name) { this.name = name; }
            speak() { console.log(`${this.name} makes a sound`); }
        }
        class Dog extends Animal {
            constructor(name, breed) { super(name); this.breed = breed; }
            speak() { super.speak(); console.log(`${this.name} barks`); }
        }
        new Dog("Rex", "lab").speak();
        "#,
    );
    assert_eq!(lines, vec!["Rex makes a sound", "Rex barks"]);
}

#[test]
fn destructuring_binds_and_swaps() {
    let lines = output_of(
        "
        const { x, y = 5, ...more } = { x: 1, z: 3 };
        const [first, , third] = [10, 20, 30];
        let a = 1, b = 2;
        [a, b] = [b, a];
        console.log(x, y, more, first, third, a, b);
        ",
    );
    assert_eq!(lines, vec!["1 5 { z: 3 } 10 30 2 1"]);
}

#[test]
fn spread_and_rest() {
    let lines = output_of(
        "
        function sum(...numbers) { return numbers.reduce((a, b) => a + b, 0); }
        console.log(sum(1, 2, 3));
        console.log([...[1, 2], 3]);
        console.log(sum(...[4, 5]));
        const base = { a: 1, b: 2 };
        console.log({ ...base, b: 3 });
        ",
    );
    assert_eq!(lines, vec!["6", "[ 1, 2, 3 ]", "9", "{ a: 1, b: 3 }"]);
}

#[test]
fn const_violation_keeps_binding() {
    let output = SharedOutput::new();
    let mut evaluator = Evaluator::with_output(Box::new(output));
    let program = jsflow::parse("const limit = 3;\nlimit = 4;").unwrap();
    let error = evaluator.evaluate_program(&program).unwrap_err();
    assert_eq!(error.kind, ErrorKind::ConstReassignment);
    assert_eq!(error.span.start, 17);

    let value = evaluator.global_environment().borrow().get("limit", Span::default()).unwrap();
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn reference_error_keeps_earlier_output() {
    let (error, lines) = error_of("console.log('first');\nconsole.log(second);\nconsole.log('third');");
    assert_eq!(error.kind, ErrorKind::ReferenceError);
    assert_eq!(error.message, "second is not defined");
    assert_eq!(lines, vec!["first"]);
}

#[test]
fn deep_recursion_hits_call_limit() {
    let output = SharedOutput::new();
    let mut evaluator = Evaluator::with_options(EvaluatorOptions { max_call_depth: 24 }, Box::new(output));
    let program = jsflow::parse("function down(n) { return down(n + 1); }\ndown(0);").unwrap();
    let error = evaluator.evaluate_program(&program).unwrap_err();
    assert_eq!(error.kind, ErrorKind::RangeError);
    assert_eq!(error.message, "Maximum call stack size exceeded");
}

#[test]
fn bounded_recursion_below_limit_succeeds() {
    let lines = output_of("function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); }\nconsole.log(depth(30));");
    assert_eq!(lines, vec!["30"]);
}

#[test]
fn super_misuse_is_reported() {
    let (error, _) = error_of("function f() { return super.x; }\nf();");
    assert_eq!(error.kind, ErrorKind::SuperMisuse);

    let (error, _) = error_of("class A {}\nclass B extends A { constructor() { this.x = 1; } }\nnew B();");
    assert_eq!(error.kind, ErrorKind::SuperMisuse);

    let (error, _) = error_of("class A { m() { return super.m(); } }\nnew A().m();");
    assert_eq!(error.kind, ErrorKind::SuperMisuse);
}

#[test]
fn closures_share_mutable_state() {
    let lines = output_of(
        "
        function makeCounter() {
            let count = 0;
            return { inc: () => ++count, get: () => count };
        }
        const c = makeCounter();
        c.inc(); c.inc();
        console.log(c.get());
        const other = makeCounter();
        console.log(other.get());
        ",
    );
    assert_eq!(lines, vec!["2", "0"]);
}

#[test]
fn array_and_string_builtins() {
    let lines = output_of(
        "
        const xs = [3, 1, 2];
        xs.push(4);
        console.log(xs.length, xs.map(x => x * 2).join('-'));
        console.log(xs.filter(x => x > 1), xs.indexOf(2), xs.includes(9));
        console.log('Hello'.toUpperCase(), 'a,b,c'.split(','), '  pad '.trim());
        console.log(Math.max(1, 7, 3), Math.floor(2.7), Object.keys({ p: 1, q: 2 }));
        ",
    );
    assert_eq!(
        lines,
        vec![
            "4 6-2-4-8",
            "[ 3, 2, 4 ] 2 false",
            "HELLO [ 'a', 'b', 'c' ] pad",
            "7 2 [ 'p', 'q' ]",
        ]
    );
}

#[test]
fn loops_and_control_flow() {
    let lines = output_of(
        "
        let out = [];
        let i = 0;
        while (true) { i++; if (i > 5) break; if (i % 2) continue; out.push(i); }
        do { out.push('d'); } while (false);
        for (const ch of 'ab') out.push(ch);
        for (const k in [7, 8]) out.push(k);
        console.log(out.join(' '));
        ",
    );
    assert_eq!(lines, vec!["2 4 d a b 0 1"]);
}

#[test]
fn equality_and_typeof() {
    let lines = output_of(
        "
        console.log(1 == '1', 1 === '1', null == undefined, null === undefined);
        console.log(typeof 1, typeof 'a', typeof undefined, typeof null, typeof {}, typeof (() => 0), typeof missing);
        ",
    );
    assert_eq!(
        lines,
        vec![
            "true false true false",
            "number string undefined object object function undefined",
        ]
    );
}

#[test]
fn calling_a_non_function_is_type_error() {
    let (error, _) = error_of("const n = 5;\nn();");
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "n is not a function");
}

#[test]
fn diagnostics_render_with_location() {
    let source = "let a = 1;\nconsole.log(b);";
    let (error, _) = error_of(source);
    assert_eq!(error.span.line_col(source), (2, 13));
    let rendered = error.render(source, Some("main.js"));
    assert!(rendered.contains("b is not defined"));
    assert!(rendered.contains("main.js"));
}

#[test]
fn await_in_async_function_is_synchronous() {
    let lines = output_of(
        "
        async function load() { const v = await 20; return v + 1; }
        console.log(load());
        const later = async () => 'done';
        console.log(later());
        ",
    );
    assert_eq!(lines, vec!["21", "done"]);
}
