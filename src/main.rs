use clap::{Parser, Subcommand};
use jsflow::{init_tracing, json, printer, scope, EvaluatorOptions, JsError, RunOptions};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "jsflow")]
#[command(about = "A tree-walking interpreter for a subset of modern JavaScript", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Start in interactive REPL mode
    #[arg(short, long)]
    interactive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script
    Run {
        /// The script file to execute
        file: PathBuf,
        /// Stop after this many top-level statements
        #[arg(long, value_name = "N")]
        max_steps: Option<usize>,
        /// Maximum nesting of function calls
        #[arg(long, value_name = "N", default_value_t = EvaluatorOptions::default().max_call_depth)]
        max_call_depth: usize,
    },
    /// Print the token stream of a script, one JSON object per line
    Lex {
        file: PathBuf,
    },
    /// Print the syntax tree of a script as ESTree-style JSON
    Ast {
        file: PathBuf,
        /// Indent the output
        #[arg(long)]
        pretty: bool,
        /// Leave out `loc` positions
        #[arg(long)]
        no_loc: bool,
    },
    /// Print the scopes, bindings and references of a script
    Scope {
        file: PathBuf,
        /// Emit JSON instead of the indented listing
        #[arg(long)]
        json: bool,
    },
    /// Parse a script and print it back in normalized form
    #[command(alias = "parse")]
    Fmt {
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    init_tracing();
    dispatch(Cli::parse())
}

fn dispatch(cli: Cli) -> ExitCode {
    if cli.interactive {
        jsflow::start_repl();
        return ExitCode::SUCCESS;
    }
    match cli.command {
        Some(Commands::Run {
            file,
            max_steps,
            max_call_depth,
        }) => {
            let options = RunOptions {
                max_steps,
                evaluator: EvaluatorOptions { max_call_depth },
            };
            with_source(&file, |source, filename| {
                if jsflow::run(source, Some(filename), &options) {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            })
        }
        Some(Commands::Lex { file }) => with_source(&file, lex_file),
        Some(Commands::Fmt { file }) => with_source(&file, fmt_file),
        Some(Commands::Ast { file, pretty, no_loc }) => {
            with_source(&file, |source, filename| ast_file(source, filename, pretty, !no_loc))
        }
        Some(Commands::Scope { file, json }) => {
            with_source(&file, |source, filename| scope_file(source, filename, json))
        }
        None => {
            jsflow::start_repl();
            ExitCode::SUCCESS
        }
    }
}

fn with_source(path: &Path, action: impl FnOnce(&str, &str) -> ExitCode) -> ExitCode {
    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        return ExitCode::FAILURE;
    }
    match fs::read_to_string(path) {
        Ok(source) => action(&source, &path.display().to_string()),
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}

fn lex_file(source: &str, filename: &str) -> ExitCode {
    let (records, error) = json::token_records(source);
    for record in &records {
        if !print_json(record, false) {
            return ExitCode::FAILURE;
        }
    }
    match error {
        Some(error) => report(error, source, filename),
        None => ExitCode::SUCCESS,
    }
}

fn fmt_file(source: &str, filename: &str) -> ExitCode {
    match jsflow::parse(source) {
        Ok(program) => {
            print!("{}", printer::print(&program));
            ExitCode::SUCCESS
        }
        Err(error) => report(error, source, filename),
    }
}

fn ast_file(source: &str, filename: &str, pretty: bool, with_loc: bool) -> ExitCode {
    match jsflow::parse(source) {
        Ok(program) => {
            let tree = json::program_to_json(&program, with_loc.then_some(source));
            exit_code(print_json(&tree, pretty))
        }
        Err(error) => report(error, source, filename),
    }
}

fn scope_file(source: &str, filename: &str, as_json: bool) -> ExitCode {
    match jsflow::parse(source) {
        Ok(program) => {
            let scopes = scope::analyze(&program);
            if as_json {
                exit_code(print_json(&scopes.to_json(source), false))
            } else {
                print!("{}", scopes.dump(source));
                ExitCode::SUCCESS
            }
        }
        Err(error) => report(error, source, filename),
    }
}

fn print_json(value: &impl Serialize, pretty: bool) -> bool {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match text {
        Ok(text) => {
            println!("{}", text);
            true
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            false
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report(error: JsError, source: &str, filename: &str) -> ExitCode {
    error.report(source, Some(filename));
    ExitCode::FAILURE
}
