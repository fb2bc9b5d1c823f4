//! CLI/REPL driver: a hand-rolled argument loop rather than a dependency
//! on an argument-parsing crate, since the surface here is this small.

use std::io::{self, Write};

use kestrel::{init_builtins, interpret, parse, scan, Environment};

enum Mode {
	Script(String),
	Commands(String),
	Repl,
}

fn main() {
	env_logger::init();

	let args: Vec<String> = std::env::args().skip(1).collect();
	match parse_args(&args) {
		Ok(ArgsOutcome::Mode(mode)) => {
			let code = run(mode);
			std::process::exit(code);
		}
		Ok(ArgsOutcome::Handled) => {}
		Err(message) => {
			print_usage();
			eprintln!("error: {message}");
			std::process::exit(1);
		}
	}
}

enum ArgsOutcome {
	Mode(Mode),
	Handled,
}

fn parse_args(args: &[String]) -> Result<ArgsOutcome, String> {
	let mut script: Option<String> = None;
	let mut commands: Option<String> = None;

	let mut i = 0;
	while i < args.len() {
		match args[i].as_str() {
			"--version" | "-v" => {
				println!("kestrel {}", env!("CARGO_PKG_VERSION"));
				return Ok(ArgsOutcome::Handled);
			}
			"--help" | "-h" => {
				print_usage();
				return Ok(ArgsOutcome::Handled);
			}
			"-s" | "--script" => {
				let path = args.get(i + 1).ok_or("-s/--script requires a path")?;
				script = Some(path.clone());
				i += 1;
			}
			"-c" | "--commands" => {
				let source = args.get(i + 1).ok_or("-c/--commands requires a source string")?;
				commands = Some(source.clone());
				i += 1;
			}
			other => return Err(format!("unrecognized argument '{other}'")),
		}
		i += 1;
	}

	match (script, commands) {
		(Some(_), Some(_)) => Err("-s/--script and -c/--commands are mutually exclusive".to_string()),
		(Some(path), None) => Ok(ArgsOutcome::Mode(Mode::Script(path))),
		(None, Some(source)) => Ok(ArgsOutcome::Mode(Mode::Commands(source))),
		(None, None) => Ok(ArgsOutcome::Mode(Mode::Repl)),
	}
}

fn print_usage() {
	println!("USAGE:");
	println!("  kestrel -s, --script <path>      run a script file");
	println!("  kestrel -c, --commands <source>  run an inline source string");
	println!("  kestrel                          start a REPL");
}

/// Exit codes: `0` success, `1` cannot open script file, `65` uncaught
/// interpret error, `64` reported syntax/parse errors.
fn run(mode: Mode) -> i32 {
	match mode {
		Mode::Script(path) => {
			let source = match std::fs::read_to_string(&path) {
				Ok(source) => source,
				Err(err) => {
					eprintln!("error: cannot open '{path}': {err}");
					return 1;
				}
			};
			let mut globals = Environment::root();
			init_builtins(&globals);
			run_source(&source, &mut globals)
		}
		Mode::Commands(source) => {
			let mut globals = Environment::root();
			init_builtins(&globals);
			run_source(&source, &mut globals)
		}
		Mode::Repl => {
			repl();
			0
		}
	}
}

fn run_source(source: &str, globals: &mut Environment) -> i32 {
	let (tokens, syntax_errors) = scan(source);
	if !syntax_errors.is_empty() {
		for error in &syntax_errors {
			eprintln!("{error}");
		}
		return 64;
	}

	let (statements, parse_errors) = parse(tokens);
	if !parse_errors.is_empty() {
		for error in &parse_errors {
			eprintln!("{error}");
		}
		return 64;
	}

	let (new_globals, interpret_errors) = interpret(&statements, globals);
	*globals = new_globals;
	if let Some(error) = interpret_errors.first() {
		eprintln!("{error}");
		return 65;
	}

	0
}

/// One persistent global environment for the whole session: it is
/// threaded through every line so definitions from one line stay visible
/// to the next.
fn repl() {
	let mut globals = Environment::root();
	init_builtins(&globals);

	let stdin = io::stdin();
	loop {
		print!("> ");
		if io::stdout().flush().is_err() {
			break;
		}

		let mut line = String::new();
		let bytes_read = match stdin.read_line(&mut line) {
			Ok(n) => n,
			Err(err) => {
				eprintln!("error: {err}");
				break;
			}
		};
		if bytes_read == 0 {
			break; // EOF
		}
		if line.trim().is_empty() {
			continue;
		}

		run_source(&line, &mut globals);
	}
}
