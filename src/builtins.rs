//! `clock` and `version`, the only two standard-library entries this core
//! has, installed into the global environment before execution.
//!
//! `clock` is backed by `std::time::Instant`, which is monotonic, pinned
//! once at process start.

use std::rc::Rc;
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::environment::Environment;
use crate::error::InterpretError;
use crate::value::{Function, FunctionBody, FunctionClosure, Value};

static ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

fn clock(args: &[Value]) -> Result<Value, InterpretError> {
	debug_assert!(args.is_empty());
	let millis = ORIGIN.elapsed().as_secs_f64() * 1000.0;
	Ok(Value::Number(millis))
}

fn version(args: &[Value]) -> Result<Value, InterpretError> {
	debug_assert!(args.is_empty());
	Ok(Value::string("kestrel-treewalk"))
}

fn native(globals: &Environment, name: &str, arity: usize, body: NativeFnPtr) {
	let function = Rc::new(Function {
		params: (0..arity).map(|i| format!("_{i}")).collect(),
		body: FunctionBody::Native(body),
	});
	let closure = Rc::new(FunctionClosure::new(
		name.to_string(),
		globals.clone(),
		function,
		false,
	));
	globals
		.define(name, Value::Function(closure))
		.expect("builtins are defined once into a fresh global scope");
}

type NativeFnPtr = fn(&[Value]) -> Result<Value, InterpretError>;

/// Installs `clock` and `version` into `globals`.
pub fn init_builtins(globals: &Environment) {
	log::debug!("registering built-ins: clock, version");
	native(globals, "clock", 0, clock);
	native(globals, "version", 0, version);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clock_is_monotonic_across_two_calls() {
		let first = clock(&[]).unwrap();
		let second = clock(&[]).unwrap();
		match (first, second) {
			(Value::Number(a), Value::Number(b)) => assert!(b >= a),
			_ => panic!("expected numbers"),
		}
	}

	#[test]
	fn version_identifies_the_implementation() {
		assert_eq!(version(&[]).unwrap(), Value::string("kestrel-treewalk"));
	}

	#[test]
	fn init_builtins_registers_both_names() {
		let globals = Environment::root();
		init_builtins(&globals);
		assert!(matches!(globals.get("clock"), Ok(Value::Function(_))));
		assert!(matches!(globals.get("version"), Ok(Value::Function(_))));
	}
}
