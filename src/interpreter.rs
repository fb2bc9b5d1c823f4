//! The evaluator: a visitor over `Expr`/`Stmt` threading the current
//! environment.
//!
//! `Return`'s non-local exit is implemented as a third `Result` outcome
//! alongside an ordinary error, simpler here than a panic-based carrier
//! since every call site that can produce one already returns a `Result`.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{Expr, FunDecl, LiteralKind, Stmt};
use crate::environment::Environment;
use crate::error::InterpretError;
use crate::token::{Token, TokenKind};
use crate::value::{ClassDefinition, ClassInstance, Function, FunctionBody, FunctionClosure, Value};

/// What unwinds the evaluator out of normal statement sequencing: either a
/// `return` carrying its value, or an error.
enum Unwind {
	Return(Value),
	Error(InterpretError),
}

impl From<InterpretError> for Unwind {
	fn from(error: InterpretError) -> Unwind {
		Unwind::Error(error)
	}
}

type EvalResult<T> = Result<T, Unwind>;

/// Runs `statements` starting from `globals`, halting at (and reporting) the
/// first interpret error. Returns the environment the evaluator ended on —
/// its current scope tail — alongside any errors, so a caller running
/// successive inputs against the same global scope (a REPL) can feed that
/// environment back in as the next call's `globals` and keep seeing
/// definitions made by earlier inputs.
pub fn interpret(statements: &[Stmt], globals: &Environment) -> (Environment, Vec<InterpretError>) {
	let mut interpreter = Interpreter {
		env: globals.clone(),
	};
	let mut errors = Vec::new();

	for stmt in statements {
		match interpreter.execute(stmt) {
			Ok(()) => continue,
			Err(Unwind::Error(error)) => {
				errors.push(error);
				break;
			}
			Err(Unwind::Return(_)) => {
				errors.push(InterpretError::new("cannot return from top-level code"));
				break;
			}
		}
	}

	(interpreter.env, errors)
}

struct Interpreter {
	env: Environment,
}

impl Interpreter {
	// --- statements --------------------------------------------------------------

	fn execute(&mut self, stmt: &Stmt) -> EvalResult<()> {
		match stmt {
			Stmt::Expression(expr) => {
				self.evaluate(expr)?;
				Ok(())
			}
			Stmt::Print(expr) => {
				let value = self.evaluate(expr)?;
				println!("{value}");
				Ok(())
			}
			Stmt::VarDecl { name, initializer } => {
				let value = match initializer {
					Some(expr) => self.evaluate(expr)?,
					None => Value::Nil,
				};
				self.env.define(&name.lexeme, value)?;
				Ok(())
			}
			Stmt::Block(statements) => {
				let scope = Environment::create(&self.env);
				self.execute_block(statements, scope)
			}
			Stmt::If {
				condition,
				then_branch,
				else_branch,
			} => {
				if self.evaluate(condition)?.is_truthy() {
					self.execute(then_branch)
				} else if let Some(else_branch) = else_branch {
					self.execute(else_branch)
				} else {
					Ok(())
				}
			}
			Stmt::While { condition, body } => {
				while self.evaluate(condition)?.is_truthy() {
					self.execute(body)?;
				}
				Ok(())
			}
			Stmt::For {
				initializer,
				condition,
				increment,
				body,
			} => self.execute_for(initializer, condition, increment, body),
			Stmt::Fun(decl) => self.declare_function(decl),
			Stmt::Return { value, .. } => {
				let value = match value {
					Some(expr) => self.evaluate(expr)?,
					None => Value::Nil,
				};
				Err(Unwind::Return(value))
			}
			Stmt::Class {
				name,
				superclass,
				methods,
			} => self.execute_class(name, superclass.as_ref(), methods),
		}
	}

	/// Runs `statements` with `scope` as the current environment, restoring
	/// the previous one on every exit path — success, error, or a `Return`
	/// unwinding through it.
	fn execute_block(&mut self, statements: &[Stmt], scope: Environment) -> EvalResult<()> {
		let previous = std::mem::replace(&mut self.env, scope);
		let mut result = Ok(());
		for stmt in statements {
			result = self.execute(stmt);
			if result.is_err() {
				break;
			}
		}
		self.env = previous;
		result
	}

	/// The initializer's scope must outlive the body's own per-iteration
	/// scope, so it gets a dedicated enclosing scope rather than reusing the
	/// surrounding block.
	fn execute_for(
		&mut self,
		initializer: &Option<Box<Stmt>>,
		condition: &Option<Expr>,
		increment: &Option<Expr>,
		body: &Stmt,
	) -> EvalResult<()> {
		let loop_scope = Environment::create(&self.env);
		let previous = std::mem::replace(&mut self.env, loop_scope);

		let result = (|| {
			if let Some(initializer) = initializer {
				self.execute(initializer)?;
			}
			loop {
				let should_continue = match condition {
					Some(condition) => self.evaluate(condition)?.is_truthy(),
					None => true,
				};
				if !should_continue {
					break;
				}
				self.execute(body)?;
				if let Some(increment) = increment {
					self.evaluate(increment)?;
				}
			}
			Ok(())
		})();

		self.env = previous;
		result
	}

	/// `fun` declarations: define the closure in the current scope, then —
	/// for ordinary functions, not methods — `extend` so that definitions
	/// coming after this one in the same scope land in a fresh node the
	/// closure never sees.
	fn declare_function(&mut self, decl: &Rc<FunDecl>) -> EvalResult<()> {
		let closure = self.make_closure(decl, false);
		self.env.define(&decl.name.lexeme, Value::Function(closure))?;
		if !decl.is_method {
			self.env = self.env.extend();
		}
		Ok(())
	}

	fn make_closure(&self, decl: &Rc<FunDecl>, force_initializer: bool) -> Rc<FunctionClosure> {
		let function = Rc::new(Function {
			params: decl.params.iter().map(|t| t.lexeme.clone()).collect(),
			body: FunctionBody::UserDefined(decl.body.clone()),
		});
		let is_initializer = force_initializer || (decl.is_method && decl.name.lexeme == "init");
		Rc::new(FunctionClosure::new(
			decl.name.lexeme.clone(),
			self.env.clone(),
			function,
			is_initializer,
		))
	}

	/// `class` declarations: resolve the superclass, build a fresh
	/// environment for the class's own methods, define the class in the
	/// outer scope, then protect that outer scope the same way a `fun`
	/// declaration does.
	fn execute_class(
		&mut self,
		name: &Token,
		superclass_name: Option<&Token>,
		methods: &[Rc<FunDecl>],
	) -> EvalResult<()> {
		let superclass = match superclass_name {
			Some(token) => {
				let value = self.env.get(&token.lexeme)?;
				match value {
					Value::Class(class) => Some(class),
					other => {
						return Err(InterpretError::new(format!(
							"superclass '{}' must be a class, got {}",
							token.lexeme,
							other.type_name()
						))
						.into())
					}
				}
			}
			None => None,
		};
		log::trace!(
			"declaring class '{}' (superclass: {:?})",
			name.lexeme,
			superclass.as_ref().map(|c| c.name.as_str())
		);

		let class_env = Environment::create(&self.env);
		let class_def = Rc::new(ClassDefinition {
			name: name.lexeme.clone(),
			env: class_env.clone(),
			superclass,
		});
		self.env.define(&name.lexeme, Value::Class(class_def))?;

		let previous = std::mem::replace(&mut self.env, class_env);
		let result = (|| {
			for method in methods {
				self.declare_function(method)?;
			}
			Ok(())
		})();
		self.env = previous;
		result?;

		self.env = self.env.extend();
		Ok(())
	}

	// --- expressions ------------------------------------------------------------

	fn evaluate(&mut self, expr: &Expr) -> EvalResult<Value> {
		match expr {
			Expr::Literal { lexeme, kind } => Ok(eval_literal(lexeme, *kind)?),
			Expr::Variable { name } => Ok(self.env.get(&name.lexeme)?),
			Expr::Grouping(inner) => self.evaluate(inner),
			Expr::Assign { name, value } => {
				let value = self.evaluate(value)?;
				self.env.assign(&name.lexeme, value.clone())?;
				Ok(value)
			}
			Expr::Unary { operator, right } => self.eval_unary(operator, right),
			Expr::Binary { left, operator, right } => self.eval_binary(left, operator, right),
			Expr::Call {
				callee,
				paren,
				arguments,
			} => self.eval_call(callee, paren, arguments),
			Expr::Get { object, name } => self.eval_get(object, name),
			Expr::Set { object, name, value } => self.eval_set(object, name, value),
		}
	}

	fn eval_unary(&mut self, operator: &Token, right: &Expr) -> EvalResult<Value> {
		let value = self.evaluate(right)?;
		match operator.kind {
			TokenKind::Minus => match value {
				Value::Number(n) => Ok(Value::Number(-n)),
				other => Err(InterpretError::new(format!(
					"operand of unary '-' must be a number, got {}",
					other.type_name()
				))
				.into()),
			},
			TokenKind::Bang => Ok(Value::Bool(!value.is_truthy())),
			_ => Err(InterpretError::internal("unreachable unary operator").into()),
		}
	}

	fn eval_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> EvalResult<Value> {
		// strict, left-to-right: no short-circuit for binary operators
		let left = self.evaluate(left)?;
		let right = self.evaluate(right)?;

		use TokenKind::*;
		let value = match operator.kind {
			Plus => match (&left, &right) {
				(Value::Number(a), Value::Number(b)) => Value::Number(a + b),
				(Value::String(a), Value::String(b)) => Value::string(format!("{a}{b}")),
				_ => return Err(type_error("+", &left, &right).into()),
			},
			Minus => {
				let (a, b) = numeric_operand(&left, &right, "-")?;
				Value::Number(a - b)
			}
			Star => {
				let (a, b) = numeric_operand(&left, &right, "*")?;
				Value::Number(a * b)
			}
			Slash => {
				let (a, b) = numeric_operand(&left, &right, "/")?;
				Value::Number(a / b)
			}
			Greater => Value::Bool(compare(&left, &right, ">")? == Ordering::Greater),
			GreaterEqual => Value::Bool(compare(&left, &right, ">=")? != Ordering::Less),
			Less => Value::Bool(compare(&left, &right, "<")? == Ordering::Less),
			LessEqual => Value::Bool(compare(&left, &right, "<=")? != Ordering::Greater),
			EqualEqual => Value::Bool(left == right),
			BangEqual => Value::Bool(left != right),
			_ => return Err(InterpretError::internal("unreachable binary operator").into()),
		};
		Ok(value)
	}

	fn eval_call(&mut self, callee: &Expr, _paren: &Token, arguments: &[Expr]) -> EvalResult<Value> {
		let callee = self.evaluate(callee)?;
		let mut args = Vec::with_capacity(arguments.len());
		for argument in arguments {
			args.push(self.evaluate(argument)?);
		}

		match callee {
			Value::Function(closure) => self.invoke(&closure, args),
			Value::Class(class) => self.instantiate(&class, args),
			other => Err(InterpretError::new(format!(
				"tried to call non-callable object of type '{}'",
				other.type_name()
			))
			.into()),
		}
	}

	/// Call dispatch for a `FunctionClosure`: arity-check, bind parameters in
	/// a fresh environment parented to the closure's captured one, run the
	/// body, and — for an initializer — substitute `this` for whatever the
	/// body actually returned.
	fn invoke(&mut self, closure: &Rc<FunctionClosure>, args: Vec<Value>) -> EvalResult<Value> {
		if args.len() != closure.arity() {
			return Err(InterpretError::new(format!(
				"'{}' expects {} argument(s) but got {}",
				closure.name(),
				closure.arity(),
				args.len()
			))
			.into());
		}

		let body = match &closure.function.body {
			FunctionBody::Native(native) => return Ok(native(&args)?),
			FunctionBody::UserDefined(body) => body.clone(),
		};

		let call_scope = Environment::create(&closure.env);
		for (param, arg) in closure.function.params.iter().zip(args) {
			call_scope.define(param, arg)?;
		}

		let previous = std::mem::replace(&mut self.env, call_scope);
		let mut outcome = Ok(Value::Nil);
		for stmt in body.iter() {
			match self.execute(stmt) {
				Ok(()) => continue,
				Err(Unwind::Return(value)) => {
					outcome = Ok(value);
					break;
				}
				Err(err @ Unwind::Error(_)) => {
					outcome = Err(err);
					break;
				}
			}
		}
		self.env = previous;

		if closure.is_initializer.get() {
			match outcome {
				Ok(Value::Nil) => Ok(closure.env.get("this")?),
				Ok(_) => Err(InterpretError::new("cannot return a value from an initializer").into()),
				Err(err) => Err(err),
			}
		} else {
			outcome
		}
	}

	/// Class instantiation: materialize one environment copy per level of
	/// the inheritance chain (root to leaf, so each level's copy is parented
	/// to the one above it), rebind that level's methods to its own copy,
	/// then inject `this` (always the leaf instance) and `super` (the next
	/// instance up) into every level.
	fn instantiate(&mut self, class: &Rc<ClassDefinition>, args: Vec<Value>) -> EvalResult<Value> {
		let mut chain = Vec::new();
		let mut next = Some(class.clone());
		while let Some(class) = next {
			next = class.superclass.clone();
			chain.push(class);
		}
		// chain[0] is the leaf (the class being instantiated), chain[last] the root.

		let mut level_envs: Vec<Environment> = Vec::with_capacity(chain.len());
		for class in chain.iter().rev() {
			let parent = level_envs
				.last()
				.cloned()
				.or_else(|| class.env.parent())
				.unwrap_or_else(Environment::root);
			level_envs.push(class.env.copy_with_parent(parent));
		}
		level_envs.reverse(); // level_envs[i] now corresponds to chain[i]

		for env in &level_envs {
			env.rebind_methods();
		}

		let instances: Vec<Rc<ClassInstance>> = level_envs
			.iter()
			.zip(chain.iter())
			.map(|(env, class)| {
				Rc::new(ClassInstance {
					class_name: class.name.clone(),
					env: env.clone(),
				})
			})
			.collect();

		let leaf_instance = instances[0].clone();
		for (i, env) in level_envs.iter().enumerate() {
			env.upsert_in_scope("this", Value::Instance(leaf_instance.clone()));
			if let Some(parent_instance) = instances.get(i + 1) {
				env.upsert_in_scope("super", Value::Instance(parent_instance.clone()));
			}
		}

		log::trace!(
			"instantiated '{}' ({} level(s) of inheritance)",
			class.name,
			chain.len()
		);

		if let Ok(Value::Function(init)) = level_envs[0].get("init") {
			self.invoke(&init, args)?;
		}

		Ok(Value::Instance(leaf_instance))
	}

	/// `Get` is a single environment lookup on the instance's own
	/// environment — inherited methods and fields are found by the normal
	/// chain walk through the instance's inheritance-parented copies.
	fn eval_get(&mut self, object: &Expr, name: &Token) -> EvalResult<Value> {
		let object = self.evaluate(object)?;
		match object {
			Value::Instance(instance) => Ok(instance.env.get(&name.lexeme)?),
			other => Err(InterpretError::new(format!(
				"cannot access property '{}' on non-instance value of type '{}'",
				name.lexeme,
				other.type_name()
			))
			.into()),
		}
	}

	fn eval_set(&mut self, object: &Expr, name: &Token, value: &Expr) -> EvalResult<Value> {
		let object = self.evaluate(object)?;
		let instance = match object {
			Value::Instance(instance) => instance,
			other => {
				return Err(InterpretError::new(format!(
					"cannot set property '{}' on non-instance value of type '{}'",
					name.lexeme,
					other.type_name()
				))
				.into())
			}
		};

		let mut value = self.evaluate(value)?;
		if let Value::Function(closure) = &value {
			value = Value::Function(closure.retagged(&name.lexeme));
		}
		instance.env.upsert_in_scope(&name.lexeme, value);
		Ok(Value::Nil)
	}
}

fn eval_literal(lexeme: &str, kind: LiteralKind) -> Result<Value, InterpretError> {
	match kind {
		LiteralKind::Nil => Ok(Value::Nil),
		LiteralKind::True => Ok(Value::Bool(true)),
		LiteralKind::False => Ok(Value::Bool(false)),
		LiteralKind::String => Ok(Value::string(lexeme)),
		LiteralKind::Number => match lexeme.parse::<f64>() {
			Ok(n) if n.is_infinite() => Err(InterpretError::new("number too large")),
			Ok(n) => Ok(Value::Number(n)),
			Err(_) => Err(InterpretError::new("unable to read number")),
		},
	}
}

fn type_error(op: &str, left: &Value, right: &Value) -> InterpretError {
	InterpretError::new(format!(
		"operands of '{op}' must both be numbers or both strings, got {} and {}",
		left.type_name(),
		right.type_name()
	))
}

fn numeric_operand(left: &Value, right: &Value, op: &str) -> Result<(f64, f64), InterpretError> {
	match (left, right) {
		(Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
		_ => Err(type_error(op, left, right)),
	}
}

fn compare(left: &Value, right: &Value, op: &str) -> Result<Ordering, InterpretError> {
	match (left, right) {
		(Value::Number(a), Value::Number(b)) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
		(Value::String(a), Value::String(b)) => Ok(a.as_ref().cmp(b.as_ref())),
		_ => Err(type_error(op, left, right)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::builtins::init_builtins;
	use crate::parser::parse;
	use crate::scanner::scan;

	fn run(src: &str) -> Result<(), Vec<InterpretError>> {
		let (tokens, serr) = scan(src);
		assert!(serr.is_empty(), "{:?}", serr);
		let (stmts, perr) = parse(tokens);
		assert!(perr.is_empty(), "{:?}", perr);
		let globals = Environment::root();
		init_builtins(&globals);
		let (_, errors) = interpret(&stmts, &globals);
		if errors.is_empty() {
			Ok(())
		} else {
			Err(errors)
		}
	}

	fn run_and_get(src: &str, var: &str) -> Value {
		let (tokens, serr) = scan(src);
		assert!(serr.is_empty());
		let (stmts, perr) = parse(tokens);
		assert!(perr.is_empty(), "{:?}", perr);
		let globals = Environment::root();
		init_builtins(&globals);
		let (globals, errors) = interpret(&stmts, &globals);
		assert!(errors.is_empty(), "{:?}", errors);
		globals.get(var).unwrap()
	}

	#[test]
	fn variable_use_and_reassignment() {
		assert_eq!(
			run_and_get("var a = 3; var b = 2 * a;", "b"),
			Value::Number(6.0)
		);
		assert_eq!(
			run_and_get("var a = 3; a = 2 * a;", "a"),
			Value::Number(6.0)
		);
	}

	#[test]
	fn assign_before_define_fails() {
		assert!(run("x = 1;").is_err());
	}

	#[test]
	fn redefinition_within_a_scope_fails_but_nested_blocks_do_not() {
		assert!(run("var x = 1; var x = 2;").is_err());
		assert!(run("var x = 1; { var x = 2; }").is_ok());
	}

	#[test]
	fn arithmetic_precedence_scenario() {
		assert_eq!(
			run_and_get("var r = (5/1+2)*--8;", "r"),
			Value::Number(56.0)
		);
	}

	#[test]
	fn string_concatenation_and_type_errors() {
		assert_eq!(
			run_and_get("var s = \"a\" + \"b\";", "s"),
			Value::string("ab")
		);
		assert!(run("var x = \"a\" + 1;").is_err());
	}

	#[test]
	fn inheritance_and_super() {
		let src = r#"
			class A { greet() { return "A"; } }
			class B < A { greet() { return super.greet() + "B"; } }
			var r = B().greet();
		"#;
		assert_eq!(run_and_get(src, "r"), Value::string("AB"));
	}

	#[test]
	fn initializer_returns_this_and_forbids_explicit_value() {
		let src = r#"
			class P { init(x) { this.x = x; } }
			var p = P(42);
			var r = p.x;
		"#;
		assert_eq!(run_and_get(src, "r"), Value::Number(42.0));

		assert!(run("class P { init() { return 5; } } P();").is_err());
		assert!(run("class P { init() { return; } } P();").is_ok());
	}

	#[test]
	fn method_extracted_from_instance_still_sees_this() {
		let src = r#"
			class Counter { init() { this.n = 0; } inc() { this.n = this.n + 1; return this.n; } }
			var c = Counter();
			var f = c.inc;
			f();
			var r = f();
		"#;
		assert_eq!(run_and_get(src, "r"), Value::Number(2.0));
	}

	#[test]
	fn wrong_arity_raises_interpret_error_naming_the_function() {
		let errors = run("fun f(a, b) { return a + b; } f(1);").unwrap_err();
		assert!(errors[0].message.contains('f'));
	}

	#[test]
	fn closure_capture_locality_via_scope_tail() {
		let src = r#"
			fun outer() {
				var a = 1;
				fun inner() { return a; }
				var a2 = 2;
				return inner();
			}
			var r = outer();
		"#;
		assert_eq!(run_and_get(src, "r"), Value::Number(1.0));
	}

	#[test]
	fn closure_counter_scenario() {
		let src = r#"
			fun makeCounter() {
				var n = 0;
				fun inc() { n = n + 1; return n; }
				return inc;
			}
			var c = makeCounter();
			var a = c();
			var b = c();
			var d = c();
		"#;
		let (tokens, serr) = scan(src);
		assert!(serr.is_empty());
		let (stmts, perr) = parse(tokens);
		assert!(perr.is_empty());
		let globals = Environment::root();
		init_builtins(&globals);
		let (globals, errors) = interpret(&stmts, &globals);
		assert!(errors.is_empty(), "{:?}", errors);
		assert_eq!(globals.get("a").unwrap(), Value::Number(1.0));
		assert_eq!(globals.get("b").unwrap(), Value::Number(2.0));
		assert_eq!(globals.get("d").unwrap(), Value::Number(3.0));
	}

	#[test]
	fn top_level_definitions_after_a_fun_decl_stay_reachable() {
		// A `fun`/`class` declaration opens a fresh scope tail (so the
		// closure it defines doesn't see later sibling definitions); the
		// environment `interpret` returns must be that same tail, so a
		// caller chaining further input against it still sees `saved`.
		let src = "fun id(x) { return x; } var saved = 42;";
		let (tokens, serr) = scan(src);
		assert!(serr.is_empty());
		let (stmts, perr) = parse(tokens);
		assert!(perr.is_empty());
		let globals = Environment::root();
		init_builtins(&globals);
		let (globals, errors) = interpret(&stmts, &globals);
		assert!(errors.is_empty(), "{:?}", errors);
		assert_eq!(globals.get("saved").unwrap(), Value::Number(42.0));
	}

	#[test]
	fn for_loop_sums_to_expected_value() {
		let src = r#"
			var sum = 0;
			for (var i = 0; i < 5; i = i + 1) { sum = sum + i; }
		"#;
		assert_eq!(run_and_get(src, "sum"), Value::Number(10.0));
	}
}
