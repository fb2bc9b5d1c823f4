//! The environment chain and its scope-partitioning discipline.
//!
//! A scope is not always one node — it can be a sequence of chained nodes,
//! and whether a later definition is visible to an earlier closure depends
//! on which node the closure captured, not on an AST-level resolver pass.
//! This is what gives the scope-tail discipline its "a function declared
//! after `var a = 1` but before `var a = 2` still sees `a == 1`" property.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::InterpretError;
use crate::value::{FunctionClosure, Value};

struct Node {
	values: RefCell<HashMap<String, Value>>,
	parent: Option<Environment>,
	is_scope_start: Cell<bool>,
	is_scope_end: Cell<bool>,
}

/// A reference-counted handle to one node of the environment chain.
///
/// Cloning an `Environment` is cheap (an `Rc` bump) and is how closures
/// capture "the current environment": the clone shares the same node, so
/// later mutations of that node (new sibling definitions before an
/// `extend`) are visible through every clone, while an `extend` call swaps
/// the *caller's* handle to a fresh node without touching the clones anyone
/// else is already holding.
#[derive(Clone)]
pub struct Environment(Rc<Node>);

impl Environment {
	/// Opens a fresh scope parented to `parent` (§4.2 `create`).
	pub fn create(parent: &Environment) -> Environment {
		Environment(Rc::new(Node {
			values: RefCell::new(HashMap::new()),
			parent: Some(parent.clone()),
			is_scope_start: Cell::new(true),
			is_scope_end: Cell::new(true),
		}))
	}

	/// The outermost environment: no parent, so `get`/`assign` bottom out here.
	pub fn root() -> Environment {
		Environment(Rc::new(Node {
			values: RefCell::new(HashMap::new()),
			parent: None,
			is_scope_start: Cell::new(true),
			is_scope_end: Cell::new(true),
		}))
	}

	/// Opens a new tail within the same scope (§4.2 `extend`): the predecessor
	/// stops being the scope's tail, and a new node — parented to the
	/// predecessor — becomes it. Anything that already captured the
	/// predecessor (e.g. a function's closure) does not see definitions added
	/// to the new tail.
	pub fn extend(&self) -> Environment {
		self.0.is_scope_end.set(false);
		Environment(Rc::new(Node {
			values: RefCell::new(HashMap::new()),
			parent: Some(self.clone()),
			is_scope_start: Cell::new(false),
			is_scope_end: Cell::new(true),
		}))
	}

	/// Defines `name` in this node, which must be a scope-tail. Fails if
	/// `name` is already defined anywhere in the current scope's node-chain
	/// (shadowing is only allowed across a scope boundary).
	pub fn define(&self, name: &str, value: Value) -> Result<(), InterpretError> {
		debug_assert!(self.0.is_scope_end.get(), "define called on a non-tail node");
		if self.defined_in_current_scope(name) {
			return Err(InterpretError::new(format!(
				"variable '{name}' already defined in this scope"
			)));
		}
		self.0.values.borrow_mut().insert(name.to_string(), value);
		Ok(())
	}

	fn defined_in_current_scope(&self, name: &str) -> bool {
		let mut node = self.0.clone();
		loop {
			if node.values.borrow().contains_key(name) {
				return true;
			}
			if node.is_scope_start.get() {
				return false;
			}
			match &node.parent {
				Some(parent) => node = parent.0.clone(),
				None => return false,
			}
		}
	}

	/// Walks the whole chain to the nearest definition and mutates it in place.
	pub fn assign(&self, name: &str, value: Value) -> Result<(), InterpretError> {
		let mut node = &self.0;
		loop {
			if node.values.borrow().contains_key(name) {
				node.values.borrow_mut().insert(name.to_string(), value);
				return Ok(());
			}
			match &node.parent {
				Some(parent) => node = &parent.0,
				None => {
					return Err(InterpretError::new(format!("undefined variable '{name}'")));
				}
			}
		}
	}

	/// Walks the whole chain and returns the nearest bound value.
	pub fn get(&self, name: &str) -> Result<Value, InterpretError> {
		let mut node = &self.0;
		loop {
			if let Some(value) = node.values.borrow().get(name) {
				return Ok(value.clone());
			}
			match &node.parent {
				Some(parent) => node = &parent.0,
				None => {
					return Err(InterpretError::new(format!("undefined variable '{name}'")));
				}
			}
		}
	}

	/// Assigns if `name` is present anywhere in the current scope's
	/// node-chain, otherwise defines it on this (tail) node. Used for `Set`
	/// on instances, where fields accumulate without the usual
	/// duplicate-definition check (§4.2 `upsertInScope`).
	pub fn upsert_in_scope(&self, name: &str, value: Value) {
		let mut node = self.0.clone();
		loop {
			if node.values.borrow().contains_key(name) {
				node.values.borrow_mut().insert(name.to_string(), value);
				return;
			}
			if node.is_scope_start.get() {
				break;
			}
			match &node.parent {
				Some(parent) => node = parent.0.clone(),
				None => break,
			}
		}
		self.0.values.borrow_mut().insert(name.to_string(), value);
	}

	/// Clones this node's own bindings (not the chain) into a detached copy
	/// parented to `parent`. Used when materializing a class's per-instance
	/// environment: each level of the inheritance chain gets its own copy of
	/// the class's defining environment, rather than sharing the class's
	/// single environment across every instance.
	pub fn copy_with_parent(&self, parent: Environment) -> Environment {
		Environment(Rc::new(Node {
			values: RefCell::new(self.0.values.borrow().clone()),
			parent: Some(parent),
			is_scope_start: Cell::new(true),
			is_scope_end: Cell::new(true),
		}))
	}

	/// The environment this one's chain walks to next, if any. Used only to
	/// seed a fresh copy's parent without re-deriving it (class instantiation).
	pub fn parent(&self) -> Option<Environment> {
		self.0.parent.clone()
	}

	/// Rebinds every `FunctionClosure` defined directly on this node so it
	/// closes over this node instead of whatever environment it was declared
	/// in. Used after `copy_with_parent` during class instantiation: without
	/// this, every instance's methods would still share the class's single
	/// defining environment and see the same `this`/`super`.
	pub fn rebind_methods(&self) {
		let mut values = self.0.values.borrow_mut();
		let names: Vec<String> = values.keys().cloned().collect();
		for name in names {
			if let Some(Value::Function(closure)) = values.get(&name) {
				let rebound = FunctionClosure::new(
					closure.name(),
					self.clone(),
					closure.function.clone(),
					closure.is_initializer.get(),
				);
				values.insert(name, Value::Function(Rc::new(rebound)));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shadowing_across_scopes_does_not_affect_outer() {
		let global = Environment::root();
		global.define("x", Value::Number(1.0)).unwrap();

		let inner = Environment::create(&global);
		inner.define("x", Value::Number(2.0)).unwrap();

		assert_eq!(inner.get("x").unwrap(), Value::Number(2.0));
		assert_eq!(global.get("x").unwrap(), Value::Number(1.0));
	}

	#[test]
	fn redefinition_within_same_scope_fails() {
		let global = Environment::root();
		global.define("x", Value::Number(1.0)).unwrap();
		assert!(global.define("x", Value::Number(2.0)).is_err());
	}

	#[test]
	fn redefinition_after_extend_succeeds() {
		let global = Environment::root();
		global.define("x", Value::Number(1.0)).unwrap();
		let tail = global.extend();
		assert!(tail.define("x", Value::Number(2.0)).is_ok());
		assert_eq!(tail.get("x").unwrap(), Value::Number(2.0));
	}

	#[test]
	fn closure_capture_locality() {
		// A node captured before `extend` cannot see bindings added to the
		// new tail — the scope-partitioning guarantee.
		let global = Environment::root();
		global.define("a", Value::Number(1.0)).unwrap();
		let captured = global.clone();
		let tail = global.extend();
		tail.define("a", Value::Number(2.0)).unwrap();

		assert_eq!(captured.get("a").unwrap(), Value::Number(1.0));
		assert_eq!(tail.get("a").unwrap(), Value::Number(2.0));
	}

	#[test]
	fn assign_without_prior_define_fails() {
		let global = Environment::root();
		assert!(global.assign("x", Value::Number(1.0)).is_err());
	}

	#[test]
	fn assign_walks_to_enclosing_scope() {
		let global = Environment::root();
		global.define("x", Value::Number(1.0)).unwrap();
		let inner = Environment::create(&global);
		inner.assign("x", Value::Number(5.0)).unwrap();
		assert_eq!(global.get("x").unwrap(), Value::Number(5.0));
	}

	#[test]
	fn upsert_in_scope_defines_when_absent() {
		let global = Environment::root();
		global.upsert_in_scope("field", Value::Number(1.0));
		assert_eq!(global.get("field").unwrap(), Value::Number(1.0));
	}
}
