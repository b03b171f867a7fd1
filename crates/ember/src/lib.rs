//! Embedding facade over the ember pipeline:
//! characters → tokens → syntax tree → bytecode → VM execution,
//! with the tree-walking evaluator available as a reference engine.

use std::rc::Rc;

pub use ember_core::{EmberError, Env, Value};
pub use ember_syntax::{parse, Program};
pub use ember_vm::{Bytecode, Compiler, SymbolTable, VM};

/// Compile source text to a bytecode artifact.
pub fn compile_source(input: &str) -> Result<Bytecode, EmberError> {
    let program = parse(input)?;
    ember_vm::compile_program(&program)
}

/// Compile and execute source text on the VM, returning the final value.
pub fn run_source(input: &str) -> Result<Value, EmberError> {
    let bytecode = compile_source(input)?;
    let mut vm = VM::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped())
}

/// Execute source text with the tree-walking evaluator in a fresh
/// environment.
pub fn eval_source(input: &str) -> Result<Value, EmberError> {
    let env = Rc::new(Env::new());
    ember_eval::eval_source(input, &env)
}

/// Compile source text and render its top-level disassembly.
pub fn disassemble_source(input: &str) -> Result<String, EmberError> {
    let bytecode = compile_source(input)?;
    Ok(ember_vm::disassemble(&bytecode.instructions))
}
