use ember_core::{CompiledFunction, EmberError, Value, BUILTINS};
use ember_syntax::{Block, Expr, Program, Stmt};

use crate::code::{make, Instructions};
use crate::opcodes::Op;
use crate::symbol_table::{Scope, Symbol, SymbolTable};

/// The compilation artifact: instruction bytes plus the constant pool
/// they index into.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// Per-function instruction buffer with the last two emitted
/// instructions, which is all the peephole fixups need.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    prev: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Value>,
    pub symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

/// Compile a program with a fresh compiler.
pub fn compile_program(program: &Program) -> Result<Bytecode, EmberError> {
    let mut compiler = Compiler::new();
    compiler.compile(program)?;
    Ok(compiler.bytecode())
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }
        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Resume with state from a previous compilation so a REPL keeps its
    /// bindings and constant pool across inputs. The caller is expected
    /// to have seeded builtins into `symbol_table` (see
    /// `SymbolTable::define_builtin`).
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), EmberError> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Tear down the compiler, releasing its symbol table and constant
    /// pool for reuse via `new_with_state`.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    // --- Statements ---

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), EmberError> {
        match stmt {
            Stmt::Expr { expr, .. } => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, &[]);
                Ok(())
            }
            Stmt::Let { name, value, .. } => {
                // The name is defined before its value compiles so a
                // global function can refer to itself in its own body.
                let symbol = self.symbol_table.define(&name.name);
                self.compile_expr(value)?;
                match symbol.scope {
                    Scope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Stmt::Return { value, .. } => {
                self.compile_expr(value)?;
                self.emit(Op::ReturnValue, &[]);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), EmberError> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    // --- Expressions ---

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), EmberError> {
        match expr {
            Expr::Number { value, .. } => {
                let idx = self.add_constant(Value::number(*value));
                self.emit(Op::Constant, &[idx]);
            }
            Expr::Str { value, .. } => {
                let idx = self.add_constant(Value::string(value));
                self.emit(Op::Constant, &[idx]);
            }
            Expr::Bool { value, .. } => {
                if *value {
                    self.emit(Op::True, &[]);
                } else {
                    self.emit(Op::False, &[]);
                }
            }
            Expr::Ident(ident) => {
                let Some(symbol) = self.symbol_table.resolve(&ident.name) else {
                    return Err(EmberError::UndefinedVariable(ident.name.clone()));
                };
                self.load_symbol(symbol);
            }
            Expr::Prefix { op, right, .. } => {
                self.compile_expr(right)?;
                match op.as_str() {
                    "!" => self.emit(Op::Bang, &[]),
                    "-" => self.emit(Op::Minus, &[]),
                    _ => return Err(EmberError::UnknownOperator(op.clone())),
                };
            }
            Expr::Infix {
                op, left, right, ..
            } => {
                // Less-than flavors swap operands so the VM only needs
                // the greater-than opcodes.
                if op == "<" || op == "<=" {
                    self.compile_expr(right)?;
                    self.compile_expr(left)?;
                    if op == "<=" {
                        self.emit(Op::GreaterEqual, &[]);
                    } else {
                        self.emit(Op::Greater, &[]);
                    }
                    return Ok(());
                }
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match op.as_str() {
                    "+" => self.emit(Op::Add, &[]),
                    "-" => self.emit(Op::Sub, &[]),
                    "*" => self.emit(Op::Mul, &[]),
                    "/" => self.emit(Op::Div, &[]),
                    ">" => self.emit(Op::Greater, &[]),
                    ">=" => self.emit(Op::GreaterEqual, &[]),
                    "==" => self.emit(Op::Equal, &[]),
                    "!=" => self.emit(Op::NotEqual, &[]),
                    _ => return Err(EmberError::UnknownOperator(op.clone())),
                };
            }
            Expr::If {
                condition,
                consequence,
                alternative,
                ..
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expr::Function { params, body, .. } => {
                self.enter_scope();
                for param in params {
                    self.symbol_table.define(&param.name);
                }
                self.compile_block(body)?;

                // An if/expression result left on the stack becomes the
                // return value; a body without one returns null.
                if self.last_instruction_is(Op::Pop) {
                    self.replace_pop_with_return();
                }
                if !self.last_instruction_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions;
                let instructions = self.leave_scope();

                // Push the captured originals so OpClosure finds them on
                // the stack, in free-list order.
                for symbol in &free_symbols {
                    self.load_symbol(*symbol);
                }

                let func = CompiledFunction {
                    instructions,
                    num_locals,
                    num_params: params.len(),
                };
                let idx = self.add_constant(Value::compiled_function(func));
                self.emit(Op::Closure, &[idx, free_symbols.len()]);
            }
            Expr::Call { func, args, .. } => {
                self.compile_expr(func)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Op::Call, &[args.len()]);
            }
            Expr::Array { elements, .. } => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            Expr::Hash { pairs, .. } => {
                // Deterministic emission order: sort keys by printed form.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }
            Expr::Index { left, index, .. } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, &[]);
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), EmberError> {
        self.compile_expr(condition)?;

        // Placeholder operand, patched once the consequence is laid out.
        let jump_not_true_pos = self.emit(Op::JumpNotTrue, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Op::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Op::Jump, &[9999]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_true_pos, after_consequence);

        match alternative {
            None => {
                self.emit(Op::Null, &[]);
            }
            Some(alt) => {
                self.compile_block(alt)?;
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: Symbol) {
        match symbol.scope {
            Scope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            Scope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            Scope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            Scope::Free => self.emit(Op::GetFree, &[symbol.index]),
        };
    }

    // --- Emission ---

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = &mut self.scopes[self.scope_index];
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    /// Intern a constant, reusing an existing slot when an equal value is
    /// already pooled. Compiled functions never merge: they compare by
    /// identity.
    fn add_constant(&mut self, value: Value) -> usize {
        if let Some(idx) = self.constants.iter().position(|c| *c == value) {
            return idx;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn set_last_instruction(&mut self, opcode: Op, position: usize) {
        let scope = &mut self.scopes[self.scope_index];
        scope.prev = scope.last;
        scope.last = Some(EmittedInstruction { opcode, position });
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        let scope = &self.scopes[self.scope_index];
        if scope.instructions.is_empty() {
            return false;
        }
        matches!(scope.last, Some(last) if last.opcode == op)
    }

    /// Drop a trailing Pop so an expression's value stays on the stack.
    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        let last = scope.last.expect("remove_last_pop with no emitted instruction");
        scope.instructions.truncate(last.position);
        scope.last = scope.prev;
    }

    /// Rewrite the trailing Pop into ReturnValue in place (both are one
    /// byte wide).
    fn replace_pop_with_return(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        let last = scope
            .last
            .as_mut()
            .expect("replace_pop_with_return with no emitted instruction");
        let position = last.position;
        last.opcode = Op::ReturnValue;
        let new_instruction = make(Op::ReturnValue, &[]);
        scope.instructions[position..position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
    }

    /// Patch the operand of the instruction at `op_pos` (same opcode,
    /// same width).
    fn change_operand(&mut self, op_pos: usize, operand: usize) {
        let op = Op::from_u8(self.current_instructions()[op_pos])
            .expect("change_operand on undefined opcode");
        let new_instruction = make(op, &[operand]);
        let scope = &mut self.scopes[self.scope_index];
        scope.instructions[op_pos..op_pos + new_instruction.len()]
            .copy_from_slice(&new_instruction);
    }

    // --- Scopes ---

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leave_scope with no open scope");
        self.scope_index -= 1;
        let outer = self
            .symbol_table
            .outer
            .take()
            .expect("leave_scope with no enclosing symbol table");
        self.symbol_table = *outer;
        scope.instructions
    }
}
