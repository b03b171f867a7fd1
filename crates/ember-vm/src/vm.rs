use std::cell::RefCell;
use std::rc::Rc;

use ember_core::{
    Closure, CompiledFunction, EmberError, HashEntry, HashPairs, Value, BUILTINS,
};

use crate::code::{read_u16, read_u8};
use crate::compiler::Bytecode;
use crate::frame::Frame;
use crate::opcodes::Op;

/// Value stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Globals vector capacity, indexed directly by global symbol index.
pub const GLOBALS_SIZE: usize = 65536;
/// Call frame capacity.
pub const MAX_FRAMES: usize = 1024;

/// Shared globals store, reusable across VM instances by a REPL.
pub type Globals = Rc<RefCell<Vec<Value>>>;

/// A fresh globals store of `GLOBALS_SIZE` null slots.
pub fn new_globals() -> Globals {
    Rc::new(RefCell::new(vec![Value::NULL; GLOBALS_SIZE]))
}

/// The stack virtual machine: fetch-decode-dispatch over a `Bytecode`
/// artifact. Strictly sequential; runs to completion or first error.
pub struct VM {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Points one past the top of stack.
    sp: usize,
    globals: Globals,
    frames: Vec<Frame>,
}

impl VM {
    pub fn new(bytecode: Bytecode) -> Self {
        VM::new_with_globals(bytecode, new_globals())
    }

    /// Reuse an existing globals store so top-level bindings survive
    /// across inputs.
    pub fn new_with_globals(bytecode: Bytecode, globals: Globals) -> Self {
        // The top-level instructions run as a zero-argument closure in
        // frame 0 with its locals based at the stack bottom.
        let main_func = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_params: 0,
        };
        let main_closure = Rc::new(Closure {
            func: Rc::new(main_func),
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        VM {
            constants: bytecode.constants,
            stack: vec![Value::NULL; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// The value most recently popped off the stack. Every expression
    /// statement compiles to a trailing Pop, so after `run` this is the
    /// program's final expression value.
    pub fn last_popped(&self) -> Value {
        self.stack[self.sp].clone()
    }

    pub fn run(&mut self) -> Result<(), EmberError> {
        'dispatch: loop {
            // Cache the active frame; re-entered whenever frames change.
            let frame = self.frames.last().expect("vm without an active frame");
            let closure = frame.closure.clone();
            let bp = frame.bp;
            let mut ip = frame.ip;
            let ins = closure.func.instructions.as_slice();

            while ip < ins.len() as isize - 1 {
                ip += 1;
                let pc = ip as usize;
                let op = Op::from_u8(ins[pc])
                    .ok_or_else(|| EmberError::runtime(format!("opcode {} undefined", ins[pc])))?;

                match op {
                    Op::Constant => {
                        let idx = read_u16(&ins[pc + 1..]) as usize;
                        ip += 2;
                        self.push(self.constants[idx].clone())?;
                    }
                    Op::Pop => {
                        self.pop();
                    }

                    Op::Add | Op::Sub | Op::Mul | Op::Div => {
                        self.execute_binary_operation(op)?;
                    }

                    Op::True => self.push(Value::TRUE)?,
                    Op::False => self.push(Value::FALSE)?,
                    Op::Null => self.push(Value::NULL)?,

                    Op::Equal | Op::NotEqual | Op::Greater | Op::GreaterEqual => {
                        self.execute_comparison(op)?;
                    }

                    Op::Minus => {
                        let operand = self.pop();
                        match operand.as_number() {
                            Some(n) => self.push(Value::number(-n))?,
                            None => {
                                return Err(EmberError::runtime(format!(
                                    "unsupported type for negation: {}",
                                    operand.type_name()
                                )))
                            }
                        }
                    }
                    Op::Bang => {
                        let operand = self.pop();
                        self.push(Value::boolean(!operand.is_truthy()))?;
                    }

                    Op::Jump => {
                        let target = read_u16(&ins[pc + 1..]) as isize;
                        ip = target - 1;
                    }
                    Op::JumpNotTrue => {
                        let target = read_u16(&ins[pc + 1..]) as isize;
                        ip += 2;
                        let condition = self.pop();
                        if !condition.is_truthy() {
                            ip = target - 1;
                        }
                    }

                    Op::SetGlobal => {
                        let idx = read_u16(&ins[pc + 1..]) as usize;
                        ip += 2;
                        let val = self.pop();
                        self.globals.borrow_mut()[idx] = val;
                    }
                    Op::GetGlobal => {
                        let idx = read_u16(&ins[pc + 1..]) as usize;
                        ip += 2;
                        let val = self.globals.borrow()[idx].clone();
                        self.push(val)?;
                    }
                    Op::SetLocal => {
                        let slot = read_u8(&ins[pc + 1..]) as usize;
                        ip += 1;
                        let val = self.pop();
                        self.stack[bp + slot] = val;
                    }
                    Op::GetLocal => {
                        let slot = read_u8(&ins[pc + 1..]) as usize;
                        ip += 1;
                        self.push(self.stack[bp + slot].clone())?;
                    }
                    Op::GetBuiltin => {
                        let idx = read_u8(&ins[pc + 1..]) as usize;
                        ip += 1;
                        self.push(Value::builtin(idx))?;
                    }
                    Op::GetFree => {
                        let idx = read_u8(&ins[pc + 1..]) as usize;
                        ip += 1;
                        self.push(closure.free[idx].clone())?;
                    }

                    Op::Array => {
                        let count = read_u16(&ins[pc + 1..]) as usize;
                        ip += 2;
                        let elements = self.stack[self.sp - count..self.sp].to_vec();
                        self.sp -= count;
                        self.push(Value::array(elements))?;
                    }
                    Op::Hash => {
                        let count = read_u16(&ins[pc + 1..]) as usize;
                        ip += 2;
                        let hash = self.build_hash(self.sp - count, self.sp)?;
                        self.sp -= count;
                        self.push(hash)?;
                    }
                    Op::Index => {
                        let index = self.pop();
                        let left = self.pop();
                        self.execute_index(left, index)?;
                    }

                    Op::Call => {
                        let argc = read_u8(&ins[pc + 1..]) as usize;
                        ip += 1;
                        self.frames.last_mut().expect("vm without an active frame").ip = ip;
                        self.execute_call(argc)?;
                        continue 'dispatch;
                    }
                    Op::ReturnValue => {
                        let value = self.pop();
                        let frame = self.frames.pop().expect("return without a frame");
                        if self.frames.is_empty() {
                            // A top-level return ends the program. Leave
                            // the value at stack[sp] where last_popped
                            // observes it, as the trailing Pop of a
                            // normal program end would.
                            self.sp = 0;
                            self.stack[0] = value;
                            return Ok(());
                        }
                        self.sp = frame.bp - 1;
                        self.push(value)?;
                        continue 'dispatch;
                    }
                    Op::Return => {
                        let frame = self.frames.pop().expect("return without a frame");
                        if self.frames.is_empty() {
                            self.sp = 0;
                            self.stack[0] = Value::NULL;
                            return Ok(());
                        }
                        self.sp = frame.bp - 1;
                        self.push(Value::NULL)?;
                        continue 'dispatch;
                    }

                    Op::Closure => {
                        let const_idx = read_u16(&ins[pc + 1..]) as usize;
                        let num_free = read_u8(&ins[pc + 3..]) as usize;
                        ip += 3;
                        self.push_closure(const_idx, num_free)?;
                    }
                }
            }

            // The active frame ran off the end of its instructions; only
            // the main frame does that, and it means the program is done.
            self.frames.last_mut().expect("vm without an active frame").ip = ip;
            return Ok(());
        }
    }

    // --- Stack primitives ---

    fn push(&mut self, value: Value) -> Result<(), EmberError> {
        if self.sp >= STACK_SIZE {
            return Err(EmberError::runtime("stack overflow"));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of stack. The slot keeps the value so `last_popped`
    /// can observe it.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    // --- Operators ---

    fn execute_binary_operation(&mut self, op: Op) -> Result<(), EmberError> {
        let right = self.pop();
        let left = self.pop();

        if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
            return self.execute_binary_number_operation(op, l, r);
        }
        if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
            if op != Op::Add {
                return Err(EmberError::runtime(format!(
                    "unknown string operator: {}",
                    op as u8
                )));
            }
            let joined = Value::string_from(format!("{l}{r}"));
            return self.push(joined);
        }
        Err(EmberError::runtime(format!(
            "unsupported types for binary operation: {} {}",
            left.type_name(),
            right.type_name()
        )))
    }

    fn execute_binary_number_operation(
        &mut self,
        op: Op,
        left: f64,
        right: f64,
    ) -> Result<(), EmberError> {
        let result = match op {
            Op::Add => left + right,
            Op::Sub => left - right,
            Op::Mul => left * right,
            Op::Div => left / right,
            _ => {
                return Err(EmberError::runtime(format!(
                    "unknown number operator: {}",
                    op as u8
                )))
            }
        };
        self.push(Value::number(result))
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), EmberError> {
        let right = self.pop();
        let left = self.pop();

        if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
            let result = match op {
                Op::Equal => l == r,
                Op::NotEqual => l != r,
                Op::Greater => l > r,
                Op::GreaterEqual => l >= r,
                _ => {
                    return Err(EmberError::runtime(format!(
                        "unknown number operator: {}",
                        op as u8
                    )))
                }
            };
            return self.push(Value::boolean(result));
        }

        // Strings compare by content through Value's equality; the
        // singletons and heap handles compare by identity.
        match op {
            Op::Equal => self.push(Value::boolean(left == right)),
            Op::NotEqual => self.push(Value::boolean(left != right)),
            _ => Err(EmberError::runtime(format!(
                "unknown operator: {} ({} {})",
                op as u8,
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    // --- Collections ---

    fn build_hash(&self, start: usize, end: usize) -> Result<Value, EmberError> {
        let mut pairs = HashPairs::with_capacity((end - start) / 2);
        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let Some(hash_key) = key.hash_key() else {
                return Err(EmberError::runtime(format!(
                    "unusable as hash key: {}",
                    key.type_name()
                )));
            };
            pairs.insert(hash_key, HashEntry { key, value });
            i += 2;
        }
        Ok(Value::hash(pairs))
    }

    fn execute_index(&mut self, left: Value, index: Value) -> Result<(), EmberError> {
        if let (Some(elements), Some(n)) = (left.as_array(), index.as_number()) {
            let i = n as i64;
            if i < 0 || i as usize >= elements.len() {
                return self.push(Value::NULL);
            }
            let element = elements[i as usize].clone();
            return self.push(element);
        }
        if let Some(pairs) = left.as_hash_ref() {
            let Some(hash_key) = index.hash_key() else {
                return Err(EmberError::runtime(format!(
                    "unusable as hash key: {}",
                    index.type_name()
                )));
            };
            let value = pairs
                .get(&hash_key)
                .map(|entry| entry.value.clone())
                .unwrap_or(Value::NULL);
            return self.push(value);
        }
        Err(EmberError::runtime(format!(
            "index operator not supported: {}[{}]",
            left.type_name(),
            index.type_name()
        )))
    }

    // --- Calls ---

    fn execute_call(&mut self, argc: usize) -> Result<(), EmberError> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        if let Some(closure) = callee.as_closure_rc() {
            return self.call_closure(closure, argc);
        }
        if let Some(idx) = callee.as_builtin() {
            return self.call_builtin(idx, argc);
        }
        Err(EmberError::runtime("calling non-function and non-built-in"))
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), EmberError> {
        if argc != closure.func.num_params {
            return Err(EmberError::runtime(format!(
                "wrong number of arguments: expected={}, got={}",
                closure.func.num_params, argc
            )));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(EmberError::runtime("stack overflow"));
        }
        let num_locals = closure.func.num_locals;
        let frame = Frame::new(closure, self.sp - argc);
        let bp = frame.bp;
        self.frames.push(frame);
        // Reserve slots for locals beyond the arguments.
        self.sp = bp + num_locals;
        if self.sp >= STACK_SIZE {
            return Err(EmberError::runtime("stack overflow"));
        }
        Ok(())
    }

    fn call_builtin(&mut self, idx: usize, argc: usize) -> Result<(), EmberError> {
        let args = self.stack[self.sp - argc..self.sp].to_vec();
        let result = (BUILTINS[idx].func)(&args);
        // Drop the arguments and the callee.
        self.sp = self.sp - argc - 1;
        self.push(result.unwrap_or(Value::NULL))
    }

    fn push_closure(&mut self, const_idx: usize, num_free: usize) -> Result<(), EmberError> {
        let constant = self.constants[const_idx].clone();
        let Some(func) = constant.as_compiled_function_rc() else {
            return Err(EmberError::runtime(format!("not a function: {constant:?}")));
        };
        // The compiler pushed the captured originals in free-list order.
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;
        self.push(Value::closure(Closure { func, free }))
    }
}
