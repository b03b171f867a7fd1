pub mod code;
pub mod compiler;
pub mod frame;
pub mod opcodes;
pub mod symbol_table;
pub mod vm;

pub use code::{disassemble, make, read_operands, Instructions};
pub use compiler::{compile_program, Bytecode, Compiler};
pub use frame::Frame;
pub use opcodes::Op;
pub use symbol_table::{Scope, Symbol, SymbolTable};
pub use vm::{new_globals, Globals, VM};
