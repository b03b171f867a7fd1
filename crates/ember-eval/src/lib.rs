pub mod eval;

pub use eval::{eval_program, eval_source};
