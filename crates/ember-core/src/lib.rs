pub mod builtins;
pub mod env;
pub mod error;
pub mod hashkey;
pub mod value;

pub use builtins::{builtin_by_name, BuiltinDef, BuiltinFn, BUILTINS};
pub use env::Env;
pub use error::EmberError;
pub use hashkey::{HashKey, HashTag};
pub use lasso::Spur;
pub use value::{
    intern, resolve, with_resolved, Closure, CompiledFunction, Function, HashEntry, HashPairs,
    Value, ValueView,
};
