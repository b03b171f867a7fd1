use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lasso::{Rodeo, Spur};

use crate::env::Env;
use crate::hashkey::HashKey;

// Compile-time check: NaN-boxing requires 64-bit pointers that fit in 48-bit VA space.
// wasm32 is exempted because its 32-bit pointers always fit in 45 bits.
#[cfg(not(any(target_pointer_width = "64", target_arch = "wasm32")))]
compile_error!("ember-core NaN-boxed Value requires a 64-bit platform (or wasm32)");

// ── String interning ──────────────────────────────────────────────

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to a String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

// ── Supporting types ──────────────────────────────────────────────

/// A user-defined function as the tree-walker sees it: parameter names,
/// the shared body block, and the environment captured at creation.
#[derive(Debug, Clone)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Rc<ember_syntax::Block>,
    pub env: Env,
}

/// A compiled function template. Immutable after emission.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_params: usize,
}

/// A compiled function paired with the free values captured when the
/// closure was constructed. Captured values are shared handles: both the
/// enclosing scope and the closure see the same object instance.
#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// One hash entry: the original key (for display) plus the value.
#[derive(Debug, Clone)]
pub struct HashEntry {
    pub key: Value,
    pub value: Value,
}

/// Backing store for Hash values.
pub type HashPairs = hashbrown::HashMap<HashKey, HashEntry>;

// ── NaN-boxing constants ──────────────────────────────────────────

// IEEE 754 double layout:
//   bit 63:     sign
//   bits 62-52: exponent (11 bits)
//   bits 51-0:  mantissa (52 bits), bit 51 = quiet NaN bit
//
// Boxed (non-number) values use: sign=1, exp=all 1s, quiet=1
//   Then bits 50-45 = TAG (6 bits), bits 44-0 = PAYLOAD (45 bits)

/// Mask for checking if a value is boxed (sign + exponent + quiet bit)
const BOX_MASK: u64 = 0xFFF8_0000_0000_0000;

/// The 45-bit payload mask
const PAYLOAD_MASK: u64 = (1u64 << 45) - 1;

/// 6-bit mask for extracting the tag from a boxed value (bits 50-45).
const TAG_MASK: u64 = 0x3F;

/// Canonical quiet NaN (sign=0), distinct from every boxed pattern.
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

// Tags (6 bits, encoded in bits 50-45)
const TAG_NULL: u64 = 0;
const TAG_FALSE: u64 = 1;
const TAG_TRUE: u64 = 2;
const TAG_BUILTIN: u64 = 3;
const TAG_STRING: u64 = 4;
const TAG_ARRAY: u64 = 5;
const TAG_HASH: u64 = 6;
const TAG_FUNCTION: u64 = 7;
const TAG_COMPILED_FUNCTION: u64 = 8;
const TAG_CLOSURE: u64 = 9;
const TAG_ERROR: u64 = 10;

// ── Helpers for encoding/decoding ─────────────────────────────────

const fn make_boxed(tag: u64, payload: u64) -> u64 {
    BOX_MASK | (tag << 45) | (payload & PAYLOAD_MASK)
}

#[inline(always)]
fn is_boxed(bits: u64) -> bool {
    (bits & BOX_MASK) == BOX_MASK
}

#[inline(always)]
fn get_tag(bits: u64) -> u64 {
    (bits >> 45) & TAG_MASK
}

#[inline(always)]
fn get_payload(bits: u64) -> u64 {
    bits & PAYLOAD_MASK
}

#[inline(always)]
fn ptr_to_payload(ptr: *const u8) -> u64 {
    let raw = ptr as u64;
    debug_assert!(raw & 0x7 == 0, "pointer not 8-byte aligned: 0x{:x}", raw);
    debug_assert!(raw >> 48 == 0, "pointer exceeds 48-bit VA space: 0x{:x}", raw);
    raw >> 3
}

#[inline(always)]
fn payload_to_ptr(payload: u64) -> *const u8 {
    (payload << 3) as *const u8
}

// ── ValueView: pattern-matching enum ──────────────────────────────

/// A view of a NaN-boxed Value for pattern matching.
/// Returned by `Value::view()`. Heap types hold Rc (refcount bumped).
pub enum ValueView {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<String>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<HashPairs>),
    Function(Rc<Function>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    /// Index into the builtins registry.
    Builtin(usize),
    Error(Rc<String>),
}

// ── The NaN-boxed Value type ──────────────────────────────────────

/// The runtime value for all ember data, stored in 8 bytes.
/// Numbers are raw IEEE-754 doubles; everything else is encoded in
/// quiet-NaN payload space.
#[repr(transparent)]
pub struct Value(u64);

// ── Constructors ──────────────────────────────────────────────────

impl Value {
    pub const NULL: Value = Value(make_boxed(TAG_NULL, 0));
    pub const TRUE: Value = Value(make_boxed(TAG_TRUE, 0));
    pub const FALSE: Value = Value(make_boxed(TAG_FALSE, 0));

    #[inline(always)]
    pub fn null() -> Value {
        Value::NULL
    }

    #[inline(always)]
    pub fn boolean(b: bool) -> Value {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    #[inline(always)]
    pub fn number(n: f64) -> Value {
        let bits = n.to_bits();
        if n.is_nan() {
            // Canonicalize NaN to avoid collision with boxed patterns.
            Value(CANONICAL_NAN)
        } else {
            debug_assert!(
                !is_boxed(bits),
                "non-NaN double collides with boxed pattern: {n:?} = 0x{bits:016x}"
            );
            Value(bits)
        }
    }

    #[inline(always)]
    pub fn builtin(index: usize) -> Value {
        Value(make_boxed(TAG_BUILTIN, index as u64))
    }

    // -- Heap constructors --

    fn from_rc_ptr<T>(tag: u64, rc: Rc<T>) -> Value {
        let ptr = Rc::into_raw(rc) as *const u8;
        Value(make_boxed(tag, ptr_to_payload(ptr)))
    }

    pub fn string(s: &str) -> Value {
        Value::from_rc_ptr(TAG_STRING, Rc::new(s.to_string()))
    }

    pub fn string_from(s: String) -> Value {
        Value::from_rc_ptr(TAG_STRING, Rc::new(s))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::from_rc_ptr(TAG_ARRAY, Rc::new(elements))
    }

    pub fn array_from_rc(rc: Rc<Vec<Value>>) -> Value {
        Value::from_rc_ptr(TAG_ARRAY, rc)
    }

    pub fn hash(pairs: HashPairs) -> Value {
        Value::from_rc_ptr(TAG_HASH, Rc::new(pairs))
    }

    pub fn function(f: Function) -> Value {
        Value::from_rc_ptr(TAG_FUNCTION, Rc::new(f))
    }

    pub fn compiled_function(f: CompiledFunction) -> Value {
        Value::from_rc_ptr(TAG_COMPILED_FUNCTION, Rc::new(f))
    }

    pub fn compiled_function_from_rc(rc: Rc<CompiledFunction>) -> Value {
        Value::from_rc_ptr(TAG_COMPILED_FUNCTION, rc)
    }

    pub fn closure(c: Closure) -> Value {
        Value::from_rc_ptr(TAG_CLOSURE, Rc::new(c))
    }

    pub fn closure_from_rc(rc: Rc<Closure>) -> Value {
        Value::from_rc_ptr(TAG_CLOSURE, rc)
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::from_rc_ptr(TAG_ERROR, Rc::new(message.into()))
    }
}

// ── Accessors ─────────────────────────────────────────────────────

impl Value {
    /// Get the raw bits (for debugging/testing).
    #[inline(always)]
    pub fn raw_bits(&self) -> u64 {
        self.0
    }

    /// Recover an Rc<T> pointer from the payload WITHOUT consuming ownership.
    /// This increments the refcount (returns a new Rc).
    #[inline(always)]
    unsafe fn get_rc<T>(&self) -> Rc<T> {
        let ptr = payload_to_ptr(get_payload(self.0)) as *const T;
        Rc::increment_strong_count(ptr);
        Rc::from_raw(ptr)
    }

    /// Borrow the underlying T from a heap-tagged Value.
    /// SAFETY: caller must ensure the tag matches and T is correct.
    #[inline(always)]
    unsafe fn borrow_ref<T>(&self) -> &T {
        let ptr = payload_to_ptr(get_payload(self.0)) as *const T;
        &*ptr
    }

    /// Pattern-match friendly view of this value.
    /// For heap types, this bumps the Rc refcount.
    pub fn view(&self) -> ValueView {
        if !is_boxed(self.0) {
            return ValueView::Number(f64::from_bits(self.0));
        }
        match get_tag(self.0) {
            TAG_NULL => ValueView::Null,
            TAG_FALSE => ValueView::Bool(false),
            TAG_TRUE => ValueView::Bool(true),
            TAG_BUILTIN => ValueView::Builtin(get_payload(self.0) as usize),
            TAG_STRING => ValueView::String(unsafe { self.get_rc::<String>() }),
            TAG_ARRAY => ValueView::Array(unsafe { self.get_rc::<Vec<Value>>() }),
            TAG_HASH => ValueView::Hash(unsafe { self.get_rc::<HashPairs>() }),
            TAG_FUNCTION => ValueView::Function(unsafe { self.get_rc::<Function>() }),
            TAG_COMPILED_FUNCTION => {
                ValueView::CompiledFunction(unsafe { self.get_rc::<CompiledFunction>() })
            }
            TAG_CLOSURE => ValueView::Closure(unsafe { self.get_rc::<Closure>() }),
            TAG_ERROR => ValueView::Error(unsafe { self.get_rc::<String>() }),
            tag => unreachable!("invalid NaN-boxed tag: {tag}"),
        }
    }

    /// The uppercase type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        if !is_boxed(self.0) {
            return "NUMBER";
        }
        match get_tag(self.0) {
            TAG_NULL => "NULL",
            TAG_FALSE | TAG_TRUE => "BOOLEAN",
            TAG_BUILTIN => "BUILTIN",
            TAG_STRING => "STRING",
            TAG_ARRAY => "ARRAY",
            TAG_HASH => "HASH",
            TAG_FUNCTION => "FUNCTION",
            TAG_COMPILED_FUNCTION => "COMPILED_FUNCTION",
            TAG_CLOSURE => "CLOSURE",
            TAG_ERROR => "ERROR",
            _ => "UNKNOWN",
        }
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.0 == Value::NULL.0
    }

    /// `False` and `Null` are the only falsy values. Zero, the empty
    /// string and the empty array are all truthy.
    #[inline(always)]
    pub fn is_truthy(&self) -> bool {
        self.0 != Value::NULL.0 && self.0 != Value::FALSE.0
    }

    #[inline(always)]
    pub fn is_number(&self) -> bool {
        !is_boxed(self.0)
    }

    #[inline(always)]
    pub fn is_string(&self) -> bool {
        is_boxed(self.0) && get_tag(self.0) == TAG_STRING
    }

    #[inline(always)]
    pub fn is_array(&self) -> bool {
        is_boxed(self.0) && get_tag(self.0) == TAG_ARRAY
    }

    #[inline(always)]
    pub fn is_hash(&self) -> bool {
        is_boxed(self.0) && get_tag(self.0) == TAG_HASH
    }

    #[inline(always)]
    pub fn is_error(&self) -> bool {
        is_boxed(self.0) && get_tag(self.0) == TAG_ERROR
    }

    #[inline(always)]
    pub fn as_number(&self) -> Option<f64> {
        if is_boxed(self.0) {
            None
        } else {
            Some(f64::from_bits(self.0))
        }
    }

    #[inline(always)]
    pub fn as_bool(&self) -> Option<bool> {
        if self.0 == Value::TRUE.0 {
            Some(true)
        } else if self.0 == Value::FALSE.0 {
            Some(false)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if self.is_string() {
            Some(unsafe { self.borrow_ref::<String>() })
        } else {
            None
        }
    }

    pub fn as_string_rc(&self) -> Option<Rc<String>> {
        if self.is_string() {
            Some(unsafe { self.get_rc::<String>() })
        } else {
            None
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        if self.is_array() {
            Some(unsafe { self.borrow_ref::<Vec<Value>>() })
        } else {
            None
        }
    }

    pub fn as_array_rc(&self) -> Option<Rc<Vec<Value>>> {
        if self.is_array() {
            Some(unsafe { self.get_rc::<Vec<Value>>() })
        } else {
            None
        }
    }

    pub fn as_hash_ref(&self) -> Option<&HashPairs> {
        if self.is_hash() {
            Some(unsafe { self.borrow_ref::<HashPairs>() })
        } else {
            None
        }
    }

    pub fn as_function_rc(&self) -> Option<Rc<Function>> {
        if is_boxed(self.0) && get_tag(self.0) == TAG_FUNCTION {
            Some(unsafe { self.get_rc::<Function>() })
        } else {
            None
        }
    }

    pub fn as_compiled_function_rc(&self) -> Option<Rc<CompiledFunction>> {
        if is_boxed(self.0) && get_tag(self.0) == TAG_COMPILED_FUNCTION {
            Some(unsafe { self.get_rc::<CompiledFunction>() })
        } else {
            None
        }
    }

    pub fn as_closure_rc(&self) -> Option<Rc<Closure>> {
        if is_boxed(self.0) && get_tag(self.0) == TAG_CLOSURE {
            Some(unsafe { self.get_rc::<Closure>() })
        } else {
            None
        }
    }

    pub fn as_builtin(&self) -> Option<usize> {
        if is_boxed(self.0) && get_tag(self.0) == TAG_BUILTIN {
            Some(get_payload(self.0) as usize)
        } else {
            None
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        if self.is_error() {
            Some(unsafe { self.borrow_ref::<String>() })
        } else {
            None
        }
    }
}

// ── Clone ─────────────────────────────────────────────────────────

impl Clone for Value {
    #[inline(always)]
    fn clone(&self) -> Self {
        if !is_boxed(self.0) {
            return Value(self.0);
        }
        let tag = get_tag(self.0);
        match tag {
            // Immediates: trivial copy
            TAG_NULL | TAG_FALSE | TAG_TRUE | TAG_BUILTIN => Value(self.0),
            // Heap pointers: increment refcount
            _ => {
                let ptr = payload_to_ptr(get_payload(self.0));
                unsafe {
                    match tag {
                        TAG_STRING | TAG_ERROR => {
                            Rc::increment_strong_count(ptr as *const String)
                        }
                        TAG_ARRAY => Rc::increment_strong_count(ptr as *const Vec<Value>),
                        TAG_HASH => Rc::increment_strong_count(ptr as *const HashPairs),
                        TAG_FUNCTION => Rc::increment_strong_count(ptr as *const Function),
                        TAG_COMPILED_FUNCTION => {
                            Rc::increment_strong_count(ptr as *const CompiledFunction)
                        }
                        TAG_CLOSURE => Rc::increment_strong_count(ptr as *const Closure),
                        _ => unreachable!("invalid heap tag in clone: {tag}"),
                    }
                }
                Value(self.0)
            }
        }
    }
}

// ── Drop ──────────────────────────────────────────────────────────

impl Drop for Value {
    #[inline(always)]
    fn drop(&mut self) {
        if !is_boxed(self.0) {
            return;
        }
        let tag = get_tag(self.0);
        match tag {
            TAG_NULL | TAG_FALSE | TAG_TRUE | TAG_BUILTIN => {}
            _ => {
                let ptr = payload_to_ptr(get_payload(self.0));
                unsafe {
                    match tag {
                        TAG_STRING | TAG_ERROR => drop(Rc::from_raw(ptr as *const String)),
                        TAG_ARRAY => drop(Rc::from_raw(ptr as *const Vec<Value>)),
                        TAG_HASH => drop(Rc::from_raw(ptr as *const HashPairs)),
                        TAG_FUNCTION => drop(Rc::from_raw(ptr as *const Function)),
                        TAG_COMPILED_FUNCTION => {
                            drop(Rc::from_raw(ptr as *const CompiledFunction))
                        }
                        TAG_CLOSURE => drop(Rc::from_raw(ptr as *const Closure)),
                        _ => {} // unreachable, but don't panic in drop
                    }
                }
            }
        }
    }
}

// ── PartialEq ─────────────────────────────────────────────────────

// Numbers compare by float value, strings by byte content; everything
// else is identity: the singletons (true/false/null/builtins) have one
// bit pattern each, and heap values compare equal only when they are the
// same shared handle.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.0 == other.0 {
            if !is_boxed(self.0) {
                // NaN != NaN per IEEE even with identical bits.
                return !f64::from_bits(self.0).is_nan();
            }
            return true;
        }
        match (is_boxed(self.0), is_boxed(other.0)) {
            (false, false) => f64::from_bits(self.0) == f64::from_bits(other.0),
            (true, true) if get_tag(self.0) == TAG_STRING && get_tag(other.0) == TAG_STRING => {
                self.as_str() == other.as_str()
            }
            _ => false,
        }
    }
}

// ── Display (the inspect format) ──────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            ValueView::Null => write!(f, "null"),
            ValueView::Bool(b) => write!(f, "{b}"),
            ValueView::Number(n) => write!(f, "{n:.6}"),
            ValueView::String(s) => write!(f, "{s}"),
            ValueView::Array(elements) => {
                write!(f, "[")?;
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{el}")?;
                }
                write!(f, "]")
            }
            ValueView::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, entry) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", entry.key, entry.value)?;
                }
                write!(f, "}}")
            }
            ValueView::Function(func) => {
                write!(f, "fn({}) {{ {} }}", func.params.join(", "), func.body)
            }
            ValueView::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(&func))
            }
            ValueView::Closure(cl) => write!(f, "Closure[{:p}]", Rc::as_ptr(&cl)),
            ValueView::Builtin(_) => write!(f, "builtin function"),
            ValueView::Error(message) => write!(f, "ERROR: {message}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            ValueView::Null => write!(f, "Null"),
            ValueView::Bool(b) => write!(f, "Bool({b})"),
            ValueView::Number(n) => write!(f, "Number({n})"),
            ValueView::String(s) => write!(f, "String({:?})", &**s),
            ValueView::Array(elements) => write!(f, "Array({elements:?})"),
            ValueView::Hash(pairs) => write!(f, "Hash({pairs:?})"),
            ValueView::Function(func) => write!(f, "Function(fn({}))", func.params.join(", ")),
            ValueView::CompiledFunction(func) => {
                write!(f, "CompiledFunction({} bytes)", func.instructions.len())
            }
            ValueView::Closure(cl) => write!(f, "Closure({} free)", cl.free.len()),
            ValueView::Builtin(idx) => write!(f, "Builtin({idx})"),
            ValueView::Error(message) => write!(f, "Error({:?})", &**message),
        }
    }
}
