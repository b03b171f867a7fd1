use crate::value::Value;

/// A host routine. Returns `None` for "no value" (the caller substitutes
/// `Null`); failures come back in-band as `Some(Value::Error)`.
pub type BuiltinFn = fn(&[Value]) -> Option<Value>;

pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// The fixed, ordered builtins registry. `Value::Builtin` carries an
/// index into this table, and the compiler's symbol table numbers
/// builtins in this order, so compile and run agree by construction.
pub const BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
];

/// Look up a builtin by name, returning its `Value::Builtin` handle.
pub fn builtin_by_name(name: &str) -> Option<Value> {
    BUILTINS
        .iter()
        .position(|def| def.name == name)
        .map(Value::builtin)
}

fn new_error(message: String) -> Option<Value> {
    Some(Value::error(message))
}

fn wrong_args(expected: usize, got: usize) -> Option<Value> {
    new_error(format!(
        "wrong number of arguments. expected={expected}, got={got}"
    ))
}

fn builtin_len(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_args(1, args.len());
    }
    if let Some(s) = args[0].as_str() {
        return Some(Value::number(s.len() as f64));
    }
    if let Some(elements) = args[0].as_array() {
        return Some(Value::number(elements.len() as f64));
    }
    new_error(format!(
        "argument to `len` not supported, got {}",
        args[0].type_name()
    ))
}

fn builtin_puts(args: &[Value]) -> Option<Value> {
    for arg in args {
        println!("{arg}");
    }
    None
}

fn builtin_first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_args(1, args.len());
    }
    let Some(elements) = args[0].as_array() else {
        return new_error(format!(
            "argument to `first` must be an ARRAY, got {}",
            args[0].type_name()
        ));
    };
    elements.first().cloned()
}

fn builtin_last(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_args(1, args.len());
    }
    let Some(elements) = args[0].as_array() else {
        return new_error(format!(
            "argument to `last` must be an ARRAY, got {}",
            args[0].type_name()
        ));
    };
    elements.last().cloned()
}

fn builtin_rest(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_args(1, args.len());
    }
    let Some(elements) = args[0].as_array() else {
        return new_error(format!(
            "argument to `rest` must be an ARRAY, got {}",
            args[0].type_name()
        ));
    };
    if elements.is_empty() {
        return None;
    }
    Some(Value::array(elements[1..].to_vec()))
}

fn builtin_push(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_args(2, args.len());
    }
    let Some(elements) = args[0].as_array() else {
        return new_error(format!(
            "argument to `push` must be an ARRAY, got {}",
            args[0].type_name()
        ));
    };
    let mut out = Vec::with_capacity(elements.len() + 1);
    out.extend_from_slice(elements);
    out.push(args[1].clone());
    Some(Value::array(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Option<Value> {
        let def = BUILTINS.iter().find(|d| d.name == name).unwrap();
        (def.func)(args)
    }

    #[test]
    fn test_registry_order_is_stable() {
        let names: Vec<&str> = BUILTINS.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["len", "puts", "first", "last", "rest", "push"]);
    }

    #[test]
    fn test_builtin_by_name() {
        assert_eq!(builtin_by_name("len"), Some(Value::builtin(0)));
        assert_eq!(builtin_by_name("push"), Some(Value::builtin(5)));
        assert_eq!(builtin_by_name("nope"), None);
    }

    #[test]
    fn test_len() {
        assert_eq!(
            call("len", &[Value::string("hello")]),
            Some(Value::number(5.0))
        );
        assert_eq!(call("len", &[Value::string("")]), Some(Value::number(0.0)));
        let arr = Value::array(vec![Value::number(1.0), Value::number(2.0)]);
        assert_eq!(call("len", &[arr]), Some(Value::number(2.0)));
    }

    #[test]
    fn test_len_errors() {
        let err = call("len", &[Value::number(1.0)]).unwrap();
        assert_eq!(
            err.as_error(),
            Some("argument to `len` not supported, got NUMBER")
        );
        let err = call("len", &[]).unwrap();
        assert_eq!(
            err.as_error(),
            Some("wrong number of arguments. expected=1, got=0")
        );
    }

    #[test]
    fn test_first_last() {
        let arr = Value::array(vec![Value::number(1.0), Value::number(2.0)]);
        assert_eq!(call("first", &[arr.clone()]), Some(Value::number(1.0)));
        assert_eq!(call("last", &[arr]), Some(Value::number(2.0)));
        let empty = Value::array(vec![]);
        assert_eq!(call("first", &[empty.clone()]), None);
        assert_eq!(call("last", &[empty]), None);
    }

    #[test]
    fn test_first_type_error() {
        let err = call("first", &[Value::number(1.0)]).unwrap();
        assert_eq!(
            err.as_error(),
            Some("argument to `first` must be an ARRAY, got NUMBER")
        );
    }

    #[test]
    fn test_rest_allocates_fresh() {
        let arr = Value::array(vec![
            Value::number(1.0),
            Value::number(2.0),
            Value::number(3.0),
        ]);
        let rest = call("rest", &[arr.clone()]).unwrap();
        assert_eq!(rest.as_array().unwrap().len(), 2);
        assert_eq!(rest.as_array().unwrap()[0], Value::number(2.0));
        // input untouched
        assert_eq!(arr.as_array().unwrap().len(), 3);
        // rest of a one-element array is an empty array, not null
        let one = Value::array(vec![Value::number(9.0)]);
        let rest = call("rest", &[one]).unwrap();
        assert!(rest.as_array().unwrap().is_empty());
        // rest of an empty array is null
        assert_eq!(call("rest", &[Value::array(vec![])]), None);
    }

    #[test]
    fn test_push_does_not_mutate() {
        let arr = Value::array(vec![Value::number(1.0)]);
        let pushed = call("push", &[arr.clone(), Value::number(2.0)]).unwrap();
        assert_eq!(pushed.as_array().unwrap().len(), 2);
        assert_eq!(arr.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_push_type_error() {
        let err = call("push", &[Value::number(1.0), Value::number(2.0)]).unwrap();
        assert_eq!(
            err.as_error(),
            Some("argument to `push` must be an ARRAY, got NUMBER")
        );
    }
}
