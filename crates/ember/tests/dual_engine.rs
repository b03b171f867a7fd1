//! The two engines must agree: every program here runs through the
//! tree-walking evaluator and the compiler+VM, and the results are
//! compared by inspect form (hashes are exercised through lookups, whose
//! display is deterministic).

use ember::{eval_source, run_source};

fn assert_engines_agree(input: &str) {
    let evaluated = eval_source(input)
        .unwrap_or_else(|e| panic!("evaluator error for {input:?}: {e}"));
    let executed = run_source(input)
        .unwrap_or_else(|e| panic!("vm error for {input:?}: {e}"));
    assert_eq!(
        evaluated.to_string(),
        executed.to_string(),
        "engines disagree on {input:?}"
    );
}

#[test]
fn agree_on_arithmetic() {
    for input in [
        "1",
        "1 + 2 * 3",
        "50 / 2 * 2 + 10 - 5",
        "-5 + 10",
        "1 / 2",
        "2 * (5 + 10)",
        "(5 + 10 * 2 + 15 / 3) * 2 + -10",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_booleans_and_comparisons() {
    for input in [
        "true",
        "false",
        "!true",
        "!!false",
        "!5",
        "1 < 2",
        "2 <= 2",
        "3 > 4",
        "4 >= 4",
        "1 == 1",
        "1 != 2",
        "true == true",
        "true != false",
        "(1 < 2) == (3 <= 3)",
        "\"a\" == \"a\"",
        "\"a\" != \"b\"",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_conditionals() {
    for input in [
        "if (true) { 10 }",
        "if (false) { 10 }",
        "if (1 < 2) { 10 } else { 20 }",
        "if (1 > 2) { 10 } else { 20 }",
        "if (0) { 10 } else { 20 }",
        "if ([]) { 10 } else { 20 }",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_bindings_and_functions() {
    for input in [
        "let a = 5; a",
        "let a = 5; let b = a + a; a + b",
        "let identity = fn(x) { x }; identity(42)",
        "let double = fn(x) { x * 2 }; double(21)",
        "let add = fn(a, b) { a + b }; add(add(1, 2), 3)",
        "let early = fn() { return 1; 2 }; early()",
        "fn(){}()",
        "fn(x) { x }(5)",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_top_level_returns() {
    for input in [
        "return 10;",
        "return 2 * 5; 9;",
        "9; return 10; 11;",
        "if (true) { return 5; } 6;",
        "if (10 > 1) { if (10 > 1) { return 10; } return 1; }",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_closures_and_recursion() {
    for input in [
        "let adder = fn(a){ fn(b){ a+b } }; adder(2)(3)",
        "let newClosure = fn(a) { fn() { a } }; newClosure(99)()",
        "let fib = fn(n){ if (n<2){n} else {fib(n-1)+fib(n-2)} }; fib(10)",
        "let make = fn(a) { fn(b) { fn(c) { a + b + c } } }; make(1)(2)(3)",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_strings_arrays_and_hashes() {
    for input in [
        "\"hello\" + \" \" + \"world\"",
        "[1, 2 * 2, 3 + 3]",
        "[1, 2, 3][1]",
        "[1, 2, 3][99]",
        "[[1, 2]][0][1]",
        "{\"k\": 1 + 1}[\"k\"]",
        "{1: 10, 2: 20}[2]",
        "{true: 1}[true]",
        "{\"a\": 1}[\"missing\"]",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_builtins() {
    for input in [
        "len(\"hello\")",
        "len([1, 2, 3])",
        "first([4, 5])",
        "last([4, 5])",
        "rest([1, 2, 3])",
        "rest([])",
        "push([1], 2)",
        "len(1)",
        "first(\"no\")",
        "let a = [1,2,3]; push(a,4)[3] + len(a)",
    ] {
        assert_engines_agree(input);
    }
}

#[test]
fn agree_on_wrong_arity_message() {
    let vm_err = run_source("fn(a,b){a+b}(1)").unwrap_err().to_string();
    let eval_err = eval_source("fn(a,b){a+b}(1)").unwrap_err().to_string();
    assert_eq!(vm_err, "wrong number of arguments: expected=2, got=1");
    // The tree-walker carries its line prefix; the message body matches.
    assert_eq!(
        eval_err,
        "on line 1 - wrong number of arguments: expected=2, got=1"
    );
}
