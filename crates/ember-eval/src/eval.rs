use std::rc::Rc;

use ember_core::{builtin_by_name, intern, EmberError, Env, Function, HashEntry, Value, BUILTINS};
use ember_syntax::{Block, Expr, Ident, Program, Stmt};

/// Statement outcome: a plain value, or a `return` unwinding to the
/// nearest function boundary (or the program top).
enum Flow {
    Normal(Value),
    Return(Value),
}

/// Evaluate a program in `env` and return its final value.
///
/// Host-level failures (bad operand types, unknown identifiers, wrong
/// arity) abort with an `on line N - ` prefixed error. Builtin failures
/// are in-band `Value::Error`s: evaluation stops and the error value
/// becomes the program result.
pub fn eval_program(program: &Program, env: &Rc<Env>) -> Result<Value, EmberError> {
    let mut result = Value::NULL;
    for stmt in &program.statements {
        match eval_stmt(stmt, env)? {
            Flow::Return(val) => return Ok(val),
            Flow::Normal(val) => {
                if val.is_error() {
                    return Ok(val);
                }
                result = val;
            }
        }
    }
    Ok(result)
}

/// Parse-free convenience used by tests and the embedding facade.
pub fn eval_source(input: &str, env: &Rc<Env>) -> Result<Value, EmberError> {
    let program = ember_syntax::parse(input)?;
    eval_program(&program, env)
}

fn eval_stmt(stmt: &Stmt, env: &Rc<Env>) -> Result<Flow, EmberError> {
    match stmt {
        Stmt::Let { name, value, .. } => {
            let val = eval_expr(value, env)?;
            if val.is_error() {
                return Ok(Flow::Normal(val));
            }
            env.set(intern(&name.name), val);
            Ok(Flow::Normal(Value::NULL))
        }
        Stmt::Return { value, .. } => {
            let val = eval_expr(value, env)?;
            if val.is_error() {
                return Ok(Flow::Normal(val));
            }
            Ok(Flow::Return(val))
        }
        Stmt::Expr { expr, .. } => eval_expr_flow(expr, env),
    }
}

/// Expression evaluation in statement position: a `return` inside an
/// if-block must keep unwinding through the enclosing statements, so the
/// Return flow of the taken branch is passed through instead of being
/// collapsed to its value.
fn eval_expr_flow(expr: &Expr, env: &Rc<Env>) -> Result<Flow, EmberError> {
    if let Expr::If {
        condition,
        consequence,
        alternative,
        ..
    } = expr
    {
        let cond = eval_expr(condition, env)?;
        if cond.is_error() {
            return Ok(Flow::Normal(cond));
        }
        if cond.is_truthy() {
            return eval_block(consequence, env);
        }
        if let Some(alt) = alternative {
            return eval_block(alt, env);
        }
        return Ok(Flow::Normal(Value::NULL));
    }
    Ok(Flow::Normal(eval_expr(expr, env)?))
}

fn eval_block(block: &Block, env: &Rc<Env>) -> Result<Flow, EmberError> {
    let mut result = Value::NULL;
    for stmt in &block.statements {
        match eval_stmt(stmt, env)? {
            Flow::Return(val) => return Ok(Flow::Return(val)),
            Flow::Normal(val) => {
                if val.is_error() {
                    return Ok(Flow::Normal(val));
                }
                result = val;
            }
        }
    }
    Ok(Flow::Normal(result))
}

fn eval_expr(expr: &Expr, env: &Rc<Env>) -> Result<Value, EmberError> {
    match expr {
        Expr::Number { value, .. } => Ok(Value::number(*value)),
        Expr::Str { value, .. } => Ok(Value::string(value)),
        Expr::Bool { value, .. } => Ok(Value::boolean(*value)),
        Expr::Ident(ident) => eval_identifier(ident, env),
        Expr::Prefix { line, op, right } => {
            let right = eval_expr(right, env)?;
            if right.is_error() {
                return Ok(right);
            }
            eval_prefix(*line, op, right)
        }
        Expr::Infix {
            line,
            op,
            left,
            right,
        } => {
            let left = eval_expr(left, env)?;
            if left.is_error() {
                return Ok(left);
            }
            let right = eval_expr(right, env)?;
            if right.is_error() {
                return Ok(right);
            }
            eval_infix(*line, op, left, right)
        }
        // In operand position the if-value is all that matters; in
        // statement position eval_expr_flow keeps the Return flow alive.
        Expr::If { .. } => Ok(flow_value(eval_expr_flow(expr, env)?)),
        Expr::Function { params, body, .. } => Ok(Value::function(Function {
            params: params.iter().map(|p| p.name.clone()).collect(),
            body: body.clone(),
            env: env.as_ref().clone(),
        })),
        Expr::Call {
            line, func, args, ..
        } => {
            let func = eval_expr(func, env)?;
            if func.is_error() {
                return Ok(func);
            }
            let args = match eval_expressions(args, env)? {
                Ok(args) => args,
                Err(error_value) => return Ok(error_value),
            };
            apply_function(*line, func, args)
        }
        Expr::Array { elements, .. } => match eval_expressions(elements, env)? {
            Ok(elements) => Ok(Value::array(elements)),
            Err(error_value) => Ok(error_value),
        },
        Expr::Hash { line, pairs } => eval_hash_literal(*line, pairs, env),
        Expr::Index { line, left, index } => {
            let left = eval_expr(left, env)?;
            if left.is_error() {
                return Ok(left);
            }
            let index = eval_expr(index, env)?;
            if index.is_error() {
                return Ok(index);
            }
            eval_index(*line, left, index)
        }
    }
}

fn flow_value(flow: Flow) -> Value {
    match flow {
        Flow::Normal(val) | Flow::Return(val) => val,
    }
}

fn eval_identifier(ident: &Ident, env: &Rc<Env>) -> Result<Value, EmberError> {
    if let Some(val) = env.get(intern(&ident.name)) {
        return Ok(val);
    }
    if let Some(builtin) = builtin_by_name(&ident.name) {
        return Ok(builtin);
    }
    Err(EmberError::eval(
        ident.line,
        format!("identifier not found: {}", ident.name),
    ))
}

fn eval_prefix(line: usize, op: &str, right: Value) -> Result<Value, EmberError> {
    match op {
        "!" => Ok(Value::boolean(!right.is_truthy())),
        "-" => match right.as_number() {
            Some(n) => Ok(Value::number(-n)),
            None => Err(EmberError::eval(
                line,
                format!("unknown operator: -{}", right.type_name()),
            )),
        },
        _ => Err(EmberError::eval(
            line,
            format!("unknown operator: {}{}", op, right.type_name()),
        )),
    }
}

fn eval_infix(line: usize, op: &str, left: Value, right: Value) -> Result<Value, EmberError> {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return eval_number_infix(line, op, l, r);
    }
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return match op {
            "+" => Ok(Value::string_from(format!("{l}{r}"))),
            "==" => Ok(Value::boolean(l == r)),
            "!=" => Ok(Value::boolean(l != r)),
            _ => Err(EmberError::eval(
                line,
                format!("unknown operator: STRING {op} STRING"),
            )),
        };
    }
    if left.type_name() != right.type_name() {
        return Err(EmberError::eval(
            line,
            format!(
                "type mismatch: {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            ),
        ));
    }
    match op {
        "==" => Ok(Value::boolean(left == right)),
        "!=" => Ok(Value::boolean(left != right)),
        _ => Err(EmberError::eval(
            line,
            format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            ),
        )),
    }
}

fn eval_number_infix(line: usize, op: &str, left: f64, right: f64) -> Result<Value, EmberError> {
    match op {
        "+" => Ok(Value::number(left + right)),
        "-" => Ok(Value::number(left - right)),
        "*" => Ok(Value::number(left * right)),
        "/" => Ok(Value::number(left / right)),
        "<" => Ok(Value::boolean(left < right)),
        ">" => Ok(Value::boolean(left > right)),
        "<=" => Ok(Value::boolean(left <= right)),
        ">=" => Ok(Value::boolean(left >= right)),
        "==" => Ok(Value::boolean(left == right)),
        "!=" => Ok(Value::boolean(left != right)),
        _ => Err(EmberError::eval(
            line,
            format!("unknown operator: NUMBER {op} NUMBER"),
        )),
    }
}

/// Evaluate a list of expressions left to right. An in-band error value
/// aborts the list and is returned in the `Err` position of the inner
/// result (host errors still use the outer `Result`).
fn eval_expressions(
    exprs: &[Expr],
    env: &Rc<Env>,
) -> Result<Result<Vec<Value>, Value>, EmberError> {
    let mut out = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let val = eval_expr(expr, env)?;
        if val.is_error() {
            return Ok(Err(val));
        }
        out.push(val);
    }
    Ok(Ok(out))
}

fn apply_function(line: usize, func: Value, args: Vec<Value>) -> Result<Value, EmberError> {
    if let Some(function) = func.as_function_rc() {
        if args.len() != function.params.len() {
            return Err(EmberError::eval(
                line,
                format!(
                    "wrong number of arguments: expected={}, got={}",
                    function.params.len(),
                    args.len()
                ),
            ));
        }
        let scope = Env::with_parent(Rc::new(function.env.clone()));
        for (param, arg) in function.params.iter().zip(args) {
            scope.set(intern(param), arg);
        }
        let flow = eval_block(&function.body, &Rc::new(scope))?;
        return Ok(flow_value(flow));
    }
    if let Some(index) = func.as_builtin() {
        let result = (BUILTINS[index].func)(&args);
        return Ok(result.unwrap_or(Value::NULL));
    }
    Err(EmberError::eval(
        line,
        format!("not a function: {}", func.type_name()),
    ))
}

fn eval_hash_literal(
    line: usize,
    pairs: &[(Expr, Expr)],
    env: &Rc<Env>,
) -> Result<Value, EmberError> {
    let mut out = ember_core::HashPairs::new();
    for (key_expr, value_expr) in pairs {
        let key = eval_expr(key_expr, env)?;
        if key.is_error() {
            return Ok(key);
        }
        let Some(hash_key) = key.hash_key() else {
            return Err(EmberError::eval(
                line,
                format!("unusable as hash key: {}", key.type_name()),
            ));
        };
        let value = eval_expr(value_expr, env)?;
        if value.is_error() {
            return Ok(value);
        }
        out.insert(hash_key, HashEntry { key, value });
    }
    Ok(Value::hash(out))
}

fn eval_index(line: usize, left: Value, index: Value) -> Result<Value, EmberError> {
    if let (Some(elements), Some(n)) = (left.as_array(), index.as_number()) {
        let i = n as i64;
        if i < 0 || i as usize >= elements.len() {
            return Ok(Value::NULL);
        }
        return Ok(elements[i as usize].clone());
    }
    if let Some(pairs) = left.as_hash_ref() {
        let Some(hash_key) = index.hash_key() else {
            return Err(EmberError::eval(
                line,
                format!("unusable as hash key: {}", index.type_name()),
            ));
        };
        return Ok(pairs
            .get(&hash_key)
            .map(|entry| entry.value.clone())
            .unwrap_or(Value::NULL));
    }
    Err(EmberError::eval(
        line,
        format!(
            "index operator not supported: {}[{}]",
            left.type_name(),
            index.type_name()
        ),
    ))
}
