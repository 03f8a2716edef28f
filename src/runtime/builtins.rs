use std::io::Write;
use std::rc::Rc;

use crate::lang::object::{Builtin, Object};
use crate::runtime::runtime_error::RuntimeError;

/// Builtin table. A builtin's position is its `GetBuiltin` operand, so the
/// order is part of the bytecode contract.
pub static BUILTINS: [Builtin; 6] = [
    Builtin {
        name: "len",
        func: len,
    },
    Builtin {
        name: "puts",
        func: puts,
    },
    Builtin {
        name: "first",
        func: first,
    },
    Builtin {
        name: "last",
        func: last,
    },
    Builtin {
        name: "rest",
        func: rest,
    },
    Builtin {
        name: "push",
        func: push,
    },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn wrong_arg_count(got: usize, want: usize) -> Object {
    Object::error(format!("wrong number of arguments. got={}, want={}", got, want))
}

fn len(args: &[Object]) -> Result<Object, RuntimeError> {
    let [arg] = args else {
        return Ok(wrong_arg_count(args.len(), 1));
    };

    Ok(match arg {
        Object::String(s) => Object::Integer(s.len() as i64),
        Object::Array(elements) => Object::Integer(elements.len() as i64),
        other => Object::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    })
}

fn puts(args: &[Object]) -> Result<Object, RuntimeError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for arg in args {
        writeln!(out, "{}", arg).map_err(|e| RuntimeError::builtin("puts", e.to_string()))?;
    }
    Ok(Object::Null)
}

/// Shared argument check for the array accessors.
fn single_array<'a>(name: &str, args: &'a [Object]) -> Result<&'a [Object], Object> {
    match args {
        [Object::Array(elements)] => Ok(elements.as_slice()),
        [other] => Err(Object::error(format!(
            "argument to `{}` must be ARRAY, got {}",
            name,
            other.type_name()
        ))),
        _ => Err(wrong_arg_count(args.len(), 1)),
    }
}

fn first(args: &[Object]) -> Result<Object, RuntimeError> {
    Ok(match single_array("first", args) {
        Ok(elements) => elements.first().cloned().unwrap_or(Object::Null),
        Err(err) => err,
    })
}

fn last(args: &[Object]) -> Result<Object, RuntimeError> {
    Ok(match single_array("last", args) {
        Ok(elements) => elements.last().cloned().unwrap_or(Object::Null),
        Err(err) => err,
    })
}

fn rest(args: &[Object]) -> Result<Object, RuntimeError> {
    Ok(match single_array("rest", args) {
        Ok([]) => Object::Null,
        Ok([_, tail @ ..]) => Object::array(tail.to_vec()),
        Err(err) => err,
    })
}

fn push(args: &[Object]) -> Result<Object, RuntimeError> {
    let [target, value] = args else {
        return Ok(wrong_arg_count(args.len(), 2));
    };

    let Object::Array(elements) = target else {
        return Ok(Object::error(format!(
            "argument to `push` must be ARRAY, got {}",
            target.type_name()
        )));
    };

    let mut extended = Vec::with_capacity(elements.len() + 1);
    extended.extend(elements.iter().cloned());
    extended.push(value.clone());
    Ok(Object::Array(Rc::new(extended)))
}
