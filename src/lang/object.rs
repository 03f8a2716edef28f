use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::Instructions;
use crate::runtime::runtime_error::RuntimeError;

/// Runtime value in the Monkey language.
///
/// Aggregates and functions are reference counted: copying an `Object` onto
/// the stack or into a global slot never deep-copies.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Rc<Vec<Object>>),
    Hash(Rc<IndexMap<HashKey, HashPair>>),
    /// Function template produced by the compiler. Lives in the constant pool.
    CompiledFunction(Rc<CompiledFunction>),
    /// Template plus captured values. Only the VM creates these.
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    /// An error *value*. Pushed like any other object.
    Error(Rc<str>),
}

impl Object {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Object::String(s.into())
    }

    pub fn error(message: impl Into<Rc<str>>) -> Self {
        Object::Error(message.into())
    }

    pub fn array(elements: Vec<Object>) -> Self {
        Object::Array(Rc::new(elements))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::String(_) => "STRING",
            Object::Null => "NULL",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
            Object::Error(_) => "ERROR",
        }
    }

    /// `false` and `null` are the only falsy values.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Boolean(false) | Object::Null)
    }

    /// Key form of a hashable object; `None` for every other kind.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(n) => Some(HashKey::Integer(*n)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::String(s) => Some(HashKey::String(Rc::clone(s))),
            _ => None,
        }
    }
}

impl From<i64> for Object {
    fn from(n: i64) -> Self {
        Object::Integer(n)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::String(s.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
}

/// The original key object is kept next to the value for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Slots reserved on the stack for this function, parameters included.
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

pub type BuiltinFn = fn(&[Object]) -> Result<Object, RuntimeError>;

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::String(s) => write!(f, "{}", s),
            Object::Null => write!(f, "null"),
            Object::Array(elements) => {
                write!(f, "[")?;
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", el)?;
                }
                write!(f, "]")
            }
            Object::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Object::CompiledFunction(func) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Object::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Object::Builtin(builtin) => write!(f, "builtin function {}", builtin.name),
            Object::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Object::Null.is_truthy());
        assert!(!Object::Boolean(false).is_truthy());
        assert!(Object::Boolean(true).is_truthy());
        assert!(Object::Integer(0).is_truthy());
        assert!(Object::from("").is_truthy());
        assert!(Object::array(vec![]).is_truthy());
    }

    #[test]
    fn test_string_hash_keys_match_by_content() {
        let a = Object::from("name");
        let b = Object::string(String::from("name"));
        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(a.hash_key(), Object::from("other").hash_key());
    }

    #[test]
    fn test_hash_key_kinds_do_not_collide() {
        assert_ne!(
            Object::Integer(1).hash_key(),
            Object::Boolean(true).hash_key()
        );
    }

    #[test]
    fn test_unhashable() {
        assert_eq!(Object::array(vec![]).hash_key(), None);
        assert_eq!(Object::Null.hash_key(), None);
    }

    #[test]
    fn test_display() {
        let arr = Object::array(vec![Object::Integer(1), Object::from("two"), Object::Null]);
        assert_eq!(arr.to_string(), "[1, two, null]");

        let mut pairs = IndexMap::new();
        let key = Object::from("a");
        pairs.insert(
            key.hash_key().unwrap(),
            HashPair {
                key,
                value: Object::Integer(1),
            },
        );
        assert_eq!(Object::Hash(Rc::new(pairs)).to_string(), "{a: 1}");
        assert_eq!(Object::error("boom").to_string(), "ERROR: boom");
    }
}
