// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ExecContext;
use crate::errors::EngineError;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use itertools::Itertools;
use std::{cmp::Ordering, collections::BTreeMap, fmt, sync::Arc};

/// Top-level bindings of an executed file, or a set of predeclared names.
pub type Namespace = IndexMap<String, Value>;

/// A Starlark value.
#[derive(Clone, Debug)]
pub enum Value {
    /// `None`.
    None,

    /// A boolean.
    Bool(bool),

    /// An integer.
    Int(i64),

    /// A float.
    Float(f64),

    /// A string.
    String(String),

    /// A byte string.
    Bytes(Vec<u8>),

    /// A list.
    List(Vec<Value>),

    /// A tuple.
    Tuple(Vec<Value>),

    /// A dict, in insertion order.
    Dict(Vec<(Value, Value)>),

    /// A set, in insertion order.
    Set(Vec<Value>),

    /// A value created with `struct(...)`.
    Struct(BTreeMap<String, Value>),

    /// A named bag of attributes, such as the `assert` module.
    Module(Arc<Module>),

    /// A function.
    Callable(Arc<dyn Callable>),
}

impl Value {
    /// Creates a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Creates a dict from key-value pairs.
    pub fn dict(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self::Dict(pairs.into_iter().collect())
    }

    /// Creates a struct from named fields.
    pub fn structure<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wraps a callable.
    pub fn callable(callable: impl Callable + 'static) -> Self {
        Self::Callable(Arc::new(callable))
    }

    /// The Starlark type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Struct(_) => "struct",
            Self::Module(_) => "module",
            Self::Callable(_) => "function",
        }
    }

    /// Starlark truthiness.
    pub fn truth(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => !items.is_empty(),
            Self::Dict(pairs) => !pairs.is_empty(),
            Self::Struct(_) | Self::Module(_) | Self::Callable(_) => true,
        }
    }

    /// Returns the string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the callable, if this is a function.
    pub fn as_callable(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            Self::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    /// Returns the pairs, if this is a dict.
    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Returns the items, if this is a list or a tuple.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a string key in a dict.
    pub fn dict_get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Looks up an attribute on a struct or module.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Struct(fields) => fields.get(name),
            Self::Module(module) => module.get(name),
            _ => None,
        }
    }

    /// `len(value)`, for values that have a length.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.len()),
            Self::Bytes(b) => Some(b.len()),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items.len()),
            Self::Dict(pairs) => Some(pairs.len()),
            _ => None,
        }
    }

    /// `item in self`, for values that support membership tests.
    pub fn contains(&self, item: &Value) -> Option<bool> {
        match (self, item) {
            (Self::String(s), Self::String(needle)) => Some(s.contains(needle.as_str())),
            (Self::Bytes(b), Self::Bytes(needle)) => {
                Some(needle.is_empty() || b.windows(needle.len()).any(|w| w == needle))
            }
            (Self::List(items) | Self::Tuple(items) | Self::Set(items), _) => {
                Some(items.contains(item))
            }
            (Self::Dict(pairs), _) => Some(pairs.iter().any(|(k, _)| k == item)),
            _ => None,
        }
    }

    /// Orders two values the way Starlark's `<` does. Returns `None` for values that can't be
    /// ordered against each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::None, Self::None) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Calls this value, failing if it isn't callable.
    pub fn call(
        &self,
        cx: &ExecContext,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, EngineError> {
        match self {
            Self::Callable(callable) => callable.call(cx, args, kwargs),
            other => Err(EngineError::runtime(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            // Dicts and sets compare without regard to insertion order.
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Self::Set(a), Self::Set(b)) => a.len() == b.len() && a.iter().all(|x| b.contains(x)),
            (Self::Struct(a), Self::Struct(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => callable_identity(a) == callable_identity(b),
            _ => false,
        }
    }
}

/// Displays the value the way Starlark's `repr` does.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "b\"{}\"", b.escape_ascii()),
            Self::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Self::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Self::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            Self::Dict(pairs) => write!(
                f,
                "{{{}}}",
                pairs.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            Self::Set(items) => write!(f, "set([{}])", items.iter().join(", ")),
            Self::Struct(fields) => write!(
                f,
                "struct({})",
                fields.iter().map(|(k, v)| format!("{k} = {v}")).join(", ")
            ),
            Self::Module(module) => write!(f, "<module {}>", module.name()),
            Self::Callable(callable) => write!(f, "<function {}>", callable.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// A stable identity for a callable, used to deduplicate mock wrappers.
///
/// Two `Arc`s have the same identity iff they point at the same allocation.
pub fn callable_identity(callable: &Arc<dyn Callable>) -> usize {
    Arc::as_ptr(callable) as *const () as usize
}

/// A function value.
pub trait Callable: Send + Sync + fmt::Debug {
    /// The function's name.
    fn name(&self) -> &str;

    /// Declared parameter names, in order. Used to bind fixtures and parametrized cases.
    fn param_names(&self) -> Vec<String>;

    /// Calls the function.
    fn call(
        &self,
        cx: &ExecContext,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, EngineError>;
}

type NativeFn =
    dyn Fn(&ExecContext, &[Value], &[(String, Value)]) -> Result<Value, EngineError> + Send + Sync;

/// A function implemented in Rust.
#[derive(Debug)]
pub struct NativeFunction {
    name: String,
    params: Vec<String>,
    f: DebugIgnore<Box<NativeFn>>,
}

impl NativeFunction {
    /// Creates a new native function with no declared parameters.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExecContext, &[Value], &[(String, Value)]) -> Result<Value, EngineError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            f: DebugIgnore(Box::new(f)),
        }
    }

    /// Declares parameter names for this function.
    pub fn with_params<S: Into<String>>(mut self, params: impl IntoIterator<Item = S>) -> Self {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Converts this function into a value.
    pub fn into_value(self) -> Value {
        Value::callable(self)
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_names(&self) -> Vec<String> {
        self.params.clone()
    }

    fn call(
        &self,
        cx: &ExecContext,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, EngineError> {
        (self.f)(cx, args, kwargs)
    }
}

/// A named bag of attributes.
#[derive(Debug)]
pub struct Module {
    name: String,
    members: IndexMap<String, Value>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: IndexMap::new(),
        }
    }

    /// Adds a member.
    pub fn with_member(mut self, name: impl Into<String>, value: Value) -> Self {
        self.members.insert(name.into(), value);
        self
    }

    /// Adds a native function as a member, named after the function.
    pub fn with_function(self, function: NativeFunction) -> Self {
        let name = function.name.clone();
        self.with_member(name, function.into_value())
    }

    /// The module's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a member.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// Iterates over members in insertion order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts this module into a value.
    pub fn into_value(self) -> Value {
        Value::Module(Arc::new(self))
    }
}

/// Returns the argument at `index`, or the keyword argument called `name`.
pub(crate) fn arg<'a>(
    args: &'a [Value],
    kwargs: &'a [(String, Value)],
    index: usize,
    name: &str,
) -> Option<&'a Value> {
    args.get(index).or_else(|| {
        kwargs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, value)| value)
    })
}

/// Like [`arg`], but fails with a Starlark-style error if the argument is missing.
pub(crate) fn required_arg<'a>(
    function: &str,
    args: &'a [Value],
    kwargs: &'a [(String, Value)],
    index: usize,
    name: &str,
) -> Result<&'a Value, EngineError> {
    arg(args, kwargs, index, name).ok_or_else(|| {
        EngineError::runtime(format!("{function}: missing argument for {name}"))
    })
}
