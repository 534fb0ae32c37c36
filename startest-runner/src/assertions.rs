// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The predeclared `assert` module.

use crate::{
    engine::{ExecContext, Module, NativeFunction, Value, arg, required_arg},
    errors::{EngineError, EngineErrorKind},
};
use std::cmp::Ordering;

/// The name the assertion module is predeclared under.
pub const ASSERT_MODULE: &str = "assert";

/// Builds the `assert` module.
///
/// Every assertion accepts an optional trailing `msg` that replaces the default
/// `assertion failed: ...` message.
pub fn assert_module() -> Value {
    Module::new(ASSERT_MODULE)
        .with_function(binary("eq", |a, b| Ok(a == b), "!="))
        .with_function(binary("ne", |a, b| Ok(a != b), "=="))
        .with_function(ordering("lt", "<", Ordering::is_lt))
        .with_function(ordering("le", "<=", Ordering::is_le))
        .with_function(ordering("gt", ">", Ordering::is_gt))
        .with_function(ordering("ge", ">=", Ordering::is_ge))
        .with_function(truthiness("true", true))
        .with_function(truthiness("false", false))
        .with_function(NativeFunction::new("contains", |_, args, kwargs| {
            let container = required_arg("assert.contains", args, kwargs, 0, "container")?;
            let item = required_arg("assert.contains", args, kwargs, 1, "item")?;
            match container.contains(item) {
                Some(true) => Ok(Value::None),
                Some(false) => Err(failure(args, kwargs, 2, || {
                    format!("{container} does not contain {item}")
                })),
                None => Err(EngineError::runtime(format!(
                    "assert.contains: {} does not support membership tests",
                    container.type_name()
                ))),
            }
        }))
        .with_function(NativeFunction::new("len", |_, args, kwargs| {
            let container = required_arg("assert.len", args, kwargs, 0, "container")?;
            let expected = required_arg("assert.len", args, kwargs, 1, "n")?;
            let actual = container.len().ok_or_else(|| {
                EngineError::runtime(format!(
                    "assert.len: {} has no length",
                    container.type_name()
                ))
            })?;
            if Value::Int(actual as i64) == *expected {
                Ok(Value::None)
            } else {
                Err(failure(args, kwargs, 2, || {
                    format!("len({container}) is {actual}, expected {expected}")
                }))
            }
        }))
        .with_function(emptiness("empty", true))
        .with_function(emptiness("not_empty", false))
        .with_function(NativeFunction::new("fails", fails))
        .with_function(NativeFunction::new("snapshot", |cx, args, kwargs| {
            let value = required_arg("assert.snapshot", args, kwargs, 0, "value")?;
            let name = required_arg("assert.snapshot", args, kwargs, 1, "name")?;
            let name = name.as_str().ok_or_else(|| {
                EngineError::runtime(format!(
                    "assert.snapshot: name must be a string, got {}",
                    name.type_name()
                ))
            })?;
            let snapshot = cx.snapshot().ok_or_else(|| {
                EngineError::runtime("assert.snapshot can only be called from a test")
            })?;
            snapshot.compare(value, name)?;
            Ok(Value::None)
        }))
        .into_value()
}

/// The error for a failed assertion: the user's `msg` if given, else `assertion failed: ...`.
fn failure(
    args: &[Value],
    kwargs: &[(String, Value)],
    msg_index: usize,
    detail: impl FnOnce() -> String,
) -> EngineError {
    match arg(args, kwargs, msg_index, "msg").and_then(Value::as_str) {
        Some(msg) => EngineError::assertion(msg),
        None => EngineError::assertion(format!("assertion failed: {}", detail())),
    }
}

fn binary(
    name: &'static str,
    check: fn(&Value, &Value) -> Result<bool, EngineError>,
    negated_op: &'static str,
) -> NativeFunction {
    NativeFunction::new(name, move |_, args, kwargs| {
        let function = format!("assert.{name}");
        let a = required_arg(&function, args, kwargs, 0, "a")?;
        let b = required_arg(&function, args, kwargs, 1, "b")?;
        if check(a, b)? {
            Ok(Value::None)
        } else {
            Err(failure(args, kwargs, 2, || format!("{a} {negated_op} {b}")))
        }
    })
}

fn ordering(name: &'static str, op: &'static str, holds: fn(Ordering) -> bool) -> NativeFunction {
    NativeFunction::new(name, move |_, args, kwargs| {
        let function = format!("assert.{name}");
        let a = required_arg(&function, args, kwargs, 0, "a")?;
        let b = required_arg(&function, args, kwargs, 1, "b")?;
        let ordering = a.compare(b).ok_or_else(|| {
            EngineError::runtime(format!(
                "{function}: cannot compare {} and {}",
                a.type_name(),
                b.type_name()
            ))
        })?;
        if holds(ordering) {
            Ok(Value::None)
        } else {
            Err(failure(args, kwargs, 2, || format!("expected {a} {op} {b}")))
        }
    })
}

fn truthiness(name: &'static str, expected: bool) -> NativeFunction {
    NativeFunction::new(name, move |_, args, kwargs| {
        let value = required_arg(&format!("assert.{name}"), args, kwargs, 0, "value")?;
        if value.truth() == expected {
            Ok(Value::None)
        } else {
            Err(failure(args, kwargs, 1, || {
                format!("expected {value} to be {}", if expected { "truthy" } else { "falsy" })
            }))
        }
    })
}

fn emptiness(name: &'static str, expect_empty: bool) -> NativeFunction {
    NativeFunction::new(name, move |_, args, kwargs| {
        let value = required_arg(&format!("assert.{name}"), args, kwargs, 0, "value")?;
        let len = value.len().ok_or_else(|| {
            EngineError::runtime(format!("assert.{name}: {} has no length", value.type_name()))
        })?;
        if (len == 0) == expect_empty {
            Ok(Value::None)
        } else if expect_empty {
            Err(failure(args, kwargs, 1, || format!("expected {value} to be empty")))
        } else {
            Err(failure(args, kwargs, 1, || "expected a non-empty value".to_owned()))
        }
    })
}

fn fails(
    cx: &ExecContext,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<Value, EngineError> {
    let function = required_arg("assert.fails", args, kwargs, 0, "fn")?;
    let pattern = arg(args, kwargs, 1, "pattern").and_then(Value::as_str);

    match function.call(cx, &[], &[]) {
        Ok(_) => Err(EngineError::assertion(
            "assertion failed: expected function to fail",
        )),
        // Cancellation isn't the failure being asserted on.
        Err(error) if error.kind() == EngineErrorKind::Cancelled => Err(error),
        Err(error) => match pattern {
            Some(pattern) if !error.message().contains(pattern) => {
                Err(EngineError::assertion(format!(
                    "assertion failed: error {:?} does not contain {pattern:?}",
                    error.message()
                )))
            }
            _ => Ok(Value::None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotManager;
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use test_case::test_case;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, EngineError> {
        call_with(&ExecContext::new("test"), name, args)
    }

    fn call_with(cx: &ExecContext, name: &str, args: Vec<Value>) -> Result<Value, EngineError> {
        let module = assert_module();
        module
            .attr(name)
            .unwrap_or_else(|| panic!("assert.{name} exists"))
            .call(cx, &args, &[])
    }

    #[test_case("eq", vec![1.into(), 1.into()]; "eq")]
    #[test_case("ne", vec![1.into(), 2.into()]; "ne")]
    #[test_case("lt", vec![1.into(), 2.into()]; "lt")]
    #[test_case("ge", vec![2.into(), 2.into()]; "ge")]
    #[test_case("true", vec!["x".into()]; "truthy")]
    #[test_case("false", vec![Value::List(vec![])]; "falsy")]
    #[test_case("contains", vec![Value::List(vec![1.into()]), 1.into()]; "contains")]
    #[test_case("len", vec!["abc".into(), 3.into()]; "len")]
    #[test_case("empty", vec![Value::dict([])]; "empty")]
    #[test_case("not_empty", vec![Value::Tuple(vec![Value::None])]; "not empty")]
    fn passing(name: &str, args: Vec<Value>) {
        assert_eq!(call(name, args), Ok(Value::None));
    }

    #[test_case("eq", vec![1.into(), 2.into()], "assertion failed: 1 != 2"; "eq")]
    #[test_case("gt", vec![1.into(), 2.into()], "assertion failed: expected 1 > 2"; "gt")]
    #[test_case(
        "contains",
        vec!["abc".into(), "z".into()],
        r#"assertion failed: "abc" does not contain "z""#;
        "contains"
    )]
    #[test_case("true", vec![0.into(), "custom".into()], "custom"; "custom message")]
    fn failing(name: &str, args: Vec<Value>, message: &str) {
        let err = call(name, args).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Assertion);
        assert_eq!(err.message(), message);
    }

    #[test]
    fn uncomparable() {
        let err = call("lt", vec![1.into(), "a".into()]).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Runtime);
    }

    #[test]
    fn fails_checks_pattern() {
        let boom = NativeFunction::new("boom", |_, _, _| Err(EngineError::runtime("division by zero")))
            .into_value();
        let fine = NativeFunction::new("fine", |_, _, _| Ok(Value::None)).into_value();

        assert_eq!(call("fails", vec![boom.clone()]), Ok(Value::None));
        assert_eq!(call("fails", vec![boom.clone(), "division".into()]), Ok(Value::None));

        let err = call("fails", vec![boom, "overflow".into()]).unwrap_err();
        assert!(err.message().contains("does not contain"), "{err}");

        let err = call("fails", vec![fine]).unwrap_err();
        assert_eq!(err.message(), "assertion failed: expected function to fail");
    }

    #[test]
    fn snapshot_uses_test_context() {
        let err = call("snapshot", vec![1.into(), "n".into()]).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Runtime);

        let dir = tempdir().unwrap();
        let manager = Arc::new(SnapshotManager::new(false));
        let cx = ExecContext::new("test_snap")
            .with_snapshot(manager.for_test(dir.path().join("snap_test.star"), "test_snap"));

        call_with(&cx, "snapshot", vec![1.into(), "n".into()]).unwrap();
        call_with(&cx, "snapshot", vec![1.into(), "n".into()]).unwrap();
        let err = call_with(&cx, "snapshot", vec![2.into(), "n".into()]).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Assertion);
        assert!(
            err.message().starts_with("snapshot \"n\" does not match:"),
            "{err}"
        );
    }
}
