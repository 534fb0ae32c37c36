// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call-recording mocks, exposed to tests as the builtin `mock` fixture.
//!
//! ```text
//! def test_fetch(mock):
//!     get = mock.wrap(http_get)
//!     mock.when(get).called_with("/users").then_return([])
//!     mock.when(get).then_return(None)
//!     ...
//!     assert.eq(mock.call_count(get), 2)
//! ```

use crate::{
    engine::{Callable, ExecContext, Module, NativeFunction, Value, callable_identity, required_arg},
    errors::{EngineError, MockError},
    snapshot::serialize_value,
};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};
use tracing::trace;

/// The name the mock module is injected under.
pub const MOCK_FIXTURE: &str = "mock";

/// A single recorded call.
#[derive(Clone, Debug, PartialEq)]
pub struct MockCall {
    /// Positional arguments.
    pub args: Vec<Value>,

    /// Keyword arguments, in call order.
    pub kwargs: Vec<(String, Value)>,
}

impl MockCall {
    /// The call as `struct(args = (...), kwargs = {...})`.
    pub fn to_value(&self) -> Value {
        Value::structure([
            ("args", Value::Tuple(self.args.clone())),
            (
                "kwargs",
                Value::dict(
                    self.kwargs
                        .iter()
                        .map(|(k, v)| (Value::string(k), v.clone())),
                ),
            ),
        ])
    }
}

#[derive(Debug, Default)]
struct MockConfig {
    default_return: Option<Value>,
    returns: HashMap<String, Value>,
    calls: Vec<MockCall>,
}

#[derive(Debug, Default)]
struct MockState {
    // Wrapped callable identity -> wrapper.
    by_target: HashMap<usize, Arc<MockWrapper>>,
    // Wrapper identity -> wrapper. Survives resets so old wrappers are still recognized.
    wrappers: HashMap<usize, Arc<MockWrapper>>,
    // Wrapper id -> config.
    configs: HashMap<u64, MockConfig>,
    next_id: u64,
}

/// Owns every mock created during one file's run.
#[derive(Clone, Debug, Default)]
pub struct MockManager {
    state: Arc<RwLock<MockState>>,
}

impl MockManager {
    /// Creates a manager with no mocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a callable in a recording mock.
    ///
    /// Wrapping the same callable again returns the same wrapper, and wrapping a wrapper
    /// returns it unchanged.
    pub fn wrap(&self, value: &Value) -> Result<Value, MockError> {
        let target = value.as_callable().ok_or(MockError::NotCallable {
            type_name: value.type_name(),
        })?;
        let key = callable_identity(target);

        let mut state = self.state.write();
        if state.wrappers.contains_key(&key) {
            return Ok(value.clone());
        }
        if let Some(wrapper) = state.by_target.get(&key) {
            return Ok(Value::Callable(wrapper.clone()));
        }

        state.next_id += 1;
        let id = state.next_id;
        let wrapper = Arc::new(MockWrapper {
            id,
            target: target.clone(),
            state: Arc::downgrade(&self.state),
        });
        let callable: Arc<dyn Callable> = wrapper.clone();

        state.by_target.insert(key, wrapper.clone());
        state
            .wrappers
            .insert(callable_identity(&callable), wrapper);
        state.configs.insert(id, MockConfig::default());
        trace!(id, target = target.name(), "wrapped callable");

        Ok(Value::Callable(callable))
    }

    /// Starts configuring a mock's return values.
    pub fn when(&self, mock: &Value) -> Result<MockWhen, MockError> {
        let id = self.wrapper_id("mock.when", mock)?;
        Ok(MockWhen {
            state: Arc::downgrade(&self.state),
            id,
            args: None,
        })
    }

    /// Returns true if the mock was called at least once since it was wrapped.
    pub fn was_called(&self, mock: &Value) -> Result<bool, MockError> {
        Ok(self.call_count_for("mock.was_called", mock)? > 0)
    }

    /// The number of recorded calls.
    pub fn call_count(&self, mock: &Value) -> Result<usize, MockError> {
        self.call_count_for("mock.call_count", mock)
    }

    /// A copy of the recorded calls, oldest first.
    pub fn calls(&self, mock: &Value) -> Result<Vec<MockCall>, MockError> {
        let id = self.wrapper_id("mock.calls", mock)?;
        Ok(self
            .state
            .read()
            .configs
            .get(&id)
            .map(|config| config.calls.clone())
            .unwrap_or_default())
    }

    /// Forgets every wrapper, configured return value and recorded call.
    ///
    /// Existing wrappers keep working but pass calls straight through without recording.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.by_target.clear();
        state.configs.clear();
    }

    /// Builds the `mock` module handed to tests.
    pub fn module(&self) -> Value {
        let wrap = self.clone();
        let when = self.clone();
        let was_called = self.clone();
        let call_count = self.clone();
        let calls = self.clone();
        let reset = self.clone();

        Module::new(MOCK_FIXTURE)
            .with_function(NativeFunction::new("wrap", move |_, args, kwargs| {
                let target = required_arg("mock.wrap", args, kwargs, 0, "fn")?;
                Ok(wrap.wrap(target)?)
            }))
            .with_function(NativeFunction::new("when", move |_, args, kwargs| {
                let mock = required_arg("mock.when", args, kwargs, 0, "mock")?;
                Ok(when.when(mock)?.into_value())
            }))
            .with_function(NativeFunction::new("was_called", move |_, args, kwargs| {
                let mock = required_arg("mock.was_called", args, kwargs, 0, "mock")?;
                Ok(Value::Bool(was_called.was_called(mock)?))
            }))
            .with_function(NativeFunction::new("call_count", move |_, args, kwargs| {
                let mock = required_arg("mock.call_count", args, kwargs, 0, "mock")?;
                Ok(Value::Int(call_count.call_count(mock)? as i64))
            }))
            .with_function(NativeFunction::new("calls", move |_, args, kwargs| {
                let mock = required_arg("mock.calls", args, kwargs, 0, "mock")?;
                Ok(Value::List(
                    calls.calls(mock)?.iter().map(MockCall::to_value).collect(),
                ))
            }))
            .with_function(NativeFunction::new("reset", move |_, _, _| {
                reset.reset();
                Ok(Value::None)
            }))
            .into_value()
    }

    fn wrapper_id(&self, operation: &'static str, mock: &Value) -> Result<u64, MockError> {
        let not_a_mock = || MockError::NotAMock {
            operation,
            type_name: mock.type_name(),
        };
        let callable = mock.as_callable().ok_or_else(not_a_mock)?;
        self.state
            .read()
            .wrappers
            .get(&callable_identity(callable))
            .map(|wrapper| wrapper.id)
            .ok_or_else(not_a_mock)
    }

    fn call_count_for(&self, operation: &'static str, mock: &Value) -> Result<usize, MockError> {
        let id = self.wrapper_id(operation, mock)?;
        Ok(self
            .state
            .read()
            .configs
            .get(&id)
            .map_or(0, |config| config.calls.len()))
    }
}

/// The lookup key for per-argument return values.
fn args_key(args: &[Value]) -> String {
    serialize_value(&Value::Tuple(args.to_vec()))
}

/// A callable that records its calls and may return configured values.
#[derive(Debug)]
pub struct MockWrapper {
    id: u64,
    target: Arc<dyn Callable>,
    state: Weak<RwLock<MockState>>,
}

impl Callable for MockWrapper {
    fn name(&self) -> &str {
        self.target.name()
    }

    fn param_names(&self) -> Vec<String> {
        self.target.param_names()
    }

    fn call(
        &self,
        cx: &ExecContext,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, EngineError> {
        let configured = self.state.upgrade().and_then(|state| {
            let mut state = state.write();
            let config = state.configs.get_mut(&self.id)?;
            config.calls.push(MockCall {
                args: args.to_vec(),
                kwargs: kwargs.to_vec(),
            });
            config
                .returns
                .get(&args_key(args))
                .or(config.default_return.as_ref())
                .cloned()
        });

        // The lock is released before calling through, so the target may use mocks itself.
        match configured {
            Some(value) => Ok(value),
            None => self.target.call(cx, args, kwargs),
        }
    }
}

/// Configures the return value of a mock, optionally for specific arguments.
#[derive(Clone, Debug)]
pub struct MockWhen {
    state: Weak<RwLock<MockState>>,
    id: u64,
    args: Option<Vec<Value>>,
}

impl MockWhen {
    /// Narrows the configuration to calls with exactly these positional arguments.
    pub fn called_with(mut self, args: Vec<Value>) -> Self {
        self.args = Some(args);
        self
    }

    /// Sets the return value. A reset mock ignores this.
    pub fn then_return(&self, value: Value) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.write();
        let Some(config) = state.configs.get_mut(&self.id) else {
            return;
        };
        match &self.args {
            Some(args) => {
                config.returns.insert(args_key(args), value);
            }
            None => config.default_return = Some(value),
        }
    }

    /// The builder as a module with `called_with` and `then_return`.
    pub fn into_value(self) -> Value {
        let narrow = self.clone();
        Module::new("mock.when")
            .with_function(NativeFunction::new("called_with", move |_, args, _| {
                Ok(narrow.clone().called_with(args.to_vec()).into_value())
            }))
            .with_function(NativeFunction::new("then_return", move |_, args, kwargs| {
                let value = required_arg("then_return", args, kwargs, 0, "value")?;
                self.then_return(value.clone());
                Ok(Value::None)
            }))
            .into_value()
    }
}
