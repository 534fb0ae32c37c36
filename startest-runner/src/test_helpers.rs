// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A scripted engine for tests.
//!
//! [`FakeEngine`] maps file names to [`FakeModule`]s, whose bindings are built from Rust
//! closures. This exercises the runner, executor and watch loop without a Starlark interpreter.

use crate::{
    engine::{Engine, ExecContext, Namespace, NativeFunction, Value},
    errors::{EngineError, WatchError},
    fixtures::{FIXTURE_CONFIG, FIXTURE_PREFIX},
    runner::{TEST_META, TEST_PARAMS},
    watcher::WatchBackend,
};
use camino::Utf8Path;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

type MakeValue = Arc<dyn Fn(&Namespace) -> Value + Send + Sync>;

/// Routes `tracing` output through the test harness, so it shows up for failing tests.
pub(crate) fn init_test_logging() {
    // Fails if another test already installed it.
    _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// The bindings of a scripted file.
#[derive(Default)]
pub(crate) struct FakeModule {
    bindings: Vec<(String, MakeValue)>,
    meta: Vec<(Value, Value)>,
    params: Vec<(Value, Value)>,
    fixture_config: Vec<(Value, Value)>,
}

impl FakeModule {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Binds a plain value.
    pub(crate) fn value(mut self, name: &str, value: Value) -> Self {
        self.bindings
            .push((name.to_owned(), Arc::new(move |_| value.clone())));
        self
    }

    /// A function with no parameters.
    pub(crate) fn test<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&ExecContext, &[Value]) -> Result<(), EngineError> + Send + Sync + 'static,
    {
        self.test_with_params(name, &[], body)
    }

    /// A hook such as `setup`. Same as a test, named for readability.
    pub(crate) fn function<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&ExecContext, &[Value]) -> Result<(), EngineError> + Send + Sync + 'static,
    {
        self.test(name, body)
    }

    /// A function with declared parameters.
    pub(crate) fn test_with_params<F>(self, name: &str, params: &[&str], body: F) -> Self
    where
        F: Fn(&ExecContext, &[Value]) -> Result<(), EngineError> + Send + Sync + 'static,
    {
        let function = NativeFunction::new(name, move |cx, args, _| {
            body(cx, args).map(|()| Value::None)
        })
        .with_params(params.iter().copied())
        .into_value();
        self.value(name, function)
    }

    /// A test that inspects the names predeclared for its file.
    pub(crate) fn test_with_predeclared<F>(mut self, name: &str, check: F) -> Self
    where
        F: Fn(&Namespace) + Send + Sync + 'static,
    {
        let check = Arc::new(check);
        let test_name = name.to_owned();
        self.bindings.push((
            name.to_owned(),
            Arc::new(move |predeclared: &Namespace| {
                let predeclared = predeclared.clone();
                let check = check.clone();
                NativeFunction::new(test_name.clone(), move |_, _, _| {
                    check(&predeclared);
                    Ok(Value::None)
                })
                .into_value()
            }),
        ));
        self
    }

    /// A fixture called `name`, bound as `fixture_<name>`.
    pub(crate) fn fixture<F>(self, name: &str, producer: F) -> Self
    where
        F: Fn(&ExecContext, &[Value]) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        self.fixture_with_params(name, &[], producer)
    }

    /// A fixture that depends on other fixtures.
    pub(crate) fn fixture_with_params<F>(self, name: &str, params: &[&str], producer: F) -> Self
    where
        F: Fn(&ExecContext, &[Value]) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        let binding = format!("{FIXTURE_PREFIX}{name}");
        let function = NativeFunction::new(binding.clone(), move |cx, args, _| producer(cx, args))
            .with_params(params.iter().copied())
            .into_value();
        self.value(&binding, function)
    }

    /// A fixture returning 0, 1, 2, ... on successive computations.
    pub(crate) fn counter_fixture(self, name: &str) -> Self {
        let counter = AtomicI64::new(0);
        self.fixture(name, move |_, _| {
            Ok(Value::Int(counter.fetch_add(1, Ordering::SeqCst)))
        })
    }

    /// Sets a fixture's scope in `__fixture_config__`.
    pub(crate) fn fixture_scope(mut self, name: &str, scope: &str) -> Self {
        self.fixture_config.push((
            name.into(),
            Value::dict([("scope".into(), scope.into())]),
        ));
        self
    }

    /// Adds a `__test_meta__` entry.
    pub(crate) fn meta(mut self, test: &str, meta: Value) -> Self {
        self.meta.push((test.into(), meta));
        self
    }

    /// Adds a `__test_params__` table.
    pub(crate) fn params(mut self, test: &str, cases: Vec<Value>) -> Self {
        self.params.push((test.into(), Value::List(cases)));
        self
    }

    fn namespace(&self, predeclared: &Namespace) -> Namespace {
        let mut namespace: Namespace = self
            .bindings
            .iter()
            .map(|(name, make)| (name.clone(), make(predeclared)))
            .collect();
        for (name, table) in [
            (TEST_META, &self.meta),
            (TEST_PARAMS, &self.params),
            (FIXTURE_CONFIG, &self.fixture_config),
        ] {
            if !table.is_empty() {
                namespace.insert(name.to_owned(), Value::Dict(table.clone()));
            }
        }
        namespace
    }
}

/// An engine that returns scripted namespaces, keyed by file name.
#[derive(Default)]
pub(crate) struct FakeEngine {
    modules: HashMap<String, Result<FakeModule, EngineError>>,
    execs: Mutex<HashMap<String, usize>>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_module(mut self, file_name: &str, module: FakeModule) -> Self {
        self.modules.insert(file_name.to_owned(), Ok(module));
        self
    }

    /// Makes executing `file_name` fail.
    pub(crate) fn with_error(mut self, file_name: &str, error: EngineError) -> Self {
        self.modules.insert(file_name.to_owned(), Err(error));
        self
    }

    /// How many times a file was executed.
    pub(crate) fn exec_count(&self, file_name: &str) -> usize {
        self.execs.lock().get(file_name).copied().unwrap_or(0)
    }
}

impl Engine for FakeEngine {
    fn exec_file(
        &self,
        path: &Utf8Path,
        _source: &str,
        predeclared: &Namespace,
        cx: &ExecContext,
    ) -> Result<Namespace, EngineError> {
        cx.cancellation().check()?;
        let file_name = path.file_name().unwrap_or(path.as_str());
        *self.execs.lock().entry(file_name.to_owned()).or_default() += 1;
        // Executing a module counts as running its first line.
        if let Some(coverage) = cx.coverage() {
            coverage.record(path, 1);
        }

        match self.modules.get(file_name) {
            Some(Ok(module)) => Ok(module.namespace(predeclared)),
            Some(Err(error)) => Err(error.clone()),
            None => Err(EngineError::runtime(format!("no scripted module for {path}"))),
        }
    }
}

/// A watch backend that never reports anything on its own. Tests inject changes through the
/// watcher's [`ChangeSender`](crate::watcher::ChangeSender).
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct NoopBackend;

impl WatchBackend for NoopBackend {
    fn watch(&mut self, _path: &Utf8Path) -> Result<(), WatchError> {
        Ok(())
    }

    fn unwatch(&mut self, _path: &Utf8Path) -> Result<(), WatchError> {
        Ok(())
    }
}
