// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures: named values injected into tests by parameter name.
//!
//! A fixture is a top-level function named `fixture_<name>`. A test (or another fixture) that
//! declares a parameter called `<name>` receives the fixture's value. Fixtures default to the
//! `test` scope, recomputed for every test; `file`-scoped fixtures are computed once per file.
//! Scopes are declared in a module-level dict:
//!
//! ```text
//! __fixture_config__ = {"db": {"scope": "file"}}
//! ```
//!
//! Fixtures in `conftest.star` files are inherited by every test file at or below the
//! conftest's directory.

use crate::{
    engine::{Callable, ExecContext, Namespace, Value},
    errors::FixtureError,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, warn};

/// The name of shared fixture-definition files.
pub const CONFTEST_FILE: &str = "conftest.star";

/// The prefix that marks a function as a fixture.
pub const FIXTURE_PREFIX: &str = "fixture_";

/// The module-level dict that configures fixture scopes.
pub const FIXTURE_CONFIG: &str = "__fixture_config__";

const VCS_MARKERS: &[&str] = &[".git", ".hg", ".jj"];

/// How long a fixture's value lives.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum FixtureScope {
    /// Recomputed for every test.
    #[default]
    Test,

    /// Computed once and shared by every test in a file.
    File,
}

impl FixtureScope {
    /// Parses a scope name as written in `__fixture_config__`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "test" => Some(Self::Test),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

impl fmt::Display for FixtureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A named value producer.
#[derive(Clone, Debug)]
pub struct Fixture {
    name: String,
    producer: Arc<dyn Callable>,
    scope: FixtureScope,
}

impl Fixture {
    /// Creates a new fixture.
    pub fn new(name: impl Into<String>, producer: Arc<dyn Callable>, scope: FixtureScope) -> Self {
        Self {
            name: name.into(),
            producer,
            scope,
        }
    }

    /// The fixture's name, without the `fixture_` prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fixture's scope.
    pub fn scope(&self) -> FixtureScope {
        self.scope
    }

    /// Names of the fixtures this fixture depends on.
    pub fn dependencies(&self) -> Vec<String> {
        self.producer.param_names()
    }
}

/// Extracts the fixtures declared in a namespace, in declaration order.
pub fn fixtures_from_namespace(namespace: &Namespace) -> Vec<Fixture> {
    let config = namespace.get(FIXTURE_CONFIG);

    namespace
        .iter()
        .filter_map(|(binding, value)| {
            let name = binding.strip_prefix(FIXTURE_PREFIX)?;
            let producer = value.as_callable()?;
            let scope = match config
                .and_then(|config| config.dict_get(name))
                .and_then(|entry| entry.dict_get("scope"))
                .and_then(Value::as_str)
            {
                Some(scope) => FixtureScope::parse(scope).unwrap_or_else(|| {
                    warn!(fixture = name, scope, "unknown fixture scope, using `test`");
                    FixtureScope::Test
                }),
                None => FixtureScope::Test,
            };
            Some(Fixture::new(name, producer.clone(), scope))
        })
        .collect()
}

/// Resolves fixtures for the tests of one file.
///
/// Caches are behind locks held only for the map access, never while a producer runs.
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    fixtures: IndexMap<String, Fixture>,
    builtins: HashMap<String, Value>,
    file_cache: RwLock<HashMap<String, Value>>,
    test_cache: RwLock<HashMap<String, Value>>,
}

impl FixtureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fixture, replacing any earlier fixture with the same name.
    pub fn register(&mut self, fixture: Fixture) {
        self.fixtures.insert(fixture.name.clone(), fixture);
    }

    /// Registers several fixtures in order. Later ones win on name collisions.
    pub fn register_all(&mut self, fixtures: impl IntoIterator<Item = Fixture>) {
        for fixture in fixtures {
            self.register(fixture);
        }
    }

    /// Adds a value that is returned as-is whenever `name` is requested.
    pub fn add_builtin(&mut self, name: impl Into<String>, value: Value) {
        self.builtins.insert(name.into(), value);
    }

    /// Looks up a registered fixture.
    pub fn get(&self, name: &str) -> Option<&Fixture> {
        self.fixtures.get(name)
    }

    /// Returns true if `name` is a fixture or a builtin.
    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name) || self.fixtures.contains_key(name)
    }

    /// Names of the registered fixtures.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fixtures.keys().map(String::as_str)
    }

    /// Returns the value of a fixture, computing it and its dependencies if needed.
    pub fn get_or_compute(&self, cx: &ExecContext, name: &str) -> Result<Value, FixtureError> {
        self.resolve(cx, name, &mut Vec::new())
    }

    /// Resolves each parameter name to a fixture value, in order.
    pub fn resolve_args(
        &self,
        cx: &ExecContext,
        params: &[String],
    ) -> Result<Vec<Value>, FixtureError> {
        params
            .iter()
            .map(|param| self.get_or_compute(cx, param))
            .collect()
    }

    /// Drops test-scoped values. Called after every test.
    pub fn clear_test_cache(&self) {
        self.test_cache.write().clear();
    }

    /// Drops file-scoped values. Called when a file is done.
    pub fn clear_file_cache(&self) {
        self.file_cache.write().clear();
    }

    fn cache(&self, scope: FixtureScope) -> &RwLock<HashMap<String, Value>> {
        match scope {
            FixtureScope::Test => &self.test_cache,
            FixtureScope::File => &self.file_cache,
        }
    }

    fn resolve(
        &self,
        cx: &ExecContext,
        name: &str,
        in_progress: &mut Vec<String>,
    ) -> Result<Value, FixtureError> {
        if let Some(value) = self.builtins.get(name) {
            return Ok(value.clone());
        }

        let fixture = self
            .fixtures
            .get(name)
            .ok_or_else(|| FixtureError::NotFound {
                name: name.to_owned(),
            })?;

        let cache = self.cache(fixture.scope);
        if let Some(value) = cache.read().get(name) {
            return Ok(value.clone());
        }

        if let Some(pos) = in_progress.iter().position(|n| n == name) {
            let mut chain = in_progress[pos..].to_vec();
            chain.push(name.to_owned());
            return Err(FixtureError::Cycle { chain });
        }

        in_progress.push(name.to_owned());
        let result = self.compute(cx, fixture, in_progress);
        in_progress.pop();
        let value = result?;

        cache.write().insert(name.to_owned(), value.clone());
        Ok(value)
    }

    fn compute(
        &self,
        cx: &ExecContext,
        fixture: &Fixture,
        in_progress: &mut Vec<String>,
    ) -> Result<Value, FixtureError> {
        let mut args = Vec::new();
        for dep in fixture.dependencies() {
            let value = self.resolve(cx, &dep, in_progress).map_err(|error| match error {
                // Report the whole cycle rather than nesting it once per hop.
                FixtureError::Cycle { .. } => error,
                error => FixtureError::Dependency {
                    name: fixture.name.clone(),
                    error: Box::new(error),
                },
            })?;
            args.push(value);
        }

        debug!(fixture = %fixture.name, scope = %fixture.scope, "computing fixture");
        fixture
            .producer
            .call(cx, &args, &[])
            .map_err(|error| FixtureError::Resolution {
                name: fixture.name.clone(),
                error,
            })
    }
}

/// Finds the `conftest.star` files that apply to a test file, farthest first.
///
/// The search starts in the test file's directory and walks up to the filesystem root, stopping
/// after the first directory that holds a version-control marker.
pub fn find_conftest_files(test_file: &Utf8Path) -> Vec<Utf8PathBuf> {
    let dir = match test_file.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let start = dir.canonicalize_utf8().unwrap_or_else(|_| dir.to_owned());

    let mut found = Vec::new();
    for ancestor in start.ancestors() {
        let candidate = ancestor.join(CONFTEST_FILE);
        if candidate.is_file() {
            found.push(candidate);
        }
        if VCS_MARKERS
            .iter()
            .any(|marker| ancestor.join(marker).exists())
        {
            break;
        }
    }

    found.reverse();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::NativeFunction, errors::EngineError};
    use camino_tempfile::tempdir;
    use maplit::hashmap;
    use pretty_assertions::assert_eq;
    use std::{
        fs,
        sync::atomic::{AtomicI64, Ordering},
    };

    fn counter_fixture(name: &str, scope: FixtureScope) -> Fixture {
        let counter = Arc::new(AtomicI64::new(0));
        let producer = NativeFunction::new(name, move |_, _, _| {
            Ok(Value::Int(counter.fetch_add(1, Ordering::SeqCst)))
        });
        Fixture::new(name, Arc::new(producer), scope)
    }

    fn fixture_with_deps(name: &str, deps: &[&str]) -> Fixture {
        let producer = NativeFunction::new(name, |_, args, _| Ok(Value::List(args.to_vec())))
            .with_params(deps.iter().copied());
        Fixture::new(name, Arc::new(producer), FixtureScope::Test)
    }

    #[test]
    fn scopes() {
        let mut registry = FixtureRegistry::new();
        registry.register(counter_fixture("per_test", FixtureScope::Test));
        registry.register(counter_fixture("per_file", FixtureScope::File));
        let cx = ExecContext::new("test");

        let first = (
            registry.get_or_compute(&cx, "per_test").unwrap(),
            registry.get_or_compute(&cx, "per_file").unwrap(),
        );
        // Within one test, the test-scoped value is shared.
        assert_eq!(registry.get_or_compute(&cx, "per_test").unwrap(), first.0);
        registry.clear_test_cache();

        let second = (
            registry.get_or_compute(&cx, "per_test").unwrap(),
            registry.get_or_compute(&cx, "per_file").unwrap(),
        );
        assert_ne!(first.0, second.0, "test scope is recomputed");
        assert_eq!(first.1, second.1, "file scope is cached");

        registry.clear_file_cache();
        assert_ne!(registry.get_or_compute(&cx, "per_file").unwrap(), first.1);
    }

    #[test]
    fn dependencies_and_builtins() {
        let mut registry = FixtureRegistry::new();
        registry.add_builtin("mock", Value::string("mock module"));
        registry.register(fixture_with_deps("leaf", &[]));
        registry.register(fixture_with_deps("client", &["leaf", "mock"]));
        let cx = ExecContext::new("test");

        assert_eq!(
            registry.get_or_compute(&cx, "client").unwrap(),
            Value::List(vec![Value::List(vec![]), Value::string("mock module")])
        );
        assert!(registry.contains("mock"));
    }

    #[test]
    fn missing_fixture() {
        let mut registry = FixtureRegistry::new();
        registry.register(fixture_with_deps("client", &["db"]));
        let cx = ExecContext::new("test");

        let err = registry.get_or_compute(&cx, "nope").unwrap_err();
        assert!(matches!(err, FixtureError::NotFound { ref name } if name == "nope"));

        let err = registry.get_or_compute(&cx, "client").unwrap_err();
        let FixtureError::Dependency { name, error } = err else {
            panic!("expected a dependency error, got {err:?}");
        };
        assert_eq!(name, "client");
        assert!(matches!(*error, FixtureError::NotFound { ref name } if name == "db"));
    }

    #[test]
    fn cycles_are_detected() {
        let mut registry = FixtureRegistry::new();
        registry.register(fixture_with_deps("a", &["b"]));
        registry.register(fixture_with_deps("b", &["c"]));
        registry.register(fixture_with_deps("c", &["a"]));
        registry.register(fixture_with_deps("selfish", &["selfish"]));
        let cx = ExecContext::new("test");

        let err = registry.get_or_compute(&cx, "a").unwrap_err();
        let FixtureError::Cycle { chain } = err else {
            panic!("expected a cycle, got {err:?}");
        };
        assert_eq!(chain, vec!["a", "b", "c", "a"]);

        let err = registry.get_or_compute(&cx, "selfish").unwrap_err();
        assert_eq!(err.to_string(), "fixture dependency cycle: selfish -> selfish");
    }

    #[test]
    fn producer_failure() {
        let mut registry = FixtureRegistry::new();
        let producer =
            NativeFunction::new("db", |_, _, _| Err(EngineError::runtime("connection refused")));
        registry.register(Fixture::new("db", Arc::new(producer), FixtureScope::File));
        let cx = ExecContext::new("test");

        let err = registry.get_or_compute(&cx, "db").unwrap_err();
        assert!(matches!(err, FixtureError::Resolution { ref name, .. } if name == "db"));
    }

    #[test]
    fn namespace_extraction() {
        let producer = |name: &str| NativeFunction::new(name, |_, _, _| Ok(Value::None)).into_value();
        let namespace: Namespace = [
            ("fixture_db".to_owned(), producer("fixture_db")),
            ("fixture_tmp".to_owned(), producer("fixture_tmp")),
            ("fixture_weird".to_owned(), producer("fixture_weird")),
            ("fixture_not_callable".to_owned(), Value::Int(1)),
            ("helper".to_owned(), producer("helper")),
            (
                FIXTURE_CONFIG.to_owned(),
                Value::dict([
                    (
                        "db".into(),
                        Value::dict([("scope".into(), "file".into())]),
                    ),
                    (
                        "weird".into(),
                        Value::dict([("scope".into(), "session".into())]),
                    ),
                ]),
            ),
        ]
        .into_iter()
        .collect();

        let scopes: HashMap<_, _> = fixtures_from_namespace(&namespace)
            .iter()
            .map(|f| (f.name().to_owned(), f.scope()))
            .collect();
        assert_eq!(
            scopes,
            hashmap! {
                "db".to_owned() => FixtureScope::File,
                "tmp".to_owned() => FixtureScope::Test,
                "weird".to_owned() => FixtureScope::Test,
            }
        );
    }

    #[test]
    fn conftest_discovery() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize_utf8().unwrap();
        fs::create_dir_all(root.join("repo/.git")).unwrap();
        fs::create_dir_all(root.join("repo/pkg/sub")).unwrap();
        for file in [
            "conftest.star",
            "repo/conftest.star",
            "repo/pkg/sub/conftest.star",
        ] {
            fs::write(root.join(file), "").unwrap();
        }

        let found = find_conftest_files(&root.join("repo/pkg/sub/x_test.star"));
        assert_eq!(
            found,
            vec![
                root.join("repo/conftest.star"),
                root.join("repo/pkg/sub/conftest.star"),
            ],
            "stops at the repository root, farthest first"
        );
    }
}
