// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    discovery::is_test_function,
    engine::{Callable, Namespace, Value},
};
use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::warn;

/// The module-level dict holding per-test metadata.
pub const TEST_META: &str = "__test_meta__";

/// The module-level dict holding parametrization tables.
pub const TEST_PARAMS: &str = "__test_params__";

/// Per-test flags from `__test_meta__`.
///
/// ```text
/// __test_meta__ = {
///     "test_slow": {"skip": "takes minutes", "markers": ["slow"]},
///     "test_known_bug": {"xfail": True},
/// }
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestMeta {
    /// Skip the test without running it.
    pub skip: bool,

    /// Why the test is skipped.
    pub skip_reason: Option<String>,

    /// The test is expected to fail.
    pub xfail: bool,

    /// Why the test is expected to fail.
    pub xfail_reason: Option<String>,

    /// Tags for the marker filter.
    pub markers: BTreeSet<String>,
}

impl TestMeta {
    fn from_value(test: &str, value: &Value) -> Self {
        let mut meta = TestMeta::default();
        if value.as_dict().is_none() {
            warn!(test, "ignoring {TEST_META} entry that is not a dict");
            return meta;
        }

        (meta.skip, meta.skip_reason) = flag(value.dict_get("skip"));
        (meta.xfail, meta.xfail_reason) = flag(value.dict_get("xfail"));
        if let Some(markers) = value.dict_get("markers").and_then(Value::as_sequence) {
            meta.markers = markers
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect();
        }
        meta
    }
}

/// `True` sets a flag without a reason. Any string sets it, with the string as the reason unless
/// it's empty.
fn flag(value: Option<&Value>) -> (bool, Option<String>) {
    match value {
        Some(Value::String(reason)) => (true, Some(reason.clone()).filter(|r| !r.is_empty())),
        Some(value @ Value::Bool(_)) => (value.truth(), None),
        _ => (false, None),
    }
}

/// One case of a parametrized test.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamCase {
    /// The case's `"name"`, or its index in the table.
    pub name: String,

    /// The case dict, passed to the test as its first argument.
    pub case: Value,
}

impl ParamCase {
    /// The name results are reported under: `test[case]`.
    pub fn virtual_name(&self, test: &str) -> String {
        format!("{test}[{}]", self.name)
    }
}

/// A test function found in a file's namespace.
#[derive(Clone)]
pub struct TestFunction {
    /// The function's name.
    pub name: String,

    /// The function.
    pub function: Arc<dyn Callable>,

    /// Flags from `__test_meta__`.
    pub meta: TestMeta,

    /// Cases from `__test_params__`. Empty for ordinary tests.
    pub cases: Vec<ParamCase>,
}

impl fmt::Debug for TestFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestFunction")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .field("cases", &self.cases.len())
            .finish_non_exhaustive()
    }
}

/// Extracts the test functions of a namespace, sorted by name, with their metadata and
/// parametrization.
pub fn test_functions(namespace: &Namespace, prefix: &str) -> Vec<TestFunction> {
    let meta = namespace.get(TEST_META);
    let params = namespace.get(TEST_PARAMS);

    let mut tests: Vec<_> = namespace
        .iter()
        .filter(|(name, _)| is_test_function(name, prefix))
        .filter_map(|(name, value)| {
            let function = value.as_callable()?.clone();
            Some(TestFunction {
                name: name.clone(),
                function,
                meta: meta
                    .and_then(|meta| meta.dict_get(name))
                    .map(|entry| TestMeta::from_value(name, entry))
                    .unwrap_or_default(),
                cases: params
                    .and_then(|params| params.dict_get(name))
                    .map(param_cases)
                    .unwrap_or_default(),
            })
        })
        .collect();

    tests.sort_by(|a, b| a.name.cmp(&b.name));
    tests
}

/// Non-dict entries are skipped but still take up an index.
fn param_cases(table: &Value) -> Vec<ParamCase> {
    let Some(cases) = table.as_sequence() else {
        return Vec::new();
    };

    cases
        .iter()
        .enumerate()
        .filter(|(_, case)| case.as_dict().is_some())
        .map(|(index, case)| ParamCase {
            name: case
                .dict_get("name")
                .and_then(Value::as_str)
                .map_or_else(|| index.to_string(), str::to_owned),
            case: case.clone(),
        })
        .collect()
}

/// Looks up an optional hook function, such as `setup`, in a namespace.
pub(crate) fn hook(namespace: &Namespace, name: &str) -> Option<Arc<dyn Callable>> {
    namespace.get(name).and_then(Value::as_callable).cloned()
}
