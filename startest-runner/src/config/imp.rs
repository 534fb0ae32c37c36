// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    runner::RunnerOptions,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeSet, sync::LazyLock, time::Duration};
use tracing::{debug, warn};

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for startest.
///
/// Obtained through [`discover`](Self::discover), [`from_file`](Self::from_file) or
/// [`default_config`](Self::default_config).
#[derive(Clone, Debug)]
pub struct StartestConfig {
    config_file: Option<Utf8PathBuf>,
    base_dir: Utf8PathBuf,
    inner: TestConfigDeserialize,
}

impl StartestConfig {
    /// The name of the config file looked for by [`discover`](Self::discover).
    pub const CONFIG_FILE_NAME: &'static str = "startest.toml";

    /// The default configuration.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Returns the default configuration, with relative paths resolved against `base_dir`.
    pub fn default_config(base_dir: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let mut unknown = BTreeSet::new();
        let deserialized: StartestConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("default config is always valid");

        // The default config is embedded, so an unknown key in it is a bug.
        if !unknown.is_empty() {
            panic!("found unknown keys in default config: {}", unknown.iter().join(", "));
        }

        Self {
            config_file: None,
            base_dir: base_dir.into(),
            inner: deserialized.test,
        }
    }

    /// Walks up from `start_dir` looking for a `startest.toml`, and reads the first one found.
    ///
    /// If there's no config file, returns the default configuration based at `start_dir`.
    pub fn discover(start_dir: impl AsRef<Utf8Path>) -> Result<Self, ConfigParseError> {
        let start_dir = start_dir.as_ref();
        match Self::find_config_file(start_dir) {
            Some(config_file) => Self::from_file(config_file),
            None => {
                debug!(%start_dir, "no config file found, using defaults");
                Ok(Self::default_config(start_dir))
            }
        }
    }

    /// Returns the path of the nearest `startest.toml` at or above `start_dir`.
    pub fn find_config_file(start_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(Self::CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Reads configuration from `config_file`, overlaid on top of the defaults.
    pub fn from_file(config_file: impl Into<Utf8PathBuf>) -> Result<Self, ConfigParseError> {
        let config_file = config_file.into();
        let builder = Self::make_default_config()
            .add_source(File::new(config_file.as_str(), FileFormat::Toml));

        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            warn!(
                "ignoring unknown configuration keys in config file {config_file}: {}",
                unknown.iter().join(", ")
            );
        }
        debug!(%config_file, "loaded config");

        let base_dir = config_file
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self {
            config_file: Some(config_file),
            base_dir,
            inner: deserialized.test,
        })
    }

    /// Returns the config file this was read from, or `None` for the defaults.
    pub fn config_file(&self) -> Option<&Utf8Path> {
        self.config_file.as_deref()
    }

    /// Returns the directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Returns the test-function prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Returns the per-test timeout, or `None` if it's disabled.
    pub fn timeout(&self) -> Option<Duration> {
        Some(self.inner.timeout).filter(|timeout| !timeout.is_zero())
    }

    /// Returns the configured number of test threads.
    pub fn test_threads(&self) -> TestThreads {
        self.inner.test_threads
    }

    /// Returns true if a run stops at the first failure.
    pub fn fail_fast(&self) -> bool {
        self.inner.fail_fast
    }

    /// Returns the prelude files, resolved against [`base_dir`](Self::base_dir).
    pub fn preludes(&self) -> Vec<Utf8PathBuf> {
        self.inner
            .preludes
            .iter()
            .map(|prelude| self.base_dir.join(prelude))
            .collect()
    }

    /// Returns true if mismatching snapshots are overwritten.
    pub fn update_snapshots(&self) -> bool {
        self.inner.update_snapshots
    }

    /// Returns true if captured output is shown for every test.
    pub fn verbose(&self) -> bool {
        self.inner.verbose
    }

    /// Returns true if directories are walked recursively.
    pub fn recursive(&self) -> bool {
        self.inner.recursive
    }

    /// Returns the coverage settings.
    pub fn coverage(&self) -> &CoverageConfig {
        &self.inner.coverage
    }

    /// Converts this configuration into options for a
    /// [`TestRunner`](crate::runner::TestRunner).
    pub fn to_runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            test_prefix: self.inner.prefix.clone(),
            preludes: self.preludes(),
            timeout: self.timeout(),
            fail_fast: self.inner.fail_fast,
            update_snapshots: self.inner.update_snapshots,
            coverage: self.inner.coverage.enabled,
            ..RunnerOptions::default()
        }
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(StartestConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut unknown = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            unknown.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: StartestConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, unknown))
    }
}

/// Coverage settings, from the `[test.coverage]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct CoverageConfig {
    /// Collect line coverage.
    pub enabled: bool,

    /// Minimum line coverage percentage for a run to pass. 0 disables the check.
    pub fail_under: f64,
}

impl CoverageConfig {
    /// Returns true if `percentage` falls below the configured minimum.
    pub fn is_below_minimum(&self, percentage: f64) -> bool {
        self.fail_under > 0.0 && percentage < self.fail_under
    }
}

#[derive(Clone, Debug, Deserialize)]
struct StartestConfigDeserialize {
    test: TestConfigDeserialize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TestConfigDeserialize {
    prefix: String,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    test_threads: TestThreads,
    fail_fast: bool,
    preludes: Vec<Utf8PathBuf>,
    update_snapshots: bool,
    verbose: bool,
    recursive: bool,
    coverage: CoverageConfig,
}
