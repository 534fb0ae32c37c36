// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::get_num_cpus;
use crate::errors::TestThreadsParseError;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Type for the test-threads config key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run with a specified number of threads.
    Count(usize),

    /// Run with a number of threads equal to the logical CPU count.
    NumCpus,
}

impl TestThreads {
    /// Interprets a signed count. Zero means the CPU count, and a negative count is subtracted
    /// from it. The result is at least 1.
    pub fn from_signed(count: i64) -> Self {
        match count {
            0 => Self::NumCpus,
            j if j < 0 => {
                let cpus = i64::try_from(get_num_cpus()).unwrap_or(i64::MAX);
                Self::Count(cpus.saturating_add(j).max(1) as usize)
            }
            j => Self::Count(usize::try_from(j).unwrap_or(usize::MAX)),
        }
    }

    /// Gets the actual number of threads computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }
}

impl Default for TestThreads {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        s.parse::<i64>()
            .map(Self::from_signed)
            .map_err(|_| TestThreadsParseError::new(s))
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(TestThreads::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(TestThreads::from_signed(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(TestThreads::Count(usize::try_from(v).unwrap_or(usize::MAX)))
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("num-cpus", TestThreads::NumCpus; "num cpus")]
    #[test_case("4", TestThreads::Count(4); "positive")]
    #[test_case("0", TestThreads::NumCpus; "zero")]
    fn parse(input: &str, expected: TestThreads) {
        assert_eq!(input.parse::<TestThreads>().unwrap(), expected);
    }

    #[test]
    fn negative_is_relative_to_cpus() {
        let cpus = get_num_cpus();
        assert_eq!(
            "-1".parse::<TestThreads>().unwrap().compute(),
            cpus.saturating_sub(1).max(1)
        );
        // Never drops below 1.
        assert_eq!(TestThreads::from_signed(-100_000).compute(), 1);
    }

    #[test_case("many"; "word")]
    #[test_case("1.5"; "float")]
    #[test_case(""; "empty")]
    fn parse_error(input: &str) {
        let error = input.parse::<TestThreads>().unwrap_err();
        assert_eq!(error.input, input);
    }

    #[test]
    fn display_round_trips() {
        for threads in [TestThreads::NumCpus, TestThreads::Count(3)] {
            assert_eq!(threads.to_string().parse::<TestThreads>().unwrap(), threads);
        }
    }
}
