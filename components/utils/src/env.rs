// Copyright 2024 tsumugi
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{error::Error, str::FromStr};

use snafu::{whatever, ResultExt, Whatever};

/// Reads an environment variable for the current process.
///
/// The `.env` file in the current or parent directories is loaded first
/// through [dotenvy], and an unset variable yields `Ok(None)`.
#[track_caller]
pub fn var(key: &str) -> Result<Option<String>, Whatever> {
    match dotenvy::var(key) {
        Ok(content) => Ok(Some(content)),
        Err(dotenvy::Error::EnvVar(std::env::VarError::NotPresent)) => Ok(None),
        Err(error) => whatever!(Err(error), "Failed to read {key} environment variable"),
    }
}

/// Reads an environment variable like [var] and parses it if it is set.
#[track_caller]
pub fn var_parsed<R>(key: &str) -> Result<Option<R>, Whatever>
where
    R: FromStr,
    R::Err: Error + Send + Sync + 'static,
{
    match var(key)? {
        Some(content) => Ok(Some(content.parse().with_whatever_context(|e| {
            format!("Failed to parse {key} environment variable; {e}")
        })?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_none() {
        std::env::set_var("TSUMUGI_UTILS_TEST_NUM", "4096");
        let v: Option<u64> = var_parsed("TSUMUGI_UTILS_TEST_NUM").unwrap();
        assert_eq!(v, Some(4096));

        let v: Option<u64> = var_parsed("TSUMUGI_UTILS_TEST_UNSET").unwrap();
        assert_eq!(v, None);

        std::env::set_var("TSUMUGI_UTILS_TEST_BAD", "four");
        assert!(var_parsed::<u64>("TSUMUGI_UTILS_TEST_BAD").is_err());
    }
}
