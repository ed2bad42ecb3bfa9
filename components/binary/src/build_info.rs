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

#[allow(dead_code)]
mod built {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const AUTHOR: &str = built::PKG_AUTHORS;

const COMMIT_HASH: &str = match built::GIT_COMMIT_HASH_SHORT {
    Some(hash) => hash,
    None => "unknown",
};

/// The package version, suffixed with the short commit hash unless
/// `TSUMUGI_RELEASE` is set at build time.
pub const FULL_VERSION: &str = if option_env!("TSUMUGI_RELEASE").is_some() {
    built::PKG_VERSION
} else {
    const_format::concatcp!(built::PKG_VERSION, "+", COMMIT_HASH)
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_starts_with_the_package_version() {
        assert!(FULL_VERSION.starts_with(built::PKG_VERSION));
        assert!(!AUTHOR.is_empty());
    }
}
