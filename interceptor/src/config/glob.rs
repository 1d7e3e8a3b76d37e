/*
 * Copyright 2023 ByteDance and/or its affiliates.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Minimal `*`-wildcard path matcher used by rewrite rules.
//!
//! `*` matches any run (including empty) of non-`/` characters, except a
//! trailing `*` — the last character of the whole pattern — which matches
//! everything remaining, slashes included.

pub fn path_glob_matches(pattern: &str, path: &str) -> bool {
    match_from(pattern.as_bytes(), path.as_bytes(), 0, 0)
}

fn match_from(pattern: &[u8], path: &[u8], pi: usize, si: usize) -> bool {
    if pi == pattern.len() {
        return si == path.len();
    }
    if pattern[pi] == b'*' {
        if pi == pattern.len() - 1 {
            return true;
        }
        let mut k = si;
        loop {
            if match_from(pattern, path, pi + 1, k) {
                return true;
            }
            if k >= path.len() || path[k] == b'/' {
                return false;
            }
            k += 1;
        }
    }
    si < path.len() && path[si] == pattern[pi] && match_from(pattern, path, pi + 1, si + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_requires_exact_match() {
        assert!(path_glob_matches("/api/x", "/api/x"));
        assert!(!path_glob_matches("/api/x", "/api/y"));
    }

    #[test]
    fn star_matches_a_run_of_non_slash_characters() {
        assert!(path_glob_matches("/api/*", "/api/x"));
        assert!(path_glob_matches("/api/*", "/api/"));
        assert!(!path_glob_matches("/api/*/end", "/api/x/y/end"));
    }

    #[test]
    fn trailing_star_matches_through_further_slashes() {
        assert!(path_glob_matches("/api/*", "/api/x/y/z"));
    }

    #[test]
    fn interior_star_stays_within_one_path_segment() {
        assert!(path_glob_matches("/*/users", "/v1/users"));
        assert!(!path_glob_matches("/*/users", "/v1/v2/users"));
    }

    #[test]
    fn empty_star_match_is_allowed() {
        assert!(path_glob_matches("/api*/x", "/api/x"));
    }
}
