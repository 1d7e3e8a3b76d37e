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

//! Request rewrite rules: an ordered list of domain/path predicates paired
//! with optional replacement bodies for the request and/or response side of
//! a matching exchange.

use serde::{Deserialize, Serialize};

use crate::config::glob::path_glob_matches;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRewriteRule {
    pub enabled: bool,
    pub domain: Option<String>,
    pub path_glob: String,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
}

impl RequestRewriteRule {
    pub fn new(path_glob: String) -> Self {
        RequestRewriteRule {
            enabled: true,
            domain: None,
            path_glob,
            request_body: None,
            response_body: None,
        }
    }

    /// A rule matches when the domain predicate passes (no domain set means
    /// "any host") and the path glob matches.
    fn matches(&self, host: &str, path: &str) -> bool {
        self.enabled && domain_matches(host, self.domain.as_deref()) && path_glob_matches(&self.path_glob, path)
    }
}

/// `host` matches `rule_domain` when no domain is set (wildcard), the host
/// equals the rule's domain case-insensitively, or the host is a subdomain
/// of it (`"." + domain` suffix).
pub fn domain_matches(host: &str, rule_domain: Option<&str>) -> bool {
    let Some(domain) = rule_domain.filter(|d| !d.is_empty()) else {
        return true;
    };
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRewrites {
    pub enabled: bool,
    pub rules: Vec<RequestRewriteRule>,
}

impl RequestRewrites {
    pub fn new() -> Self {
        RequestRewrites::default()
    }

    /// Returns the first enabled rule (in insertion order) whose domain and
    /// path predicates both match, or `None`.
    pub fn find_match(&self, host: &str, path: &str) -> Option<&RequestRewriteRule> {
        if !self.enabled {
            return None;
        }
        self.rules.iter().find(|r| r.matches(host, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(domain: Option<&str>, path_glob: &str) -> RequestRewriteRule {
        RequestRewriteRule {
            enabled: true,
            domain: domain.map(str::to_string),
            path_glob: path_glob.to_string(),
            request_body: None,
            response_body: None,
        }
    }

    #[test]
    fn domain_equality_and_subdomain_suffix_both_match() {
        assert!(domain_matches("example.com", Some("example.com")));
        assert!(domain_matches("api.example.com", Some("example.com")));
        assert!(!domain_matches("notexample.com", Some("example.com")));
        assert!(domain_matches("anything.test", None));
    }

    #[test]
    fn first_matching_enabled_rule_wins() {
        let mut rewrites = RequestRewrites::new();
        rewrites.enabled = true;
        rewrites.rules.push(rule(None, "/api/*"));
        rewrites.rules.push(rule(None, "/api/x"));

        let found = rewrites.find_match("example.com", "/api/x").unwrap();
        assert_eq!(found.path_glob, "/api/*");
    }

    #[test]
    fn disabled_rule_is_skipped() {
        let mut rewrites = RequestRewrites::new();
        rewrites.enabled = true;
        let mut disabled = rule(None, "/api/*");
        disabled.enabled = false;
        rewrites.rules.push(disabled);
        rewrites.rules.push(rule(None, "/api/y"));

        let found = rewrites.find_match("example.com", "/api/x");
        assert!(found.is_none());
    }

    #[test]
    fn rewrites_disabled_globally_short_circuits() {
        let mut rewrites = RequestRewrites::new();
        rewrites.rules.push(rule(None, "/api/*"));
        assert!(rewrites.find_match("example.com", "/api/x").is_none());
    }
}
