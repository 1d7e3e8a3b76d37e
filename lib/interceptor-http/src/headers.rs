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

//! Case-insensitive, multi-valued HTTP header storage.
//!
//! Lookup is case-insensitive (the `http` crate's `HeaderName` always
//! normalizes to lowercase internally), but the casing a peer actually sent
//! is preserved per-value so it can be reproduced on the wire.

use std::str::FromStr;

use http::HeaderName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFieldValue {
    pub original_name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
struct HeaderEntry {
    name: HeaderName,
    values: Vec<HeaderFieldValue>,
}

/// An ordered, case-insensitive multimap of header fields.
///
/// Names are kept in the order they were first seen; values under one name
/// keep the order they were appended in.
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders {
    entries: Vec<HeaderEntry>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        HttpHeaders::default()
    }

    fn index_of(&self, name: &HeaderName) -> Option<usize> {
        self.entries.iter().position(|e| &e.name == name)
    }

    /// Appends a value, preserving any existing values under the same name.
    pub fn append(&mut self, name: &str, original_name: &str, value: impl Into<String>) -> Result<(), http::header::InvalidHeaderName> {
        let name = HeaderName::from_str(name)?;
        let field = HeaderFieldValue {
            original_name: original_name.to_string(),
            value: value.into(),
        };
        match self.index_of(&name) {
            Some(idx) => self.entries[idx].values.push(field),
            None => self.entries.push(HeaderEntry {
                name,
                values: vec![field],
            }),
        }
        Ok(())
    }

    /// Replaces all values under `name` with a single value, inserting it at
    /// the end if the name was not already present.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let header_name = HeaderName::from_str(name).expect("valid static header name");
        match self.index_of(&header_name) {
            Some(idx) => {
                self.entries[idx].values = vec![HeaderFieldValue {
                    original_name: name.to_string(),
                    value,
                }]
            }
            None => self.entries.push(HeaderEntry {
                name: header_name,
                values: vec![HeaderFieldValue {
                    original_name: name.to_string(),
                    value,
                }],
            }),
        }
    }

    /// Removes every value stored under `name`, returning them if present.
    pub fn remove(&mut self, name: &str) -> Option<Vec<HeaderFieldValue>> {
        let name = HeaderName::from_str(name).ok()?;
        let idx = self.index_of(&name)?;
        Some(self.entries.remove(idx).values)
    }

    pub fn contains(&self, name: &str) -> bool {
        HeaderName::from_str(name)
            .ok()
            .and_then(|n| self.index_of(&n))
            .is_some()
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        let name = HeaderName::from_str(name).ok()?;
        let idx = self.index_of(&name)?;
        self.entries[idx].values.first().map(|v| v.value.as_str())
    }

    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        let idx = HeaderName::from_str(name).ok().and_then(|n| self.index_of(&n));
        idx.into_iter()
            .flat_map(move |idx| self.entries[idx].values.iter().map(|v| v.value.as_str()))
    }

    /// Iterates all (original-cased name, value) pairs in wire order.
    pub fn for_each(&self, mut visit: impl FnMut(&str, &str)) {
        for entry in &self.entries {
            for field in &entry.values {
                visit(&field.original_name, &field.value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -- convenience accessors used throughout the codec and engine --

    pub fn content_length(&self) -> Option<i64> {
        self.get_first("content-length").and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_first("content-type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_first("content-encoding")
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.get_first("transfer-encoding")
    }

    pub fn is_chunked(&self) -> bool {
        self.transfer_encoding()
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    pub fn is_gzip_content(&self) -> bool {
        self.content_encoding()
            .map(|v| v.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false)
    }

    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for raw in self.get_all("cookie") {
            for pair in raw.split(';') {
                let pair = pair.trim();
                if let Some((k, v)) = pair.split_once('=') {
                    pairs.push((k.trim().to_string(), v.trim().to_string()));
                }
            }
        }
        pairs
    }

    pub fn connection_tokens(&self) -> Vec<String> {
        self.get_all("connection")
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_but_emission_preserves_casing() {
        let mut h = HttpHeaders::new();
        h.append("content-type", "Content-Type", "text/plain").unwrap();
        assert_eq!(h.get_first("CONTENT-TYPE"), Some("text/plain"));

        let mut out = Vec::new();
        h.for_each(|name, value| out.push(format!("{name}: {value}")));
        assert_eq!(out, vec!["Content-Type: text/plain".to_string()]);
    }

    #[test]
    fn append_preserves_order_of_values_and_names() {
        let mut h = HttpHeaders::new();
        h.append("x-a", "X-A", "1").unwrap();
        h.append("x-b", "X-B", "2").unwrap();
        h.append("x-a", "X-A", "3").unwrap();

        assert_eq!(h.get_all("x-a").collect::<Vec<_>>(), vec!["1", "3"]);

        let mut order = Vec::new();
        h.for_each(|name, _| order.push(name.to_string()));
        assert_eq!(order, vec!["X-A", "X-B", "X-A"]);
    }

    #[test]
    fn remove_drops_every_value_under_the_name() {
        let mut h = HttpHeaders::new();
        h.append("x-a", "X-A", "1").unwrap();
        h.append("x-a", "X-A", "2").unwrap();
        assert!(h.remove("x-a").is_some());
        assert!(!h.contains("x-a"));
    }

    #[test]
    fn cookie_header_splits_into_pairs() {
        let mut h = HttpHeaders::new();
        h.append("cookie", "Cookie", "a=1; b=2").unwrap();
        assert_eq!(
            h.cookies(),
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
    }
}
