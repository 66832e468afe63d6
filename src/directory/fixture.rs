//! Directory backed by a YAML file of entries
//!
//! Each YAML item is a mapping with a `dn` key; every other key is an
//! attribute holding a string or a list of strings. Searches honour base,
//! scope, a subset of RFC 4515 filters and joins on DN-valued attributes.

use super::dn::normalize_dn;
use super::{Directory, DirectoryEntry, Scope, SearchQuery};
use crate::error::SyncError;
use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Vec<DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read directory fixture {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid directory fixture {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let raw: Vec<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(contents)?;
        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            let dn = item
                .get("dn")
                .and_then(|v| v.as_str())
                .ok_or_else(|| SyncError::user("Directory fixture entry without dn"))?;
            let mut entry = DirectoryEntry::new(dn);
            for (name, value) in &item {
                if name == "dn" {
                    continue;
                }
                entry.set_attribute(name, yaml_values(name, value)?);
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    fn find_by_dn(&self, dn: &str) -> Option<&DirectoryEntry> {
        let wanted = normalize_dn(dn).ok()?;
        self.entries
            .iter()
            .find(|entry| normalize_dn(&entry.dn).is_ok_and(|candidate| candidate == wanted))
    }
}

impl Directory for StaticDirectory {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<DirectoryEntry>> {
        debug!(
            base = %query.base,
            filter = %query.filter,
            attributes = ?query.attributes,
            "Searching directory"
        );

        let filter = Filter::parse(&query.filter)
            .map_err(|e| SyncError::user(format!("Failed to query directory: {}", e)))?;
        let base = normalize_dn(&query.base)
            .map_err(|e| SyncError::user(format!("Invalid search base {:?}: {}", query.base, e)))?;

        let mut results = Vec::new();
        for entry in &self.entries {
            if !in_scope(&entry.dn, &base, query.scope) || !filter.matches(entry) {
                continue;
            }

            let mut found = project(entry, &query.attributes);
            for (join, join_query) in &query.joins {
                let join_filter = Filter::parse(&join_query.filter).map_err(|e| {
                    SyncError::user(format!("Failed to query directory join {}: {}", join, e))
                })?;
                let children = entry
                    .attribute(join)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|dn| self.find_by_dn(dn))
                    .filter(|child| join_filter.matches(child))
                    .map(|child| project(child, &join_query.attributes))
                    .collect();
                found.set_children(join, children);
            }
            results.push(found);
        }

        debug!(count = results.len(), "Directory search done");
        Ok(results)
    }
}

fn yaml_values(name: &str, value: &serde_yaml::Value) -> Result<Vec<String>> {
    let scalar = |v: &serde_yaml::Value| -> Result<String> {
        match v {
            serde_yaml::Value::String(s) => Ok(s.clone()),
            serde_yaml::Value::Number(n) => Ok(n.to_string()),
            serde_yaml::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(SyncError::user(format!("Unsupported value for attribute {}", name)).into()),
        }
    };

    match value {
        serde_yaml::Value::Sequence(items) => items.iter().map(scalar).collect(),
        other => Ok(vec![scalar(other)?]),
    }
}

fn in_scope(dn: &str, base: &[String], scope: Scope) -> bool {
    let Ok(rdns) = normalize_dn(dn) else {
        return false;
    };
    if rdns.len() < base.len() || !rdns.ends_with(base) {
        return false;
    }
    let depth = rdns.len() - base.len();
    match scope {
        Scope::Base => depth == 0,
        Scope::One => depth == 1,
        Scope::Sub => true,
    }
}

fn project(entry: &DirectoryEntry, attributes: &[String]) -> DirectoryEntry {
    let mut projected = DirectoryEntry::new(entry.dn.clone());
    for name in attributes {
        if let Some(values) = entry.attribute(name) {
            projected.set_attribute(name, values.to_vec());
        }
    }
    projected
}

/// Search filter subset: `&`, `|`, `!`, presence and equality with `*`.
#[derive(Debug, Clone)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, Pattern),
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl Filter {
    fn parse(input: &str) -> Result<Filter, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Filter::Present("objectclass".to_string()));
        }
        let input = if input.starts_with('(') {
            input.to_string()
        } else {
            format!("({})", input)
        };

        let (filter, rest) = Self::parse_one(&input)?;
        if !rest.trim().is_empty() {
            return Err(format!("unexpected trailing input {:?}", rest));
        }
        Ok(filter)
    }

    fn parse_one(input: &str) -> Result<(Filter, &str), String> {
        let body = input
            .trim_start()
            .strip_prefix('(')
            .ok_or_else(|| format!("expected '(' at {:?}", input))?;

        if let Some(rest) = body.strip_prefix('&') {
            let (items, rest) = Self::parse_list(rest)?;
            Ok((Filter::And(items), rest))
        } else if let Some(rest) = body.strip_prefix('|') {
            let (items, rest) = Self::parse_list(rest)?;
            Ok((Filter::Or(items), rest))
        } else if let Some(rest) = body.strip_prefix('!') {
            let (inner, rest) = Self::parse_one(rest)?;
            let rest = rest
                .trim_start()
                .strip_prefix(')')
                .ok_or_else(|| "unterminated '!' filter".to_string())?;
            Ok((Filter::Not(Box::new(inner)), rest))
        } else {
            let end = body
                .find(')')
                .ok_or_else(|| format!("unterminated filter {:?}", input))?;
            let item = &body[..end];
            let (attr, value) = item
                .split_once('=')
                .ok_or_else(|| format!("invalid filter item {:?}", item))?;
            let attr = attr.trim().to_lowercase();
            let filter = if value == "*" {
                Filter::Present(attr)
            } else {
                let escaped: Vec<String> = value.split('*').map(Pattern::escape).collect();
                let pattern = Pattern::new(&escaped.join("*")).map_err(|e| e.to_string())?;
                Filter::Equal(attr, pattern)
            };
            Ok((filter, &body[end + 1..]))
        }
    }

    fn parse_list(mut input: &str) -> Result<(Vec<Filter>, &str), String> {
        let mut items = Vec::new();
        loop {
            let trimmed = input.trim_start();
            if let Some(rest) = trimmed.strip_prefix(')') {
                return Ok((items, rest));
            }
            if trimmed.is_empty() {
                return Err("unterminated filter list".to_string());
            }
            let (item, rest) = Self::parse_one(trimmed)?;
            items.push(item);
            input = rest;
        }
    }

    fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(entry)),
            Filter::Or(items) => items.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => attr == "objectclass" || entry.attribute(attr).is_some(),
            Filter::Equal(attr, pattern) => entry
                .attribute(attr)
                .unwrap_or_default()
                .iter()
                .any(|value| pattern.matches_with(value, MATCH_OPTIONS)),
        }
    }
}
