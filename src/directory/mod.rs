//! Directory entries and the search interface the rule engine consumes
//!
//! The directory protocol itself lives behind [`Directory`]; this crate only
//! ships [`fixture::StaticDirectory`], which answers searches from a YAML file.

pub mod dn;
pub mod fixture;

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Base,
    #[serde(alias = "onelevel")]
    One,
    #[default]
    #[serde(alias = "subtree")]
    Sub,
}

/// Search for the entries of one sync map item, with one sub-search per join.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchQuery {
    pub base: String,
    pub filter: String,
    pub scope: Scope,
    pub attributes: Vec<String>,
    pub joins: BTreeMap<String, JoinQuery>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinQuery {
    pub filter: String,
    pub scope: Scope,
    pub attributes: Vec<String>,
}

#[allow(async_fn_in_trait)]
pub trait Directory {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<DirectoryEntry>>;
}

/// A read-only directory entry with its joined sub-entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectoryEntry {
    pub dn: String,
    // Keys are lowercased; directory attribute names are case-insensitive.
    attributes: BTreeMap<String, Vec<String>>,
    children: BTreeMap<String, Vec<DirectoryEntry>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_attribute(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_children(mut self, join: &str, entries: Vec<DirectoryEntry>) -> Self {
        self.set_children(join, entries);
        self
    }

    pub fn set_attribute(&mut self, name: &str, values: Vec<String>) {
        self.attributes.insert(name.to_lowercase(), values);
    }

    pub fn set_children(&mut self, join: &str, entries: Vec<DirectoryEntry>) {
        self.children.insert(join.to_lowercase(), entries);
    }

    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .get(&name.to_lowercase())
            .map(|values| values.as_slice())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn children(&self, join: &str) -> Option<&[DirectoryEntry]> {
        self.children
            .get(&join.to_lowercase())
            .map(|entries| entries.as_slice())
    }

    pub fn has_join(&self, join: &str) -> bool {
        self.children.contains_key(&join.to_lowercase())
    }

    /// Values of a dotted attribute path.
    ///
    /// `dn` is the entry's own DN. `member.cn` decodes each `member` value as
    /// a DN and extracts its `cn` component.
    pub fn values(&self, path: &str) -> Result<Vec<String>, SyncError> {
        let (head, component) = match path.split_once('.') {
            Some((head, component)) => (head, Some(component)),
            None => (path, None),
        };

        let raw: Vec<String> = if head.eq_ignore_ascii_case("dn") {
            vec![self.dn.clone()]
        } else {
            self.attribute(head)
                .ok_or_else(|| SyncError::MissingAttribute {
                    path: path.to_string(),
                })?
                .to_vec()
        };

        let Some(component) = component else {
            return Ok(raw);
        };

        raw.into_iter()
            .map(|value| {
                match dn::dn_component(&value, component) {
                    Ok(Some(found)) => Ok(found),
                    Ok(None) => Err(SyncError::MissingAttribute {
                        path: path.to_string(),
                    }),
                    Err(_) => Err(SyncError::Decode {
                        value,
                        key: path.to_string(),
                    }),
                }
            })
            .collect()
    }
}
