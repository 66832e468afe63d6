//! Sync map items: an optional directory search feeding role and grant rules

use super::OneOrMany;
use super::grant::GrantRule;
use super::role::RoleRule;
use crate::constants::DN_COMPONENTS;
use crate::directory::{JoinQuery, Scope, SearchQuery};
use crate::error::SyncError;
use crate::format::AttributeMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Where to search, as configured. Attributes are inferred from the rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryQuery {
    pub base: String,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub scope: Scope,
    /// Search options for joined entries, by attribute.
    #[serde(default)]
    pub joins: BTreeMap<String, JoinOptions>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinOptions {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub scope: Scope,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SyncItemInput")]
pub struct SyncItem {
    pub description: Option<String>,
    pub directory: Option<DirectoryQuery>,
    pub roles: Vec<RoleRule>,
    pub grants: Vec<GrantRule>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncItemInput {
    description: Option<String>,
    #[serde(alias = "ldap")]
    directory: Option<DirectoryQuery>,
    #[serde(default, alias = "role")]
    roles: OneOrMany<RoleRule>,
    #[serde(default, alias = "grants")]
    grant: OneOrMany<GrantRule>,
}

impl TryFrom<SyncItemInput> for SyncItem {
    type Error = SyncError;

    fn try_from(input: SyncItemInput) -> Result<Self, Self::Error> {
        let item = SyncItem {
            description: input.description,
            directory: input.directory,
            roles: input.roles.into_vec(),
            grants: input.grant.into_vec(),
        };
        item.validate()?;
        Ok(item)
    }
}

impl SyncItem {
    fn validate(&self) -> Result<(), SyncError> {
        if self.roles.is_empty() && self.grants.is_empty() {
            return Err(SyncError::user("Missing role or grant rule."));
        }

        if self.directory.is_some() {
            let hides_static = self.roles.iter().any(RoleRule::has_static_names)
                || self.grants.iter().any(GrantRule::has_static_roles);
            if hides_static {
                return Err(SyncError::user(
                    "Mixing static role with directory query may hide it.",
                ));
            }
        } else {
            let dynamic = !self.roles.iter().all(RoleRule::is_static)
                || !self.grants.iter().all(GrantRule::is_static);
            if dynamic {
                return Err(SyncError::user(format!(
                    "{}: place-holders require a directory query.",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.description.as_deref().unwrap_or("Sync map item")
    }

    /// Attributes read by every rule of the item, merged.
    pub fn attributes_map(&self) -> AttributeMap {
        let mut map = AttributeMap::new();
        for rule in &self.roles {
            map.update(&rule.attributes_map());
        }
        for rule in &self.grants {
            map.update(&rule.attributes_map());
        }
        map
    }

    /// The directory search feeding this item, with one sub-search per join
    /// reading more than DN components.
    pub fn search_query(&self) -> Result<Option<SearchQuery>, SyncError> {
        let Some(directory) = &self.directory else {
            return Ok(None);
        };
        let map = self.attributes_map();

        let mut attributes: Vec<String> = map
            .self_attributes()
            .filter(|attribute| *attribute != "dn" && !attribute.starts_with("dn."))
            .map(str::to_string)
            .collect();

        let mut joins = BTreeMap::new();
        for (object, wanted) in map.joins() {
            attributes.push(object.to_string());
            // DN components are decoded from the attribute value itself.
            let needs_search = wanted
                .iter()
                .any(|attribute| attribute != "dn" && !DN_COMPONENTS.contains(&attribute.as_str()));
            if !needs_search {
                continue;
            }
            let options = directory.joins.get(object);
            let fetched = wanted.iter().filter(|a| *a != "dn").cloned().collect();
            joins.insert(
                object.to_string(),
                JoinQuery {
                    filter: options.map_or_else(default_filter, |o| o.filter.clone()),
                    scope: options.map_or(Scope::Base, |o| o.scope),
                    attributes: fetched,
                },
            );
        }

        attributes.sort();
        attributes.dedup();
        if attributes.is_empty() {
            return Err(SyncError::user(format!(
                "No attributes are used from directory query {}",
                directory.base
            )));
        }

        debug!(
            item = self.name(),
            base = %directory.base,
            attributes = ?attributes,
            joins = ?joins.keys().collect::<Vec<_>>(),
            "Collected directory search attributes"
        );

        Ok(Some(SearchQuery {
            base: directory.base.clone(),
            filter: directory.filter.clone(),
            scope: directory.scope,
            attributes,
            joins,
        }))
    }
}
