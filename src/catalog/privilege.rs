//! Privilege definitions and their expansion against the topology
//!
//! Every privilege has one of four shapes, following PostgreSQL's own ACL
//! model. The shape decides how a wanted grant with wildcards is resolved into
//! concrete grants and how the grant is described to the operator.

use super::grant::{Acl, Grant, Target};
use super::inspector::QuerySource;
use super::topology::Topology;
use crate::error::SyncError;
use crate::render::{Statement, quote_ident, substitute};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PrivilegeKind {
    /// Granted on a database, e.g. `CONNECT`.
    #[serde(rename = "datacl", alias = "database")]
    Database,
    /// Granted on a schema or on all objects of a schema.
    #[serde(rename = "nspacl", alias = "schema")]
    Schema,
    /// Default privileges for objects created by an owner in a schema.
    #[serde(rename = "defacl", alias = "default")]
    DefaultSchema,
    /// Default privileges for objects created by an owner anywhere.
    #[serde(rename = "globaldefacl", alias = "global_default")]
    DefaultGlobal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Privilege {
    pub name: String,
    pub kind: PrivilegeKind,
    pub inspect: Option<QuerySource>,
    pub grant: Option<String>,
    pub revoke: Option<String>,
}

impl Privilege {
    pub fn new(name: &str, kind: PrivilegeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            inspect: None,
            grant: None,
            revoke: None,
        }
    }

    pub fn with_inspect(mut self, inspect: QuerySource) -> Self {
        self.inspect = Some(inspect);
        self
    }

    pub fn with_grant(mut self, sql: &str) -> Self {
        self.grant = Some(sql.to_string());
        self
    }

    pub fn with_revoke(mut self, sql: &str) -> Self {
        self.revoke = Some(sql.to_string());
        self
    }

    /// Resolve wildcards of `grant` into concrete grants of this privilege.
    pub fn expand(&self, grant: &Grant, topology: &Topology) -> Result<Vec<Grant>, SyncError> {
        let mut expanded = Vec::new();

        for dbname in expand_databases(&grant.dbname, topology) {
            let base = Grant {
                privilege: self.name.clone(),
                dbname: Target::Named(dbname.clone()),
                ..grant.clone()
            };

            match self.kind {
                PrivilegeKind::Database => expanded.push(Grant { schema: None, ..base }),
                PrivilegeKind::DefaultGlobal => {
                    for owner in topology.database_owners(&dbname)? {
                        expanded.push(Grant {
                            schema: None,
                            owner: Some(owner.to_string()),
                            ..base.clone()
                        });
                    }
                }
                PrivilegeKind::Schema => {
                    for schema in expand_schemas(grant.schema.as_ref(), &dbname, topology)? {
                        expanded.push(Grant {
                            schema: Some(Target::Named(schema)),
                            ..base.clone()
                        });
                    }
                }
                PrivilegeKind::DefaultSchema => {
                    for schema in expand_schemas(grant.schema.as_ref(), &dbname, topology)? {
                        for owner in topology.owners(&dbname, &schema)? {
                            expanded.push(Grant {
                                schema: Some(Target::Named(schema.clone())),
                                owner: Some(owner.clone()),
                                ..base.clone()
                            });
                        }
                    }
                }
            }
        }

        Ok(expanded)
    }

    pub fn grant_statement(&self, grant: &Grant) -> Option<Statement> {
        let sql = self.grant.as_deref()?;
        let message = format!(
            "Grant {} on {} to {}.",
            grant.privilege,
            self.describe(grant),
            grant.role
        );
        Some(Statement::new(message, render_template(sql, grant)).on(grant.dbname.clone()))
    }

    pub fn revoke_statement(&self, grant: &Grant) -> Option<Statement> {
        let sql = self.revoke.as_deref()?;
        let message = format!(
            "Revoke {} on {} from {}.",
            grant.privilege,
            self.describe(grant),
            grant.role
        );
        Some(Statement::destructive(message, render_template(sql, grant)).on(grant.dbname.clone()))
    }

    fn describe(&self, grant: &Grant) -> String {
        let schema = grant.schema_name().unwrap_or_default();
        let owner = grant.owner.as_deref().unwrap_or_default();
        match self.kind {
            PrivilegeKind::Database => grant.dbname.to_string(),
            PrivilegeKind::Schema => format!("{}.{}", grant.dbname, schema),
            PrivilegeKind::DefaultSchema => format!("{}.{} for {}", grant.dbname, schema, owner),
            PrivilegeKind::DefaultGlobal => format!("{} for {}", grant.dbname, owner),
        }
    }
}

fn expand_databases(dbname: &Target, topology: &Topology) -> Vec<String> {
    match dbname {
        Target::All => topology.databases().map(str::to_string).collect(),
        Target::Named(name) => vec![name.clone()],
    }
}

fn expand_schemas(
    schema: Option<&Target>,
    dbname: &str,
    topology: &Topology,
) -> Result<Vec<String>, SyncError> {
    match schema {
        Some(Target::Named(name)) => Ok(vec![name.clone()]),
        Some(Target::All) | None => Ok(topology.schemas(dbname)?.map(str::to_string).collect()),
    }
}

fn render_template(template: &str, grant: &Grant) -> String {
    substitute(template, |placeholder| {
        let value = match placeholder {
            "database" => grant.dbname.name(),
            "schema" => grant.schema_name(),
            "owner" => grant.owner.as_deref(),
            "role" => Some(grant.role.as_str()),
            _ => None,
        };
        value.map(quote_ident)
    })
}

/// Every privilege known to a run, with named groups of privileges.
#[derive(Debug, Clone, Default)]
pub struct PrivilegeCatalog {
    privileges: BTreeMap<String, Privilege>,
    groups: BTreeMap<String, Vec<String>>,
}

impl PrivilegeCatalog {
    /// Build a catalog, checking that groups only reference known names and
    /// do not contain themselves.
    pub fn new(
        privileges: impl IntoIterator<Item = Privilege>,
        groups: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, SyncError> {
        let catalog = Self {
            privileges: privileges
                .into_iter()
                .map(|privilege| (privilege.name.clone(), privilege))
                .collect(),
            groups,
        };

        for (name, members) in &catalog.groups {
            let unknown: Vec<&str> = members
                .iter()
                .filter(|member| !catalog.contains(member))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(SyncError::internal(format!(
                    "Unknown privilege {} in group {}",
                    unknown.join(", "),
                    name
                )));
            }
            catalog.flatten(name, &mut Vec::new(), &mut BTreeSet::new())?;
        }

        Ok(catalog)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.privileges.contains_key(name) || self.groups.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Privilege> {
        self.privileges.get(name)
    }

    pub fn privileges(&self) -> impl Iterator<Item = &Privilege> {
        self.privileges.values()
    }

    pub fn len(&self) -> usize {
        self.privileges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.privileges.is_empty()
    }

    /// The privileges a name stands for: itself, or every member of the group.
    pub fn resolve(&self, name: &str) -> Result<Vec<&Privilege>, SyncError> {
        if !self.contains(name) {
            return Err(SyncError::user(format!("Unknown privilege {}", name)));
        }
        let mut names = BTreeSet::new();
        self.flatten(name, &mut Vec::new(), &mut names)?;
        Ok(names.iter().filter_map(|name| self.privileges.get(name)).collect())
    }

    fn flatten(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        out: &mut BTreeSet<String>,
    ) -> Result<(), SyncError> {
        let Some(members) = self.groups.get(name) else {
            if self.privileges.contains_key(name) {
                out.insert(name.to_string());
                return Ok(());
            }
            return Err(SyncError::internal(format!("Unknown privilege {}", name)));
        };

        if stack.iter().any(|seen| seen == name) {
            return Err(SyncError::internal(format!(
                "Privilege group {} includes itself",
                name
            )));
        }
        out.insert(name.to_string());
        stack.push(name.to_string());
        for member in members {
            self.flatten(member, stack, out)?;
        }
        stack.pop();
        Ok(())
    }

    /// Drop hidden definitions (named `_x` or `.x`) that neither a visible
    /// name nor `referenced` uses, so that shipped defaults are only
    /// inspected when used.
    pub fn prune_hidden<'a>(
        &mut self,
        referenced: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), SyncError> {
        let hidden = |name: &str| name.starts_with('_') || name.starts_with('.');

        let mut used = BTreeSet::new();
        for name in self.privileges.keys().chain(self.groups.keys()) {
            if !hidden(name) {
                self.flatten(name, &mut Vec::new(), &mut used)?;
            }
        }
        for name in referenced {
            if self.contains(name) {
                self.flatten(name, &mut Vec::new(), &mut used)?;
            }
        }

        self.privileges.retain(|name, _| {
            let keep = !hidden(name) || used.contains(name);
            if !keep {
                debug!("Drop unused hidden privilege {}", name);
            }
            keep
        });
        self.groups
            .retain(|name, _| !hidden(name) || used.contains(name));
        Ok(())
    }

    /// Expand every grant of `acl` through its privilege or group.
    pub fn expand_acl(&self, acl: &Acl, topology: &Topology) -> Result<Acl, SyncError> {
        let mut expanded = Acl::new();
        for grant in acl {
            for privilege in self.resolve(&grant.privilege)? {
                expanded.extend(privilege.expand(grant, topology)?);
            }
        }
        Ok(expanded)
    }
}
