//! Roles, their options and memberships

use crate::catalog::grant::Target;
use crate::error::SyncError;
use crate::render::{Statement, escape_braces, escape_string, quote_ident, quote_ident_list};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Boolean role attributes, in the column order of `pg_roles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleOptions {
    pub superuser: bool,
    pub inherit: bool,
    pub createrole: bool,
    pub createdb: bool,
    pub login: bool,
    pub replication: bool,
    pub bypassrls: bool,
}

impl Default for RoleOptions {
    fn default() -> Self {
        Self {
            superuser: false,
            inherit: true,
            createrole: false,
            createdb: false,
            login: false,
            replication: false,
            bypassrls: false,
        }
    }
}

impl RoleOptions {
    pub const NAMES: [&'static str; 7] = [
        "SUPERUSER",
        "INHERIT",
        "CREATEROLE",
        "CREATEDB",
        "LOGIN",
        "REPLICATION",
        "BYPASSRLS",
    ];

    fn values(&self) -> [bool; 7] {
        [
            self.superuser,
            self.inherit,
            self.createrole,
            self.createdb,
            self.login,
            self.replication,
            self.bypassrls,
        ]
    }

    /// Set one option by keyword, case-insensitively.
    pub fn set(&mut self, name: &str, value: bool) -> Result<(), SyncError> {
        let slot = match name.to_uppercase().as_str() {
            "SUPERUSER" => &mut self.superuser,
            "INHERIT" => &mut self.inherit,
            "CREATEROLE" => &mut self.createrole,
            "CREATEDB" => &mut self.createdb,
            "LOGIN" => &mut self.login,
            "REPLICATION" => &mut self.replication,
            "BYPASSRLS" => &mut self.bypassrls,
            _ => return Err(SyncError::user(format!("Unknown role option {}", name))),
        };
        *slot = value;
        Ok(())
    }

    /// Parse `LOGIN NOSUPERUSER` style keywords over the defaults.
    pub fn parse(spec: &str) -> Result<Self, SyncError> {
        let mut options = Self::default();
        for token in spec.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            match token.to_uppercase().strip_prefix("NO") {
                Some(name) => options.set(name, false)?,
                None => options.set(token, true)?,
            }
        }
        Ok(options)
    }

    /// Options from `pg_roles` columns, in [`RoleOptions::NAMES`] order.
    pub fn from_columns(columns: &[bool]) -> Self {
        let mut options = Self::default();
        for (name, value) in Self::NAMES.iter().zip(columns) {
            // Names come from the fixed list above.
            let _ = options.set(name, *value);
        }
        options
    }
}

impl fmt::Display for RoleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = Self::NAMES
            .iter()
            .zip(self.values())
            .map(|(name, value)| {
                if value {
                    name.to_string()
                } else {
                    format!("NO{}", name)
                }
            })
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

/// A role, wanted or observed. Two roles with the same name are the same
/// role, possibly described differently.
///
/// `parents` of a wanted role are the unmanaged roles it must belong to.
/// Observed roles list every role they belong to.
#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub name: String,
    pub options: RoleOptions,
    pub members: BTreeSet<String>,
    /// Observed members outside the managed roles. Never revoked.
    #[serde(skip)]
    pub protected_members: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub parents: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Role {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: RoleOptions::default(),
            members: BTreeSet::new(),
            protected_members: BTreeSet::new(),
            parents: BTreeSet::new(),
            comment: None,
        }
    }

    pub fn with_options(mut self, options: RoleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members.extend(members.into_iter().map(Into::into));
        self
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents.extend(parents.into_iter().map(Into::into));
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Move members failing `managed` to the protected members.
    pub fn protect_members(&mut self, managed: impl Fn(&str) -> bool) {
        let (kept, protected): (BTreeSet<String>, BTreeSet<String>) =
            std::mem::take(&mut self.members)
                .into_iter()
                .partition(|member| managed(member.as_str()));
        self.members = kept;
        self.protected_members.extend(protected);
    }

    pub fn create(&self) -> Vec<Statement> {
        let mut statements = vec![Statement::new(
            format!("Create role {}.", self.name),
            format!("CREATE ROLE {} WITH {};", quote_ident(&self.name), self.options),
        )];
        if let Some(comment) = &self.comment {
            statements.push(self.comment_statement(comment));
        }
        if !self.members.is_empty() {
            statements.push(self.grant_members(&self.members));
        }
        if !self.parents.is_empty() {
            statements.push(self.join_parents(&self.parents));
        }
        statements
    }

    /// Statements turning `self` into `wanted`.
    pub fn alter(&self, wanted: &Role) -> Vec<Statement> {
        let mut statements = Vec::new();

        if self.options != wanted.options {
            statements.push(Statement::new(
                format!("Update options of role {}.", self.name),
                format!("ALTER ROLE {} WITH {};", quote_ident(&self.name), wanted.options),
            ));
        }

        let missing: BTreeSet<String> = wanted
            .members
            .iter()
            .filter(|member| !self.members.contains(*member) && !self.protected_members.contains(*member))
            .cloned()
            .collect();
        if !missing.is_empty() {
            statements.push(self.grant_members(&missing));
        }

        let spurious: BTreeSet<String> = self.members.difference(&wanted.members).cloned().collect();
        if !spurious.is_empty() {
            statements.push(self.revoke_members(&spurious));
        }

        let parents: BTreeSet<String> = wanted.parents.difference(&self.parents).cloned().collect();
        if !parents.is_empty() {
            statements.push(self.join_parents(&parents));
        }

        if let Some(comment) = &wanted.comment {
            if self.comment.as_ref() != Some(comment) {
                statements.push(self.comment_statement(comment));
            }
        }

        statements
    }

    /// Remove memberships, reassign and purge owned objects in every
    /// database, then drop the role.
    pub fn drop(&self) -> Vec<Statement> {
        let mut statements = Vec::new();
        if !self.members.is_empty() {
            statements.push(self.revoke_members(&self.members));
        }
        let name = quote_ident(&self.name);
        statements.push(
            Statement::destructive(
                format!(
                    "Reassign {} objects and purge ACL on {{database}}.",
                    escape_braces(&self.name)
                ),
                format!("REASSIGN OWNED BY {name} TO SESSION_USER; DROP OWNED BY {name};"),
            )
            .on(Target::All),
        );
        statements.push(Statement::destructive(
            format!("Drop role {}.", self.name),
            format!("DROP ROLE {};", name),
        ));
        statements
    }

    fn grant_members(&self, members: &BTreeSet<String>) -> Statement {
        Statement::new(
            format!("Add {} to role {}.", join(members), self.name),
            format!(
                "GRANT {} TO {};",
                quote_ident(&self.name),
                quote_ident_list(members.iter().map(String::as_str))
            ),
        )
    }

    fn join_parents(&self, parents: &BTreeSet<String>) -> Statement {
        Statement::new(
            format!("Add {} to role {}.", self.name, join(parents)),
            format!(
                "GRANT {} TO {};",
                quote_ident_list(parents.iter().map(String::as_str)),
                quote_ident(&self.name)
            ),
        )
    }

    fn revoke_members(&self, members: &BTreeSet<String>) -> Statement {
        Statement::destructive(
            format!("Remove {} from role {}.", join(members), self.name),
            format!(
                "REVOKE {} FROM {};",
                quote_ident(&self.name),
                quote_ident_list(members.iter().map(String::as_str))
            ),
        )
    }

    fn comment_statement(&self, comment: &str) -> Statement {
        Statement::new(
            format!("Set comment on role {}.", self.name),
            format!(
                "COMMENT ON ROLE {} IS {};",
                quote_ident(&self.name),
                escape_string(comment)
            ),
        )
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl PartialEq for Role {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Role {}

impl Hash for Role {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Roles indexed by name.
#[derive(Debug, Clone, Default)]
pub struct RoleSet(BTreeMap<String, Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `role`, merging it with an earlier definition of the same name.
    pub fn add(&mut self, role: Role) -> Result<(), SyncError> {
        match self.0.get_mut(&role.name) {
            None => {
                self.0.insert(role.name.clone(), role);
            }
            Some(existing) => {
                if existing.options != role.options {
                    return Err(SyncError::user(format!(
                        "Role {} is defined twice with different options",
                        role.name
                    )));
                }
                existing.members.extend(role.members);
                existing.parents.extend(role.parents);
                if existing.comment.is_none() {
                    existing.comment = role.comment;
                }
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, role: Role) -> Option<Role> {
        self.0.insert(role.name.clone(), role)
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Role> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Role> {
        self.0.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Role> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Turn every `parents` declaration on a wanted parent into a membership
    /// of that parent.
    ///
    /// Parents found in `unmanaged` stay in `parents`: the membership is
    /// granted with the member and never revoked.
    pub fn resolve_membership(&mut self, unmanaged: &RoleSet) -> Result<(), SyncError> {
        let mut memberships = Vec::new();
        for role in self.0.values() {
            for parent in &role.parents {
                memberships.push((parent.clone(), role.name.clone()));
            }
        }
        for (parent, member) in memberships {
            if let Some(parent_role) = self.0.get_mut(&parent) {
                parent_role.members.insert(member.clone());
                if let Some(role) = self.0.get_mut(&member) {
                    role.parents.remove(&parent);
                }
            } else if unmanaged.contains(&parent) {
                debug!("Role {} inherits unmanaged parent {}.", member, parent);
            } else {
                return Err(SyncError::user(format!(
                    "Role {} wants to be member of {}, which does not exist",
                    member, parent
                )));
            }
        }
        Ok(())
    }

    /// Record on each role the roles it belongs to, from their members.
    pub fn link_parents(&mut self) {
        let mut memberships = Vec::new();
        for role in self.0.values() {
            for member in role.members.iter().chain(&role.protected_members) {
                memberships.push((role.name.clone(), member.clone()));
            }
        }
        for (parent, member) in memberships {
            if let Some(role) = self.0.get_mut(&member) {
                role.parents.insert(parent);
            }
        }
    }

    /// Fail when a role is, directly or not, a member of itself.
    pub fn check_cycles(&self) -> Result<(), SyncError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let nodes: BTreeMap<&str, _> = self
            .0
            .keys()
            .map(|name| (name.as_str(), graph.add_node(name.as_str())))
            .collect();

        for role in self.0.values() {
            for member in &role.members {
                if member == &role.name {
                    return Err(SyncError::MembershipCycle(role.name.clone()));
                }
                if let Some(&member_node) = nodes.get(member.as_str()) {
                    graph.add_edge(member_node, nodes[role.name.as_str()], ());
                }
            }
        }

        for component in tarjan_scc(&graph) {
            if component.len() > 1 {
                let mut names: Vec<&str> = component.iter().map(|node| graph[*node]).collect();
                names.sort();
                return Err(SyncError::MembershipCycle(names.join(", ")));
            }
        }
        Ok(())
    }

    /// Every role, members before the roles they belong to.
    ///
    /// Roots are visited in name order. Members outside the set are skipped.
    pub fn flatten(&self) -> Vec<&Role> {
        let mut order = Vec::with_capacity(self.0.len());
        let mut seen = BTreeSet::new();
        for role in self.0.values() {
            self.visit(role, &mut seen, &mut order);
        }
        order
    }

    fn visit<'a>(&'a self, role: &'a Role, seen: &mut BTreeSet<&'a str>, order: &mut Vec<&'a Role>) {
        if !seen.insert(role.name.as_str()) {
            return;
        }
        for member in &role.members {
            if let Some(member) = self.0.get(member) {
                self.visit(member, seen, order);
            }
        }
        order.push(role);
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().map(|role| (role.name.clone(), role)).collect())
    }
}
