//! Grants: one privilege given to one role on one database object

use crate::constants::ALL_WILDCARD;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A database or schema name, or the wildcard resolved at expansion time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    All,
    Named(String),
}

impl Target {
    pub fn named(name: impl Into<String>) -> Self {
        Target::Named(name.into())
    }

    /// `__all__` is the wildcard, anything else a concrete name.
    pub fn parse(value: &str) -> Self {
        if value == ALL_WILDCARD {
            Target::All
        } else {
            Target::Named(value.to_string())
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Target::All => None,
            Target::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str(ALL_WILDCARD),
            Target::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A wanted or observed privilege.
///
/// Identity is `(dbname, role, privilege, schema, owner)`; `full` is left out
/// so that observations of the same grant collapse in an [`Acl`] while the
/// diff still reads it:
///
/// - `Some(true)`: granted on every object
/// - `Some(false)`: granted on some objects only
/// - `None`: there is no object to grant on
#[derive(Debug, Clone, Serialize)]
pub struct Grant {
    pub privilege: String,
    pub dbname: Target,
    pub schema: Option<Target>,
    pub owner: Option<String>,
    pub role: String,
    pub full: Option<bool>,
}

impl Grant {
    pub fn new(privilege: &str, dbname: Target, schema: Option<Target>, role: &str) -> Self {
        Self {
            privilege: privilege.to_string(),
            dbname,
            schema,
            owner: None,
            role: role.to_string(),
            full: Some(true),
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_full(mut self, full: Option<bool>) -> Self {
        self.full = full;
        self
    }

    fn identity(&self) -> (&Target, &str, &str, Option<&Target>, Option<&str>) {
        (
            &self.dbname,
            &self.role,
            &self.privilege,
            self.schema.as_ref(),
            self.owner.as_deref(),
        )
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_ref().and_then(Target::name)
    }
}

impl PartialEq for Grant {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Grant {}

impl Hash for Grant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for Grant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Grant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = match self.full {
            Some(true) => "full",
            Some(false) => "partial",
            None => "n/a",
        };
        write!(
            f,
            "{} on {}.{} for {} to {} ({})",
            self.privilege,
            self.dbname,
            self.schema.as_ref().map_or("*".to_string(), Target::to_string),
            self.owner.as_deref().unwrap_or("*"),
            self.role,
            full
        )
    }
}

/// A set of grants, ordered by identity.
pub type Acl = BTreeSet<Grant>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_is_not_part_of_identity() {
        let granted = Grant::new("connect", Target::named("app"), None, "alice");
        let partial = granted.clone().with_full(Some(false));
        assert_eq!(granted, partial);

        let mut acl = Acl::new();
        acl.insert(granted);
        assert!(!acl.insert(partial));
        assert_eq!(acl.len(), 1);
    }

    #[test]
    fn test_owner_is_part_of_identity() {
        let grant = Grant::new("select", Target::named("app"), Some(Target::named("public")), "bob");
        assert_ne!(grant.clone().with_owner("alice"), grant.with_owner("carol"));
    }

    #[test]
    fn test_wildcard_parsing_and_display() {
        assert_eq!(Target::parse("__all__"), Target::All);
        assert_eq!(Target::parse("app"), Target::named("app"));
        assert_eq!(Target::All.to_string(), "__all__");
        assert_eq!(Target::All.name(), None);
    }

    #[test]
    fn test_display() {
        let grant = Grant::new("usage", Target::named("app"), Some(Target::named("public")), "bob")
            .with_full(None);
        assert_eq!(grant.to_string(), "usage on app.public for * to bob (n/a)");
    }
}
