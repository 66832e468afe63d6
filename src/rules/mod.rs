//! Derive the wanted roles and grants from the sync map
//!
//! Each [`SyncItem`] runs its directory search, if any, then feeds every
//! entry through its role and grant rules. Items without a search run their
//! rules once with empty bindings.

pub mod grant;
pub mod item;
pub mod role;

pub use grant::GrantRule;
pub use item::{DirectoryQuery, JoinOptions, SyncItem};
pub use role::RoleRule;

use crate::catalog::grant::Acl;
use crate::catalog::role::RoleSet;
use crate::directory::Directory;
use crate::error::SyncError;
use crate::format::Bindings;
use anyhow::{Context, Result};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

/// A YAML value or a list of them.
///
/// Unlike an untagged enum, errors of the inner value are reported as is.
#[derive(Debug, Clone)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        let parsed = if value.is_sequence() {
            serde_yaml::from_value(value).map(OneOrMany::Many)
        } else {
            serde_yaml::from_value(value).map(OneOrMany::One)
        };
        parsed.map_err(de::Error::custom)
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Roles and unexpanded grants wanted by the sync map.
#[derive(Debug, Clone, Default)]
pub struct WantedState {
    pub roles: RoleSet,
    pub acl: Acl,
}

pub struct RuleExpander<'a, D: Directory> {
    directory: Option<&'a D>,
    unmanaged: Option<&'a RoleSet>,
}

impl<'a, D: Directory> RuleExpander<'a, D> {
    pub fn new(directory: Option<&'a D>) -> Self {
        Self {
            directory,
            unmanaged: None,
        }
    }

    /// Existing roles left alone by the run, accepted as parents.
    pub fn with_unmanaged_roles(mut self, roles: &'a RoleSet) -> Self {
        self.unmanaged = Some(roles);
        self
    }

    pub async fn expand(&self, items: &[SyncItem]) -> Result<WantedState> {
        let mut wanted = WantedState::default();

        for item in items {
            info!("Processing {}", item.name());
            match item.search_query()? {
                None => apply(item, &Bindings::new(), &mut wanted)?,
                Some(query) => {
                    let directory = self.directory.ok_or_else(|| {
                        SyncError::user(format!("{}: no directory configured.", item.name()))
                    })?;
                    let entries = directory
                        .search(&query)
                        .await
                        .with_context(|| format!("Failed to search directory for {}", item.name()))?;
                    debug!(count = entries.len(), "Directory returned entries");

                    let map = item.attributes_map();
                    for entry in &entries {
                        let bindings = Bindings::from_entry(entry, &map)
                            .with_context(|| format!("Failed to read entry {}", entry.dn))?;
                        apply(item, &bindings, &mut wanted)
                            .with_context(|| format!("Failed to apply rules to {}", entry.dn))?;
                    }
                }
            }
        }

        let none = RoleSet::new();
        wanted.roles.resolve_membership(self.unmanaged.unwrap_or(&none))?;
        wanted.roles.check_cycles()?;
        info!(
            "Wanting {} role(s) and {} grant(s)",
            wanted.roles.len(),
            wanted.acl.len()
        );
        Ok(wanted)
    }
}

fn apply(item: &SyncItem, bindings: &Bindings, wanted: &mut WantedState) -> Result<(), SyncError> {
    for rule in &item.roles {
        for role in rule.generate(bindings)? {
            wanted.roles.add(role)?;
        }
    }
    for rule in &item.grants {
        wanted.acl.extend(rule.generate(bindings)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::grant::Target;
    use crate::catalog::role::Role;
    use crate::directory::fixture::StaticDirectory;

    const FIXTURE: &str = r#"
- dn: cn=dba,ou=groups,dc=acme
  objectClass: groupOfNames
  cn: dba
  member:
    - cn=alice,ou=people,dc=acme
    - cn=bob,ou=people,dc=acme
- dn: cn=alice,ou=people,dc=acme
  objectClass: person
  cn: alice
  mail: alice@acme.test
- dn: cn=bob,ou=people,dc=acme
  objectClass: person
  cn: bob
  mail: bob@acme.test
"#;

    fn items(yaml: &str) -> Vec<SyncItem> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_expand_directory_and_static_items() {
        let directory = StaticDirectory::from_yaml(FIXTURE).unwrap();
        let items = items(
            r#"
- roles:
    - name: dba
      options: NOLOGIN
- directory:
    base: ou=groups,dc=acme
    filter: (cn=dba)
  roles:
    name: '{member.cn}'
    parent: '{cn}'
    options: LOGIN
  grant:
    privilege: connect
    database: postgres
    role: '{member.cn}'
"#,
        );

        let wanted = RuleExpander::new(Some(&directory)).expand(&items).await.unwrap();
        assert_eq!(wanted.roles.names().collect::<Vec<_>>(), vec!["alice", "bob", "dba"]);
        let dba = wanted.roles.get("dba").unwrap();
        assert_eq!(dba.members.len(), 2);
        assert_eq!(wanted.acl.len(), 2);
        assert!(wanted.acl.iter().all(|g| g.dbname == Target::named("postgres")));
    }

    #[tokio::test]
    async fn test_joined_attributes() {
        let directory = StaticDirectory::from_yaml(FIXTURE).unwrap();
        let items = items(
            r#"
- directory:
    base: ou=groups,dc=acme
    filter: (cn=dba)
  roles:
    - name: '{cn}'
    - name: '{member.mail}'
      parent: '{cn}'
"#,
        );
        let wanted = RuleExpander::new(Some(&directory)).expand(&items).await.unwrap();
        assert!(wanted.roles.contains("alice@acme.test"));
        assert!(wanted.roles.get("dba").unwrap().members.contains("bob@acme.test"));
    }

    #[tokio::test]
    async fn test_missing_parent_is_user_error() {
        let items = items("[{roles: [{name: alice, parent: ghost}]}]");
        let unmanaged: RoleSet = [Role::new("readers")].into_iter().collect();
        let err = RuleExpander::<StaticDirectory>::new(None)
            .with_unmanaged_roles(&unmanaged)
            .expand(&items)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert!(err.downcast_ref::<SyncError>().is_some_and(SyncError::is_user_error));
    }

    #[tokio::test]
    async fn test_unmanaged_parent_is_kept() {
        let items = items("[{roles: [{name: alice, parent: readers}]}]");
        let unmanaged: RoleSet = [Role::new("readers")].into_iter().collect();
        let wanted = RuleExpander::<StaticDirectory>::new(None)
            .with_unmanaged_roles(&unmanaged)
            .expand(&items)
            .await
            .unwrap();
        assert_eq!(wanted.roles.len(), 1);
        assert!(wanted.roles.get("alice").unwrap().parents.contains("readers"));
    }

    #[tokio::test]
    async fn test_membership_cycle_fails() {
        let items = items("[{roles: [{name: a, parent: b}, {name: b, parent: a}]}]");
        let err = RuleExpander::<StaticDirectory>::new(None)
            .expand(&items)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::MembershipCycle(_))
        ));
    }

    #[tokio::test]
    async fn test_search_without_directory() {
        let items = items("[{directory: {base: 'dc=acme'}, roles: ['{cn}']}]");
        let err = RuleExpander::<StaticDirectory>::new(None)
            .expand(&items)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no directory configured"));
    }
}
