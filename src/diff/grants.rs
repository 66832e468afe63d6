//! Diff grants: REVOKE spurious, GRANT missing

use crate::catalog::grant::{Acl, Grant};
use crate::catalog::privilege::{Privilege, PrivilegeCatalog};
use crate::diff::operations::{GrantOperation, MigrationStep};
use crate::error::SyncError;
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::warn;

/// Revocations and grants converging `observed` to `desired`.
///
/// Revocations must run before role changes, grants after them.
#[derive(Debug, Default)]
pub struct AclDiff {
    pub revokes: Vec<MigrationStep>,
    pub grants: Vec<MigrationStep>,
}

/// Observed grants on empty object sets (`full` is `None`) are neither
/// revoked nor considered missing. Partial grants (`Some(false)`) are
/// revoked when unwanted and granted again when wanted.
pub fn diff_acl(observed: &Acl, desired: &Acl, catalog: &PrivilegeCatalog) -> Result<AclDiff, SyncError> {
    let mut diff = AclDiff::default();

    let spurious = observed
        .difference(desired)
        .filter(|grant| grant.full.is_some());
    for (name, grants) in by_privilege(spurious) {
        let privilege = lookup(catalog, name)?;
        if privilege.revoke.is_none() {
            warn!("Can't revoke {}: query not defined.", name);
            continue;
        }
        diff.revokes.extend(grants.into_iter().map(|grant| {
            MigrationStep::Grant(GrantOperation::Revoke {
                grant: grant.clone(),
                privilege: privilege.clone(),
            })
        }));
    }

    let satisfied: Acl = observed
        .iter()
        .filter(|grant| grant.full != Some(false))
        .cloned()
        .collect();
    let missing = desired.difference(&satisfied);
    for (name, grants) in by_privilege(missing) {
        let privilege = lookup(catalog, name)?;
        if privilege.grant.is_none() {
            warn!("Can't grant {}: query not defined.", name);
            continue;
        }
        diff.grants.extend(grants.into_iter().map(|grant| {
            MigrationStep::Grant(GrantOperation::Grant {
                grant: grant.clone(),
                privilege: privilege.clone(),
            })
        }));
    }

    Ok(diff)
}

fn lookup<'a>(catalog: &'a PrivilegeCatalog, name: &str) -> Result<&'a Privilege, SyncError> {
    catalog
        .get(name)
        .ok_or_else(|| SyncError::internal(format!("Unknown privilege {}", name)))
}

/// Group grants by privilege name, each group in grant order.
fn by_privilege<'a>(grants: impl Iterator<Item = &'a Grant>) -> BTreeMap<&'a str, Vec<&'a Grant>> {
    grants
        .map(|grant| (grant.privilege.as_str(), grant))
        .into_group_map()
        .into_iter()
        .map(|(name, mut grants)| {
            grants.sort();
            (name, grants)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::grant::Target;
    use crate::catalog::privilege::{Privilege, PrivilegeKind};
    use crate::diff::operations::SqlRenderer;
    use std::collections::BTreeMap;

    fn catalog() -> PrivilegeCatalog {
        PrivilegeCatalog::new(
            [
                Privilege::new("connect", PrivilegeKind::Database)
                    .with_grant("GRANT CONNECT ON DATABASE {database} TO {role};")
                    .with_revoke("REVOKE CONNECT ON DATABASE {database} FROM {role};"),
                Privilege::new("select", PrivilegeKind::Schema)
                    .with_grant("GRANT SELECT ON ALL TABLES IN SCHEMA {schema} TO {role};")
                    .with_revoke("REVOKE SELECT ON ALL TABLES IN SCHEMA {schema} FROM {role};"),
                Privilege::new("grant_only", PrivilegeKind::Database)
                    .with_grant("GRANT TEMPORARY ON DATABASE {database} TO {role};"),
            ],
            BTreeMap::new(),
        )
        .unwrap()
    }

    fn connect(role: &str) -> Grant {
        Grant::new("connect", Target::named("postgres"), None, role)
    }

    fn select(role: &str, full: Option<bool>) -> Grant {
        Grant::new("select", Target::named("app"), Some(Target::named("public")), role).with_full(full)
    }

    fn messages(steps: &[MigrationStep]) -> Vec<String> {
        steps.iter().flat_map(|s| s.to_sql()).map(|s| s.message).collect()
    }

    #[test]
    fn test_same_acl_yields_nothing() {
        let acl = Acl::from([connect("bob"), select("bob", Some(true)), select("carol", None)]);
        let diff = diff_acl(&acl, &acl, &catalog()).unwrap();
        assert!(diff.revokes.is_empty());
        assert!(diff.grants.is_empty());
    }

    #[test]
    fn test_spurious_grant_is_revoked_once() {
        let observed = Acl::from([connect("bob")]);
        let diff = diff_acl(&observed, &Acl::new(), &catalog()).unwrap();
        assert_eq!(messages(&diff.revokes), vec!["Revoke connect on postgres from bob."]);
        assert!(diff.grants.is_empty());

        let diff = diff_acl(&Acl::new(), &Acl::new(), &catalog()).unwrap();
        assert!(diff.revokes.is_empty());
    }

    #[test]
    fn test_irrelevant_grants_are_left_alone() {
        let observed = Acl::from([select("bob", None)]);
        let diff = diff_acl(&observed, &Acl::new(), &catalog()).unwrap();
        assert!(diff.revokes.is_empty());

        let desired = Acl::from([select("bob", Some(true))]);
        let diff = diff_acl(&observed, &desired, &catalog()).unwrap();
        assert!(diff.grants.is_empty());
    }

    #[test]
    fn test_partial_grant_is_granted_again() {
        let observed = Acl::from([select("bob", Some(false))]);
        let desired = Acl::from([select("bob", Some(true))]);
        let diff = diff_acl(&observed, &desired, &catalog()).unwrap();
        assert!(diff.revokes.is_empty());
        assert_eq!(messages(&diff.grants), vec!["Grant select on app.public to bob."]);

        let diff = diff_acl(&observed, &Acl::new(), &catalog()).unwrap();
        assert_eq!(diff.revokes.len(), 1);
    }

    #[test]
    fn test_missing_template_is_skipped() {
        let observed = Acl::from([Grant::new("grant_only", Target::named("app"), None, "bob")]);
        let diff = diff_acl(&observed, &Acl::new(), &catalog()).unwrap();
        assert!(diff.revokes.is_empty());
    }

    #[test]
    fn test_unknown_privilege_is_internal_error() {
        let desired = Acl::from([Grant::new("nope", Target::named("app"), None, "bob")]);
        let err = diff_acl(&Acl::new(), &desired, &catalog()).unwrap_err();
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_grants_are_grouped_by_privilege() {
        let desired = Acl::from([
            select("alice", Some(true)),
            connect("bob"),
            connect("alice"),
        ]);
        let diff = diff_acl(&Acl::new(), &desired, &catalog()).unwrap();
        assert_eq!(
            messages(&diff.grants),
            vec![
                "Grant connect on postgres to alice.",
                "Grant connect on postgres to bob.",
                "Grant select on app.public to alice.",
            ]
        );
    }
}
