//! Diff roles: CREATE wanted, ALTER existing, DROP spurious

use crate::catalog::role::{Role, RoleSet};
use crate::diff::operations::{MigrationStep, RoleOperation};
use tracing::warn;

pub fn diff(old: Option<&Role>, new: Option<&Role>) -> Vec<MigrationStep> {
    match (old, new) {
        (None, Some(n)) => vec![MigrationStep::Role(RoleOperation::Create { role: n.clone() })],
        (Some(o), None) => {
            if o.name == "public" {
                return Vec::new();
            }
            vec![MigrationStep::Role(RoleOperation::Drop { role: o.clone() })]
        }
        (Some(o), Some(n)) => {
            if o.alter(n).is_empty() {
                return Vec::new();
            }
            vec![MigrationStep::Role(RoleOperation::Alter {
                current: o.clone(),
                wanted: n.clone(),
            })]
        }
        (None, None) => vec![],
    }
}

/// Steps turning `observed` into `desired`: creations in membership order,
/// then alterations, then drops in reverse membership order.
pub fn diff_roles(observed: &RoleSet, desired: &RoleSet) -> Vec<MigrationStep> {
    let mut creates = Vec::new();
    let mut alters = Vec::new();
    for role in desired.flatten() {
        match observed.get(&role.name) {
            None => creates.extend(diff(None, Some(role))),
            Some(current) => alters.extend(diff(Some(current), Some(role))),
        }
    }

    let drops = observed
        .flatten()
        .into_iter()
        .rev()
        .filter(|role| !desired.contains(&role.name))
        .flat_map(|role| diff(Some(role), None));

    creates.into_iter().chain(alters).chain(drops).collect()
}

/// Managed roles, plus the unmanaged existing roles that are wanted.
///
/// A wanted role that exists but is not managed is altered in place rather
/// than created again.
pub fn with_reused_roles(all: &RoleSet, managed: &RoleSet, desired: &RoleSet) -> RoleSet {
    let mut observed = managed.clone();
    for role in desired.iter() {
        if observed.contains(&role.name) {
            continue;
        }
        if let Some(existing) = all.get(&role.name) {
            warn!(
                "Reusing unmanaged role {}. Ensure managed roles query returns all wanted roles.",
                role.name
            );
            let mut existing = existing.clone();
            existing.protect_members(|member| desired.contains(member) || managed.contains(member));
            observed.insert(existing);
        }
    }
    observed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::role::RoleOptions;
    use crate::diff::operations::SqlRenderer;

    fn sql(steps: &[MigrationStep]) -> Vec<String> {
        steps.iter().flat_map(|s| s.to_sql()).map(|s| s.sql).collect()
    }

    #[test]
    fn test_same_roles_yield_nothing() {
        let roles: RoleSet = [
            Role::new("dba").with_members(["alice"]),
            Role::new("alice").with_options(RoleOptions::parse("LOGIN").unwrap()),
        ]
        .into_iter()
        .collect();
        assert!(diff_roles(&roles, &roles).is_empty());
    }

    #[test]
    fn test_option_change_is_one_alter() {
        let observed: RoleSet = [Role::new("alice")].into_iter().collect();
        let superuser = RoleOptions {
            superuser: true,
            ..RoleOptions::default()
        };
        let desired: RoleSet = [Role::new("alice").with_options(superuser)].into_iter().collect();

        let steps = diff_roles(&observed, &desired);
        let statements = sql(&steps);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("ALTER ROLE \"alice\" WITH SUPERUSER "));
    }

    #[test]
    fn test_members_are_created_before_parents() {
        let desired: RoleSet = [Role::new("parent").with_members(["child"]), Role::new("child")]
            .into_iter()
            .collect();
        let statements = sql(&diff_roles(&RoleSet::new(), &desired));
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE ROLE \"child\""));
        assert!(statements[1].starts_with("CREATE ROLE \"parent\""));
        assert_eq!(statements[2], "GRANT \"parent\" TO \"child\";");
    }

    #[test]
    fn test_parents_are_dropped_before_members() {
        let observed: RoleSet = [Role::new("parent").with_members(["child"]), Role::new("child")]
            .into_iter()
            .collect();
        let steps = diff_roles(&observed, &RoleSet::new());
        let dropped: Vec<String> = steps.iter().map(SqlRenderer::subject).collect();
        assert_eq!(dropped, vec!["parent", "child"]);
        assert!(steps.iter().all(SqlRenderer::is_destructive));
    }

    #[test]
    fn test_public_is_never_dropped() {
        let observed: RoleSet = [Role::new("public")].into_iter().collect();
        assert!(diff_roles(&observed, &RoleSet::new()).is_empty());
    }

    #[test]
    fn test_order_is_create_alter_drop() {
        let observed: RoleSet = [Role::new("old"), Role::new("kept")].into_iter().collect();
        let desired: RoleSet = [
            Role::new("kept").with_comment("Kept"),
            Role::new("new"),
        ]
        .into_iter()
        .collect();
        let steps = diff_roles(&observed, &desired);
        let kinds: Vec<&str> = steps
            .iter()
            .map(|step| match step {
                MigrationStep::Role(RoleOperation::Create { .. }) => "create",
                MigrationStep::Role(RoleOperation::Alter { .. }) => "alter",
                MigrationStep::Role(RoleOperation::Drop { .. }) => "drop",
                MigrationStep::Grant(_) => "grant",
            })
            .collect();
        assert_eq!(kinds, vec!["create", "alter", "drop"]);
    }

    #[test]
    fn test_unmanaged_wanted_role_is_reused() {
        let all: RoleSet = [Role::new("alice"), Role::new("legacy").with_members(["alice", "bob"])]
            .into_iter()
            .collect();
        let managed: RoleSet = [Role::new("alice")].into_iter().collect();
        let desired: RoleSet = [Role::new("alice"), Role::new("legacy")].into_iter().collect();

        let observed = with_reused_roles(&all, &managed, &desired);
        assert_eq!(observed.len(), 2);
        let steps = diff_roles(&observed, &desired);
        assert_eq!(sql(&steps), vec!["REVOKE \"legacy\" FROM \"alice\";"]);
    }
}
