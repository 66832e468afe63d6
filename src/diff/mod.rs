pub mod grants;
pub mod operations;
pub mod roles;

use crate::catalog::grant::Acl;
use crate::catalog::privilege::PrivilegeCatalog;
use crate::catalog::role::RoleSet;
use crate::diff::operations::{MigrationStep, SqlRenderer};
use crate::error::SyncError;
use crate::render::{Statement, expand_all_databases};
use tracing::{debug, info};

/// Observed and wanted state of one run.
pub struct DiffInput<'a> {
    pub observed_roles: &'a RoleSet,
    pub desired_roles: &'a RoleSet,
    pub observed_acl: &'a Acl,
    pub desired_acl: &'a Acl,
    pub catalog: &'a PrivilegeCatalog,
}

/// Every step of the plan, in execution order: revoke spurious grants,
/// create roles, alter roles, drop roles, then grant missing privileges.
///
/// Grants are revoked before a role is dropped and only given once the
/// grantee exists.
pub fn diff_all(input: &DiffInput<'_>) -> Result<Vec<MigrationStep>, SyncError> {
    info!("Diffing roles and privileges...");
    let acl = grants::diff_acl(input.observed_acl, input.desired_acl, input.catalog)?;
    let roles = roles::diff_roles(input.observed_roles, input.desired_roles);

    let (creates, rest): (Vec<_>, Vec<_>) = roles.into_iter().partition(MigrationStep::is_create);

    let mut out = Vec::with_capacity(acl.revokes.len() + creates.len() + rest.len() + acl.grants.len());
    out.extend(acl.revokes);
    out.extend(creates);
    // Alterations come before drops in `diff_roles` already.
    out.extend(rest);
    out.extend(acl.grants);

    for step in &out {
        debug!("Planned {}", step.subject());
    }
    info!("Diff complete");
    Ok(out)
}

/// Render steps into statements, running `Target::All` statements once per
/// database.
pub fn to_statements<'a>(
    steps: &[MigrationStep],
    databases: impl IntoIterator<Item = &'a str> + Clone,
) -> Vec<Statement> {
    let statements: Vec<Statement> = steps.iter().flat_map(SqlRenderer::to_sql).collect();
    expand_all_databases(statements, databases)
}
