//! rolesync sync - Bring the cluster in line with the sync map
//!
//! One run inspects the cluster, expands the sync map against the directory,
//! diffs both states and executes the resulting statements, or only shows
//! them with `--dry-run` and `--check`.

use crate::catalog::role::RoleSet;
use crate::catalog::{Blacklist, Inspector};
use crate::config::{Config, Directory as DirectoryConfig};
use crate::db::executor::execute;
use crate::db::session::{PgSessionPool, SessionPool};
use crate::diff::roles::with_reused_roles;
use crate::diff::{DiffInput, diff_all, to_statements};
use crate::directory::Directory;
use crate::directory::fixture::StaticDirectory;
use crate::rules::RuleExpander;
use anyhow::Result;
use console::style;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncArgs {
    /// Show statements without sending them
    pub dry_run: bool,
    /// Like dry-run, and report pending changes through the outcome
    pub check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cluster already matches the sync map.
    Converged,
    Applied(usize),
    /// Statements were only shown.
    Pending(usize),
}

/// Synchronize the cluster described by `config`.
pub async fn cmd_sync(config: &Config, args: SyncArgs) -> Result<SyncOutcome> {
    let directory = load_directory(&config.directory)?;
    let postgres = &config.postgres;
    let mut pool = PgSessionPool::new(&postgres.dsn, &postgres.default_database, postgres.pool_size);

    let result = synchronize(config, &mut pool, directory.as_ref(), args).await;
    pool.close().await;
    result
}

pub fn load_directory(config: &DirectoryConfig) -> Result<Option<StaticDirectory>> {
    config
        .fixture
        .as_deref()
        .map(StaticDirectory::from_file)
        .transpose()
}

/// Inspect, expand, diff and execute against any session pool and directory.
pub async fn synchronize<P: SessionPool, D: Directory>(
    config: &Config,
    pool: &mut P,
    directory: Option<&D>,
    args: SyncArgs,
) -> Result<SyncOutcome> {
    let blacklist = Blacklist::new(&config.postgres.roles_blacklist)?;
    let inspector = Inspector::new(&config.postgres.queries, &config.privileges, &blacklist);
    let observed = inspector.inspect(pool).await?;

    let unmanaged: RoleSet = observed
        .all_roles
        .iter()
        .filter(|role| !observed.managed_roles.contains(&role.name))
        .cloned()
        .collect();
    let wanted = RuleExpander::new(directory)
        .with_unmanaged_roles(&unmanaged)
        .expand(&config.sync_map)
        .await?;
    let observed_roles = with_reused_roles(&observed.all_roles, &observed.managed_roles, &wanted.roles);
    let desired_acl = config.privileges.expand_acl(&wanted.acl, &observed.topology)?;

    let steps = diff_all(&DiffInput {
        observed_roles: &observed_roles,
        desired_roles: &wanted.roles,
        observed_acl: &observed.grants,
        desired_acl: &desired_acl,
        catalog: &config.privileges,
    })?;
    let statements = to_statements(&steps, observed.databases.iter().map(String::as_str));

    if statements.is_empty() {
        println!("{}", style("Nothing to do.").green());
        return Ok(SyncOutcome::Converged);
    }

    let dry_run = args.dry_run || args.check;
    let count = execute(pool, &statements, dry_run).await?;

    if dry_run {
        println!(
            "\n{}",
            style(format!("{} statement(s) pending. Run without --dry-run to apply.", count)).yellow()
        );
        Ok(SyncOutcome::Pending(count))
    } else {
        info!("Executed {} statement(s)", count);
        println!("\n{}", style(format!("Applied {} statement(s).", count)).green().bold());
        Ok(SyncOutcome::Applied(count))
    }
}
