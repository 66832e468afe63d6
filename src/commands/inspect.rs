//! rolesync inspect - Show what the cluster looks like
//!
//! Prints the managed roles and grants as JSON, the same view `sync` diffs
//! the sync map against.

use crate::catalog::{Blacklist, Inspector, ObservedState};
use crate::config::Config;
use crate::db::session::{PgSessionPool, SessionPool};
use anyhow::Result;
use serde_json::{Value, json};

pub async fn cmd_inspect(config: &Config) -> Result<()> {
    let postgres = &config.postgres;
    let mut pool = PgSessionPool::new(&postgres.dsn, &postgres.default_database, postgres.pool_size);

    let result = observe(config, &mut pool).await;
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&to_json(&result?))?);
    Ok(())
}

pub async fn observe<P: SessionPool>(config: &Config, pool: &mut P) -> Result<ObservedState> {
    let blacklist = Blacklist::new(&config.postgres.roles_blacklist)?;
    Inspector::new(&config.postgres.queries, &config.privileges, &blacklist)
        .inspect(pool)
        .await
}

fn to_json(observed: &ObservedState) -> Value {
    let unmanaged: Vec<&str> = observed
        .all_roles
        .names()
        .filter(|name| !observed.managed_roles.contains(name))
        .collect();
    let roles: Vec<_> = observed.managed_roles.iter().collect();

    json!({
        "databases": observed.databases,
        "roles": roles,
        "unmanaged_roles": unmanaged,
        "grants": observed.grants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Acl, Grant, Role, RoleSet, Target};

    #[test]
    fn test_json_output() {
        let mut acl = Acl::new();
        acl.insert(Grant::new("connect", Target::named("app"), None, "alice"));
        let observed = ObservedState {
            databases: vec!["app".to_string()],
            all_roles: [Role::new("alice"), Role::new("legacy")].into_iter().collect(),
            managed_roles: [Role::new("alice")].into_iter().collect::<RoleSet>(),
            grants: acl,
            ..Default::default()
        };

        let value = to_json(&observed);
        assert_eq!(value["databases"], json!(["app"]));
        assert_eq!(value["roles"][0]["name"], "alice");
        assert_eq!(value["roles"][0]["options"]["login"], false);
        assert_eq!(value["unmanaged_roles"], json!(["legacy"]));
        assert_eq!(value["grants"][0]["privilege"], "connect");
        assert_eq!(value["grants"][0]["dbname"], "app");
    }
}
