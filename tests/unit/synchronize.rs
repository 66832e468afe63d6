//! Full runs against a recording session pool
//!
//! Inspection queries answer with static rows and the directory is a YAML
//! fixture, so the whole pipeline runs without a server.

use crate::helpers::pool::RecordingPool;
use anyhow::Result;
use rolesync::commands::sync::{SyncArgs, SyncOutcome, load_directory, synchronize};
use rolesync::config::{Config, ConfigBuilder, load_config};
use rolesync::directory::fixture::StaticDirectory;
use rolesync::error::{EXIT_USER_ERROR, exit_code_for};
use std::fs;
use tempfile::TempDir;

const DIRECTORY: &str = r#"
- dn: cn=dba,ou=groups,dc=acme
  objectClass: groupOfNames
  cn: dba
  member:
    - cn=Alice,ou=people,dc=acme
    - cn=Carol,ou=people,dc=acme
- dn: cn=Alice,ou=people,dc=acme
  objectClass: person
  cn: Alice
- dn: cn=Carol,ou=people,dc=acme
  objectClass: person
  cn: Carol
"#;

const CONFIG: &str = r#"
postgres:
  databases_query: [app, postgres]
  roles_query:
    - [dba, [bob]]
    - [bob]
    - [legacy]
  managed_roles_query: [dba, bob]
  schemas_query:
    - [public, [dba]]
  owners_query: []

privileges:
  connect:
    type: datacl
    inspect:
      - [~, bob]
    grant: GRANT CONNECT ON DATABASE {database} TO {role};
    revoke: REVOKE CONNECT ON DATABASE {database} FROM {role};
  usage:
    inspect:
      - [public, dba]
    grant: GRANT USAGE ON SCHEMA {schema} TO {role};
    revoke: REVOKE USAGE ON SCHEMA {schema} FROM {role};
  ro: [connect, usage]

directory:
  fixture: directory.yml

sync_map:
  - description: Static roles
    roles:
      - name: dba
        options: NOLOGIN
    grant:
      privilege: ro
      role: dba
      database: app
  - description: DBA members
    directory:
      base: ou=groups,dc=acme
      filter: (cn=dba)
    roles:
      name: "{member.cn.lower()}"
      options: LOGIN
      parent: dba
"#;

fn project(config: &str) -> Result<(TempDir, Config)> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("directory.yml"), DIRECTORY)?;
    let path = dir.path().join("rolesync.yaml");
    fs::write(&path, config)?;

    let (input, base_dir) = load_config(&path.to_string_lossy())?;
    let config = ConfigBuilder::new().with_file(input, &base_dir).resolve()?;
    Ok((dir, config))
}

async fn run(config: &Config, pool: &mut RecordingPool, args: SyncArgs) -> Result<SyncOutcome> {
    let directory = load_directory(&config.directory)?;
    synchronize(config, pool, directory.as_ref(), args).await
}

fn position(statements: &[&str], wanted: &str) -> usize {
    statements
        .iter()
        .position(|statement| *statement == wanted)
        .unwrap_or_else(|| panic!("{} not in {:#?}", wanted, statements))
}

#[tokio::test]
async fn test_full_synchronization() -> Result<()> {
    let (_dir, config) = project(CONFIG)?;
    let mut pool = RecordingPool::default();

    let outcome = run(&config, &mut pool, SyncArgs::default()).await?;
    assert_eq!(outcome, SyncOutcome::Applied(pool.executed_count()));

    let app = pool.executed_on("app");
    assert_eq!(
        app,
        vec![
            "REVOKE CONNECT ON DATABASE \"app\" FROM \"bob\";",
            "REASSIGN OWNED BY \"bob\" TO SESSION_USER; DROP OWNED BY \"bob\";",
            "GRANT CONNECT ON DATABASE \"app\" TO \"dba\";",
        ]
    );

    let postgres = pool.executed_on("postgres");
    let revoke_bob = position(&postgres, "REVOKE CONNECT ON DATABASE \"postgres\" FROM \"bob\";");
    // Granted on postgres but only wanted on app.
    let revoke_usage = position(&postgres, "REVOKE USAGE ON SCHEMA \"public\" FROM \"dba\";");
    let create_alice = position(
        &postgres,
        "CREATE ROLE \"alice\" WITH NOSUPERUSER INHERIT NOCREATEROLE NOCREATEDB LOGIN NOREPLICATION NOBYPASSRLS;",
    );
    let add_members = position(&postgres, "GRANT \"dba\" TO \"alice\", \"carol\";");
    let remove_bob = position(&postgres, "REVOKE \"dba\" FROM \"bob\";");
    let drop_bob = position(&postgres, "DROP ROLE \"bob\";");

    assert!(revoke_bob < create_alice && revoke_usage < create_alice);
    assert!(create_alice < add_members);
    assert!(remove_bob < drop_bob);

    // The unmanaged role is neither dropped nor altered.
    assert!(postgres.iter().all(|statement| !statement.contains("legacy")));
    Ok(())
}

#[tokio::test]
async fn test_check_mode_reports_pending_changes() -> Result<()> {
    let (_dir, config) = project(CONFIG)?;
    let mut pool = RecordingPool::default();
    let args = SyncArgs {
        dry_run: false,
        check: true,
    };

    let outcome = run(&config, &mut pool, args).await?;
    assert!(matches!(outcome, SyncOutcome::Pending(count) if count > 0));
    assert_eq!(pool.executed_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_static_only_configuration_needs_no_directory() -> Result<()> {
    let yaml = r#"
postgres:
  databases_query: [postgres]
  roles_query:
    - [alice, ~, false, true, false, false, true, false, false, Former employee]
  schemas_query: []
  owners_query: []
sync_map:
  - roles:
      name: alice
      options: LOGIN
      comment: Current employee
"#;
    let (_dir, config) = project(yaml)?;
    let mut pool = RecordingPool::default();

    let outcome = synchronize::<_, StaticDirectory>(&config, &mut pool, None, SyncArgs::default()).await?;
    assert_eq!(outcome, SyncOutcome::Applied(1));
    assert_eq!(
        pool.executed_on("postgres"),
        vec!["COMMENT ON ROLE \"alice\" IS 'Current employee';"]
    );
    Ok(())
}

#[tokio::test]
async fn test_membership_cycle_is_reported() -> Result<()> {
    let yaml = r#"
postgres:
  databases_query: [postgres]
  roles_query: []
  schemas_query: []
  owners_query: []
sync_map:
  - roles:
      - {name: a, parent: b}
      - {name: b, parent: a}
"#;
    let (_dir, config) = project(yaml)?;
    let mut pool = RecordingPool::default();

    let err = synchronize::<_, StaticDirectory>(&config, &mut pool, None, SyncArgs::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Membership cycle between roles: a, b"));
    assert_eq!(exit_code_for(&err), EXIT_USER_ERROR);
    assert_eq!(pool.executed_count(), 0);
    Ok(())
}
