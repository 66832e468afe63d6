use anyhow::Result;
use rolesync::config::{ConfigBuilder, load_config};
use rolesync::error::{EXIT_USER_ERROR, exit_code_for};
use rstest::rstest;
use std::fs;
use tempfile::TempDir;

const SAMPLE: &str = r#"
postgres:
  default_database: template1
  managed_roles_query: SELECT rolname FROM pg_roles WHERE rolname LIKE 'app\_%'
  roles_blacklist: [pg_*, postgres, rds_*]

privileges:
  ro: [__connect__, __usage_on_schema__, __select_on_tables__]
  rw: [ro, __insert__, __update_on_tables__]

directory:
  fixture: directory.yml

sync_map:
  - description: Static roles
    roles:
      - name: readers
        comment: Read-only access
      - writers
    grant:
      - privilege: ro
        role: readers
      - privilege: rw
        role: writers
        database: app
        schema: public
  - description: Developers
    directory:
      base: ou=groups,dc=acme
      filter: (cn=developers)
    roles:
      name: "{member.cn.lower()}"
      options: LOGIN
      parent: writers
"#;

fn write_config(contents: &str) -> Result<(TempDir, String)> {
    let dir = TempDir::new()?;
    let path = dir.path().join("rolesync.yaml");
    fs::write(&path, contents)?;
    let path = path.to_string_lossy().into_owned();
    Ok((dir, path))
}

#[test]
fn test_sample_configuration() -> Result<()> {
    let (dir, path) = write_config(SAMPLE)?;
    let (input, base_dir) = load_config(&path)?;
    let config = ConfigBuilder::new().with_file(input, &base_dir).resolve()?;

    assert_eq!(config.postgres.default_database, "template1");
    assert_eq!(config.postgres.roles_blacklist.len(), 3);
    assert!(config.postgres.queries.managed_roles.is_some());
    assert_eq!(config.directory.fixture, Some(dir.path().join("directory.yml")));

    assert_eq!(config.sync_map.len(), 2);
    assert_eq!(config.sync_map[0].name(), "Static roles");
    assert_eq!(config.sync_map[0].roles.len(), 2);
    assert_eq!(config.sync_map[0].grants.len(), 2);
    assert!(config.sync_map[1].directory.is_some());

    // Groups nest: rw includes everything ro does.
    let ro = config.privileges.resolve("ro")?;
    let rw = config.privileges.resolve("rw")?;
    assert!(rw.len() > ro.len());
    assert!(ro.iter().all(|p| rw.iter().any(|q| q.name == p.name)));
    assert!(config.privileges.get("__delete_on_all_tables__").is_none());
    Ok(())
}

#[test]
fn test_search_query_is_inferred_from_templates() -> Result<()> {
    let (_dir, path) = write_config(SAMPLE)?;
    let (input, base_dir) = load_config(&path)?;
    let config = ConfigBuilder::new().with_file(input, &base_dir).resolve()?;

    let query = config.sync_map[1].search_query()?.unwrap();
    assert_eq!(query.base, "ou=groups,dc=acme");
    assert_eq!(query.filter, "(cn=developers)");
    assert_eq!(query.attributes, vec!["member"]);
    assert!(query.joins.is_empty());
    assert!(config.sync_map[0].search_query()?.is_none());
    Ok(())
}

#[rstest]
#[case::empty_item("sync_map: [{description: nothing}]", "Missing role or grant rule.")]
#[case::static_role_with_search(
    "sync_map: [{directory: {base: dc=acme}, roles: [{name: fixed}]}]",
    "Mixing static role with directory query may hide it."
)]
#[case::placeholder_without_search(
    "sync_map: [{roles: ['{cn}']}]",
    "place-holders require a directory query."
)]
#[case::grant_without_role("sync_map: [{roles: [a], grant: {privilege: p}}]", "Missing role in grant rule.")]
#[case::grant_without_privilege("sync_map: [{roles: [a], grant: {role: a}}]", "Missing privilege to grant rule.")]
#[case::unknown_role_option("sync_map: [{roles: [{name: a, options: FLY}]}]", "Unknown role option FLY")]
fn test_invalid_sync_map(#[case] contents: &str, #[case] message: &str) -> Result<()> {
    let (_dir, path) = write_config(contents)?;
    let err = load_config(&path).unwrap_err();
    assert!(
        format!("{:#}", err).contains(message),
        "{:#} does not mention {}",
        err,
        message
    );
    assert_eq!(exit_code_for(&err), EXIT_USER_ERROR);
    Ok(())
}

#[test]
fn test_unknown_privilege_is_user_error() -> Result<()> {
    let (_dir, path) = write_config("sync_map: [{roles: [a], grant: {privilege: __nope__, role: a}}]")?;
    let (input, base_dir) = load_config(&path)?;
    let err = ConfigBuilder::new().with_file(input, &base_dir).resolve().unwrap_err();
    assert!(err.to_string().contains("Unknown privilege __nope__"));
    assert_eq!(exit_code_for(&err), EXIT_USER_ERROR);
    Ok(())
}
