//! CLI error handling tests
//!
//! Configuration problems are reported before any connection attempt and
//! exit with status 1.

use crate::helpers::cli::with_cli_helper;
use predicates::prelude::*;

#[test]
fn test_invalid_config_yaml_error() {
    with_cli_helper(|helper| {
        helper.write_config("invalid: yaml: content: [unbalanced");

        helper
            .command()
            .arg("sync")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid configuration"));
    });
}

#[test]
fn test_unknown_section_error() {
    with_cli_helper(|helper| {
        helper.write_config("ldap:\n  uri: ldap://localhost\n");

        helper
            .command()
            .arg("sync")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("unknown field `ldap`"));
    });
}

#[test]
fn test_invalid_sync_map_error() {
    with_cli_helper(|helper| {
        helper.write_config(
            r#"
sync_map:
  - directory:
      base: ou=groups,dc=acme
    roles: [static_role]
"#,
        );

        helper
            .command()
            .arg("sync")
            .assert()
            .code(1)
            .stderr(predicate::str::contains(
                "Mixing static role with directory query may hide it.",
            ));
    });
}

#[test]
fn test_unknown_privilege_error() {
    with_cli_helper(|helper| {
        helper.write_config("sync_map:\n  - roles: [alice]\n    grant: {privilege: superpowers, role: alice}\n");

        helper
            .command()
            .args(["sync", "--dry-run"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Unknown privilege superpowers"));
    });
}

#[test]
fn test_missing_directory_fixture_error() {
    with_cli_helper(|helper| {
        helper.write_config("sync_map:\n  - roles: [alice]\n");

        helper
            .command()
            .args(["sync", "--directory-fixture", "missing.yml"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Failed to read directory fixture missing.yml"));
    });
}

#[test]
fn test_invalid_pool_size_error() {
    with_cli_helper(|helper| {
        helper.write_config("postgres:\n  pool_size: 0\n");

        helper
            .command()
            .arg("inspect")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("pool_size"));
    });
}
