use crate::helpers::cli::with_cli_helper;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    with_cli_helper(|helper| {
        helper
            .command()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("sync").and(predicate::str::contains("inspect")));
    });
}

#[test]
fn test_sync_help_lists_options() {
    with_cli_helper(|helper| {
        helper
            .command()
            .args(["sync", "--help"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("--dry-run")
                    .and(predicate::str::contains("--check"))
                    .and(predicate::str::contains("--dsn"))
                    .and(predicate::str::contains("--directory-fixture")),
            );
    });
}

#[test]
fn test_missing_subcommand_is_usage_error() {
    with_cli_helper(|helper| {
        helper.command().assert().failure().code(2);
    });
}
