use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A temporary project directory to run the binary in
pub struct CliTestHelper {
    pub temp_dir: TempDir,
    pub project_root: PathBuf,
}

impl CliTestHelper {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let project_root = temp_dir.path().to_path_buf();
        Self {
            temp_dir,
            project_root,
        }
    }

    pub fn write_config(&self, contents: &str) {
        self.write_file("rolesync.yaml", contents);
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        fs::write(self.project_root.join(name), contents).expect("Failed to write file");
    }

    /// The binary, run from the project root without connection settings
    /// leaking from the environment.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("rolesync").unwrap();
        cmd.current_dir(&self.project_root)
            .env_remove("PGDSN")
            .env_remove("DATABASE_URL")
            .env_remove("RUST_LOG");
        cmd
    }
}

pub fn with_cli_helper<F, R>(test_fn: F) -> R
where
    F: FnOnce(&CliTestHelper) -> R,
{
    let helper = CliTestHelper::new();
    test_fn(&helper)
}
