use crate::catalog::inspector::{InspectQueries, QuerySource};
use crate::catalog::privilege::{PrivilegeCatalog, PrivilegeKind};
use crate::rules::SyncItem;
use clap::Args;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration input - all fields Optional for merging
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigInput {
    pub postgres: Option<PostgresInput>,
    pub privileges: Option<BTreeMap<String, PrivilegeInput>>,
    pub directory: Option<DirectoryInput>,
    pub sync_map: Option<Vec<SyncItem>>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone)]
pub struct Config {
    pub postgres: Postgres,
    pub privileges: PrivilegeCatalog,
    pub directory: Directory,
    pub sync_map: Vec<SyncItem>,
}

// Cluster connection and inspection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresInput {
    pub dsn: Option<String>,
    pub default_database: Option<String>,
    pub pool_size: Option<usize>,
    pub databases_query: Option<QuerySource>,
    pub roles_query: Option<QuerySource>,
    pub managed_roles_query: Option<QuerySource>,
    pub schemas_query: Option<QuerySource>,
    pub owners_query: Option<QuerySource>,
    pub shared_queries: Option<BTreeMap<String, QuerySource>>,
    #[serde(alias = "roles_blacklist_query")]
    pub roles_blacklist: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Postgres {
    /// Empty means libpq-style `PG*` environment variables.
    pub dsn: String,
    pub default_database: String,
    pub pool_size: usize,
    pub queries: InspectQueries,
    pub roles_blacklist: Vec<String>,
}

/// A privilege definition, or a list of privilege names forming a group.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrivilegeInput {
    Group(Vec<String>),
    Definition(PrivilegeDefinition),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivilegeDefinition {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: PrivilegeKind,
    pub inspect: Option<QuerySource>,
    pub grant: Option<String>,
    pub revoke: Option<String>,
}

fn default_kind() -> PrivilegeKind {
    PrivilegeKind::Schema
}

// Directory backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryInput {
    pub fixture: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    /// YAML file of entries answering directory searches.
    pub fixture: Option<PathBuf>,
}

// CLI argument groups for command-specific options
#[derive(Debug, Clone, Default, Args)]
pub struct PostgresArgs {
    #[arg(long, help = "PostgreSQL connection URL (default: PGDSN, DATABASE_URL or PG* variables)")]
    pub dsn: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DirectoryArgs {
    #[arg(long, help = "YAML file of directory entries to search")]
    pub directory_fixture: Option<String>,
}

// Conversion functions from CLI args to config input
impl From<PostgresArgs> for PostgresInput {
    fn from(args: PostgresArgs) -> Self {
        Self {
            dsn: args.dsn,
            ..Default::default()
        }
    }
}

impl From<DirectoryArgs> for DirectoryInput {
    fn from(args: DirectoryArgs) -> Self {
        Self {
            fixture: args.directory_fixture,
        }
    }
}
