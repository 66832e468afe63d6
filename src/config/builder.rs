use crate::catalog::inspector::{Blacklist, InspectQueries};
use crate::catalog::privilege::{Privilege, PrivilegeCatalog};
use crate::config::defaults::well_known_privileges;
use crate::config::{merge::Merge, types::*};
use crate::error::SyncError;
use crate::rules::SyncItem;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigBuilder {
    config_input: ConfigInput,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
        }
    }

    /// Relative paths of the file are resolved against `base_dir`.
    pub fn with_file(mut self, mut file_input: ConfigInput, base_dir: &Path) -> Self {
        if let Some(directory) = file_input.directory.as_mut() {
            directory.fixture = directory
                .fixture
                .take()
                .map(|fixture| base_dir.join(fixture).to_string_lossy().into_owned());
        }
        self.config_input = self.config_input.merge(file_input);
        self
    }

    pub fn with_cli_args(mut self, cli_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    pub fn resolve(self) -> Result<Config> {
        let defaults = Config::default();

        let sync_map = self.config_input.sync_map.clone().unwrap_or_default();

        Ok(Config {
            postgres: self.resolve_postgres(&defaults.postgres)?,
            privileges: self.resolve_privileges(&sync_map)?,
            directory: self.resolve_directory(),
            sync_map,
        })
    }

    fn resolve_postgres(&self, defaults: &Postgres) -> Result<Postgres> {
        let pg_input = self.config_input.postgres.as_ref();

        let dsn = pg_input
            .and_then(|p| p.dsn.as_ref())
            .cloned()
            .or_else(|| std::env::var("PGDSN").ok())
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| defaults.dsn.clone());

        let pool_size = pg_input
            .and_then(|p| p.pool_size)
            .unwrap_or(defaults.pool_size);
        if pool_size == 0 {
            return Err(SyncError::user("postgres.pool_size must be at least 1").into());
        }

        let default_queries = &defaults.queries;
        let queries = InspectQueries {
            databases: pg_input
                .and_then(|p| p.databases_query.as_ref())
                .cloned()
                .unwrap_or_else(|| default_queries.databases.clone()),
            roles: pg_input
                .and_then(|p| p.roles_query.as_ref())
                .cloned()
                .or_else(|| default_queries.roles.clone()),
            managed_roles: pg_input
                .and_then(|p| p.managed_roles_query.as_ref())
                .cloned()
                .or_else(|| default_queries.managed_roles.clone()),
            schemas: pg_input
                .and_then(|p| p.schemas_query.as_ref())
                .cloned()
                .unwrap_or_else(|| default_queries.schemas.clone()),
            owners: pg_input
                .and_then(|p| p.owners_query.as_ref())
                .cloned()
                .unwrap_or_else(|| default_queries.owners.clone()),
            shared: pg_input
                .and_then(|p| p.shared_queries.as_ref())
                .cloned()
                .unwrap_or_else(|| default_queries.shared.clone()),
        };

        let roles_blacklist = pg_input
            .and_then(|p| p.roles_blacklist.as_ref())
            .cloned()
            .unwrap_or_else(|| defaults.roles_blacklist.clone());
        // Reject invalid patterns before connecting.
        Blacklist::new(&roles_blacklist)?;

        Ok(Postgres {
            dsn,
            default_database: pg_input
                .and_then(|p| p.default_database.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.default_database.clone()),
            pool_size,
            queries,
            roles_blacklist,
        })
    }

    /// Well-known privileges overridden by configured ones, without unused
    /// hidden definitions.
    fn resolve_privileges(&self, sync_map: &[SyncItem]) -> Result<PrivilegeCatalog> {
        let mut inputs = well_known_privileges();
        if let Some(configured) = &self.config_input.privileges {
            inputs.extend(configured.clone());
        }

        let mut privileges = Vec::new();
        let mut groups = BTreeMap::new();
        for (name, input) in inputs {
            match input {
                PrivilegeInput::Group(members) => {
                    groups.insert(name, members);
                }
                PrivilegeInput::Definition(definition) => {
                    privileges.push(Privilege {
                        name,
                        kind: definition.kind,
                        inspect: definition.inspect,
                        grant: definition.grant,
                        revoke: definition.revoke,
                    });
                }
            }
        }
        let mut catalog = PrivilegeCatalog::new(privileges, groups)?;

        let referenced: BTreeSet<&str> = sync_map
            .iter()
            .flat_map(|item| &item.grants)
            .flat_map(|rule| &rule.privileges)
            .filter(|template| template.is_static())
            .map(|template| template.source())
            .collect();
        for name in &referenced {
            if !catalog.contains(name) {
                return Err(SyncError::user(format!("Unknown privilege {} in sync map", name)).into());
            }
        }

        catalog.prune_hidden(referenced)?;
        debug!("Managing {} privilege(s).", catalog.len());
        Ok(catalog)
    }

    fn resolve_directory(&self) -> Directory {
        let dir_input = self.config_input.directory.as_ref();

        Directory {
            fixture: dir_input
                .and_then(|d| d.fixture.as_ref())
                .map(PathBuf::from),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
