use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl<T> Merge<Option<T>> for Option<T> {
    fn merge(self, other: Option<T>) -> Option<T> {
        other.or(self)
    }
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            postgres: match (self.postgres, other.postgres) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            privileges: match (self.privileges, other.privileges) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
            },
            directory: match (self.directory, other.directory) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            sync_map: self.sync_map.merge(other.sync_map),
        }
    }
}

// Custom merge implementations for complex types
impl PostgresInput {
    pub fn merge_with(self, other: PostgresInput) -> PostgresInput {
        PostgresInput {
            dsn: other.dsn.or(self.dsn),
            default_database: other.default_database.or(self.default_database),
            pool_size: other.pool_size.or(self.pool_size),
            databases_query: other.databases_query.or(self.databases_query),
            roles_query: other.roles_query.or(self.roles_query),
            managed_roles_query: other.managed_roles_query.or(self.managed_roles_query),
            schemas_query: other.schemas_query.or(self.schemas_query),
            owners_query: other.owners_query.or(self.owners_query),
            shared_queries: match (self.shared_queries, other.shared_queries) {
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
                (a, b) => b.or(a),
            },
            roles_blacklist: other.roles_blacklist.or(self.roles_blacklist),
        }
    }
}

impl DirectoryInput {
    pub fn merge_with(self, other: DirectoryInput) -> DirectoryInput {
        DirectoryInput {
            fixture: other.fixture.or(self.fixture),
        }
    }
}
