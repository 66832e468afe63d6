// Configuration file name
pub const CONFIG_FILENAME: &str = "rolesync.yaml";

// Reported to PostgreSQL as application_name
pub const APPLICATION_NAME: &str = "rolesync";

// Object name of the directory entry itself in templates and attribute maps
pub const SELF_OBJECT: &str = "__self__";

// Wildcard spelling accepted in grant rules for databases and schemas
pub const ALL_WILDCARD: &str = "__all__";

// Upper bound of per-database sessions opened during one run
pub const DEFAULT_POOL_SIZE: usize = 256;

pub const DEFAULT_DATABASE: &str = "postgres";

// Roles never managed unless the blacklist is overridden
pub const DEFAULT_ROLES_BLACKLIST: &[&str] = &["pg_*", "postgres"];

// Exit status of `sync --check` when statements are pending
pub const EXIT_CHANGES_PENDING: i32 = 2;

// RDN attribute types recognised in `{attr.component}` place-holders
pub const DN_COMPONENTS: &[&str] = &["cn", "l", "st", "o", "ou", "c", "street", "dc", "uid"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_do_not_collide() {
        assert_ne!(SELF_OBJECT, ALL_WILDCARD);
        assert!(DEFAULT_POOL_SIZE > 0);
        assert!(DN_COMPONENTS.contains(&"cn"));
    }
}
