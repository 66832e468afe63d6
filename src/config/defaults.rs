use crate::catalog::inspector::{InspectQueries, QuerySource};
use crate::catalog::privilege::PrivilegeKind;
use crate::config::types::*;
use crate::constants::{DEFAULT_DATABASE, DEFAULT_POOL_SIZE, DEFAULT_ROLES_BLACKLIST};
use std::collections::BTreeMap;

pub const DATABASES_QUERY: &str = "\
SELECT datname FROM pg_catalog.pg_database
WHERE datallowconn IS TRUE ORDER BY 1;";

pub const ROLES_QUERY: &str = "\
SELECT
  role.rolname::text,
  array_remove(array_agg(members.rolname::text ORDER BY members.rolname), NULL) AS members,
  role.rolsuper, role.rolinherit, role.rolcreaterole, role.rolcreatedb,
  role.rolcanlogin, role.rolreplication, role.rolbypassrls,
  pg_catalog.shobj_description(role.oid, 'pg_authid') AS comment
FROM pg_catalog.pg_roles AS role
LEFT JOIN pg_catalog.pg_auth_members ON roleid = role.oid
LEFT JOIN pg_catalog.pg_roles AS members ON members.oid = member
GROUP BY role.oid, role.rolname, role.rolsuper, role.rolinherit, role.rolcreaterole,
  role.rolcreatedb, role.rolcanlogin, role.rolreplication, role.rolbypassrls
ORDER BY 1;";

pub const SCHEMAS_QUERY: &str = "\
SELECT nspname::text FROM pg_catalog.pg_namespace
WHERE nspname NOT LIKE 'pg\\_%' AND nspname <> 'information_schema'
ORDER BY 1;";

pub const OWNERS_QUERY: &str = "\
SELECT role.rolname::text
FROM pg_catalog.pg_roles AS role
WHERE role.rolsuper IS TRUE
ORDER BY 1;";

impl Default for InspectQueries {
    fn default() -> Self {
        Self {
            databases: QuerySource::sql(DATABASES_QUERY),
            roles: Some(QuerySource::sql(ROLES_QUERY)),
            managed_roles: None,
            schemas: QuerySource::sql(SCHEMAS_QUERY),
            owners: QuerySource::sql(OWNERS_QUERY),
            shared: BTreeMap::new(),
        }
    }
}

impl Default for Postgres {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            default_database: DEFAULT_DATABASE.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            queries: InspectQueries::default(),
            roles_blacklist: DEFAULT_ROLES_BLACKLIST.iter().map(|p| p.to_string()).collect(),
        }
    }
}

// Well-known privileges, hidden unless referenced.

fn definition(kind: PrivilegeKind, inspect: String, grant: String, revoke: String) -> PrivilegeInput {
    PrivilegeInput::Definition(PrivilegeDefinition {
        kind,
        inspect: Some(QuerySource::Sql(inspect)),
        grant: Some(grant),
        revoke: Some(revoke),
    })
}

fn datacl(privilege: &str) -> PrivilegeInput {
    definition(
        PrivilegeKind::Database,
        format!(
            "WITH d AS (
  SELECT
    (aclexplode(datacl)).grantee AS grantee,
    (aclexplode(datacl)).privilege_type AS priv
  FROM pg_catalog.pg_database
  WHERE datname = current_database()
)
SELECT NULL::text AS namespace, r.rolname::text
FROM pg_catalog.pg_roles AS r
JOIN d ON d.grantee = r.oid AND d.priv = '{privilege}';"
        ),
        format!("GRANT {privilege} ON DATABASE {{database}} TO {{role}};"),
        format!("REVOKE {privilege} ON DATABASE {{database}} FROM {{role}};"),
    )
}

fn nspacl(privilege: &str) -> PrivilegeInput {
    definition(
        PrivilegeKind::Schema,
        format!(
            "WITH n AS (
  SELECT
    n.nspname AS namespace,
    (aclexplode(nspacl)).grantee AS grantee,
    (aclexplode(nspacl)).privilege_type AS priv
  FROM pg_catalog.pg_namespace AS n
)
SELECT n.namespace::text, r.rolname::text
FROM pg_catalog.pg_roles AS r
JOIN n ON n.grantee = r.oid AND n.priv = '{privilege}'
ORDER BY 1, 2;"
        ),
        format!("GRANT {privilege} ON SCHEMA {{schema}} TO {{role}};"),
        format!("REVOKE {privilege} ON SCHEMA {{schema}} FROM {{role}};"),
    )
}

/// Default privileges per schema, or global ones when `global`.
fn defacl(privilege: &str, objtype: ObjectType, global: bool) -> PrivilegeInput {
    let (kind, namespace, scope) = if global {
        (PrivilegeKind::DefaultGlobal, "defaclnamespace = 0", "")
    } else {
        (PrivilegeKind::DefaultSchema, "defaclnamespace <> 0", " IN SCHEMA {schema}")
    };
    let (code, plural) = (objtype.code(), objtype.plural());
    definition(
        kind,
        format!(
            "WITH grants AS (
  SELECT
    defaclnamespace,
    defaclrole,
    (aclexplode(defaclacl)).grantee AS grantee,
    (aclexplode(defaclacl)).privilege_type AS privilege_type
  FROM pg_catalog.pg_default_acl
  WHERE defaclobjtype = '{code}' AND {namespace}
)
SELECT
  nsp.nspname::text,
  pg_catalog.pg_get_userbyid(grantee)::text AS grantee,
  TRUE AS full,
  pg_catalog.pg_get_userbyid(defaclrole)::text AS owner
FROM grants
LEFT JOIN pg_catalog.pg_namespace nsp ON nsp.oid = defaclnamespace
WHERE privilege_type = '{privilege}'
ORDER BY 1, 2, 4;"
        ),
        format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {{owner}}{scope} GRANT {privilege} ON {plural} TO {{role}};"
        ),
        format!(
            "ALTER DEFAULT PRIVILEGES FOR ROLE {{owner}}{scope} REVOKE {privilege} ON {plural} FROM {{role}};"
        ),
    )
}

/// `ON ALL <objects> IN SCHEMA`, with `full` telling empty, partial and
/// complete grants apart. Schemas without objects report `full` NULL;
/// schemas with objects but no grant report no row.
fn all_in_schema(privilege: &str, objtype: ObjectType) -> PrivilegeInput {
    let (catalog, namespace, name, acl, filter) = match objtype {
        ObjectType::Functions => ("pg_proc", "pronamespace", "proname", "proacl", "TRUE"),
        ObjectType::Tables => ("pg_class", "relnamespace", "relname", "relacl", "relkind = 'r'"),
        ObjectType::Sequences => ("pg_class", "relnamespace", "relname", "relacl", "relkind = 'S'"),
        ObjectType::Types => ("pg_type", "typnamespace", "typname", "typacl", "TRUE"),
    };
    let plural = objtype.plural();
    definition(
        PrivilegeKind::Schema,
        format!(
            "WITH
namespace_objects AS (
  SELECT
    nsp.oid,
    nsp.nspname,
    array_agg(obj.{name}::text ORDER BY obj.{name}) FILTER (WHERE obj.{name} IS NOT NULL) AS objects
  FROM pg_catalog.pg_namespace nsp
  LEFT OUTER JOIN pg_catalog.{catalog} AS obj
    ON obj.{namespace} = nsp.oid AND {filter}
  WHERE nspname NOT LIKE 'pg\\_%'
  GROUP BY 1, 2
),
all_grants AS (
  SELECT
    {namespace},
    (aclexplode({acl})).privilege_type,
    (aclexplode({acl})).grantee,
    array_agg({name}::text ORDER BY {name}) AS objects
  FROM pg_catalog.{catalog}
  WHERE {filter}
  GROUP BY 1, 2, 3
)
SELECT
  nspname::text,
  rolname::text,
  CASE
    WHEN nsp.objects IS NULL THEN NULL
    ELSE nsp.objects = COALESCE(grants.objects, ARRAY[]::text[])
  END AS \"full\"
FROM namespace_objects AS nsp
CROSS JOIN pg_catalog.pg_roles AS rol
LEFT OUTER JOIN all_grants AS grants
  ON {namespace} = nsp.oid
     AND grantee = rol.oid
     AND privilege_type = '{privilege}'
WHERE NOT (nsp.objects IS NOT NULL AND grants.objects IS NULL)
ORDER BY 1, 2;"
        ),
        format!("GRANT {privilege} ON ALL {plural} IN SCHEMA {{schema}} TO {{role}};"),
        format!("REVOKE {privilege} ON ALL {plural} IN SCHEMA {{schema}} FROM {{role}};"),
    )
}

#[derive(Debug, Clone, Copy)]
enum ObjectType {
    Functions,
    Tables,
    Sequences,
    Types,
}

impl ObjectType {
    fn code(self) -> char {
        match self {
            ObjectType::Functions => 'f',
            ObjectType::Tables => 'r',
            ObjectType::Sequences => 'S',
            ObjectType::Types => 'T',
        }
    }

    fn plural(self) -> &'static str {
        match self {
            ObjectType::Functions => "FUNCTIONS",
            ObjectType::Tables => "TABLES",
            ObjectType::Sequences => "SEQUENCES",
            ObjectType::Types => "TYPES",
        }
    }
}

/// `__<p>_on_all_<t>__`, `__default_<p>_on_<t>__` and
/// `__global_default_<p>_on_<t>__`, grouped under `group`; the group holds
/// the first two.
fn object_privileges(
    out: &mut BTreeMap<String, PrivilegeInput>,
    privilege: &str,
    objtype: ObjectType,
    group: String,
) {
    let (p, t) = (privilege.to_lowercase(), objtype.plural().to_lowercase());
    let all = format!("__{p}_on_all_{t}__");
    let default = format!("__default_{p}_on_{t}__");
    out.insert(all.clone(), all_in_schema(privilege, objtype));
    out.insert(default.clone(), defacl(privilege, objtype, false));
    out.insert(
        format!("__global_default_{p}_on_{t}__"),
        defacl(privilege, objtype, true),
    );
    out.insert(group, PrivilegeInput::Group(vec![all, default]));
}

/// Privileges shipped with rolesync, named `__like_this__`.
pub fn well_known_privileges() -> BTreeMap<String, PrivilegeInput> {
    let mut out = BTreeMap::new();
    out.insert("__connect__".to_string(), datacl("CONNECT"));
    out.insert("__temporary__".to_string(), datacl("TEMPORARY"));
    out.insert("__create_on_schemas__".to_string(), nspacl("CREATE"));
    out.insert("__usage_on_schema__".to_string(), nspacl("USAGE"));
    out.insert("__usage_on_types__".to_string(), defacl("USAGE", ObjectType::Types, false));

    object_privileges(&mut out, "EXECUTE", ObjectType::Functions, "__execute__".to_string());
    for privilege in ["DELETE", "INSERT", "REFERENCES", "TRIGGER", "TRUNCATE"] {
        let group = format!("__{}__", privilege.to_lowercase());
        object_privileges(&mut out, privilege, ObjectType::Tables, group);
    }
    for privilege in ["SELECT", "UPDATE"] {
        for objtype in [ObjectType::Tables, ObjectType::Sequences] {
            let group = format!(
                "__{}_on_{}__",
                privilege.to_lowercase(),
                objtype.plural().to_lowercase()
            );
            object_privileges(&mut out, privilege, objtype, group);
        }
    }
    out.insert(
        "__usage_on_sequences__".to_string(),
        PrivilegeInput::Group(vec![
            "__usage_on_all_sequences__".to_string(),
            "__default_usage_on_sequences__".to_string(),
        ]),
    );
    out.insert(
        "__usage_on_all_sequences__".to_string(),
        all_in_schema("USAGE", ObjectType::Sequences),
    );
    out.insert(
        "__default_usage_on_sequences__".to_string(),
        defacl("USAGE", ObjectType::Sequences, false),
    );
    out
}

impl Default for Config {
    fn default() -> Self {
        Self {
            postgres: Postgres::default(),
            privileges: Default::default(),
            directory: Directory::default(),
            sync_map: Vec::new(),
        }
    }
}
