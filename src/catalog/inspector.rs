//! Read the observed state of the cluster
//!
//! Inspection queries are configurable: each one is SQL text, a static list
//! of rows, or a reference to a shared query. Rows are mapped to roles,
//! schemas and grants here, and everything the run must not touch is
//! filtered out: blacklisted roles, unmanaged roles, and grants on unknown
//! schemas or owners.

use super::grant::{Acl, Grant, Target};
use super::privilege::{PrivilegeCatalog, PrivilegeKind};
use super::role::{Role, RoleOptions, RoleSet};
use super::topology::Topology;
use crate::db::session::{Row, Session, SessionPool, Value};
use crate::error::SyncError;
use anyhow::Result;
use glob::Pattern;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QuerySource {
    Sql(String),
    Rows(Vec<StaticRow>),
    Shared { shared_query: String },
}

/// A row of a static query: a list of columns or a single value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StaticRow {
    Columns(Vec<Value>),
    Scalar(Value),
}

impl StaticRow {
    fn to_row(&self) -> Row {
        match self {
            StaticRow::Columns(columns) => columns.clone(),
            StaticRow::Scalar(value) => vec![value.clone()],
        }
    }
}

impl QuerySource {
    pub fn sql(sql: &str) -> Self {
        QuerySource::Sql(sql.to_string())
    }

    pub fn rows<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        QuerySource::Rows(
            values
                .into_iter()
                .map(|value| StaticRow::Scalar(Value::text(value.as_ref())))
                .collect(),
        )
    }
}

/// Roles never inspected nor managed, as glob patterns.
#[derive(Debug, Clone, Default)]
pub struct Blacklist(Vec<Pattern>);

impl Blacklist {
    pub fn new<I, S>(patterns: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|pattern| {
                Pattern::new(pattern.as_ref()).map_err(|e| {
                    SyncError::user(format!("Invalid blacklist pattern {:?}: {}", pattern.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Blacklist)
    }

    /// The first pattern matching `name`.
    pub fn matches(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|pattern| pattern.matches(name))
            .map(Pattern::as_str)
    }
}

/// Inspection queries, as configured.
#[derive(Debug, Clone)]
pub struct InspectQueries {
    pub databases: QuerySource,
    /// `None` disables role inspection.
    pub roles: Option<QuerySource>,
    /// `None` means every inspected role is managed.
    pub managed_roles: Option<QuerySource>,
    pub schemas: QuerySource,
    pub owners: QuerySource,
    pub shared: BTreeMap<String, QuerySource>,
}

/// Everything inspection learned about the cluster.
#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    pub databases: Vec<String>,
    /// Every non-blacklisted role, managed or not.
    pub all_roles: RoleSet,
    /// Roles this run may alter or drop.
    pub managed_roles: RoleSet,
    pub topology: Topology,
    pub grants: Acl,
}

pub struct Inspector<'a> {
    queries: &'a InspectQueries,
    catalog: &'a PrivilegeCatalog,
    blacklist: &'a Blacklist,
}

impl<'a> Inspector<'a> {
    pub fn new(queries: &'a InspectQueries, catalog: &'a PrivilegeCatalog, blacklist: &'a Blacklist) -> Self {
        Self {
            queries,
            catalog,
            blacklist,
        }
    }

    pub async fn inspect<P: SessionPool>(&self, pool: &mut P) -> Result<ObservedState> {
        info!("Inspecting roles in Postgres cluster...");
        let (databases, all_roles, managed_roles) = self.fetch_roles(pool).await?;
        info!("Inspecting schemas in {} database(s)...", databases.len());
        let topology = self.fetch_topology(pool, &databases, &managed_roles).await?;
        info!("Inspecting privileges...");
        let grants = self.fetch_grants(pool, &topology, &managed_roles).await?;

        Ok(ObservedState {
            databases,
            all_roles,
            managed_roles,
            topology,
            grants,
        })
    }

    /// Databases, every role and managed roles, from the default database.
    pub async fn fetch_roles<P: SessionPool>(
        &self,
        pool: &mut P,
    ) -> Result<(Vec<String>, RoleSet, RoleSet)> {
        let session = pool.session(None).await?;

        let databases = first_column(&self.fetch(session, &self.queries.databases).await?)?;
        debug!("Found databases {}.", databases.join(", "));

        let Some(roles_query) = &self.queries.roles else {
            warn!("Roles introspection disabled.");
            return Ok((databases, RoleSet::new(), RoleSet::new()));
        };
        let mut all_roles = RoleSet::new();
        for row in self.fetch(session, roles_query).await? {
            let role = role_from_row(&row)?;
            if let Some(pattern) = self.blacklist.matches(&role.name) {
                debug!("Ignoring role {}. Matches {:?}.", role.name, pattern);
                continue;
            }
            all_roles.insert(role);
        }
        all_roles.link_parents();

        let managed_names: BTreeSet<String> = match &self.queries.managed_roles {
            None => all_roles.names().map(str::to_string).collect(),
            Some(source) => {
                debug!("Listing managed roles.");
                first_column(&self.fetch(session, source).await?)?
                    .into_iter()
                    .collect()
            }
        };

        let mut managed_roles = RoleSet::new();
        for role in all_roles.iter() {
            if !managed_names.contains(&role.name) {
                debug!("May reuse role {}.", role.name);
                continue;
            }
            let mut role = role.clone();
            // Never revoke membership of an unmanaged role.
            role.protect_members(|member| managed_names.contains(member));
            debug!("Managing role {} {}.", role.name, role.options);
            managed_roles.insert(role);
        }

        Ok((databases, all_roles, managed_roles))
    }

    /// Schemas of each database with the owners whose default privileges are
    /// managed.
    pub async fn fetch_topology<P: SessionPool>(
        &self,
        pool: &mut P,
        databases: &[String],
        managed_roles: &RoleSet,
    ) -> Result<Topology> {
        let mut topology = Topology::new();
        let mut global_owners: Option<Vec<String>> = None;

        for dbname in databases {
            topology.add_database(dbname);
            debug!("Inspecting schemas in {}.", dbname);
            let rows = {
                let session = pool.session(Some(dbname)).await?;
                self.fetch(session, &self.queries.schemas).await?
            };

            for row in rows {
                let (schema, owners) = schema_from_row(&row)?;
                let owners = match owners {
                    Some(owners) => owners,
                    None => {
                        if global_owners.is_none() {
                            debug!("Globally inspecting owners...");
                            let session = pool.session(None).await?;
                            global_owners =
                                Some(first_column(&self.fetch(session, &self.queries.owners).await?)?);
                        }
                        global_owners.clone().unwrap_or_default()
                    }
                };
                topology.add_schema(dbname, &schema, owners);
            }
        }

        let managed_query = self.queries.managed_roles.is_some();
        topology.retain_owners(|owner| {
            self.blacklist.matches(owner).is_none()
                && (!managed_query || managed_roles.contains(owner))
        });
        Ok(topology)
    }

    /// Grants of every inspectable privilege in every database.
    pub async fn fetch_grants<P: SessionPool>(
        &self,
        pool: &mut P,
        topology: &Topology,
        managed_roles: &RoleSet,
    ) -> Result<Acl> {
        let mut acl = Acl::new();
        let mut shared_rows: BTreeMap<(String, String), Vec<Row>> = BTreeMap::new();
        let databases: Vec<String> = topology.databases().map(str::to_string).collect();

        for privilege in self.catalog.privileges() {
            let Some(source) = &privilege.inspect else {
                warn!("Can't inspect privilege {}: query not defined.", privilege.name);
                continue;
            };
            debug!("Searching grants of privilege {}.", privilege.name);

            for dbname in &databases {
                let rows = match source {
                    QuerySource::Shared { shared_query } => {
                        let key = (shared_query.clone(), dbname.clone());
                        if !shared_rows.contains_key(&key) {
                            let shared = self.shared(shared_query)?;
                            let session = pool.session(Some(dbname)).await?;
                            let rows = self.fetch(session, shared).await?;
                            shared_rows.insert(key.clone(), rows);
                        }
                        shared_rows
                            .get(&key)
                            .map(|rows| rows_of_privilege(rows, &privilege.name))
                            .unwrap_or_default()
                    }
                    _ => {
                        let session = pool.session(Some(dbname)).await?;
                        self.fetch(session, source).await?
                    }
                };

                let owners = topology.database_owners(dbname)?;
                for row in rows {
                    let grant = grant_from_row(&privilege.name, privilege.kind, dbname, &row)?;
                    if !self.is_grant_managed(&grant, topology, &owners, managed_roles) {
                        continue;
                    }
                    debug!("Found grant {}.", grant);
                    acl.insert(grant);
                }
            }
        }

        Ok(acl)
    }

    fn is_grant_managed(
        &self,
        grant: &Grant,
        topology: &Topology,
        database_owners: &BTreeSet<&str>,
        managed_roles: &RoleSet,
    ) -> bool {
        let role_managed = self.queries.roles.is_none()
            || grant.role == "public"
            || managed_roles.contains(&grant.role);
        if !role_managed {
            return false;
        }

        let Some(dbname) = grant.dbname.name() else {
            return false;
        };
        let schema = grant.schema_name();
        if let Some(schema) = schema {
            if !topology.contains_schema(dbname, schema) {
                return false;
            }
        }

        match (&grant.owner, schema) {
            (None, _) => true,
            (Some(owner), None) => database_owners.contains(owner.as_str()),
            (Some(owner), Some(schema)) => topology
                .owners(dbname, schema)
                .is_ok_and(|owners| owners.contains(owner)),
        }
    }

    fn shared(&self, name: &str) -> Result<&QuerySource, SyncError> {
        match self.queries.shared.get(name) {
            Some(QuerySource::Shared { .. }) => Err(SyncError::user(format!(
                "Shared query {} must not reference another shared query",
                name
            ))),
            Some(source) => Ok(source),
            None => Err(SyncError::user(format!("Unknown shared query {}", name))),
        }
    }

    async fn fetch<S: Session>(&self, session: &mut S, source: &QuerySource) -> Result<Vec<Row>> {
        match source {
            QuerySource::Sql(sql) => session.query(sql).await,
            QuerySource::Rows(rows) => Ok(rows.iter().map(StaticRow::to_row).collect()),
            QuerySource::Shared { shared_query } => {
                let shared = self.shared(shared_query)?;
                match shared {
                    QuerySource::Sql(sql) => session.query(sql).await,
                    QuerySource::Rows(rows) => Ok(rows.iter().map(StaticRow::to_row).collect()),
                    QuerySource::Shared { .. } => Ok(Vec::new()),
                }
            }
        }
    }
}

fn text(value: &Value, what: &str) -> Result<String, SyncError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SyncError::user(format!("Expected text for {}, got {:?}", what, value)))
}

fn first_column(rows: &[Row]) -> Result<Vec<String>, SyncError> {
    rows.iter()
        .filter_map(|row| row.first())
        .filter(|value| !value.is_null())
        .map(|value| text(value, "name"))
        .collect()
}

/// Rows of a shared query for one privilege, without the privilege column.
fn rows_of_privilege(rows: &[Row], privilege: &str) -> Vec<Row> {
    rows.iter()
        .filter(|row| row.first().and_then(Value::as_str) == Some(privilege))
        .map(|row| row[1..].to_vec())
        .collect()
}

/// `name [, members [, superuser, inherit, ... [, comment]]]`
pub fn role_from_row(row: &Row) -> Result<Role, SyncError> {
    let Some(name) = row.first() else {
        return Err(SyncError::user("Roles query returned an empty row"));
    };
    let mut role = Role::new(&text(name, "role name")?);

    if let Some(members) = row.get(1) {
        let members = members
            .as_list()
            .ok_or_else(|| SyncError::user(format!("Expected members of {} as an array", role.name)))?;
        role.members.extend(members.iter().cloned());
    }

    let flags = row.iter().skip(2).take(RoleOptions::NAMES.len());
    let flags: Vec<bool> = flags
        .map(|value| {
            value.as_bool().ok_or_else(|| {
                SyncError::user(format!("Expected boolean role option for {}, got {:?}", role.name, value))
            })
        })
        .collect::<Result<_, _>>()?;
    if !flags.is_empty() {
        let mut options = RoleOptions::default();
        for (name, value) in RoleOptions::NAMES.iter().zip(flags) {
            options.set(name, value)?;
        }
        role.options = options;
    }

    if let Some(comment) = row.get(2 + RoleOptions::NAMES.len()) {
        role.comment = comment.as_str().map(str::to_string);
    }

    Ok(role)
}

/// `schema [, owners]`; `None` owners means the query does not know them.
pub fn schema_from_row(row: &Row) -> Result<(String, Option<Vec<String>>), SyncError> {
    let Some(schema) = row.first() else {
        return Err(SyncError::user("Schemas query returned an empty row"));
    };
    let schema = text(schema, "schema name")?;
    let owners = match row.get(1) {
        None => None,
        Some(owners) => Some(
            owners
                .as_list()
                .ok_or_else(|| SyncError::user(format!("Expected owners of schema {} as an array", schema)))?
                .to_vec(),
        ),
    };
    Ok((schema, owners))
}

/// `schema, role [, full [, owner]]`
pub fn grant_from_row(
    privilege: &str,
    kind: PrivilegeKind,
    dbname: &str,
    row: &Row,
) -> Result<Grant, SyncError> {
    if row.len() < 2 {
        return Err(SyncError::user(format!(
            "{}'s inspect query doesn't return role as column 2",
            privilege
        )));
    }

    let schema = match (&row[0], kind) {
        (_, PrivilegeKind::Database | PrivilegeKind::DefaultGlobal) => None,
        (Value::Null, _) => None,
        (value, _) => Some(Target::Named(text(value, "schema")?)),
    };
    let role = match &row[1] {
        Value::Null => "public".to_string(),
        value => text(value, "grantee")?,
    };
    let full = match row.get(2) {
        None => Some(true),
        Some(Value::Null) => None,
        Some(value) => Some(value.as_bool().ok_or_else(|| {
            SyncError::user(format!("{}'s inspect query returns a non-boolean full column", privilege))
        })?),
    };
    let owner = match row.get(3) {
        None | Some(Value::Null) => None,
        Some(value) => Some(text(value, "owner")?),
    };

    Ok(Grant {
        privilege: privilege.to_string(),
        dbname: Target::named(dbname),
        schema,
        owner,
        role,
        full,
    })
}
