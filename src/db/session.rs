//! Sessions on the managed databases
//!
//! The engine talks to PostgreSQL through [`SessionPool`] and [`Session`] so
//! that inspection can be exercised without a server. [`PgSessionPool`] is
//! the sqlx implementation: one lazily opened connection per database, never
//! more than the configured limit.

use super::connection::connect_to_database;
use super::error_context::SqlErrorContext;
use crate::error::SyncError;
use anyhow::Result;
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row as _, TypeInfo};
use std::collections::BTreeMap;
use tracing::debug;

/// A column value, as far as inspection needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Text(String),
    TextArray(Vec<String>),
}

impl Value {
    pub fn text(value: &str) -> Self {
        Value::Text(value.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Array values; NULL is the empty array.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::TextArray(values) => Some(values),
            Value::Null => Some(&[]),
            _ => None,
        }
    }
}

pub type Row = Vec<Value>;

#[allow(async_fn_in_trait)]
pub trait Session {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;
    async fn execute(&mut self, sql: &str) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait SessionPool {
    type Session: Session;

    /// Session on `dbname`, or on the default database when `None`.
    async fn session(&mut self, dbname: Option<&str>) -> Result<&mut Self::Session>;

    fn default_database(&self) -> &str;
}

pub struct PgSession {
    dbname: String,
    pool: PgPool,
}

impl Session for PgSession {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        debug!("Querying {}:\n{}", self.dbname, sql.trim());
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::user(SqlErrorContext::from_sqlx_error(&e).format(sql)))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::user(SqlErrorContext::from_sqlx_error(&e).format(sql)))?;
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut values = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let index = column.ordinal();
        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            name if name.ends_with("[]") => row
                .try_get::<Option<Vec<Option<String>>>, _>(index)?
                .map(|items| Value::TextArray(items.into_iter().flatten().collect())),
            _ => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
        };
        values.push(value.unwrap_or(Value::Null));
    }
    Ok(values)
}

/// One connection per database, opened on first use.
pub struct PgSessionPool {
    dsn: String,
    default_database: String,
    limit: usize,
    sessions: BTreeMap<String, PgSession>,
}

impl PgSessionPool {
    pub fn new(dsn: &str, default_database: &str, limit: usize) -> Self {
        Self {
            dsn: dsn.to_string(),
            default_database: default_database.to_string(),
            limit,
            sessions: BTreeMap::new(),
        }
    }

    pub async fn close(self) {
        for (_, session) in self.sessions {
            session.pool.close().await;
        }
    }
}

impl SessionPool for PgSessionPool {
    type Session = PgSession;

    async fn session(&mut self, dbname: Option<&str>) -> Result<&mut PgSession> {
        let dbname = dbname.unwrap_or(&self.default_database).to_string();
        if !self.sessions.contains_key(&dbname) {
            if self.sessions.len() >= self.limit {
                return Err(SyncError::PoolExhausted(self.limit).into());
            }
            let pool = connect_to_database(&self.dsn, &dbname).await?;
            self.sessions.insert(
                dbname.clone(),
                PgSession {
                    dbname: dbname.clone(),
                    pool,
                },
            );
        }
        self.sessions
            .get_mut(&dbname)
            .ok_or_else(|| SyncError::internal(format!("Session on {} vanished", dbname)).into())
    }

    fn default_database(&self) -> &str {
        &self.default_database
    }
}
