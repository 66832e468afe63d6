//! Databases, their schemas and the owners of objects in each schema

use crate::error::SyncError;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    databases: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database(&mut self, dbname: &str) {
        self.databases.entry(dbname.to_string()).or_default();
    }

    pub fn add_schema<I, S>(&mut self, dbname: &str, schema: &str, owners: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases
            .entry(dbname.to_string())
            .or_default()
            .entry(schema.to_string())
            .or_default()
            .extend(owners.into_iter().map(Into::into));
    }

    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    pub fn contains_database(&self, dbname: &str) -> bool {
        self.databases.contains_key(dbname)
    }

    pub fn schemas(&self, dbname: &str) -> Result<impl Iterator<Item = &str>, SyncError> {
        self.databases
            .get(dbname)
            .map(|schemas| schemas.keys().map(String::as_str))
            .ok_or_else(|| SyncError::UnknownDatabase(dbname.to_string()))
    }

    pub fn contains_schema(&self, dbname: &str, schema: &str) -> bool {
        self.databases
            .get(dbname)
            .is_some_and(|schemas| schemas.contains_key(schema))
    }

    pub fn owners(&self, dbname: &str, schema: &str) -> Result<&BTreeSet<String>, SyncError> {
        self.databases
            .get(dbname)
            .and_then(|schemas| schemas.get(schema))
            .ok_or_else(|| SyncError::UnknownSchema {
                database: dbname.to_string(),
                schema: schema.to_string(),
            })
    }

    /// Every owner of any schema of `dbname`.
    pub fn database_owners(&self, dbname: &str) -> Result<BTreeSet<&str>, SyncError> {
        self.databases
            .get(dbname)
            .map(|schemas| schemas.values().flatten().map(String::as_str).collect())
            .ok_or_else(|| SyncError::UnknownDatabase(dbname.to_string()))
    }

    /// Restrict owners of every schema with `keep`.
    pub fn retain_owners(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for schemas in self.databases.values_mut() {
            for owners in schemas.values_mut() {
                owners.retain(|owner| keep(owner));
            }
        }
    }
}
