use anyhow::Result;
use rolesync::db::session::{Row, Session, SessionPool};
use std::collections::BTreeMap;

/// Session that refuses queries and records executed statements.
///
/// Configurations used with it answer every inspection query with static
/// rows.
#[derive(Default)]
pub struct RecordingSession {
    pub executed: Vec<String>,
}

impl Session for RecordingSession {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        anyhow::bail!("No server to run {}", sql)
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.executed.push(sql.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPool {
    pub sessions: BTreeMap<String, RecordingSession>,
}

impl RecordingPool {
    pub fn executed_on(&self, dbname: &str) -> Vec<&str> {
        self.sessions
            .get(dbname)
            .map(|session| session.executed.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn executed_count(&self) -> usize {
        self.sessions.values().map(|session| session.executed.len()).sum()
    }
}

impl SessionPool for RecordingPool {
    type Session = RecordingSession;

    async fn session(&mut self, dbname: Option<&str>) -> Result<&mut RecordingSession> {
        Ok(self
            .sessions
            .entry(dbname.unwrap_or("postgres").to_string())
            .or_default())
    }

    fn default_database(&self) -> &str {
        "postgres"
    }
}
