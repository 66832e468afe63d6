//! Send planned statements to their database, or just show them

use super::session::{Session, SessionPool};
use crate::catalog::grant::Target;
use crate::error::SyncError;
use crate::render::Statement;
use anyhow::Result;
use console::style;
use tracing::debug;

/// Run `statements` in order and return how many were handled.
///
/// In dry-run mode nothing is sent: every statement is printed as what it
/// would do.
pub async fn execute<P: SessionPool>(
    pool: &mut P,
    statements: &[Statement],
    dry_run: bool,
) -> Result<usize> {
    let mut count = 0;
    for statement in statements {
        let dbname = match &statement.database {
            None => None,
            Some(Target::Named(name)) => Some(name.as_str()),
            Some(Target::All) => {
                return Err(SyncError::internal(format!(
                    "Statement not expanded to databases: {}",
                    statement.message
                ))
                .into());
            }
        };
        let sql = &statement.sql;

        if dry_run {
            println!("{}", style(would(&statement.message)).yellow());
            debug!("Would execute: {}", sql);
        } else {
            let message = if statement.is_destructive() {
                style(&statement.message).red()
            } else {
                style(&statement.message).green()
            };
            println!("{}", message);
            debug!("Executing on {}: {}", dbname.unwrap_or(pool.default_database()), sql);
            pool.session(dbname).await?.execute(sql).await?;
        }
        count += 1;
    }
    Ok(count)
}

/// `Create role x.` becomes `Would create role x.`
pub fn would(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => format!("Would {}{}", first.to_lowercase(), chars.as_str()),
        None => "Would do nothing.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::session::Row;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Recorder {
        executed: Vec<String>,
    }

    impl Session for Recorder {
        async fn query(&mut self, _sql: &str) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&mut self, sql: &str) -> Result<()> {
            self.executed.push(sql.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorders(BTreeMap<String, Recorder>);

    impl SessionPool for Recorders {
        type Session = Recorder;

        async fn session(&mut self, dbname: Option<&str>) -> Result<&mut Recorder> {
            Ok(self.0.entry(dbname.unwrap_or("postgres").to_string()).or_default())
        }

        fn default_database(&self) -> &str {
            "postgres"
        }
    }

    fn plan() -> Vec<Statement> {
        vec![
            Statement::new("Create role x.", "CREATE ROLE \"x\";"),
            Statement::new("Grant connect on app to x.", "GRANT CONNECT ON DATABASE \"app\" TO \"x\";")
                .on(Target::named("app")),
        ]
    }

    #[tokio::test]
    async fn test_statements_go_to_their_database() {
        let mut pool = Recorders::default();
        let count = execute(&mut pool, &plan(), false).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(pool.0["postgres"].executed, vec!["CREATE ROLE \"x\";"]);
        assert_eq!(pool.0["app"].executed.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let mut pool = Recorders::default();
        let count = execute(&mut pool, &plan(), true).await.unwrap();
        assert_eq!(count, 2);
        assert!(pool.0.is_empty());
    }

    #[tokio::test]
    async fn test_unexpanded_statement_is_rejected() {
        let mut pool = Recorders::default();
        let plan = vec![Statement::new("Purge.", "DROP OWNED BY \"x\";").on(Target::All)];
        let err = execute(&mut pool, &plan, false).await.unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), crate::error::EXIT_INTERNAL_ERROR);
    }

    #[test]
    fn test_would() {
        assert_eq!(would("Create role x."), "Would create role x.");
        assert_eq!(would(""), "Would do nothing.");
    }
}
