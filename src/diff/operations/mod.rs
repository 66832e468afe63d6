//! Operations of a synchronization plan
//!
//! Each operation renders to the statements that carry it out, in order.

use crate::render::Statement;

pub use grant::*;
pub use role::*;

pub mod grant;
pub mod role;

#[derive(Debug, Clone)]
pub enum MigrationStep {
    Role(RoleOperation),
    Grant(GrantOperation),
}

/// Trait for rendering SQL from operations
pub trait SqlRenderer {
    fn to_sql(&self) -> Vec<Statement>;
    /// Name of the role or grant the operation is about, for logs.
    fn subject(&self) -> String;
    fn is_destructive(&self) -> bool {
        false
    }
}

impl SqlRenderer for MigrationStep {
    fn to_sql(&self) -> Vec<Statement> {
        match self {
            MigrationStep::Role(op) => op.to_sql(),
            MigrationStep::Grant(op) => op.to_sql(),
        }
    }

    fn subject(&self) -> String {
        match self {
            MigrationStep::Role(op) => op.subject(),
            MigrationStep::Grant(op) => op.subject(),
        }
    }

    fn is_destructive(&self) -> bool {
        match self {
            MigrationStep::Role(op) => op.is_destructive(),
            MigrationStep::Grant(op) => op.is_destructive(),
        }
    }
}

impl MigrationStep {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            MigrationStep::Role(RoleOperation::Create { .. })
                | MigrationStep::Grant(GrantOperation::Grant { .. })
        )
    }
}
