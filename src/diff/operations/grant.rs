//! Grant operations

use super::SqlRenderer;
use crate::catalog::grant::Grant;
use crate::catalog::privilege::Privilege;
use crate::render::Statement;

/// Carries the privilege definition whose templates render the statement.
#[derive(Debug, Clone)]
pub enum GrantOperation {
    Grant { grant: Grant, privilege: Privilege },
    Revoke { grant: Grant, privilege: Privilege },
}

impl SqlRenderer for GrantOperation {
    fn to_sql(&self) -> Vec<Statement> {
        let statement = match self {
            GrantOperation::Grant { grant, privilege } => privilege.grant_statement(grant),
            GrantOperation::Revoke { grant, privilege } => privilege.revoke_statement(grant),
        };
        statement.into_iter().collect()
    }

    fn subject(&self) -> String {
        match self {
            GrantOperation::Grant { grant, .. } | GrantOperation::Revoke { grant, .. } => {
                grant.to_string()
            }
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, GrantOperation::Revoke { .. })
    }
}
