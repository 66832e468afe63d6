//! Role operations

use super::SqlRenderer;
use crate::catalog::role::Role;
use crate::render::Statement;

#[derive(Debug, Clone)]
pub enum RoleOperation {
    Create { role: Role },
    Alter { current: Role, wanted: Role },
    Drop { role: Role },
}

impl SqlRenderer for RoleOperation {
    fn to_sql(&self) -> Vec<Statement> {
        match self {
            RoleOperation::Create { role } => role.create(),
            RoleOperation::Alter { current, wanted } => current.alter(wanted),
            RoleOperation::Drop { role } => role.drop(),
        }
    }

    fn subject(&self) -> String {
        match self {
            RoleOperation::Create { role } | RoleOperation::Drop { role } => role.name.clone(),
            RoleOperation::Alter { current, .. } => current.name.clone(),
        }
    }

    fn is_destructive(&self) -> bool {
        matches!(self, RoleOperation::Drop { .. })
    }
}
