//! Roles, grants and privileges, wanted or observed

pub mod grant;
pub mod inspector;
pub mod privilege;
pub mod role;
pub mod topology;

pub use grant::{Acl, Grant, Target};
pub use inspector::{Blacklist, InspectQueries, Inspector, ObservedState, QuerySource};
pub use privilege::{Privilege, PrivilegeCatalog, PrivilegeKind};
pub use role::{Role, RoleOptions, RoleSet};
pub use topology::Topology;
