pub mod access;
pub mod activity;
pub mod change;
pub mod fields;
pub mod permission;
pub mod resource;
pub mod statistics;

pub use access::AccessControlEntry;
pub use activity::{ActivityAction, ActivityCategory, ActivityEntry, NewActivity, Severity};
pub use change::{ChangeSet, FieldChange};
pub use permission::{AccessType, Actor, OrgRole, PermissionLevel};
pub use resource::{NewResource, Resource, ResourceKind, ResourceStatus, StatusOp};
pub use statistics::ResourceStatistics;
