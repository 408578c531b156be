mod capability;
#[cfg(feature = "app")]
pub(crate) mod commands;
mod gate;

pub use capability::{Capability, Platform};
pub use gate::{
    required_satisfied, PermissionBroker, PermissionGate, PermissionOutcome, PermissionRecord,
    PermissionRow, PermissionSet, PermissionSummary, PermissionsView,
};
