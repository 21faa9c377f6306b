use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered permission levels carried by access control entries.
///
/// Checking "at least edit" compares rank indices, so a higher grant always
/// satisfies a lower requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    View,
    Edit,
    Admin,
}

impl PermissionLevel {
    pub fn rank(&self) -> u8 {
        match self {
            PermissionLevel::View => 0,
            PermissionLevel::Edit => 1,
            PermissionLevel::Admin => 2,
        }
    }

    /// True when this level meets or exceeds the required one.
    pub fn satisfies(&self, required: PermissionLevel) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::View => "view",
            PermissionLevel::Edit => "edit",
            PermissionLevel::Admin => "admin",
        }
    }
}

impl std::str::FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(PermissionLevel::View),
            "edit" => Ok(PermissionLevel::Edit),
            "admin" => Ok(PermissionLevel::Admin),
            other => Err(format!("unknown permission level: {}", other)),
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a grant was requested explicitly or derived from a grant on the
/// resource's immediate container/parent at grant time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Direct,
    Inherited,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Direct => "direct",
            AccessType::Inherited => "inherited",
        }
    }
}

impl std::str::FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(AccessType::Direct),
            "inherited" => Ok(AccessType::Inherited),
            other => Err(format!("unknown access type: {}", other)),
        }
    }
}

/// Organization-scoped role on the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Member,
    Admin,
    Superadmin,
}

impl OrgRole {
    /// Admins and superadmins skip the entry table entirely.
    pub fn bypasses_entries(&self) -> bool {
        matches!(self, OrgRole::Admin | OrgRole::Superadmin)
    }
}

/// Already-authenticated caller identity, supplied by the external auth layer.
/// The core never issues or validates credentials.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub org_role: OrgRole,
}

impl Actor {
    pub fn new(user_id: Uuid, organization_id: Uuid, org_role: OrgRole) -> Self {
        Self { user_id, organization_id, org_role }
    }
}
