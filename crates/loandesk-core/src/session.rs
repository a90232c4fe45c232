//! Session snapshot shared by request construction and navigation guards

use serde::{Deserialize, Serialize};

/// Organization the signed-in employee belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    /// Identifier used in routes and the `organization` header
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl OrganizationMembership {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub employee_id: Option<String>,
    #[serde(default)]
    pub organizations: Vec<OrganizationMembership>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub loading: bool,
}

impl SessionSnapshot {
    /// Whether the employee belongs to `organization`
    #[must_use]
    pub fn is_member_of(&self, organization: &str) -> bool {
        self.organizations.iter().any(|m| m.id == organization)
    }

    /// Workspace to land on after login
    #[must_use]
    pub fn default_organization(&self) -> Option<&OrganizationMembership> {
        self.organizations.first()
    }
}
