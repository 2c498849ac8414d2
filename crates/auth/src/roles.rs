use core::str::FromStr;

use serde::{Deserialize, Serialize};

use clinic_core::DomainError;

/// Staff role used for RBAC.
///
/// The set is closed: every role-keyed decision is an exhaustive `match`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Doctor,
    Assistant,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::SuperAdmin, Role::Doctor, Role::Assistant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Doctor => "doctor",
            Role::Assistant => "assistant",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::Doctor => "Doctor",
            Role::Assistant => "Assistant",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Clinic administrator: manages staff, settings and data, but does not prescribe",
            Role::Doctor => "Treating physician: owns prescriptions and templates, sees every patient",
            Role::Assistant => "Front-desk and nursing staff: registers patients and visits, prints prescriptions",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown role '{s}'")))
    }
}
