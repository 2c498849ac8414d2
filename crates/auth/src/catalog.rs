//! Fixed role → permission table.

use std::collections::HashSet;

use serde::Serialize;

use crate::{Permission, PermissionGroup, Role};

/// Immutable mapping of every role to its granted permissions.
///
/// Built once at startup and shared (`Arc`) afterwards; nothing mutates it.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    super_admin: HashSet<Permission>,
    doctor: HashSet<Permission>,
    assistant: HashSet<Permission>,
}

impl PermissionCatalog {
    /// The clinic's standard grant table.
    pub fn standard() -> Self {
        Self {
            super_admin: standard_grants(Role::SuperAdmin),
            doctor: standard_grants(Role::Doctor),
            assistant: standard_grants(Role::Assistant),
        }
    }

    pub fn permissions_for(&self, role: Role) -> &HashSet<Permission> {
        match role {
            Role::SuperAdmin => &self.super_admin,
            Role::Doctor => &self.doctor,
            Role::Assistant => &self.assistant,
        }
    }

    pub fn grants(&self, role: Role, permission: Permission) -> bool {
        self.permissions_for(role).contains(&permission)
    }

    /// Roles that hold `permission`.
    pub fn roles_granting(&self, permission: Permission) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.grants(*role, permission))
            .collect()
    }

    /// Audit view of the whole table, sorted for stable output.
    pub fn describe(&self) -> CatalogDescription {
        let roles = Role::ALL
            .into_iter()
            .map(|role| {
                let mut permissions: Vec<&'static str> = self
                    .permissions_for(role)
                    .iter()
                    .map(|p| p.as_str())
                    .collect();
                permissions.sort_unstable();
                RoleDefinition {
                    role,
                    name: role.display_name(),
                    description: role.description(),
                    permissions,
                }
            })
            .collect();

        let permissions = Permission::ALL
            .iter()
            .map(|p| PermissionDefinition {
                name: p.as_str(),
                group: p.group(),
                description: p.description(),
                granted_to: self.roles_granting(*p),
            })
            .collect();

        CatalogDescription { roles, permissions }
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_grants(role: Role) -> HashSet<Permission> {
    use Permission::*;

    match role {
        // Administrators see and manage everything except writing prescriptions:
        // a prescription must be authored by a treating doctor.
        Role::SuperAdmin => Permission::ALL
            .iter()
            .copied()
            .filter(|p| *p != CreatePrescriptions)
            .collect(),
        Role::Doctor => {
            let mut set: HashSet<Permission> = [
                ViewPatients,
                CreatePatients,
                EditPatients,
                ViewVisits,
                CreateVisits,
                EditVisits,
                ViewAnalytics,
                ExportReports,
                UseAiAssistant,
            ]
            .into_iter()
            .collect();
            for group in [
                PermissionGroup::Prescriptions,
                PermissionGroup::Medications,
                PermissionGroup::LabTests,
                PermissionGroup::Templates,
            ] {
                set.extend(Permission::in_group(group));
            }
            set
        }
        Role::Assistant => [
            ViewPatients,
            CreatePatients,
            EditPatients,
            ViewVisits,
            CreateVisits,
            EditVisits,
            ViewPrescriptions,
            PrintPrescriptions,
            ViewMedications,
            ViewLabTests,
            ViewTemplates,
        ]
        .into_iter()
        .collect(),
    }
}

/// Role definition with its granted permissions (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub role: Role,
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
}

/// Permission definition (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct PermissionDefinition {
    pub name: &'static str,
    pub group: PermissionGroup,
    pub description: &'static str,
    pub granted_to: Vec<Role>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogDescription {
    pub roles: Vec<RoleDefinition>,
    pub permissions: Vec<PermissionDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_cannot_create_prescriptions() {
        let catalog = PermissionCatalog::standard();
        assert!(!catalog.grants(Role::SuperAdmin, Permission::CreatePrescriptions));
        assert_eq!(
            catalog.permissions_for(Role::SuperAdmin).len(),
            Permission::ALL.len() - 1
        );
    }

    #[test]
    fn doctor_prescribes_but_does_not_manage_users() {
        let catalog = PermissionCatalog::standard();
        assert!(catalog.grants(Role::Doctor, Permission::CreatePrescriptions));
        assert!(!catalog.grants(Role::Doctor, Permission::CreateUsers));
        assert!(catalog.grants(Role::SuperAdmin, Permission::CreateUsers));
    }

    #[test]
    fn assistant_is_a_subset_of_doctor() {
        let catalog = PermissionCatalog::standard();
        let doctor = catalog.permissions_for(Role::Doctor);
        assert!(catalog.permissions_for(Role::Assistant).is_subset(doctor));
        assert!(!catalog.grants(Role::Assistant, Permission::CreatePrescriptions));
    }

    #[test]
    fn only_doctors_can_write_prescriptions() {
        let catalog = PermissionCatalog::standard();
        assert_eq!(
            catalog.roles_granting(Permission::CreatePrescriptions),
            vec![Role::Doctor]
        );
    }

    #[test]
    fn description_lists_every_role_and_permission() {
        let description = PermissionCatalog::standard().describe();
        assert_eq!(description.roles.len(), 3);
        assert_eq!(description.permissions.len(), Permission::ALL.len());
        let json = serde_json::to_value(&description).unwrap();
        assert_eq!(json["roles"][1]["role"], "doctor");
    }
}
