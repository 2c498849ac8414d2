use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use clinic_core::UserId;

use crate::ownership::{Owned, ResourceKind, Visibility, visibility};
use crate::{Permission, PermissionCatalog, Principal, Role};

/// Text shown to a caller who was denied. Details go to the log only.
pub const ACCESS_DENIED_MESSAGE: &str = "You do not have permission to perform this action.";

/// Authorization denial, carrying the requirement that was not met.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    MissingPermission { permission: Permission, role: Role },

    #[error("forbidden: role '{role}' holds none of {required:?}")]
    MissingAnyPermission { required: Vec<Permission>, role: Role },

    #[error("forbidden: role '{actual}' is not one of {allowed:?}")]
    RoleNotAllowed { allowed: Vec<Role>, actual: Role },

    #[error("forbidden: {kind:?} is not owned by user {user_id}")]
    NotOwner { kind: ResourceKind, user_id: UserId },
}

impl AuthzError {
    pub fn user_message(&self) -> &'static str {
        ACCESS_DENIED_MESSAGE
    }
}

/// Permission, role and ownership checks over a shared [`PermissionCatalog`].
///
/// - No IO
/// - No panics
/// - Decisions depend only on the principal's role and the catalog
#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    catalog: Arc<PermissionCatalog>,
}

impl AuthorizationGuard {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn has_permission(&self, principal: &Principal, permission: Permission) -> bool {
        self.catalog.grants(principal.role, permission)
    }

    pub fn has_any_permission(&self, principal: &Principal, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(principal, *p))
    }

    /// `true` for an empty list.
    pub fn has_all_permissions(&self, principal: &Principal, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(principal, *p))
    }

    pub fn require_permission(&self, principal: &Principal, permission: Permission) -> Result<(), AuthzError> {
        if self.has_permission(principal, permission) {
            return Ok(());
        }
        deny(
            principal,
            AuthzError::MissingPermission {
                permission,
                role: principal.role,
            },
        )
    }

    pub fn require_any_permission(
        &self,
        principal: &Principal,
        permissions: &[Permission],
    ) -> Result<(), AuthzError> {
        if self.has_any_permission(principal, permissions) {
            return Ok(());
        }
        deny(
            principal,
            AuthzError::MissingAnyPermission {
                required: permissions.to_vec(),
                role: principal.role,
            },
        )
    }

    pub fn require_role(&self, principal: &Principal, allowed: &[Role]) -> Result<(), AuthzError> {
        if allowed.contains(&principal.role) {
            return Ok(());
        }
        deny(
            principal,
            AuthzError::RoleNotAllowed {
                allowed: allowed.to_vec(),
                actual: principal.role,
            },
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // Row-level ownership
    // ─────────────────────────────────────────────────────────────────────

    pub fn visibility(&self, principal: &Principal, kind: ResourceKind) -> Visibility {
        visibility(principal.role, kind)
    }

    /// Keep only the rows `principal` may see. Order is preserved; rows with
    /// no value in the owner field are dropped.
    pub fn filter_by_ownership<T, I>(&self, items: I, kind: ResourceKind, principal: &Principal) -> Vec<T>
    where
        T: Owned,
        I: IntoIterator<Item = T>,
    {
        let rule = self.visibility(principal, kind);
        items
            .into_iter()
            .filter(|item| rule.admits(item, principal.user_id))
            .collect()
    }

    /// Single-row form of [`Self::filter_by_ownership`], for checks before mutation.
    pub fn is_owner_or_elevated<T>(&self, item: &T, kind: ResourceKind, principal: &Principal) -> bool
    where
        T: Owned + ?Sized,
    {
        self.visibility(principal, kind).admits(item, principal.user_id)
    }

    pub fn require_owner_or_elevated<T>(
        &self,
        item: &T,
        kind: ResourceKind,
        principal: &Principal,
    ) -> Result<(), AuthzError>
    where
        T: Owned + ?Sized,
    {
        if self.is_owner_or_elevated(item, kind, principal) {
            return Ok(());
        }
        deny(
            principal,
            AuthzError::NotOwner {
                kind,
                user_id: principal.user_id,
            },
        )
    }

    /// Explain why a permission check would pass or fail.
    ///
    /// Answers "why was this request allowed/denied?" for audit screens and
    /// support tooling. Evaluates the same rule as [`Self::has_permission`].
    pub fn explain(&self, principal: &Principal, required: Permission) -> AuthorizationExplanation {
        let mut effective_permissions: Vec<&'static str> = self
            .catalog
            .permissions_for(principal.role)
            .iter()
            .map(|p| p.as_str())
            .collect();
        effective_permissions.sort_unstable();

        let state = PrincipalState {
            user_id: principal.user_id,
            username: principal.username.clone(),
            role: principal.role,
            effective_permissions,
        };

        if self.has_permission(principal, required) {
            return AuthorizationExplanation {
                required_permission: required.as_str(),
                granted: true,
                reason: format!(
                    "Role '{}' is granted '{}'",
                    principal.role.as_str(),
                    required.as_str()
                ),
                principal: state,
                denial_reason: None,
            };
        }

        let granting_roles = self.catalog.roles_granting(required);
        let suggestions = if granting_roles.is_empty() {
            vec![format!("No role is granted '{}'", required.as_str())]
        } else {
            vec![format!(
                "Sign in with an account holding one of these roles: {}",
                granting_roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )]
        };

        AuthorizationExplanation {
            required_permission: required.as_str(),
            granted: false,
            reason: format!(
                "Role '{}' is not granted '{}'",
                principal.role.as_str(),
                required.as_str()
            ),
            principal: state,
            denial_reason: Some(DenialReason {
                kind: DenialKind::MissingPermission,
                message: format!("Missing required permission: '{}'", required.as_str()),
                granting_roles,
                suggestions,
            }),
        }
    }
}

fn deny(principal: &Principal, err: AuthzError) -> Result<(), AuthzError> {
    tracing::warn!(
        user_id = %principal.user_id,
        role = %principal.role,
        reason = %err,
        "access denied"
    );
    Err(err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: &'static str,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub effective_permissions: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub granting_roles: Vec<Role>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MissingPermission,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use clinic_core::SessionId;

    use super::*;
    use crate::ownership::OwnerFields;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: UserId::new(),
            username: "someone".to_string(),
            role,
            full_name: "Some One".to_string(),
            email: None,
            session_id: SessionId::generate(),
            logged_in_at: Utc::now(),
        }
    }

    fn guard() -> AuthorizationGuard {
        AuthorizationGuard::new(Arc::new(PermissionCatalog::standard()))
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        fields: OwnerFields,
    }

    impl Owned for Row {
        fn owner_fields(&self) -> OwnerFields {
            self.fields
        }
    }

    fn authored_by(id: u32, doctor: Option<UserId>) -> Row {
        Row {
            id,
            fields: OwnerFields {
                doctor_id: doctor,
                created_by: None,
            },
        }
    }

    fn created_by(id: u32, staff: Option<UserId>) -> Row {
        Row {
            id,
            fields: OwnerFields {
                doctor_id: None,
                created_by: staff,
            },
        }
    }

    #[test]
    fn super_admin_is_denied_prescribing() {
        let g = guard();
        let admin = principal(Role::SuperAdmin);
        let err = g
            .require_permission(&admin, Permission::CreatePrescriptions)
            .unwrap_err();
        assert_eq!(
            err,
            AuthzError::MissingPermission {
                permission: Permission::CreatePrescriptions,
                role: Role::SuperAdmin
            }
        );
        assert_eq!(err.user_message(), ACCESS_DENIED_MESSAGE);
        assert!(g.require_permission(&principal(Role::Doctor), Permission::CreatePrescriptions).is_ok());
    }

    #[test]
    fn assistant_cannot_touch_system_settings() {
        let g = guard();
        let assistant = principal(Role::Assistant);
        assert!(!g.has_any_permission(
            &assistant,
            &[Permission::ManageSettings, Permission::CreateUsers, Permission::ViewActivityLogs]
        ));
        assert!(g.require_any_permission(&assistant, &[Permission::ViewPatients, Permission::ManageSettings]).is_ok());
        assert!(g.has_all_permissions(&assistant, &[]));
    }

    #[test]
    fn role_gate() {
        let g = guard();
        let doctor = principal(Role::Doctor);
        assert!(g.require_role(&doctor, &[Role::Doctor, Role::SuperAdmin]).is_ok());
        assert!(matches!(
            g.require_role(&doctor, &[Role::SuperAdmin]),
            Err(AuthzError::RoleNotAllowed { actual: Role::Doctor, .. })
        ));
    }

    #[test]
    fn doctor_sees_only_own_prescriptions() {
        let g = guard();
        let doctor = principal(Role::Doctor);
        let rows = vec![
            authored_by(1, Some(doctor.user_id)),
            authored_by(2, Some(UserId::new())),
            authored_by(3, None),
            authored_by(4, Some(doctor.user_id)),
        ];
        let visible: Vec<u32> = g
            .filter_by_ownership(rows, ResourceKind::Prescription, &doctor)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(visible, vec![1, 4]);
    }

    #[test]
    fn doctor_sees_every_patient_and_assistant_only_their_own() {
        let g = guard();
        let doctor = principal(Role::Doctor);
        let assistant = principal(Role::Assistant);
        let rows = vec![
            created_by(1, Some(assistant.user_id)),
            created_by(2, Some(doctor.user_id)),
            created_by(3, None),
        ];
        assert_eq!(g.filter_by_ownership(rows.clone(), ResourceKind::Patient, &doctor).len(), 3);
        let mine = g.filter_by_ownership(&rows, ResourceKind::Patient, &assistant);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, 1);
    }

    #[test]
    fn assistant_sees_no_authored_rows() {
        let g = guard();
        let assistant = principal(Role::Assistant);
        let rows = vec![authored_by(1, Some(UserId::new())), authored_by(2, None)];
        assert!(g.filter_by_ownership(rows, ResourceKind::Template, &assistant).is_empty());
    }

    #[test]
    fn super_admin_bypasses_every_owner_field() {
        let g = guard();
        let admin = principal(Role::SuperAdmin);
        let rows = vec![
            authored_by(1, Some(UserId::new())),
            authored_by(2, None),
            created_by(3, None),
        ];
        for kind in [ResourceKind::Prescription, ResourceKind::Template, ResourceKind::Visit] {
            assert_eq!(g.filter_by_ownership(rows.clone(), kind, &admin).len(), 3);
        }
        assert_eq!(g.visibility(&admin, ResourceKind::Patient), Visibility::All);
    }

    #[test]
    fn single_row_check_mirrors_filter() {
        let g = guard();
        let doctor = principal(Role::Doctor);
        let other = authored_by(1, Some(UserId::new()));
        assert!(matches!(
            g.require_owner_or_elevated(&other, ResourceKind::Prescription, &doctor),
            Err(AuthzError::NotOwner { kind: ResourceKind::Prescription, .. })
        ));
        assert!(g.is_owner_or_elevated(&other, ResourceKind::Prescription, &principal(Role::SuperAdmin)));
    }

    #[test]
    fn explanation_names_granting_roles() {
        let g = guard();
        let assistant = principal(Role::Assistant);
        let explanation = g.explain(&assistant, Permission::CreatePrescriptions);
        assert!(!explanation.granted);
        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.granting_roles, vec![Role::Doctor]);

        let granted = g.explain(&principal(Role::Doctor), Permission::CreatePrescriptions);
        assert!(granted.granted);
        assert!(granted.denial_reason.is_none());
        let json = serde_json::to_value(&granted).unwrap();
        assert_eq!(json["principal"]["role"], "doctor");
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::SuperAdmin), Just(Role::Doctor), Just(Role::Assistant)]
    }

    fn any_kind() -> impl Strategy<Value = ResourceKind> {
        prop_oneof![
            Just(ResourceKind::Patient),
            Just(ResourceKind::Visit),
            Just(ResourceKind::Prescription),
            Just(ResourceKind::Template),
        ]
    }

    proptest! {
        #[test]
        fn filter_is_an_order_preserving_subset(
            role in any_role(),
            kind in any_kind(),
            owners in proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()), 0..24),
        ) {
            let g = guard();
            let me = principal(role);
            let stranger = UserId::new();
            let pick = |present: bool, mine: bool| present.then(|| if mine { me.user_id } else { stranger });

            let rows: Vec<Row> = owners
                .iter()
                .enumerate()
                .map(|(i, (dp, dm, cp, cm))| Row {
                    id: i as u32,
                    fields: OwnerFields { doctor_id: pick(*dp, *dm), created_by: pick(*cp, *cm) },
                })
                .collect();

            let kept = g.filter_by_ownership(rows.clone(), kind, &me);
            let ids: Vec<u32> = kept.iter().map(|r| r.id).collect();
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            prop_assert_eq!(&ids, &sorted);

            if role == Role::SuperAdmin {
                prop_assert_eq!(kept.len(), rows.len());
            }
            for row in &kept {
                prop_assert!(g.is_owner_or_elevated(row, kind, &me));
            }
            for row in rows.iter().filter(|r| !ids.contains(&r.id)) {
                prop_assert!(!g.is_owner_or_elevated(row, kind, &me));
            }
        }
    }
}
