//! Ownership rules for row-level visibility.
//!
//! Which field decides ownership depends on the resource:
//!
//! | resource       | owner field                 |
//! |----------------|-----------------------------|
//! | prescription   | authoring doctor (`doctor_id`) |
//! | template       | authoring doctor (`doctor_id`) |
//! | patient        | creating staff (`created_by`)  |
//! | visit          | creating staff (`created_by`)  |
//!
//! SuperAdmin sees everything. Doctors additionally see every patient
//! regardless of who registered them.

use serde::{Deserialize, Serialize};

use clinic_core::UserId;

use crate::Role;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Patient,
    Visit,
    Prescription,
    Template,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerField {
    DoctorId,
    CreatedBy,
}

impl ResourceKind {
    pub fn owner_field(&self) -> OwnerField {
        match self {
            ResourceKind::Prescription | ResourceKind::Template => OwnerField::DoctorId,
            ResourceKind::Patient | ResourceKind::Visit => OwnerField::CreatedBy,
        }
    }
}

/// Ownership-relevant fields of a row. Absent fields never match.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct OwnerFields {
    pub doctor_id: Option<UserId>,
    pub created_by: Option<UserId>,
}

impl OwnerFields {
    pub fn get(&self, field: OwnerField) -> Option<UserId> {
        match field {
            OwnerField::DoctorId => self.doctor_id,
            OwnerField::CreatedBy => self.created_by,
        }
    }
}

/// Implemented by rows subject to ownership filtering.
pub trait Owned {
    fn owner_fields(&self) -> OwnerFields;
}

impl<T: Owned + ?Sized> Owned for &T {
    fn owner_fields(&self) -> OwnerFields {
        (**self).owner_fields()
    }
}

/// What a caller may see of one resource kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "field", rename_all = "snake_case")]
pub enum Visibility {
    All,
    OwnedOnly(OwnerField),
}

/// Visibility rule for one role and resource kind.
pub fn visibility(role: Role, kind: ResourceKind) -> Visibility {
    match (role, kind) {
        (Role::SuperAdmin, _) => Visibility::All,
        (Role::Doctor, ResourceKind::Patient) => Visibility::All,
        _ => Visibility::OwnedOnly(kind.owner_field()),
    }
}

impl Visibility {
    pub fn admits<T: Owned + ?Sized>(&self, item: &T, user_id: UserId) -> bool {
        match self {
            Visibility::All => true,
            Visibility::OwnedOnly(field) => item.owner_fields().get(*field) == Some(user_id),
        }
    }
}
