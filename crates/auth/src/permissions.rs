use core::str::FromStr;

use serde::{Deserialize, Serialize};

use clinic_core::DomainError;

/// Resource area a permission belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionGroup {
    Users,
    Patients,
    Visits,
    Prescriptions,
    Medications,
    LabTests,
    Templates,
    Analytics,
    System,
    Ai,
    Special,
}

macro_rules! permissions {
    ($( $variant:ident => ($token:literal, $group:ident, $desc:literal) ),+ $(,)?) => {
        /// Capability token checked against a role's fixed grant set.
        ///
        /// Tokens are stable dotted strings (`"prescriptions.create"`) so they can
        /// be logged, serialized and compared across releases.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "&'static str", try_from = "String")]
        pub enum Permission {
            $( $variant, )+
        }

        impl Permission {
            pub const ALL: &'static [Permission] = &[ $( Permission::$variant, )+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Permission::$variant => $token, )+
                }
            }

            pub fn group(&self) -> PermissionGroup {
                match self {
                    $( Permission::$variant => PermissionGroup::$group, )+
                }
            }

            pub fn description(&self) -> &'static str {
                match self {
                    $( Permission::$variant => $desc, )+
                }
            }
        }
    };
}

permissions! {
    ViewUsers => ("users.view", Users, "List and view staff accounts"),
    CreateUsers => ("users.create", Users, "Create staff accounts"),
    EditUsers => ("users.edit", Users, "Edit staff accounts and roles"),
    DeleteUsers => ("users.delete", Users, "Deactivate or delete staff accounts"),

    ViewPatients => ("patients.view", Patients, "View patient records"),
    CreatePatients => ("patients.create", Patients, "Register new patients"),
    EditPatients => ("patients.edit", Patients, "Edit patient records"),
    DeletePatients => ("patients.delete", Patients, "Delete patient records"),

    ViewVisits => ("visits.view", Visits, "View visits"),
    CreateVisits => ("visits.create", Visits, "Record new visits"),
    EditVisits => ("visits.edit", Visits, "Edit visits"),
    DeleteVisits => ("visits.delete", Visits, "Delete visits"),

    ViewPrescriptions => ("prescriptions.view", Prescriptions, "View prescriptions"),
    CreatePrescriptions => ("prescriptions.create", Prescriptions, "Write new prescriptions"),
    EditPrescriptions => ("prescriptions.edit", Prescriptions, "Edit prescriptions"),
    DeletePrescriptions => ("prescriptions.delete", Prescriptions, "Delete prescriptions"),
    PrintPrescriptions => ("prescriptions.print", Prescriptions, "Print or export prescriptions"),

    ViewMedications => ("medications.view", Medications, "Browse the medication catalogue"),
    ManageMedications => ("medications.manage", Medications, "Add and edit medications"),

    ViewLabTests => ("lab_tests.view", LabTests, "Browse lab tests"),
    ManageLabTests => ("lab_tests.manage", LabTests, "Add and edit lab tests"),

    ViewTemplates => ("templates.view", Templates, "View prescription templates"),
    CreateTemplates => ("templates.create", Templates, "Create prescription templates"),
    EditTemplates => ("templates.edit", Templates, "Edit prescription templates"),
    DeleteTemplates => ("templates.delete", Templates, "Delete prescription templates"),

    ViewAnalytics => ("analytics.view", Analytics, "View clinic analytics"),
    ExportReports => ("analytics.export", Analytics, "Export reports"),

    ManageSettings => ("system.settings", System, "Change clinic settings"),
    ViewActivityLogs => ("system.activity_logs", System, "Read the activity log"),
    ManageBackups => ("system.backups", System, "Create and restore backups"),

    UseAiAssistant => ("ai.use", Ai, "Use the AI assistant"),
    ConfigureAi => ("ai.configure", Ai, "Configure AI providers"),

    ViewAllData => ("special.view_all_data", Special, "Bypass ownership filtering on reads"),
    ResetPasswords => ("special.reset_passwords", Special, "Reset another account's password"),
    UnlockAccounts => ("special.unlock_accounts", Special, "Clear an account lockout"),
}

impl Permission {
    pub fn in_group(group: PermissionGroup) -> impl Iterator<Item = Permission> {
        Permission::ALL.iter().copied().filter(move |p| p.group() == group)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown permission '{s}'")))
    }
}

impl From<Permission> for &'static str {
    fn from(value: Permission) -> Self {
        value.as_str()
    }
}

impl TryFrom<String> for Permission {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
