use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Boss,
    Technician,
    #[default]
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Boss => "boss",
            Role::Technician => "technician",
            Role::Customer => "customer",
        }
    }

    /// Missing or unrecognised roles get the least privileged one.
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "boss" => Role::Boss,
            "technician" | "tech" => Role::Technician,
            _ => Role::Customer,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Boss)
    }

    pub fn can_send_or_reject_proposals(&self) -> bool {
        self.is_staff()
    }

    pub fn can_approve_proposals(&self) -> bool {
        matches!(self, Role::Admin | Role::Boss | Role::Customer)
    }

    pub fn can_initiate_payment(&self) -> bool {
        matches!(self, Role::Admin | Role::Boss | Role::Customer)
    }

    pub fn can_update_jobs(&self) -> bool {
        matches!(self, Role::Admin | Role::Boss | Role::Technician)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_is_customer() {
        assert_eq!(Role::from_str("authenticated"), Role::Customer);
        assert_eq!(Role::from_str(""), Role::Customer);
    }

    #[test]
    fn boss_and_admin_are_distinct_staff_roles() {
        assert_eq!(Role::from_str("Boss"), Role::Boss);
        assert!(Role::Boss.is_staff());
        assert!(Role::Admin.is_staff());
        assert!(!Role::Technician.is_staff());
    }

    #[test]
    fn technicians_cannot_approve_or_pay() {
        assert!(!Role::Technician.can_approve_proposals());
        assert!(!Role::Technician.can_initiate_payment());
        assert!(Role::Technician.can_update_jobs());
        assert!(!Role::Customer.can_update_jobs());
    }
}
