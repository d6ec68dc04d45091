// Roles, the permission table checked by the catalog and the API, and the
// admin-managed role grants that override the role a caller arrives with.

use chrono::{DateTime, Utc};
use odyssey_common::store::{Collection, Document};
use odyssey_common::{OdysseyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageCourses,
    ManageExercises,
    ManageRoles,
    SubmitCode,
    ViewStatistics,
}

impl Role {
    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;
        match (self, permission) {
            (_, SubmitCode | ViewStatistics) => true,
            (Role::Instructor | Role::Admin, ManageCourses | ManageExercises) => true,
            (Role::Admin, ManageRoles) => true,
            _ => false,
        }
    }

    /// Instructors and admins see every course without enrolling
    pub fn bypasses_enrollment(self) -> bool {
        matches!(self, Role::Instructor | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Instructor => "INSTRUCTOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = OdysseyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STUDENT" => Ok(Role::Student),
            "INSTRUCTOR" => Ok(Role::Instructor),
            "ADMIN" => Ok(Role::Admin),
            other => Err(OdysseyError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

pub fn authorize(principal: &Principal, permission: Permission) -> Result<()> {
    if principal.role.allows(permission) {
        Ok(())
    } else {
        Err(OdysseyError::Forbidden(format!(
            "Role {} may not {:?}",
            principal.role, permission
        )))
    }
}

/// Role assigned to a user by an administrator, keyed by user id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGrant {
    pub id: String,
    pub role: Role,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
}

impl Document for RoleGrant {
    const COLLECTION: &'static str = "role_grants";

    fn id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Clone)]
pub struct RoleDirectory {
    grants: Collection<RoleGrant>,
}

impl RoleDirectory {
    pub fn new(grants: Collection<RoleGrant>) -> Self {
        Self { grants }
    }

    /// Give `user_id` a role; admin only, replaces any earlier grant
    #[instrument(skip(self), fields(admin_id = %principal.user_id))]
    pub async fn assign_role(
        &self,
        principal: &Principal,
        user_id: &str,
        role: Role,
    ) -> Result<RoleGrant> {
        authorize(principal, Permission::ManageRoles)?;
        if user_id.trim().is_empty() {
            return Err(OdysseyError::Validation("user id must not be empty".to_string()));
        }

        let grant = self
            .grants
            .save(RoleGrant {
                id: user_id.to_string(),
                role,
                granted_by: principal.user_id.clone(),
                granted_at: Utc::now(),
            })
            .await?;
        info!(user_id = %user_id, role = %role, "Role granted");
        Ok(grant)
    }

    pub async fn granted_role(&self, user_id: &str) -> Result<Option<Role>> {
        Ok(self.grants.find_by_id(user_id).await?.map(|g| g.role))
    }

    /// Apply the user's grant, if any, to an authenticated caller
    pub async fn resolve(&self, mut principal: Principal) -> Result<Principal> {
        if let Some(role) = self.granted_role(&principal.user_id).await? {
            principal.role = role;
        }
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;

    #[test]
    fn test_permission_table() {
        assert!(Role::Student.allows(Permission::SubmitCode));
        assert!(Role::Student.allows(Permission::ViewStatistics));
        assert!(!Role::Student.allows(Permission::ManageCourses));
        assert!(!Role::Student.allows(Permission::ManageExercises));

        assert!(Role::Instructor.allows(Permission::ManageExercises));
        assert!(!Role::Instructor.allows(Permission::ManageRoles));

        assert!(Role::Admin.allows(Permission::ManageRoles));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!(" ADMIN ".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!(
            "MODERATOR".parse::<Role>(),
            Err(OdysseyError::Validation(_))
        ));
    }

    #[test]
    fn test_authorize_denies_with_forbidden() {
        let student = Principal::new("u1", Role::Student);
        assert!(authorize(&student, Permission::SubmitCode).is_ok());
        assert!(matches!(
            authorize(&student, Permission::ManageCourses),
            Err(OdysseyError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_only_admins_grant_roles() {
        let directory = RoleDirectory::new(Collection::new(memory_store()));
        let admin = Principal::new("root", Role::Admin);
        let instructor = Principal::new("teach-1", Role::Instructor);

        let err = directory
            .assign_role(&instructor, "u1", Role::Instructor)
            .await
            .unwrap_err();
        assert!(matches!(err, OdysseyError::Forbidden(_)));
        assert_eq!(directory.granted_role("u1").await.unwrap(), None);

        let grant = directory.assign_role(&admin, "u1", Role::Instructor).await.unwrap();
        assert_eq!(grant.id, "u1");
        assert_eq!(grant.granted_by, "root");

        let err = directory.assign_role(&admin, " ", Role::Admin).await.unwrap_err();
        assert!(matches!(err, OdysseyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_grant_overrides_caller_role() {
        let directory = RoleDirectory::new(Collection::new(memory_store()));
        let admin = Principal::new("root", Role::Admin);

        let caller = directory
            .resolve(Principal::new("u1", Role::Student))
            .await
            .unwrap();
        assert_eq!(caller.role, Role::Student);

        directory.assign_role(&admin, "u1", Role::Instructor).await.unwrap();
        let caller = directory
            .resolve(Principal::new("u1", Role::Student))
            .await
            .unwrap();
        assert_eq!(caller.role, Role::Instructor);

        // Demotion works the same way
        directory.assign_role(&admin, "u1", Role::Student).await.unwrap();
        let caller = directory
            .resolve(Principal::new("u1", Role::Admin))
            .await
            .unwrap();
        assert_eq!(caller.role, Role::Student);
    }
}
