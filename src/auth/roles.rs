use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every role the service knows about, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::SuperAdmin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Privileged roles are routed to the administrative UI after sign-in.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The roles enabled for this deployment. Always contains `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<Role>,
}

#[derive(Debug, thiserror::Error)]
pub enum RoleSetError {
    #[error(transparent)]
    Unknown(#[from] UnknownRole),
    #[error("role set must include `user`")]
    MissingUser,
}

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Result<Self, RoleSetError> {
        let mut roles: Vec<Role> = roles.into_iter().collect();
        roles.sort();
        roles.dedup();
        if !roles.contains(&Role::User) {
            return Err(RoleSetError::MissingUser);
        }
        Ok(Self { roles })
    }

    /// Parses a comma-separated list such as `user,admin`.
    pub fn parse(list: &str) -> Result<Self, RoleSetError> {
        let roles = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Role::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(roles)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Role assigned to accounts that were not given one explicitly.
    pub fn default_role(&self) -> Role {
        self.roles[0]
    }

    /// Resolves a stored or claimed role name, rejecting roles this deployment disabled.
    pub fn resolve(&self, name: &str) -> Option<Role> {
        name.parse::<Role>().ok().filter(|r| self.contains(*r))
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self {
            roles: Role::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_names() {
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_as_snake_case() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
    }

    #[test]
    fn default_role_is_least_privileged() {
        let set = RoleSet::parse("admin,user").unwrap();
        assert_eq!(set.default_role(), Role::User);
        assert_eq!(RoleSet::default().default_role(), Role::User);
    }

    #[test]
    fn role_set_requires_user() {
        assert!(matches!(
            RoleSet::parse("admin,super_admin"),
            Err(RoleSetError::MissingUser)
        ));
        assert!(matches!(
            RoleSet::parse("user,owner"),
            Err(RoleSetError::Unknown(_))
        ));
    }

    #[test]
    fn resolve_rejects_disabled_roles() {
        let set = RoleSet::parse("user,admin").unwrap();
        assert_eq!(set.resolve("admin"), Some(Role::Admin));
        assert_eq!(set.resolve("super_admin"), None);
    }

    #[test]
    fn privileged_roles() {
        assert!(!Role::User.is_privileged());
        assert!(Role::Admin.is_privileged());
        assert!(Role::SuperAdmin.is_privileged());
    }
}
