use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::membership::deserialize_organizations;

/// Account role. `Courtly` is platform staff; `Admin` manages one or more
/// clubs; `Member` is everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Member,
    Admin,
    Courtly,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Member => "member",
            UserType::Admin => "admin",
            UserType::Courtly => "courtly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "member" => Some(UserType::Member),
            "admin" => Some(UserType::Admin),
            "courtly" => Some(UserType::Courtly),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, UserType::Courtly)
    }

    /// Role after being granted management of a club. Only plain members are
    /// promoted; admins and staff keep what they have.
    pub fn after_club_grant(self) -> Self {
        match self {
            UserType::Member => UserType::Admin,
            other => other,
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    #[serde(rename = "userType")]
    pub user_type: UserType,
    /// Ids of the clubs this user belongs to, in the order they were joined.
    pub organizations: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(full_name: &str, email: &str, password_hash: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            user_type: UserType::Member,
            organizations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn belongs_to(&self, club_id: &str) -> bool {
        self.organizations.iter().any(|id| id == club_id)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A user document as exported from the legacy document store. `organization`
/// is either a bare id or a list of ids depending on which code path last
/// wrote it.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyUserDocument {
    pub email: String,
    #[serde(rename = "fullName", alias = "name", default)]
    pub full_name: Option<String>,
    #[serde(rename = "userType", default)]
    pub user_type: Option<String>,
    #[serde(
        rename = "organization",
        alias = "organizations",
        default,
        deserialize_with = "deserialize_organizations"
    )]
    pub organizations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserPublic {
    pub id: Uuid,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "userType")]
    pub user_type: UserType,
    pub organizations: Vec<String>,
}

impl From<&User> for UserPublic {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            user_type: u.user_type,
            organizations: u.organizations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_members_are_promoted() {
        assert_eq!(UserType::Member.after_club_grant(), UserType::Admin);
        assert_eq!(UserType::Admin.after_club_grant(), UserType::Admin);
        assert_eq!(UserType::Courtly.after_club_grant(), UserType::Courtly);
    }

    #[test]
    fn user_type_round_trips_through_text() {
        for t in [UserType::Member, UserType::Admin, UserType::Courtly] {
            assert_eq!(UserType::parse(t.as_str()), Some(t));
        }
        assert_eq!(UserType::parse(" Courtly "), Some(UserType::Courtly));
        assert_eq!(UserType::parse("owner"), None);
    }

    #[test]
    fn new_users_are_members_with_normalized_email() {
        let user = User::new(" Ada Lovelace ", " Ada@Example.COM ", None);
        assert_eq!(user.full_name, "Ada Lovelace");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.user_type, UserType::Member);
        assert!(user.organizations.is_empty());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User::new("Ada", "ada@example.com", Some("secret-hash".into()));
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["userType"], "member");
    }
}
