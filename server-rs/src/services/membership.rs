use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::models::club::{MemberRole, Membership};
use crate::models::user::{User, UserType};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn normalize(raw: Option<OneOrMany>) -> Vec<String> {
    let ids = match raw {
        None => Vec::new(),
        Some(OneOrMany::One(id)) => vec![id],
        Some(OneOrMany::Many(ids)) => ids,
    };
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .fold(Vec::new(), |acc, id| add_organization(&acc, &id))
}

/// Reads a legacy `organization` field that may hold a single id, a list of
/// ids, or nothing, into a de-duplicated list.
pub fn deserialize_organizations<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<OneOrMany>::deserialize(deserializer).map(normalize)
}

/// Appends `club_id` unless already present; existing order is preserved.
pub fn add_organization(organizations: &[String], club_id: &str) -> Vec<String> {
    let mut out = organizations.to_vec();
    if !out.iter().any(|id| id == club_id) {
        out.push(club_id.to_string());
    }
    out
}

pub fn remove_organization(organizations: &[String], club_id: &str) -> Vec<String> {
    organizations
        .iter()
        .filter(|id| id.as_str() != club_id)
        .cloned()
        .collect()
}

/// Everything that changes when a user is granted a role in a club.
#[derive(Debug, Clone)]
pub struct MembershipGrant {
    pub organizations: Vec<String>,
    pub user_type: UserType,
    pub membership: Membership,
}

/// Computes the user's new organization list, role and membership record.
/// A management role (owner/admin) promotes plain members to club admins;
/// an existing membership keeps its join date and never loses rank.
pub fn grant_membership(
    user: &User,
    existing: Option<&Membership>,
    club_id: &str,
    role: MemberRole,
    now: DateTime<Utc>,
) -> MembershipGrant {
    let user_type = if role.can_manage() {
        user.user_type.after_club_grant()
    } else {
        user.user_type
    };

    let membership = match existing {
        Some(m) => Membership {
            role: m.role.max(role),
            status: "active".to_string(),
            ..m.clone()
        },
        None => Membership::new(club_id, user.id, role, now),
    };

    MembershipGrant {
        organizations: add_organization(&user.organizations, club_id),
        user_type,
        membership,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::LegacyUserDocument;

    fn legacy(json: serde_json::Value) -> LegacyUserDocument {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn bare_string_and_singleton_list_normalize_identically() {
        let scalar = legacy(serde_json::json!({
            "email": "a@example.com", "organization": "club-1"
        }));
        let list = legacy(serde_json::json!({
            "email": "a@example.com", "organization": ["club-1"]
        }));
        assert_eq!(scalar.organizations, vec!["club-1".to_string()]);
        assert_eq!(scalar.organizations, list.organizations);
    }

    #[test]
    fn missing_null_and_blank_organizations_are_empty() {
        let missing = legacy(serde_json::json!({ "email": "a@example.com" }));
        let null = legacy(serde_json::json!({ "email": "a@example.com", "organization": null }));
        let blank = legacy(serde_json::json!({ "email": "a@example.com", "organization": " " }));
        assert!(missing.organizations.is_empty());
        assert!(null.organizations.is_empty());
        assert!(blank.organizations.is_empty());
    }

    #[test]
    fn duplicate_legacy_entries_collapse() {
        let doc = legacy(serde_json::json!({
            "email": "a@example.com", "organizations": ["club-1", "club-2", "club-1"]
        }));
        assert_eq!(doc.organizations, vec!["club-1", "club-2"]);
    }

    #[test]
    fn add_is_append_if_absent() {
        let list = vec!["a".to_string(), "b".to_string()];
        assert_eq!(add_organization(&list, "c"), vec!["a", "b", "c"]);
        assert_eq!(add_organization(&list, "a"), vec!["a", "b"]);
        assert_eq!(remove_organization(&list, "a"), vec!["b"]);
    }

    #[test]
    fn granting_ownership_promotes_members_only() {
        let now = Utc::now();
        let member = User::new("M", "m@example.com", None);
        let grant = grant_membership(&member, None, "club-1", MemberRole::Owner, now);
        assert_eq!(grant.organizations, vec!["club-1"]);
        assert_eq!(grant.user_type, UserType::Admin);
        assert_eq!(grant.membership.role, MemberRole::Owner);

        let mut staff = User::new("S", "s@example.com", None);
        staff.user_type = UserType::Courtly;
        let grant = grant_membership(&staff, None, "club-1", MemberRole::Owner, now);
        assert_eq!(grant.user_type, UserType::Courtly);
    }

    #[test]
    fn plain_membership_keeps_role_and_existing_rank() {
        let now = Utc::now();
        let mut user = User::new("M", "m@example.com", None);
        user.organizations = vec!["club-0".into()];
        let grant = grant_membership(&user, None, "club-1", MemberRole::Member, now);
        assert_eq!(grant.user_type, UserType::Member);
        assert_eq!(grant.organizations, vec!["club-0", "club-1"]);

        let owner = Membership::new("club-1", user.id, MemberRole::Owner, now);
        let grant = grant_membership(&user, Some(&owner), "club-1", MemberRole::Member, now);
        assert_eq!(grant.membership.role, MemberRole::Owner);
        assert_eq!(grant.membership.joined_at, owner.joined_at);
    }
}
