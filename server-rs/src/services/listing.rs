use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::club::Club;
use crate::models::request::{ClubJoinRequest, LessonRequest};
use crate::models::submission::ClubSubmission;

/// Records that can be matched by the free-text search box.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}

impl Searchable for Club {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.city.as_str(), self.state.as_str()]
    }
}

impl Searchable for ClubSubmission {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.city.as_str(), self.state.as_str()]
    }
}

impl Searchable for ClubJoinRequest {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.user_name.as_str(), self.user_email.as_str()]
    }
}

impl Timestamped for ClubSubmission {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Timestamped for ClubJoinRequest {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Timestamped for LessonRequest {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Recent,
    Oldest,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub sort: Option<SortOrder>,
    pub status: Option<String>,
}

/// Case-insensitive substring match on any searchable field. A blank term
/// matches everything.
pub fn matches_search<T: Searchable>(item: &T, term: &str) -> bool {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    item.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

pub fn filter_by_search<T: Searchable>(items: Vec<T>, term: Option<&str>) -> Vec<T> {
    match term {
        Some(term) => items
            .into_iter()
            .filter(|item| matches_search(item, term))
            .collect(),
        None => items,
    }
}

/// Orders by creation time in whole seconds. The sort is stable, so records
/// created within the same second keep their input order.
pub fn sort_by_created<T: Timestamped>(items: &mut [T], order: SortOrder) {
    match order {
        SortOrder::Recent => {
            items.sort_by_key(|item| std::cmp::Reverse(item.created_at().timestamp()))
        }
        SortOrder::Oldest => items.sort_by_key(|item| item.created_at().timestamp()),
    }
}
