use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which entity collection a batch request is paginating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Guests,
    Events,
    Checkin,
}

impl Entity {
    pub fn batch_path(&self) -> &'static str {
        match self {
            Entity::Guests => "/api/batch/guests",
            Entity::Events => "/api/batch/events",
            Entity::Checkin => "/api/batch/checkin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinStatus {
    NotArrived,
    CheckedIn,
    CheckedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: i64,
    pub name: String,
    pub title: Option<String>,
    pub role: Option<String>,
    pub organization: Option<String>,
    pub tag: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub rsvp_status: RsvpStatus,
    pub checkin_status: CheckinStatus,
    pub event_content: Option<String>,
    pub created_at: Option<String>,
    pub event_id: Option<i64>,
    pub event_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub venue_address: Option<String>,
    pub venue_map_url: Option<String>,
    pub dress_code: Option<String>,
    pub program_outline: Option<String>,
    pub max_guests: Option<i64>,
    pub status: EventStatus,
    pub created_at: Option<String>,
}

/// Opaque filter set parameterizing which logical result set is paginated
/// (search term, status, tag, organization, role, event id). Kept as a
/// sorted map so serializing it yields a stable dedup key.
pub type FilterSet = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub pages: Vec<u32>,
    pub items_per_page: u32,
    pub filters: FilterSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPagination {
    pub total_items: u64,
    pub total_pages: u32,
    pub items_per_page: u32,
    pub loaded_pages: Vec<u32>,
}

/// One batch endpoint round trip: several pages of records plus the
/// server's authoritative totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse<T> {
    pub data: BTreeMap<u32, Vec<T>>,
    pub pagination: BatchPagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_response_roundtrip_keys() {
        // Page keys arrive as JSON object keys (strings); serde must map
        // them back to integers.
        let raw = r#"{
            "data": {"1": [], "2": []},
            "pagination": {"total_items": 12, "total_pages": 2, "items_per_page": 10, "loaded_pages": [1, 2]}
        }"#;

        let parsed: BatchResponse<Guest> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert!(parsed.data.contains_key(&1));
        assert_eq!(parsed.pagination.total_pages, 2);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&CheckinStatus::NotArrived).unwrap(),
            "\"not_arrived\""
        );
        assert_eq!(
            serde_json::from_str::<RsvpStatus>("\"accepted\"").unwrap(),
            RsvpStatus::Accepted
        );
    }

    #[test]
    fn test_entity_paths() {
        assert_eq!(Entity::Guests.batch_path(), "/api/batch/guests");
        assert_eq!(Entity::Checkin.batch_path(), "/api/batch/checkin");
    }
}
