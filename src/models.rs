//! Records returned by collection and command endpoints.
//!
//! DESIGN
//! ======
//! Field names mirror the backend JSON so serde round-trips need no renames.
//! Timestamps stay as the backend's strings (the backend emits naive ISO
//! datetimes without an offset); helpers parse them only where a screen
//! needs to compare dates.

#[cfg(test)]
#[path = "models_test.rs"]
mod models_test;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::mutation::MutationOutcome;

/// A registered client (adult or child).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub identification: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_child: bool,
    /// Guardian client for child registrations.
    #[serde(default)]
    pub guardian_id: Option<Uuid>,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Client {
    /// Case-insensitive match on name or email, substring match on phone.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return true;
        }
        let lowered = term.to_lowercase();
        self.full_name.to_lowercase().contains(&lowered)
            || self.email.as_deref().is_some_and(|email| email.to_lowercase().contains(&lowered))
            || self.phone.as_deref().is_some_and(|phone| phone.contains(term))
    }
}

/// A family or corporate group that owns plan instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub clients: Vec<serde_json::Value>,
    #[serde(default)]
    pub admins: Vec<serde_json::Value>,
}

impl ClientGroup {
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.clients.len()
    }
}

/// A subscription plan offered to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    /// Subscription length in days.
    #[serde(default)]
    pub duration_days: Option<u32>,
    /// Length for hourly plans.
    #[serde(default)]
    pub duration_hours: Option<u32>,
    #[serde(default)]
    pub is_class_plan: bool,
    #[serde(default)]
    pub max_classes: Option<u32>,
    /// Entries included, for entry-based plans.
    #[serde(default)]
    pub entries: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Add-on name to price.
    #[serde(default)]
    pub addons: BTreeMap<String, f64>,
}

impl Plan {
    /// Plan price plus the price of every selected add-on that exists.
    #[must_use]
    pub fn total_with_addons<'a>(&self, selected: impl IntoIterator<Item = &'a str>) -> f64 {
        selected
            .into_iter()
            .filter_map(|name| self.addons.get(name))
            .fold(self.price, |total, price| total + price)
    }
}

/// A purchased plan. Purchases paid through the external processor carry a
/// `payment_url` the user must be sent to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanInstance {
    pub id: Uuid,
    pub plan_id: Uuid,
    #[serde(default)]
    pub client_group_id: Option<Uuid>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub payment_url: Option<String>,
}

impl PlanInstance {
    /// Outstanding balance, never negative.
    #[must_use]
    pub fn remaining_amount(&self) -> f64 {
        (self.total_cost - self.paid_amount).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub amount: f64,
    /// `pending`, `completed`, `failed` or `refunded`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub client_id: Uuid,
    #[serde(default)]
    pub client_name: Option<String>,
    pub date: String,
    pub duration_hours: f64,
    /// `pending`, `confirmed`, `cancelled` or `completed`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
}

impl Reservation {
    /// Reservation start, accepting RFC 3339 or the backend's naive ISO form
    /// (treated as UTC).
    #[must_use]
    pub fn starts_at(&self) -> Option<OffsetDateTime> {
        parse_timestamp(&self.date)
    }

    /// Unparseable dates count as upcoming so they are never hidden.
    #[must_use]
    pub fn is_upcoming(&self, now: OffsetDateTime) -> bool {
        self.starts_at().is_none_or(|start| start >= now)
    }
}

/// Split a page of reservations into upcoming and past, keeping order.
#[must_use]
pub fn split_upcoming(reservations: &[Reservation], now: OffsetDateTime) -> (Vec<&Reservation>, Vec<&Reservation>) {
    reservations.iter().partition(|reservation| reservation.is_upcoming(now))
}

/// A park entry: check-in with optional check-out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub client_id: Uuid,
    pub check_in: String,
    #[serde(default)]
    pub check_out: Option<String>,
    /// Hours spent, set on check-out.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
}

impl Visit {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.check_out.is_none()
    }
}

/// A tenant organization the signed-in user belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Who a notification was sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Broadcast,
    Individual,
    Group,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub target_client_id: Option<Uuid>,
    #[serde(default)]
    pub target_group_id: Option<Uuid>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub is_broadcast: bool,
}

impl Notification {
    /// Broadcast wins over a client target, which wins over a group target.
    #[must_use]
    pub fn audience(&self) -> Audience {
        if self.is_broadcast {
            Audience::Broadcast
        } else if self.target_client_id.is_some() {
            Audience::Individual
        } else if self.target_group_id.is_some() {
            Audience::Group
        } else {
            Audience::Unknown
        }
    }

    /// Case-insensitive match on the message or the client's name.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let lowered = term.trim().to_lowercase();
        self.message.to_lowercase().contains(&lowered)
            || self.client_name.as_deref().is_some_and(|name| name.to_lowercase().contains(&lowered))
    }
}

/// A chat session opened for an organization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_true() -> bool {
    true
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

macro_rules! outcome_by_id {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MutationOutcome for $ty {
                fn resource_id(&self) -> Option<String> {
                    Some(self.id.to_string())
                }
            }
        )*
    };
}

outcome_by_id!(Client, ClientGroup, Plan, Reservation, Visit, Organization, Notification, Chat);

impl MutationOutcome for PlanInstance {
    fn resource_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn redirect_url(&self) -> Option<&str> {
        self.payment_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

impl MutationOutcome for Payment {
    fn resource_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn redirect_url(&self) -> Option<&str> {
        self.payment_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}
