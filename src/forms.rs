//! Typed command payloads and client-side validation.
//!
//! DESIGN
//! ======
//! Each form submits exactly one of these records. Required and optional
//! fields are spelled out in the type, and `validate` runs before any network
//! call so a missing field or unchecked terms box never reaches the backend.
//! [`Command`] tags every payload so a whole submission can be stored or read
//! back as one JSON document.

#[cfg(test)]
#[path = "forms_test.rs"]
mod forms_test;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::Plan;

// =============================================================================
// VALIDATION
// =============================================================================

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field error found in one payload, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{}", render_field_errors(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn render_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError { field, message: message.into() });
    }

    /// Message for one field, for rendering next to its input.
    #[must_use]
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    fn require(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "is required");
        }
    }

    fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Client-side checks run before a payload is submitted.
pub trait Validate {
    /// # Errors
    ///
    /// Returns every field that fails its check.
    fn validate(&self) -> Result<(), ValidationErrors>;
}

// =============================================================================
// CLIENT REGISTRATION
// =============================================================================

/// Adult client registration (`POST /clients/management/register`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub identification: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
}

impl Validate for ClientRegistration {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("identification", &self.identification);
        errors.require("full_name", &self.full_name);
        if self.email.trim().is_empty() {
            errors.push("email", "is required");
        } else if !looks_like_email(&self.email) {
            errors.push("email", "must be a valid email address");
        }
        errors.require("phone", &self.phone);
        if self.is_child {
            errors.push("is_child", "use a child registration for dependents");
        }
        errors.into_result()
    }
}

/// Child or dependent registration (`POST /clients/management/register/child`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRegistration {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_child: bool,
}

impl Validate for ChildRegistration {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("full_name", &self.full_name);
        if let Some(email) = self.email.as_deref().filter(|email| !email.trim().is_empty()) {
            if !looks_like_email(email) {
                errors.push("email", "must be a valid email address");
            }
        }
        if !self.is_child {
            errors.push("is_child", "must be set for child registrations");
        }
        errors.into_result()
    }
}

// =============================================================================
// PLANS
// =============================================================================

/// Plan create/update body (`POST /admin/plans`, `PUT /admin/plans/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub duration_hours: Option<u32>,
    #[serde(default)]
    pub is_class_plan: bool,
    #[serde(default)]
    pub max_classes: Option<u32>,
    /// Add-on name to price.
    #[serde(default)]
    pub addons: BTreeMap<String, f64>,
}

impl Validate for PlanDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("name", &self.name);
        if !self.price.is_finite() || self.price < 0.0 {
            errors.push("price", "must be zero or more");
        }
        if self.is_class_plan && self.max_classes.is_none_or(|max| max == 0) {
            errors.push("max_classes", "is required for class plans");
        }
        if self.addons.iter().any(|(name, price)| name.trim().is_empty() || !price.is_finite() || *price < 0.0) {
            errors.push("addons", "every add-on needs a name and a price of zero or more");
        }
        errors.into_result()
    }
}

// =============================================================================
// PAYMENTS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    DebitCard,
    Cash,
    BankTransfer,
    Paypal,
    Other,
}

impl PaymentMethod {
    pub const ALL: [Self; 6] =
        [Self::CreditCard, Self::DebitCard, Self::Cash, Self::BankTransfer, Self::Paypal, Self::Other];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Paypal => "paypal",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == raw.trim())
            .ok_or_else(|| format!("unknown payment method '{raw}'"))
    }
}

/// Staff-recorded payment (`POST /clients/plans/payments`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub client_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    /// Set for subscription payments, absent for direct payments.
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    #[serde(default)]
    pub notes: String,
}

impl PaymentDraft {
    /// Draft with a freshly generated transaction id.
    #[must_use]
    pub fn new(client_id: Uuid, amount: f64, payment_method: PaymentMethod) -> Self {
        Self {
            client_id,
            amount,
            payment_method,
            transaction_id: generate_transaction_id(OffsetDateTime::now_utc()),
            subscription_id: None,
            notes: String::new(),
        }
    }
}

impl Validate for PaymentDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if !self.amount.is_finite() || self.amount <= 0.0 {
            errors.push("amount", "must be greater than zero");
        }
        errors.require("transaction_id", &self.transaction_id);
        errors.into_result()
    }
}

/// `TX-<millis in base 36>-<5 random alphanumerics>`, uppercase.
#[must_use]
pub fn generate_transaction_id(now: OffsetDateTime) -> String {
    let millis = u128::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or_default();
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    format!("TX-{}-{suffix}", to_base36(millis)).to_uppercase()
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

// =============================================================================
// RESERVATIONS
// =============================================================================

/// Reservation booking (`POST /clients/plans/reservations`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub client_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub duration_hours: f64,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
}

impl Validate for ReservationDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if !self.duration_hours.is_finite() || self.duration_hours <= 0.0 {
            errors.push("duration_hours", "must be greater than zero");
        }
        errors.into_result()
    }
}

// =============================================================================
// PLAN PURCHASE
// =============================================================================

/// Client-side plan purchase (`POST /clients/plans/plan-instances`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPurchase {
    pub client_group_id: Option<Uuid>,
    pub plan_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    /// Add-on name to quantity.
    #[serde(default)]
    pub purchased_addons: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub remaining_entries: Option<u32>,
    pub payment_method: PaymentMethod,
    /// Terms checkbox; checked locally, never sent.
    #[serde(skip)]
    pub agree_to_terms: bool,
}

impl PlanPurchase {
    /// Purchase starting `now`. The end date follows the plan's length in
    /// days; each selected add-on that the plan offers is bought once.
    #[must_use]
    pub fn new<'a>(
        plan: &Plan,
        client_group_id: Option<Uuid>,
        selected_addons: impl IntoIterator<Item = &'a str>,
        payment_method: PaymentMethod,
        now: OffsetDateTime,
    ) -> Self {
        let purchased: BTreeMap<String, u32> = selected_addons
            .into_iter()
            .filter(|name| plan.addons.contains_key(*name))
            .map(|name| (name.to_owned(), 1))
            .collect();
        Self {
            client_group_id,
            plan_id: plan.id,
            start_date: now,
            end_date: plan.duration_days.map(|days| now + Duration::days(i64::from(days))),
            purchased_addons: if purchased.is_empty() { None } else { Some(purchased) },
            remaining_entries: plan.entries,
            payment_method,
            agree_to_terms: false,
        }
    }
}

impl Validate for PlanPurchase {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.client_group_id.is_none() {
            errors.push("client_group_id", "select a client group");
        }
        if !self.agree_to_terms {
            errors.push("agree_to_terms", "you must agree to the terms and conditions");
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                errors.push("end_date", "must not be before the start date");
            }
        }
        errors.into_result()
    }
}

// =============================================================================
// VISITS
// =============================================================================

/// Staff check-in (`POST /admin/visits/check-in`, sent as query parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub client_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub check_in: OffsetDateTime,
}

impl CheckIn {
    #[must_use]
    pub fn new(client_id: Uuid, now: OffsetDateTime) -> Self {
        Self { client_id, check_in: now }
    }
}

impl Validate for CheckIn {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.client_id.is_nil() {
            errors.push("client_id", "select a client");
        }
        errors.into_result()
    }
}

/// Scanned QR code check (`GET /admin/check-qr`, sent as query parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCheck {
    pub client_id: Uuid,
    pub qr_code_id: String,
}

impl QrCheck {
    /// Parse scanner output of the form `<client id>|<qr code id>`.
    ///
    /// # Errors
    ///
    /// Returns a `qr_code` field error when the separator is missing or the
    /// client id is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let Some((client, code)) = raw.trim().split_once('|') else {
            errors.push("qr_code", "expected <client id>|<qr code id>");
            return Err(errors);
        };
        match Uuid::parse_str(client.trim()) {
            Ok(client_id) => Ok(Self { client_id, qr_code_id: code.trim().to_owned() }),
            Err(_) => {
                errors.push("qr_code", "client id is not a valid UUID");
                Err(errors)
            }
        }
    }
}

impl Validate for QrCheck {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("qr_code_id", &self.qr_code_id);
        errors.into_result()
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Staff notification (`POST /admin/notifications`). A non-broadcast
/// notification needs a client or a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub message: String,
    #[serde(default)]
    pub is_broadcast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_client_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_id: Option<Uuid>,
}

impl NotificationDraft {
    #[must_use]
    pub fn broadcast(message: impl Into<String>) -> Self {
        Self { message: message.into(), is_broadcast: true, target_client_id: None, target_group_id: None }
    }

    #[must_use]
    pub fn to_client(message: impl Into<String>, client_id: Uuid) -> Self {
        Self { message: message.into(), is_broadcast: false, target_client_id: Some(client_id), target_group_id: None }
    }

    #[must_use]
    pub fn to_group(message: impl Into<String>, group_id: Uuid) -> Self {
        Self { message: message.into(), is_broadcast: false, target_client_id: None, target_group_id: Some(group_id) }
    }
}

impl Validate for NotificationDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("message", &self.message);
        if !self.is_broadcast && self.target_client_id.is_none() && self.target_group_id.is_none() {
            errors.push("recipient", "select a client or a group, or broadcast");
        }
        errors.into_result()
    }
}

/// Commands whose whole input is in the path carry no body.
impl Validate for () {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

// =============================================================================
// PARK ENTRY
// =============================================================================

/// Guardian's authorization for a minor entering the park.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkEntry {
    pub child_name: String,
    pub child_age: Option<u32>,
    pub adult_name: String,
    pub identification_number: String,
    pub relationship: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: String,
    /// `YYYY-MM-DD`.
    pub entry_date: String,
    /// `HH:MM`.
    pub entry_time: String,
    pub city: String,
    pub authorize_entry: bool,
    #[serde(default)]
    pub authorize_photos: bool,
    #[serde(default)]
    pub authorize_marketing: bool,
}

/// Age below which a visitor needs a guardian's authorization.
pub const ADULT_AGE: u32 = 18;

impl ParkEntry {
    /// Blank form prefilled with the guardian's contact details and the
    /// current date and time, every authorization granted.
    #[must_use]
    pub fn for_guardian(adult_name: impl Into<String>, phone_number: impl Into<String>, email: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            child_name: String::new(),
            child_age: None,
            adult_name: adult_name.into(),
            identification_number: String::new(),
            relationship: String::new(),
            phone_number: phone_number.into(),
            email: email.into(),
            entry_date: now.date().to_string(),
            entry_time: format!("{:02}:{:02}", now.hour(), now.minute()),
            city: String::new(),
            authorize_entry: true,
            authorize_photos: true,
            authorize_marketing: true,
        }
    }
}

impl Validate for ParkEntry {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("child_name", &self.child_name);
        match self.child_age {
            None => errors.push("child_age", "is required"),
            Some(age) if age >= ADULT_AGE => errors.push("child_age", "must be under 18"),
            Some(_) => {}
        }
        errors.require("adult_name", &self.adult_name);
        errors.require("identification_number", &self.identification_number);
        errors.require("relationship", &self.relationship);
        errors.require("phone_number", &self.phone_number);
        if !self.email.trim().is_empty() && !looks_like_email(&self.email) {
            errors.push("email", "must be a valid email address");
        }
        errors.require("entry_date", &self.entry_date);
        errors.require("entry_time", &self.entry_time);
        errors.require("city", &self.city);
        if !self.authorize_entry {
            errors.push("authorize_entry", "entry requires the guardian's authorization");
        }
        errors.into_result()
    }
}

// =============================================================================
// TAGGED COMMAND
// =============================================================================

/// Any submittable payload, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    RegisterClient(ClientRegistration),
    RegisterChild(ChildRegistration),
    CreatePlan(PlanDraft),
    UpdatePlan { plan_id: Uuid, draft: PlanDraft },
    CreatePayment(PaymentDraft),
    CreateReservation(ReservationDraft),
    PurchasePlan(PlanPurchase),
    CheckIn(CheckIn),
    CheckQr(QrCheck),
    CreateNotification(NotificationDraft),
    ResendNotification { notification_id: Uuid },
    StartChat,
    ParkEntry(ParkEntry),
}

impl Validate for Command {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::RegisterClient(payload) => payload.validate(),
            Self::RegisterChild(payload) => payload.validate(),
            Self::CreatePlan(payload) | Self::UpdatePlan { draft: payload, .. } => payload.validate(),
            Self::CreatePayment(payload) => payload.validate(),
            Self::CreateReservation(payload) => payload.validate(),
            Self::PurchasePlan(payload) => payload.validate(),
            Self::CheckIn(payload) => payload.validate(),
            Self::CheckQr(payload) => payload.validate(),
            Self::CreateNotification(payload) => payload.validate(),
            Self::ParkEntry(payload) => payload.validate(),
            Self::ResendNotification { .. } | Self::StartChat => Ok(()),
        }
    }
}

fn looks_like_email(raw: &str) -> bool {
    let raw = raw.trim();
    raw.split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
}

fn default_true() -> bool {
    true
}
