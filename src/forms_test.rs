use serde_json::json;
use time::macros::datetime;

use super::*;

fn registration() -> ClientRegistration {
    ClientRegistration {
        identification: "12345678".to_owned(),
        full_name: "Ana Ruiz".to_owned(),
        email: "ana@example.com".to_owned(),
        phone: "555-0100".to_owned(),
        is_active: true,
        is_child: false,
        guardian_id: None,
        group_id: None,
    }
}

fn monthly_plan() -> Plan {
    Plan {
        id: Uuid::new_v4(),
        name: "Monthly".to_owned(),
        description: String::new(),
        price: 50.0,
        duration_days: Some(30),
        duration_hours: None,
        is_class_plan: false,
        max_classes: None,
        entries: Some(12),
        is_active: true,
        addons: BTreeMap::from([("socks".to_owned(), 3.5)]),
    }
}

fn plan_draft() -> PlanDraft {
    PlanDraft {
        name: "Monthly".to_owned(),
        description: String::new(),
        price: 50.0,
        duration_days: Some(30),
        duration_hours: None,
        is_class_plan: false,
        max_classes: None,
        addons: BTreeMap::new(),
    }
}

// =============================================================
// Registrations
// =============================================================

#[test]
fn complete_registration_is_valid() {
    assert_eq!(registration().validate(), Ok(()));
}

#[test]
fn registration_reports_every_missing_field() {
    let mut form = registration();
    form.identification = " ".to_owned();
    form.phone.clear();
    let errors = form.validate().unwrap_err();
    assert_eq!(errors.errors.len(), 2);
    assert_eq!(errors.for_field("identification"), Some("is required"));
    assert_eq!(errors.for_field("phone"), Some("is required"));
    assert_eq!(errors.to_string(), "identification: is required; phone: is required");
}

#[test]
fn registration_rejects_malformed_email() {
    let mut form = registration();
    form.email = "ana-at-example".to_owned();
    let errors = form.validate().unwrap_err();
    assert_eq!(errors.for_field("email"), Some("must be a valid email address"));
}

#[test]
fn child_registration_only_needs_a_name() {
    let child: ChildRegistration = serde_json::from_value(json!({ "full_name": "Leo" })).unwrap();
    assert!(child.is_child);
    assert_eq!(child.validate(), Ok(()));

    let unnamed = ChildRegistration { full_name: String::new(), ..child };
    assert!(unnamed.validate().unwrap_err().for_field("full_name").is_some());
}

// =============================================================
// Plans
// =============================================================

#[test]
fn class_plan_requires_max_classes() {
    let mut draft = plan_draft();
    draft.is_class_plan = true;
    assert!(draft.validate().unwrap_err().for_field("max_classes").is_some());
    draft.max_classes = Some(8);
    assert_eq!(draft.validate(), Ok(()));
}

#[test]
fn plan_rejects_negative_prices() {
    let mut draft = plan_draft();
    draft.price = -1.0;
    draft.addons.insert("locker".to_owned(), -2.0);
    let errors = draft.validate().unwrap_err();
    assert!(errors.for_field("price").is_some());
    assert!(errors.for_field("addons").is_some());
}

// =============================================================
// Payments
// =============================================================

#[test]
fn payment_method_parses_wire_names() {
    assert_eq!("bank_transfer".parse::<PaymentMethod>(), Ok(PaymentMethod::BankTransfer));
    assert_eq!(serde_json::to_value(PaymentMethod::Paypal).unwrap(), json!("paypal"));
    assert!("bitcoin".parse::<PaymentMethod>().is_err());
}

#[test]
fn unknown_payment_method_fails_to_deserialize() {
    let result: Result<PaymentDraft, _> = serde_json::from_value(json!({
        "client_id": Uuid::new_v4(),
        "amount": 10.0,
        "payment_method": "barter",
        "transaction_id": "TX-1"
    }));
    assert!(result.is_err());
}

#[test]
fn payment_amount_must_be_positive() {
    let mut draft = PaymentDraft::new(Uuid::new_v4(), 0.0, PaymentMethod::Cash);
    assert!(draft.validate().unwrap_err().for_field("amount").is_some());
    draft.amount = 20.0;
    assert_eq!(draft.validate(), Ok(()));
}

#[test]
fn transaction_id_is_uppercase_with_base36_timestamp() {
    let id = generate_transaction_id(datetime!(2024-01-01 00:00 UTC));
    let parts: Vec<&str> = id.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "TX");
    assert_eq!(parts[1], to_base36(1_704_067_200_000).to_uppercase());
    assert_eq!(parts[2].len(), 5);
    assert_eq!(id, id.to_uppercase());
}

#[test]
fn base36_encodes_small_values() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "z");
    assert_eq!(to_base36(36), "10");
}

// =============================================================
// Reservations
// =============================================================

#[test]
fn reservation_duration_must_be_positive() {
    let draft = ReservationDraft {
        client_id: Uuid::new_v4(),
        date: datetime!(2030-01-01 10:00 UTC),
        duration_hours: 0.0,
        subscription_id: None,
    };
    assert!(draft.validate().unwrap_err().for_field("duration_hours").is_some());
}

// =============================================================
// Plan purchase
// =============================================================

#[test]
fn purchase_derives_end_date_and_known_addons() {
    let plan = monthly_plan();
    let now = datetime!(2030-01-01 00:00 UTC);
    let purchase = PlanPurchase::new(&plan, Some(Uuid::new_v4()), ["socks", "cape"], PaymentMethod::CreditCard, now);

    assert_eq!(purchase.end_date, Some(datetime!(2030-01-31 00:00 UTC)));
    assert_eq!(purchase.remaining_entries, Some(12));
    assert_eq!(purchase.purchased_addons, Some(BTreeMap::from([("socks".to_owned(), 1)])));
}

#[test]
fn purchase_requires_terms_and_group() {
    let plan = monthly_plan();
    let mut purchase =
        PlanPurchase::new(&plan, None, [], PaymentMethod::CreditCard, datetime!(2030-01-01 00:00 UTC));
    let errors = purchase.validate().unwrap_err();
    assert!(errors.for_field("client_group_id").is_some());
    assert!(errors.for_field("agree_to_terms").is_some());

    purchase.client_group_id = Some(Uuid::new_v4());
    purchase.agree_to_terms = true;
    assert_eq!(purchase.validate(), Ok(()));
}

#[test]
fn purchase_never_sends_terms_flag() {
    let plan = monthly_plan();
    let mut purchase =
        PlanPurchase::new(&plan, Some(Uuid::new_v4()), [], PaymentMethod::Cash, datetime!(2030-01-01 00:00 UTC));
    purchase.agree_to_terms = true;
    let body = serde_json::to_value(&purchase).unwrap();
    assert!(body.get("agree_to_terms").is_none());
    assert_eq!(body["payment_method"], "cash");
    assert_eq!(body["start_date"], "2030-01-01T00:00:00Z");
}

// =============================================================
// Visits
// =============================================================

#[test]
fn qr_scan_splits_client_and_code() {
    let client = Uuid::new_v4();
    let check = QrCheck::parse(&format!(" {client}|QR-42 ")).unwrap();
    assert_eq!(check.client_id, client);
    assert_eq!(check.qr_code_id, "QR-42");
    assert!(check.validate().is_ok());
}

#[test]
fn qr_scan_without_separator_or_uuid_is_rejected() {
    assert!(QrCheck::parse("QR-42").unwrap_err().for_field("qr_code").is_some());
    assert!(QrCheck::parse("not-a-uuid|QR-42").unwrap_err().for_field("qr_code").is_some());
    let blank = QrCheck { client_id: Uuid::new_v4(), qr_code_id: " ".to_owned() };
    assert!(blank.validate().is_err());
}

#[test]
fn check_in_requires_a_client() {
    let now = datetime!(2030-01-01 08:30 UTC);
    assert!(CheckIn::new(Uuid::nil(), now).validate().is_err());
    let check_in = CheckIn::new(Uuid::new_v4(), now);
    assert!(check_in.validate().is_ok());
    assert_eq!(serde_json::to_value(&check_in).unwrap()["check_in"], "2030-01-01T08:30:00Z");
}

// =============================================================
// Notifications
// =============================================================

#[test]
fn notification_needs_message_and_recipient() {
    assert!(NotificationDraft::broadcast("Closed at noon").validate().is_ok());
    assert!(NotificationDraft::to_group("Closed at noon", Uuid::new_v4()).validate().is_ok());

    let mut draft = NotificationDraft::to_client("", Uuid::new_v4());
    assert!(draft.validate().unwrap_err().for_field("message").is_some());

    draft.message = "Closed at noon".to_owned();
    draft.target_client_id = None;
    assert!(draft.validate().unwrap_err().for_field("recipient").is_some());
}

#[test]
fn notification_omits_absent_targets() {
    let body = serde_json::to_value(NotificationDraft::broadcast("Hi")).unwrap();
    assert_eq!(body, json!({ "message": "Hi", "is_broadcast": true }));
}

// =============================================================
// Park entry
// =============================================================

fn park_entry() -> ParkEntry {
    let mut entry = ParkEntry::for_guardian("Ana Ruiz", "555-0100", "ana@example.com", datetime!(2030-03-04 09:05 UTC));
    entry.child_name = "Leo Ruiz".to_owned();
    entry.child_age = Some(7);
    entry.identification_number = "12345678".to_owned();
    entry.relationship = "mother".to_owned();
    entry.city = "Bogota".to_owned();
    entry
}

#[test]
fn park_entry_prefills_date_and_time() {
    let entry = park_entry();
    assert_eq!(entry.entry_date, "2030-03-04");
    assert_eq!(entry.entry_time, "09:05");
    assert!(entry.validate().is_ok());
}

#[test]
fn park_entry_requires_authorization_and_a_minor() {
    let mut entry = park_entry();
    entry.authorize_entry = false;
    entry.child_age = Some(18);
    let errors = entry.validate().unwrap_err();
    assert!(errors.for_field("authorize_entry").is_some());
    assert_eq!(errors.for_field("child_age"), Some("must be under 18"));

    let mut entry = park_entry();
    entry.city.clear();
    entry.child_age = None;
    let errors = entry.validate().unwrap_err();
    assert_eq!(errors.for_field("city"), Some("is required"));
    assert_eq!(errors.for_field("child_age"), Some("is required"));
}

// =============================================================
// Command
// =============================================================

#[test]
fn command_is_tagged_by_kind() {
    let command = Command::UpdatePlan { plan_id: Uuid::nil(), draft: plan_draft() };
    let body = serde_json::to_value(&command).unwrap();
    assert_eq!(body["kind"], "update_plan");
    assert_eq!(body["draft"]["name"], "Monthly");

    let back: Command = serde_json::from_value(body).unwrap();
    assert_eq!(back, command);
}

#[test]
fn command_validates_inner_payload() {
    let mut form = registration();
    form.full_name.clear();
    let command = Command::RegisterClient(form);
    assert!(command.validate().unwrap_err().for_field("full_name").is_some());
}

#[test]
fn bodiless_commands_round_trip_by_kind() {
    let body = serde_json::to_value(Command::StartChat).unwrap();
    assert_eq!(body, json!({ "kind": "start_chat" }));
    let resend: Command =
        serde_json::from_value(json!({ "kind": "resend_notification", "notification_id": Uuid::nil() })).unwrap();
    assert_eq!(resend, Command::ResendNotification { notification_id: Uuid::nil() });
    assert!(resend.validate().is_ok());
}
