//! Per-screen wiring of list controllers and mutation flows.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every dashboard screen shares one [`ApiClient`], one [`QueryCache`] and
//! one [`LocationStore`]. [`Screens`] holds those handles and hands out a
//! controller or flow configured with that screen's page size, default
//! filters, invalidation keys and success route.

#[cfg(test)]
#[path = "screens_test.rs"]
mod screens_test;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::api::{ApiClient, Collection, CollectionEndpoint, CommandEndpoint, PayloadEncoding, commands};
use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::forms::{
    CheckIn, ChildRegistration, ClientRegistration, NotificationDraft, ParkEntry, PaymentDraft, PlanDraft, PlanPurchase,
    QrCheck, ReservationDraft, Validate,
};
use crate::list::PagedList;
use crate::location::LocationStore;
use crate::models::{Chat, Client, ClientGroup, Notification, Organization, Payment, Plan, PlanInstance, Reservation, Visit};
use crate::mutation::{MutationFlow, MutationFlowBuilder, MutationOutcome, SuccessRoute};
use crate::page::PageError;
use crate::source::Filters;

/// Internal routes targeted after a successful submit.
pub mod routes {
    use uuid::Uuid;

    pub const CLIENTS: &str = "/dashboard/clients";
    pub const CLIENT_GROUPS: &str = "/dashboard/client-groups";
    pub const PLANS: &str = "/dashboard/plans";
    pub const PAYMENTS: &str = "/dashboard/payments";
    pub const RESERVATIONS: &str = "/dashboard/reservations";
    pub const VISITS: &str = "/dashboard/visits";
    /// Plan instances of a client, staff view.
    pub const CLIENT_DASHBOARD_PLANS: &str = "/dashboard/client/plans";
    /// Plan instances of the signed-in client.
    pub const CLIENT_PLANS: &str = "/client/plans";
    /// Detail pages of purchased plans, `/{id}`.
    pub const CLIENT_PLAN_INSTANCES: &str = "/dashboard/client/plan-instances";
    /// Chat screen; the chat is picked by the `chatId` query parameter.
    pub const CHAT: &str = "/dashboard/chat/";
    pub const CHAT_PARAM: &str = "chatId";
    pub const HOME: &str = "/";

    #[must_use]
    pub fn client_detail(id: Uuid) -> String {
        format!("{CLIENTS}/{id}")
    }

    #[must_use]
    pub fn plan_detail(id: Uuid) -> String {
        format!("{PLANS}/{id}")
    }
}

/// Cache key prefixes marked stale by mutations. `plan` holds single-plan
/// detail entries; the rest are collection names.
pub mod keys {
    pub const CLIENTS: &str = "clients";
    pub const CLIENT_PLANS: &str = "client_plans";
    pub const PLAN: &str = "plan";
    pub const PLANS: &str = "plans";
    pub const PAYMENTS: &str = "payments";
    pub const RESERVATIONS: &str = "reservations";
    pub const ACTIVE_VISITS: &str = "active_visits";
    pub const NOTIFICATIONS: &str = "notifications";
}

pub type ListOf<T> = PagedList<T, CollectionEndpoint<T>>;
pub type FlowOf<P, R> = MutationFlow<P, R, CommandEndpoint<P, R>>;

#[derive(Clone)]
pub struct Screens {
    api: ApiClient,
    cache: QueryCache,
    location: Arc<dyn LocationStore>,
    page_size: u32,
    redirect_delay: Duration,
}

impl Screens {
    #[must_use]
    pub fn new(api: ApiClient, cache: QueryCache, location: Arc<dyn LocationStore>, config: &ClientConfig) -> Self {
        Self { api, cache, location, page_size: config.page_size, redirect_delay: config.redirect_delay }
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub fn location(&self) -> &Arc<dyn LocationStore> {
        &self.location
    }

    // =========================================================================
    // LISTS
    // =========================================================================

    /// Default filters each list screen starts with.
    #[must_use]
    pub fn default_filters(collection: Collection) -> Filters {
        match collection {
            Collection::Clients | Collection::Plans | Collection::AvailablePlans | Collection::PlanInstances => {
                Filters::new().with("active_only", "true")
            }
            Collection::Reservations => Filters::new().with("upcoming_only", "false"),
            Collection::Notifications => Filters::new().with("sort_by", "created_at").with("sort_order", "desc"),
            Collection::ClientGroups
            | Collection::MyClientGroups
            | Collection::Payments
            | Collection::Visits
            | Collection::ActiveVisits
            | Collection::Organizations => Filters::new(),
        }
    }

    /// Controller for any collection with its default filters.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::ZeroPageSize`] if the configured page size is zero.
    pub fn list<T>(&self, collection: Collection) -> Result<ListOf<T>, PageError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        PagedList::builder(collection.cache_name(), self.api.collection::<T>(collection))
            .page_size(self.page_size)
            .filters(Self::default_filters(collection))
            .location(Arc::clone(&self.location))
            .cache(self.cache.clone())
            .build()
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn clients(&self) -> Result<ListOf<Client>, PageError> {
        self.list(Collection::Clients)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn client_groups(&self) -> Result<ListOf<ClientGroup>, PageError> {
        self.list(Collection::ClientGroups)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn plans(&self) -> Result<ListOf<Plan>, PageError> {
        self.list(Collection::Plans)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn payments(&self) -> Result<ListOf<Payment>, PageError> {
        self.list(Collection::Payments)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn reservations(&self) -> Result<ListOf<Reservation>, PageError> {
        self.list(Collection::Reservations)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn plan_instances(&self) -> Result<ListOf<PlanInstance>, PageError> {
        self.list(Collection::PlanInstances)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn visits(&self) -> Result<ListOf<Visit>, PageError> {
        self.list(Collection::Visits)
    }

    /// Visits without a check-out, shown on the check-in desk.
    ///
    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn active_visits(&self) -> Result<ListOf<Visit>, PageError> {
        self.list(Collection::ActiveVisits)
    }

    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn organizations(&self) -> Result<ListOf<Organization>, PageError> {
        self.list(Collection::Organizations)
    }

    /// Newest first; narrow with `type`, `date_from` and `date_to` filters.
    ///
    /// # Errors
    ///
    /// See [`Screens::list`].
    pub fn notifications(&self) -> Result<ListOf<Notification>, PageError> {
        self.list(Collection::Notifications)
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    fn flow<P, R>(&self, name: &str, method: Method, path: impl Into<String>) -> MutationFlowBuilder<P, R, CommandEndpoint<P, R>>
    where
        P: Validate + Serialize + Clone + Send + Sync + 'static,
        R: MutationOutcome + DeserializeOwned + Send + Sync + 'static,
    {
        self.flow_encoded(name, method, path, PayloadEncoding::Json)
    }

    fn flow_encoded<P, R>(
        &self,
        name: &str,
        method: Method,
        path: impl Into<String>,
        encoding: PayloadEncoding,
    ) -> MutationFlowBuilder<P, R, CommandEndpoint<P, R>>
    where
        P: Validate + Serialize + Clone + Send + Sync + 'static,
        R: MutationOutcome + DeserializeOwned + Send + Sync + 'static,
    {
        MutationFlow::builder(name, self.api.command::<P, R>(method, path).with_encoding(encoding))
            .redirect_delay(self.redirect_delay)
            .location(Arc::clone(&self.location))
            .cache(self.cache.clone())
    }

    #[must_use]
    pub fn register_client(&self) -> FlowOf<ClientRegistration, Client> {
        self.flow("register_client", Method::POST, commands::REGISTER_CLIENT)
            .invalidates(keys::CLIENTS)
            .on_success(SuccessRoute::detail(routes::CLIENTS))
            .build()
    }

    #[must_use]
    pub fn register_child(&self) -> FlowOf<ChildRegistration, Client> {
        self.flow("register_child", Method::POST, commands::REGISTER_CHILD)
            .invalidates(keys::CLIENTS)
            .invalidates(keys::CLIENT_PLANS)
            .on_success(SuccessRoute::to(routes::CLIENT_DASHBOARD_PLANS))
            .build()
    }

    #[must_use]
    pub fn create_plan(&self) -> FlowOf<PlanDraft, Plan> {
        self.flow("create_plan", Method::POST, commands::CREATE_PLAN)
            .invalidates(keys::PLANS)
            .on_success(SuccessRoute::detail(routes::PLANS))
            .build()
    }

    #[must_use]
    pub fn update_plan(&self, plan_id: Uuid) -> FlowOf<PlanDraft, Plan> {
        self.flow("update_plan", Method::PUT, commands::update_plan(plan_id))
            .invalidates(keys::PLAN)
            .invalidates(keys::PLANS)
            .on_success(SuccessRoute::to(routes::plan_detail(plan_id)))
            .build()
    }

    #[must_use]
    pub fn create_payment(&self) -> FlowOf<PaymentDraft, Payment> {
        self.flow("create_payment", Method::POST, commands::CREATE_PAYMENT)
            .invalidates(keys::PAYMENTS)
            .on_success(SuccessRoute::to(routes::PAYMENTS))
            .build()
    }

    #[must_use]
    pub fn create_reservation(&self) -> FlowOf<ReservationDraft, Reservation> {
        self.flow("create_reservation", Method::POST, commands::CREATE_RESERVATION)
            .invalidates(keys::RESERVATIONS)
            .on_success(SuccessRoute::to(routes::RESERVATIONS))
            .build()
    }

    /// Goes to the processor's `payment_url` when the purchase has one,
    /// otherwise to the new plan instance.
    #[must_use]
    pub fn purchase_plan(&self) -> FlowOf<PlanPurchase, PlanInstance> {
        self.flow("purchase_plan", Method::POST, commands::CREATE_PLAN_INSTANCE)
            .invalidates(keys::CLIENT_PLANS)
            .on_success(SuccessRoute::detail(routes::CLIENT_PLAN_INSTANCES))
            .build()
    }

    /// Opens a chat for a new organization and switches to it.
    #[must_use]
    pub fn start_chat(&self) -> FlowOf<(), Chat> {
        self.flow_encoded("start_chat", Method::POST, commands::START_CHAT, PayloadEncoding::Empty)
            .on_success(SuccessRoute::with_query(routes::CHAT, routes::CHAT_PARAM))
            .build()
    }

    /// Manual check-in from the desk. The desk stays open for the next
    /// client.
    #[must_use]
    pub fn check_in(&self) -> FlowOf<CheckIn, Visit> {
        self.flow_encoded("check_in", Method::POST, commands::CHECK_IN, PayloadEncoding::Query)
            .invalidates(keys::ACTIVE_VISITS)
            .build()
    }

    #[must_use]
    pub fn check_qr(&self) -> FlowOf<QrCheck, serde_json::Value> {
        self.flow_encoded("check_qr", Method::GET, commands::CHECK_QR, PayloadEncoding::Query)
            .invalidates(keys::ACTIVE_VISITS)
            .build()
    }

    #[must_use]
    pub fn create_notification(&self) -> FlowOf<NotificationDraft, Notification> {
        self.flow("create_notification", Method::POST, commands::CREATE_NOTIFICATION)
            .invalidates(keys::NOTIFICATIONS)
            .on_success(SuccessRoute::to(routes::HOME))
            .build()
    }

    #[must_use]
    pub fn resend_notification(&self, notification_id: Uuid) -> FlowOf<(), serde_json::Value> {
        self.flow_encoded(
            "resend_notification",
            Method::POST,
            commands::resend_notification(notification_id),
            PayloadEncoding::Empty,
        )
        .invalidates(keys::NOTIFICATIONS)
        .build()
    }

    #[must_use]
    pub fn park_entry(&self) -> FlowOf<ParkEntry, serde_json::Value> {
        self.flow("park_entry", Method::POST, commands::PARK_ENTRY)
            .on_success(SuccessRoute::to(routes::CLIENT_DASHBOARD_PLANS))
            .build()
    }
}
