use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use plandesk::api::{ApiClient, ApiError, Collection};
use plandesk::cache::QueryCache;
use plandesk::config::{ClientConfig, ConfigError, normalize_api_url};
use plandesk::forms::{self, CheckIn, PaymentDraft, PaymentMethod, PlanPurchase, QrCheck, Validate};
use plandesk::location::{Location, LocationStore, MemoryLocation, NavigationTarget};
use plandesk::mutation::{MutationError, MutationOutcome};
use plandesk::page::{PAGE_PARAM, PageError};
use plandesk::screens::{FlowOf, Screens};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;


#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read .env: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("unknown collection `{0}`; expected one of: {1}")]
    UnknownCollection(String, String),
    #[error("invalid filter `{0}`; expected key=value")]
    InvalidFilter(String),
    #[error("missing payload; pass --data or --file")]
    MissingPayload,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to read payload: {0}")]
    Io(#[from] io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "plandesk", about = "Drive plandesk list screens and forms against a live backend")]
struct Cli {
    #[arg(long, env = "PLANDESK_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "PLANDESK_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[arg(long, env = "PLANDESK_PAGE_SIZE")]
    page_size: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call the backend health check.
    Ping,
    /// Show one page of a collection.
    List(ListArgs),
    RegisterClient(PayloadArgs),
    RegisterChild(PayloadArgs),
    CreatePlan(PayloadArgs),
    UpdatePlan {
        plan_id: Uuid,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    CreatePayment(PaymentArgs),
    CreateReservation(PayloadArgs),
    PurchasePlan {
        #[command(flatten)]
        payload: PayloadArgs,
        #[arg(long, default_value_t = false)]
        agree_to_terms: bool,
    },
    /// Check a client in at the desk now.
    CheckIn { client_id: Uuid },
    /// Check a scanned `<client id>|<qr code id>` code.
    CheckQr { code: String },
    CreateNotification(PayloadArgs),
    ResendNotification { notification_id: Uuid },
    /// Open a new project chat.
    StartChat,
    ParkEntry(PayloadArgs),
    /// Submit a `kind`-tagged command document.
    Submit(PayloadArgs),
    /// Print a fresh payment transaction id.
    TransactionId,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Collection name, e.g. `clients`, `client-groups`, `plan-instances`.
    collection: String,

    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Extra query filter, repeatable.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Also fetch the following page into the cache.
    #[arg(long, default_value_t = false)]
    prefetch: bool,
}

#[derive(Args, Debug)]
struct PayloadArgs {
    /// Inline JSON payload.
    #[arg(long, conflicts_with = "file")]
    data: Option<String>,

    /// JSON payload file, or - for stdin.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PaymentArgs {
    #[arg(long)]
    client_id: Uuid,

    #[arg(long)]
    amount: f64,

    #[arg(long, default_value_t = PaymentMethod::CreditCard)]
    method: PaymentMethod,

    /// Generated when omitted.
    #[arg(long)]
    transaction_id: Option<String>,

    #[arg(long)]
    subscription_id: Option<Uuid>,

    #[arg(long, default_value = "")]
    notes: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    load_dotenv()?;
    let cli = Cli::parse();
    init_tracing();

    let config = resolve_config(&cli)?;
    let api = ApiClient::new(&config)?;
    let location = MemoryLocation::new(Location::new("/"));
    let screens = Screens::new(api.clone(), QueryCache::new(), Arc::new(location.clone()), &config);

    match cli.command {
        Command::Ping => run_ping(&api).await,
        Command::List(args) => run_list(&screens, &location, args).await,
        Command::RegisterClient(args) => run_flow(screens.register_client(), read_payload(&args)?).await,
        Command::RegisterChild(args) => run_flow(screens.register_child(), read_payload(&args)?).await,
        Command::CreatePlan(args) => run_flow(screens.create_plan(), read_payload(&args)?).await,
        Command::UpdatePlan { plan_id, payload } => run_flow(screens.update_plan(plan_id), read_payload(&payload)?).await,
        Command::CreatePayment(args) => run_flow(screens.create_payment(), payment_draft(args)).await,
        Command::CreateReservation(args) => run_flow(screens.create_reservation(), read_payload(&args)?).await,
        Command::PurchasePlan { payload, agree_to_terms } => {
            let mut purchase: PlanPurchase = read_payload(&payload)?;
            purchase.agree_to_terms = agree_to_terms;
            run_flow(screens.purchase_plan(), purchase).await
        }
        Command::CheckIn { client_id } => {
            run_flow(screens.check_in(), CheckIn::new(client_id, time::OffsetDateTime::now_utc())).await
        }
        Command::CheckQr { code } => {
            let check = QrCheck::parse(&code).map_err(MutationError::Invalid)?;
            run_flow(screens.check_qr(), check).await
        }
        Command::CreateNotification(args) => run_flow(screens.create_notification(), read_payload(&args)?).await,
        Command::ResendNotification { notification_id } => {
            run_flow(screens.resend_notification(notification_id), ()).await
        }
        Command::StartChat => run_flow(screens.start_chat(), ()).await,
        Command::ParkEntry(args) => run_flow(screens.park_entry(), read_payload(&args)?).await,
        Command::Submit(args) => run_command(&screens, read_payload(&args)?).await,
        Command::TransactionId => {
            println!("{}", forms::generate_transaction_id(time::OffsetDateTime::now_utc()));
            Ok(())
        }
    }
}

fn load_dotenv() -> Result<(), CliError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(CliError::EnvFile(err)),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn resolve_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config.api_url = normalize_api_url(url)?;
    }
    if let Some(token) = cli.api_token.as_deref().map(str::trim).filter(|token| !token.is_empty()) {
        config.api_token = Some(token.to_owned());
    }
    if let Some(page_size) = cli.page_size {
        if page_size == 0 {
            return Err(ConfigError::Zero { var: "PLANDESK_PAGE_SIZE" }.into());
        }
        config.page_size = page_size;
    }
    Ok(config)
}

async fn run_ping(api: &ApiClient) -> Result<(), CliError> {
    let health = api.health_check().await?;
    print_json(&health)
}

async fn run_list(screens: &Screens, location: &MemoryLocation, args: ListArgs) -> Result<(), CliError> {
    let collection = Collection::from_name(&args.collection).ok_or_else(|| {
        let known = Collection::ALL.iter().map(|c| c.cache_name()).collect::<Vec<_>>().join(", ");
        CliError::UnknownCollection(args.collection.clone(), known)
    })?;
    let list = screens.list::<Value>(collection)?;
    for raw in &args.filters {
        let (key, value) = parse_filter(raw)?;
        list.set_filter(key, value);
    }
    list.go_to_page(args.page);

    let outcome = list.load().await?;
    tracing::info!(collection = collection.cache_name(), ?outcome, "page loaded");
    if args.prefetch {
        list.prefetch_next().await?;
    }

    let view = list.state();
    let query = list.query();
    let current = location.current();
    let next = list
        .can_go_next()
        .then(|| current.clone().with_query(PAGE_PARAM, (view.page + 1).to_string()).href());
    let previous = view
        .has_previous
        .then(|| current.clone().with_query(PAGE_PARAM, (view.page - 1).to_string()).href());
    print_json(&json!({
        "collection": collection.cache_name(),
        "page": view.page,
        "skip": query.skip,
        "limit": query.limit,
        "showing": view.span.map(|span| json!({ "first": span.first, "last": span.last })),
        "has_next": view.has_next,
        "has_previous": view.has_previous,
        "next": next,
        "previous": previous,
        "items": view.items.as_ref(),
    }))
}

async fn run_flow<P, R>(flow: FlowOf<P, R>, payload: P) -> Result<(), CliError>
where
    P: Validate + Serialize + Clone + Send + Sync + 'static,
    R: MutationOutcome + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let target = flow.submit(payload).await?;
    let result = flow.last_result();
    print_json(&json!({
        "mutation": flow.name(),
        "status": "succeeded",
        "navigate": target.as_ref().map(NavigationTarget::href),
        "external": matches!(target, Some(NavigationTarget::External(_))),
        "result": result.as_deref(),
    }))
}

async fn run_command(screens: &Screens, command: forms::Command) -> Result<(), CliError> {
    match command {
        forms::Command::RegisterClient(payload) => run_flow(screens.register_client(), payload).await,
        forms::Command::RegisterChild(payload) => run_flow(screens.register_child(), payload).await,
        forms::Command::CreatePlan(payload) => run_flow(screens.create_plan(), payload).await,
        forms::Command::UpdatePlan { plan_id, draft } => run_flow(screens.update_plan(plan_id), draft).await,
        forms::Command::CreatePayment(payload) => run_flow(screens.create_payment(), payload).await,
        forms::Command::CreateReservation(payload) => run_flow(screens.create_reservation(), payload).await,
        forms::Command::PurchasePlan(payload) => run_flow(screens.purchase_plan(), payload).await,
        forms::Command::CheckIn(payload) => run_flow(screens.check_in(), payload).await,
        forms::Command::CheckQr(payload) => run_flow(screens.check_qr(), payload).await,
        forms::Command::CreateNotification(payload) => run_flow(screens.create_notification(), payload).await,
        forms::Command::ResendNotification { notification_id } => {
            run_flow(screens.resend_notification(notification_id), ()).await
        }
        forms::Command::StartChat => run_flow(screens.start_chat(), ()).await,
        forms::Command::ParkEntry(payload) => run_flow(screens.park_entry(), payload).await,
    }
}

fn payment_draft(args: PaymentArgs) -> PaymentDraft {
    let mut draft = PaymentDraft::new(args.client_id, args.amount, args.method);
    if let Some(transaction_id) = args.transaction_id {
        draft.transaction_id = transaction_id;
    }
    draft.subscription_id = args.subscription_id;
    draft.notes = args.notes;
    draft
}

fn parse_filter(raw: &str) -> Result<(String, String), CliError> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| CliError::InvalidFilter(raw.to_owned()))?;
    Ok((key.trim().to_owned(), value.trim().to_owned()))
}

fn read_payload<P: DeserializeOwned>(args: &PayloadArgs) -> Result<P, CliError> {
    let raw = match (&args.data, &args.file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err(CliError::MissingPayload),
    };
    Ok(serde_json::from_str(&raw)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
