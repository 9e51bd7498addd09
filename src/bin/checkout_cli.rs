use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use storefront_checkout::{
    backend::{BackendApi, HttpBackend},
    config::{self, CheckoutConfig},
    errors::ErrorKind,
    gateway::StripeGateway,
    models::{AuthorizationId, CardField, CardFieldEvent, OrderRecord, PlanReference, PlanSelection},
    navigation::{Navigator, Route, TracingNavigator},
    services::{CardAuthorizer, CheckoutFlow, CheckoutOutcome, SettlementReconciler},
};
use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize()?;

    match cli.command {
        Commands::Pay(args) => handle_pay(&context, args, cli.json).await?,
        Commands::Reconcile(args) => handle_reconcile(&context, args, cli.json).await?,
        Commands::Order(args) => handle_order(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "checkout-cli",
    about = "Authorize storefront payments and reconcile them with backend orders",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full checkout: create the intent, confirm it, wait for the order
    Pay(PayArgs),
    /// Reconcile a payment from its success-redirect `payment_intent` parameter
    Reconcile(ReconcileArgs),
    /// Look up the order for a payment once, without polling
    Order(OrderArgs),
}

#[derive(Args)]
struct PayArgs {
    #[arg(long, conflicts_with = "custom_plan_id", required_unless_present = "custom_plan_id")]
    plan_id: Option<String>,
    #[arg(long)]
    custom_plan_id: Option<String>,
    #[arg(long)]
    amount: Decimal,
    #[arg(long, requires = "service_name")]
    service_id: Option<String>,
    #[arg(long)]
    service_name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    /// Payment-method token produced by the gateway's card widget
    #[arg(long)]
    card_token: String,
}

#[derive(Args)]
struct ReconcileArgs {
    #[arg(long)]
    payment_intent: Option<String>,
}

#[derive(Args)]
struct OrderArgs {
    #[arg(long)]
    payment_intent: String,
}

struct CliContext {
    config: CheckoutConfig,
    backend: Arc<HttpBackend>,
}

impl CliContext {
    fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load checkout config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let backend = HttpBackend::from_config(&config).context("failed to build backend client")?;
        debug!(api = %config.api_base_url, "checkout client ready");

        Ok(Self {
            config,
            backend: Arc::new(backend),
        })
    }

    fn flow(&self) -> Result<CheckoutFlow> {
        let gateway = StripeGateway::from_config(&self.config)
            .context("failed to build gateway client")?
            .ok_or_else(|| anyhow!("gateway_publishable_key must be configured to take payments"))?;

        Ok(CheckoutFlow::new(
            self.backend.clone(),
            Arc::new(gateway),
            Arc::new(TracingNavigator),
            self.config.poll_policy(),
        ))
    }
}

#[derive(Serialize)]
struct OutcomeReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn handle_pay(context: &CliContext, args: PayArgs, json: bool) -> Result<()> {
    let plan = match (args.plan_id, args.custom_plan_id) {
        (Some(id), None) => PlanReference::Plan(id),
        (None, Some(id)) => PlanReference::CustomPlanRequest(id),
        _ => bail!("exactly one of --plan-id or --custom-plan-id is required"),
    };

    let mut selection = PlanSelection::new(plan, args.amount)?;
    if let (Some(id), Some(name)) = (args.service_id, args.service_name) {
        selection = selection.with_service(id, name);
    }
    if let Some(description) = args.description {
        selection = selection.with_description(description);
    }

    let authorizer = CardAuthorizer::new();
    authorizer.set_payer_name(args.name);
    authorizer.set_payer_email(args.email);
    // A widget token only exists once all three card inputs were complete.
    for field in [CardField::Number, CardField::Expiry, CardField::Cvc] {
        authorizer.apply_card_event(CardFieldEvent::Changed {
            field,
            complete: true,
        });
    }

    let flow = context.flow()?;
    let outcome = flow.run(&selection, &authorizer, &args.card_token).await;
    report(outcome, json)
}

async fn handle_reconcile(context: &CliContext, args: ReconcileArgs, json: bool) -> Result<()> {
    let reconciler =
        SettlementReconciler::new(context.backend.clone(), context.config.poll_policy());
    let authorization_id = args.payment_intent.as_deref().and_then(AuthorizationId::parse);

    let handle = reconciler.start(authorization_id);
    let mut progress = handle.subscribe();
    if !json {
        while progress.changed().await.is_ok() {
            let state = *progress.borrow();
            println!("attempt {} • {}", state.attempt, state.status);
            if state.status.is_terminal() {
                break;
            }
        }
    }

    let outcome = CheckoutOutcome::from(handle.wait().await);
    if let Some(route) = outcome.route() {
        TracingNavigator.navigate(&route);
    }
    report(outcome, json)
}

async fn handle_order(context: &CliContext, args: OrderArgs, json: bool) -> Result<()> {
    let id = AuthorizationId::parse(&args.payment_intent)
        .ok_or_else(|| anyhow!("--payment-intent must not be blank"))?;

    let order = context
        .backend
        .get_order(&id)
        .await
        .context("failed to look up order")?;

    match (order, json) {
        (Some(order), true) => print_json(&order)?,
        (Some(order), false) => render_order(&order),
        (None, true) => print_json(&serde_json::Value::Null)?,
        (None, false) => println!("No order recorded yet for {}", id),
    }
    Ok(())
}

fn report(outcome: CheckoutOutcome, json: bool) -> Result<()> {
    let route = outcome.route();
    let result = outcome.into_result();

    if json {
        let report = match &result {
            Ok(_) => OutcomeReport {
                status: "settled",
                route,
                error_kind: None,
                message: None,
            },
            Err(err) => OutcomeReport {
                status: "not_settled",
                route,
                error_kind: Some(err.kind()),
                message: Some(err.user_message()),
            },
        };
        print_json(&report)?;
    }

    match result {
        Ok(order) => {
            if !json {
                println!("Payment settled.");
                render_order(&order);
            }
            Ok(())
        }
        Err(err) => {
            if !json {
                eprintln!("{}", err.user_message());
            }
            Err(err).context("checkout did not settle")
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &OrderRecord) {
    println!(
        "- Order {} • {} / {} • price {} • payment {}",
        order.order_id,
        order.service_title().unwrap_or("-"),
        order.plan_title().unwrap_or("-"),
        order.price,
        order.payment_status
    );
    for feature in order.plan_features() {
        println!("  • {}", feature);
    }
    if let Some(created_at) = order.created_at {
        println!("  placed {}", created_at.format("%Y-%m-%d %H:%M UTC"));
    }
}
