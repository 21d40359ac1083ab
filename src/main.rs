//! subscription-billing server.
//!
//! Wires the Postgres stores, the Stripe gateway and the JWT session
//! validator into the billing router, and runs the expiry sweep in the
//! background.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_billing::adapters::auth::JwtSessionValidator;
use subscription_billing::adapters::http::{app_router, BillingAppState, BillingPorts};
use subscription_billing::adapters::postgres::{
    PostgresDeadLetterStore, PostgresPaymentLedger, PostgresSubscriptionRepository,
    PostgresUserDirectory,
};
use subscription_billing::adapters::stripe::{StripeConfig, StripePaymentGateway};
use subscription_billing::application::ExpireCancellationsHandler;
use subscription_billing::config::AppConfig;
use subscription_billing::domain::billing::WebhookVerifier;
use subscription_billing::domain::foundation::Timestamp;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        live_mode = config.payment.is_live_mode(),
        "Starting subscription-billing"
    );

    let pool = config.database.pool_options().connect(&config.database.url).await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let catalog = config.payment.price_catalog();
    for plan in catalog.missing_plans() {
        tracing::warn!(plan = plan.as_str(), "No gateway price configured");
    }

    let gateway = StripePaymentGateway::new(
        StripeConfig::new(config.payment.stripe_api_key.clone(), catalog.clone())
            .with_base_url(config.payment.api_base_url.clone())
            .with_redirect_urls(config.payment.success_url.clone(), config.payment.cancel_url.clone())
            .with_timeout(config.payment.timeout()),
    )?;

    let ports = BillingPorts {
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        ledger: Arc::new(PostgresPaymentLedger::new(pool.clone())),
        directory: Arc::new(PostgresUserDirectory::new(pool.clone())),
        gateway: Arc::new(gateway),
        dead_letters: Arc::new(PostgresDeadLetterStore::new(pool.clone())),
    };
    let verifier = WebhookVerifier::new(config.payment.stripe_webhook_secret.clone())
        .with_tolerance_secs(config.payment.webhook_tolerance_secs);
    let state = BillingAppState::new(ports, catalog, verifier, config.billing.webhook_budget());
    let validator = Arc::new(JwtSessionValidator::new(config.auth.jwt_config()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = config.billing.sweep_interval().map(|interval| {
        let handler = state.expire_cancellations_handler(config.billing.sweep_batch_size);
        tokio::spawn(run_expiry_sweep(handler, interval, shutdown_rx))
    });

    let app = app_router(state, validator, config.server.request_timeout());
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(sweep) = sweep {
        let _ = sweep.await;
    }
    pool.close().await;
    tracing::info!("Shut down");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

/// Expires lapsed end-of-period cancellations until shutdown.
async fn run_expiry_sweep(
    handler: ExpireCancellationsHandler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        // The handler logs its own report.
        if let Err(e) = handler.handle(Timestamp::now()).await {
            tracing::error!(alert = true, error = %e, "Expiry sweep failed");
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received ctrl+C, draining connections"),
        Err(e) => {
            tracing::error!(error = %e, "Could not listen for ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
