//! # checkout-engine
//!
//! Order lifecycle and payment reconciliation service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export RAZORPAY_KEY_ID=rzp_test_...
//! export RAZORPAY_KEY_SECRET=...
//! export RAZORPAY_WEBHOOK_SECRET=...
//! export ADMIN_API_TOKEN=...
//!
//! # Run the server
//! checkout-engine
//! ```

use checkout_api::{routes, AppConfig, AppState, LogFormat};
use checkout_core::spawn_expiry_sweep;
use checkout_razorpay::REQUIRED_WEBHOOK_EVENTS;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    init_tracing(config.log_format);

    // Print banner
    print_banner();

    // Initialize application state
    let state = AppState::from_config(config)?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment provider: {}", state.gateway.provider_name());
    info!("Gateway timeout: {}ms", state.config.gateway_timeout_ms);
    info!("Webhook events to enable: {}", REQUIRED_WEBHOOK_EVENTS.join(", "));
    if state.config.admin_token.is_none() {
        warn!("ADMIN_API_TOKEN not set, admin endpoints are disabled");
    }

    let webhook_path = state.gateway.webhook_path();
    info!("Webhook URL to register: {}", state.config.public_url(&webhook_path));

    // Sweep abandoned carts in the background
    let sweep = spawn_expiry_sweep(state.carts.clone(), state.config.cart_sweep_interval());
    info!("Cart expiry sweep every {}s", state.config.cart_sweep_secs);

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("🚀 checkout-engine starting on http://{}", addr);

    if !is_prod {
        info!("📝 Health: http://{}/health", addr);
        info!("🛒 Orders: POST http://{}/api/v1/orders", addr);
        info!("🔔 Webhook: POST http://{}{}", addr, webhook_path);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep.abort();
    info!("server shut down gracefully");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Waits for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}

fn print_banner() {
    println!(
        r#"
  🧾 checkout-engine 🧾
  ━━━━━━━━━━━━━━━━━━━━━━━
  Orders, payments, reconciliation
  Version: {}
  
"#,
        env!("CARGO_PKG_VERSION")
    );
}
