//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the cart and order stores, the catalog, the payment gateway and the
//! order services together from configuration.

use anyhow::Context;
use checkout_core::{
    InMemoryCartStore, InMemoryOrderStore, LoggingNotifier, OrderFactory, OrderLifecycle,
    PaymentService, PricingConfig, ReconciliationListener, SharedCartStore, SharedCatalog,
    SharedGateway, SharedNotifier, SharedOrderStore, StaticCatalog,
};
use checkout_razorpay::RazorpayGateway;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CART_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CART_SWEEP_SECS: u64 = 60 * 60;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Application configuration
#[derive(Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used to print the webhook URL to register
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Token required on admin endpoints; admin endpoints are closed when unset
    pub admin_token: Option<String>,
    /// Idle lifetime of a cart
    pub cart_ttl_secs: i64,
    /// How often expired carts are swept
    pub cart_sweep_secs: u64,
    /// Upper bound for a single gateway call
    pub gateway_timeout_ms: u64,
    /// Explicit pricing file; the default locations are searched when unset
    pub pricing_path: Option<String>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            admin_token: std::env::var("ADMIN_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            cart_ttl_secs: std::env::var("CART_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &i64| *secs > 0)
                .unwrap_or(DEFAULT_CART_TTL_SECS),
            cart_sweep_secs: std::env::var("CART_SWEEP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(DEFAULT_CART_SWEEP_SECS),
            gateway_timeout_ms: std::env::var("GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_MS),
            pricing_path: std::env::var("PRICING_CONFIG").ok(),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn cart_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cart_ttl_secs)
    }

    pub fn cart_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cart_sweep_secs)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    /// Public URL of a route on this service
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            environment: "development".to_string(),
            admin_token: None,
            cart_ttl_secs: DEFAULT_CART_TTL_SECS,
            cart_sweep_secs: DEFAULT_CART_SWEEP_SECS,
            gateway_timeout_ms: DEFAULT_GATEWAY_TIMEOUT_MS,
            pricing_path: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("cart_ttl_secs", &self.cart_ttl_secs)
            .field("cart_sweep_secs", &self.cart_sweep_secs)
            .field("gateway_timeout_ms", &self.gateway_timeout_ms)
            .field("pricing_path", &self.pricing_path)
            .field("log_format", &self.log_format)
            .finish()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub carts: SharedCartStore,
    pub catalog: SharedCatalog,
    pub factory: Arc<OrderFactory>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub payments: Arc<PaymentService>,
    pub listener: Arc<ReconciliationListener>,
    pub gateway: SharedGateway,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create AppState with the Razorpay gateway and on-disk catalog and pricing
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let pricing = load_pricing(config.pricing_path.as_deref())?;
        let catalog = load_product_catalog()?;

        let gateway = RazorpayGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Razorpay: {}", e))?;
        if gateway.config().is_live_mode() && !config.is_production() {
            tracing::warn!("Razorpay live keys in use outside production");
        }

        Ok(Self::with_components(
            config,
            pricing,
            Arc::new(catalog),
            Arc::new(gateway),
            Arc::new(LoggingNotifier),
        ))
    }

    /// Assemble the services around explicit collaborators
    pub fn with_components(
        config: AppConfig,
        pricing: PricingConfig,
        catalog: SharedCatalog,
        gateway: SharedGateway,
        notifier: SharedNotifier,
    ) -> Self {
        let carts: SharedCartStore =
            Arc::new(InMemoryCartStore::new(pricing.currency, config.cart_ttl()));
        let orders: SharedOrderStore = Arc::new(InMemoryOrderStore::new());

        let factory = OrderFactory::new(carts.clone(), orders.clone(), pricing);
        let lifecycle = OrderLifecycle::new(orders.clone(), notifier.clone());
        let payments = PaymentService::new(orders.clone(), gateway.clone(), notifier.clone())
            .with_timeout(config.gateway_timeout());
        let listener = ReconciliationListener::new(orders.clone(), gateway.clone(), notifier);

        Self {
            carts,
            catalog,
            factory: Arc::new(factory),
            lifecycle: Arc::new(lifecycle),
            payments: Arc::new(payments),
            listener: Arc::new(listener),
            gateway,
            config,
        }
    }
}

/// Read the first config file that exists
fn read_first(paths: &[&str]) -> Option<(String, String)> {
    paths.iter().find_map(|path| {
        std::fs::read_to_string(path)
            .ok()
            .map(|content| (path.to_string(), content))
    })
}

/// Load pricing from `PRICING_CONFIG` or config/pricing.toml
fn load_pricing(explicit: Option<&str>) -> anyhow::Result<PricingConfig> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read pricing config {}", path))?;
        let pricing = PricingConfig::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
        tracing::info!("Loaded pricing from {}", path);
        return Ok(pricing);
    }

    let config_paths = [
        "config/pricing.toml",
        "../config/pricing.toml",
        "../../config/pricing.toml",
    ];

    match read_first(&config_paths) {
        Some((path, content)) => {
            let pricing = PricingConfig::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded pricing from {}", path);
            Ok(pricing)
        }
        None => {
            tracing::warn!("No pricing config found, using defaults");
            Ok(PricingConfig::default())
        }
    }
}

/// Load product catalog from config file
fn load_product_catalog() -> anyhow::Result<StaticCatalog> {
    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    match read_first(&config_paths) {
        Some((path, content)) => {
            let catalog = StaticCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} products from {}", catalog.products.len(), path);
            Ok(catalog)
        }
        None => {
            tracing::warn!("No product catalog found, using empty catalog");
            Ok(StaticCatalog::new())
        }
    }
}
