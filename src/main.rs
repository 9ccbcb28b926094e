use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use saaskit_gateway::audit::TracingAuditSink;
use saaskit_gateway::auth::SessionAuthenticator;
use saaskit_gateway::billing::{self, SubscriptionUpdater};
use saaskit_gateway::config;
use saaskit_gateway::entitlement::{EntitlementEvaluator, FeatureGates};
use saaskit_gateway::handlers::{protected, public};
use saaskit_gateway::middleware::auth::session_middleware;
use saaskit_gateway::middleware::GatewayState;
use saaskit_gateway::store::memory::MemoryStore;
use saaskit_gateway::store::postgres::PostgresStore;
use saaskit_gateway::store::Store;
use saaskit_gateway::tenant::TenantResolver;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("starting saaskit-gateway in {:?} mode", config.environment);

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = PostgresStore::connect(&url)
                .await
                .unwrap_or_else(|e| panic!("failed to connect to store: {}", e));
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let audit = Arc::new(TracingAuditSink);
    let authenticator = Arc::new(SessionAuthenticator::new(store.clone(), audit.clone()));
    let resolver = Arc::new(TenantResolver::new(store.clone(), audit.clone()));
    let entitlements = Arc::new(EntitlementEvaluator::new(store.clone(), FeatureGates::standard()));

    let (billing_handle, _updater) = SubscriptionUpdater::spawn(
        store.clone(),
        audit.clone(),
        config.billing.event_queue_depth,
    );

    // Periodic grace-period sweep: past_due older than the grace period
    // is canceled.
    {
        let store = store.clone();
        let audit = audit.clone();
        let grace = config.billing.grace_period();
        let every = std::time::Duration::from_secs(config.billing.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = billing::sweep_grace_period(store.as_ref(), audit.as_ref(), grace).await
                {
                    tracing::error!("grace-period sweep failed: {}", e);
                }
            }
        });
    }

    // Periodic session garbage collection: expired sessions leave the
    // store and the cache, stale lockout entries are dropped.
    {
        let authenticator = authenticator.clone();
        let every =
            std::time::Duration::from_secs(config.security.session_purge_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match authenticator.purge_expired().await {
                    Ok(purged) if purged > 0 => {
                        tracing::info!("purged {} expired sessions", purged)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("session purge failed: {}", e),
                }
            }
        });
    }

    let state = GatewayState {
        store,
        authenticator: authenticator.clone(),
        resolver,
        entitlements,
        billing: billing_handle,
    };

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("GATEWAY_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("saaskit-gateway listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server");

    // Explicit teardown: drop cached sessions before exit.
    authenticator.teardown().await;
    tracing::info!("saaskit-gateway stopped");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn app(state: GatewayState) -> Router {
    let protected_routes = Router::new()
        .route("/api/auth/whoami", get(protected::auth::whoami_get))
        .route("/api/auth/session", delete(protected::auth::session_logout))
        .route("/api/auth/sessions", delete(protected::auth::sessions_logout_all))
        .route("/api/features/:feature", get(protected::features::feature_get))
        .route(
            "/api/tenants/:tenant_id/features/:feature",
            get(protected::features::tenant_feature_get),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/login", post(public::auth::login_post))
        .route("/billing/events", post(public::billing::provider_event_post))
        // Protected API behind the session middleware
        .merge(protected_routes)
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "SaaSKit Gateway",
            "version": version,
            "description": "Multi-tenant authentication and subscription gateway",
            "endpoints": {
                "home": "/ (public)",
                "login": "/auth/login (public - token acquisition)",
                "billing": "/billing/events (public - provider notifications)",
                "auth": "/api/auth/* (protected - session management)",
                "features": "/api/features/:feature (protected - entitlement checks)",
            }
        }
    }))
}

async fn health(State(state): State<GatewayState>) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "store unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "store_error": e.to_string()
                }
            })),
        ),
    }
}
