//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::policy::PermissionResolver;
use crate::registry::CapabilityRegistry;
use crate::repository::{
    CapabilityRepositoryImpl, MemberGrantRepositoryImpl, TenantAccessRepositoryImpl,
};
use crate::service::GrantService;
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

type Resolver = PermissionResolver<
    CapabilityRepositoryImpl,
    TenantAccessRepositoryImpl,
    MemberGrantRepositoryImpl,
>;

type Grants = GrantService<
    CapabilityRepositoryImpl,
    TenantAccessRepositoryImpl,
    MemberGrantRepositoryImpl,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub registry: Arc<CapabilityRegistry<CapabilityRepositoryImpl>>,
    pub resolver: Arc<Resolver>,
    pub grant_service: Arc<Grants>,
}

pub async fn run(config: Config) -> Result<()> {
    // Create database connection pool
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    info!("Connected to database");

    // Create repositories
    let capability_repo = Arc::new(CapabilityRepositoryImpl::new(db_pool.clone()));
    let tenant_access_repo = Arc::new(TenantAccessRepositoryImpl::new(db_pool.clone()));
    let member_grant_repo = Arc::new(MemberGrantRepositoryImpl::new(db_pool.clone()));

    // Create the capability registry with its in-process cache
    let registry = Arc::new(CapabilityRegistry::new(
        capability_repo.clone(),
        config.registry.modules_dir.clone(),
        Duration::from_secs(config.registry.cache_ttl_secs),
    ));

    if config.registry.sync_on_start {
        registry.run_startup_sync().await;
    } else {
        info!("Startup capability sync disabled, serving persisted state");
        registry.mark_discovery_complete();
    }

    // Create the resolver and the grant service
    let resolver = Arc::new(PermissionResolver::new(
        registry.clone(),
        tenant_access_repo.clone(),
        member_grant_repo.clone(),
    ));
    let grant_service = Arc::new(GrantService::new(
        capability_repo,
        registry.clone(),
        tenant_access_repo,
        member_grant_repo,
    ));

    // Create app state
    let state = AppState {
        config: Arc::new(config.clone()),
        db_pool,
        registry,
        resolver,
        grant_service,
    };

    let app = build_router(state);

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        // Capability registry administration
        .route("/admin/capabilities", get(api::admin::list_capabilities))
        .route(
            "/admin/capabilities/{key}/activate",
            post(api::admin::activate_capability),
        )
        .route(
            "/admin/capabilities/{key}/deactivate",
            post(api::admin::deactivate_capability),
        )
        // Tenant access administration
        .route(
            "/admin/tenants/{tenant_id}/capabilities/{key}/enable",
            post(api::admin::enable_for_tenant),
        )
        .route(
            "/admin/tenants/{tenant_id}/capabilities/{key}/disable",
            post(api::admin::disable_for_tenant),
        )
        // Member grant administration
        .route(
            "/admin/members/{user_id}/capabilities/{key}/grant",
            put(api::admin::grant_member_actions)
                .delete(api::admin::revoke_member_actions),
        )
        // Access decision probes for the calling actor
        .route(
            "/access/capabilities/{key}",
            get(api::access::check_reach),
        )
        .route(
            "/access/capabilities/{key}/actions/{action}",
            get(api::access::check_action),
        )
        // Registry maintenance
        .route("/admin/registry/sync", post(api::admin::sync_registry))
        .route(
            "/admin/registry/cache/invalidate",
            post(api::admin::invalidate_cache),
        )
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
