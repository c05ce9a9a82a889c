use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use ledgerbot_db::DbPool;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    if !ready {
        warn!(event_name = "system.health.degraded", detail = %database.detail, "database not ready");
    }

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "ledgerbot-server accepting messages".to_string() },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    let ledger_probe = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products").fetch_one(pool);
    match ledger_probe.await {
        Ok(products) => HealthCheck {
            status: "ready",
            detail: format!("ledger reachable ({products} products)"),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("ledger query failed: {error}") }
        }
    }
}
