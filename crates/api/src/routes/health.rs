use axum::{extract::State, http::StatusCode, routing::get, Router};
use chrono::{DateTime, Duration, Utc};

use common::StatusSnapshot;

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// No cycle has run yet.
    Starting,
    Ok,
    /// Last cycle is older than the staleness window.
    Stale,
}

pub fn evaluate(status: &StatusSnapshot, now: DateTime<Utc>, stale_after: Duration) -> Health {
    match status.last_cycle_at {
        None => Health::Starting,
        Some(at) if now - at > stale_after => Health::Stale,
        Some(_) => Health::Ok,
    }
}

/// Liveness probe, no auth. Used by the hosting platform's health check.
async fn health(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let health = evaluate(&state.status.borrow(), Utc::now(), state.stale_after);
    match health {
        Health::Ok => (StatusCode::OK, "OK"),
        Health::Starting => (StatusCode::OK, "OK (starting)"),
        Health::Stale => (StatusCode::SERVICE_UNAVAILABLE, "STALE"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use common::TradingMode;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn status_at(at: Option<DateTime<Utc>>) -> StatusSnapshot {
        let mut s = StatusSnapshot::new("BTC-USDT-SWAP", TradingMode::Paper);
        s.last_cycle_at = at;
        s
    }

    #[test]
    fn staleness_follows_the_last_cycle() {
        let now = Utc::now();
        let window = Duration::hours(2);
        assert_eq!(evaluate(&status_at(None), now, window), Health::Starting);
        assert_eq!(
            evaluate(&status_at(Some(now - Duration::minutes(70))), now, window),
            Health::Ok
        );
        assert_eq!(
            evaluate(&status_at(Some(now - Duration::hours(3))), now, window),
            Health::Stale
        );
    }

    #[tokio::test]
    async fn stale_service_answers_503() {
        let (_tx, rx) = watch::channel(status_at(Some(Utc::now() - Duration::hours(5))));
        let app = crate::router(AppState { status: rx, stale_after: Duration::hours(2) });

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn root_answers_ok_for_a_fresh_cycle() {
        let (_tx, rx) = watch::channel(status_at(Some(Utc::now())));
        let app = crate::router(AppState { status: rx, stale_after: Duration::hours(2) });

        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }
}
