use axum::{extract::State, routing::get, Json, Router};

use common::StatusSnapshot;

use crate::AppState;

pub fn status_router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use common::{Phase, Side, TradingMode};
    use tokio::sync::watch;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_serves_the_latest_snapshot() {
        let (tx, rx) = watch::channel(StatusSnapshot::new("BTC-USDT-SWAP", TradingMode::Paper));
        let app = crate::router(AppState { status: rx, stale_after: Duration::hours(2) });

        let mut next = StatusSnapshot::new("BTC-USDT-SWAP", TradingMode::Paper);
        next.phase = Phase::TrendMode;
        next.trend = Some(Side::Short);
        next.total_trades = 7;
        tx.send_replace(next.clone());

        let resp = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let got: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(got, next);
    }
}
