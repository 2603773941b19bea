use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tower_http::trace::TraceLayer;

use crate::db::UsageSource;
use crate::error::ApiError;
use crate::history::{self, History};
use crate::params::{self, DateValidation, ReportQuery};
use crate::report::{self, Dashboard, Report};

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn UsageSource>,
    pub timezone: Tz,
}

impl AppState {
    pub fn new(source: Arc<dyn UsageSource>, timezone: Tz) -> Self {
        Self { source, timezone }
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/readiness", get(readiness))
        .route("/data", get(data))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/data", get(dashboard))
        .route("/history", get(cumulative_history))
        .route("/", get(home))
        .route("/{*path}", get(home))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn readiness() -> &'static str {
    "OK"
}

async fn respond_with_report(
    state: &AppState,
    raw: Option<&str>,
    validation: DateValidation,
) -> Result<Json<Report>, ApiError> {
    let now = state.now();
    let request = params::bind(ReportQuery::parse(raw), validation, now)?;
    let report = report::build(state.source.as_ref(), &request, now).await?;
    Ok(Json(report))
}

async fn data(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Report>, ApiError> {
    respond_with_report(&state, raw.as_deref(), DateValidation::Strict).await
}

/// Default view: malformed dates fall back to the defaults instead of
/// failing the page.
async fn home(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Report>, ApiError> {
    respond_with_report(&state, raw.as_deref(), DateValidation::Lenient).await
}

async fn dashboard(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Dashboard>, ApiError> {
    let query = ReportQuery::parse(raw.as_deref());
    let group_text = query.current_group.filter(|g| !g.is_empty());
    let group = params::group_filter(group_text.as_deref());
    let dashboard = report::dashboard(
        state.source.as_ref(),
        group.as_deref(),
        group_text,
        state.now(),
    )
    .await?;
    Ok(Json(dashboard))
}

async fn cumulative_history(State(state): State<AppState>) -> Result<Json<History>, ApiError> {
    Ok(Json(history::history(state.source.as_ref()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueryError, QueryResult};
    use crate::mock::MockSource;
    use crate::models::{
        DateTypeCount, Filter, GroupCount, HourlyCount, MonthlyCount, TypeCount, UserCount,
    };
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono_tz::Europe::London;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BROKEN_PARAM: &str = "secret_lookup";

    /// Every query fails with an internal error that must not reach callers.
    struct BrokenStore;

    fn broken<T>() -> QueryResult<T> {
        Err(QueryError::UnboundParameter(BROKEN_PARAM.to_string()))
    }

    #[async_trait]
    impl UsageSource for BrokenStore {
        async fn usage_by_date_type(&self, _: &Filter) -> QueryResult<Vec<DateTypeCount>> {
            broken()
        }
        async fn usage_by_type(&self, _: &Filter) -> QueryResult<Vec<TypeCount>> {
            broken()
        }
        async fn usage_by_group(&self, _: &Filter) -> QueryResult<Vec<GroupCount>> {
            broken()
        }
        async fn usage_by_user(&self, _: &Filter) -> QueryResult<Vec<UserCount>> {
            broken()
        }
        async fn search_totals(
            &self,
            _: bool,
            _: Option<&str>,
            _: DateTime<Tz>,
        ) -> QueryResult<i64> {
            broken()
        }
        async fn search_with_group_filtering(&self, _: &Filter) -> QueryResult<i64> {
            broken()
        }
        async fn hourly_usage(&self, _: &Filter) -> QueryResult<Vec<HourlyCount>> {
            broken()
        }
        async fn cumulative_usage(&self) -> QueryResult<Vec<MonthlyCount>> {
            broken()
        }
    }

    fn app() -> Router {
        let source = MockSource::load().unwrap();
        router(AppState::new(Arc::new(source), London))
    }

    async fn call(app: Router, path: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_path(path: &str) -> (StatusCode, Vec<u8>) {
        call(app(), path).await
    }

    async fn get_json(path: &str) -> (StatusCode, Value) {
        let (status, body) = get_path(path).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn readiness_is_ok() {
        let (status, body) = get_path("/readiness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn data_returns_the_report() {
        let (status, json) =
            get_json("/data?from=2020-06-01&to=2020-06-08&currentGroup=No%20group").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["datasets"].as_array().map(Vec::len), Some(4));
        assert_eq!(json["dates"].as_array().map(Vec::len), Some(7));
        assert_eq!(json["currentGroup"], "No group");
        assert_eq!(json["total"], 461);
    }

    #[tokio::test]
    async fn data_rejects_bad_from() {
        let (status, json) = get_json("/data?from=2019-09-50").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
        assert_eq!(
            json["error"]["message"],
            "Must provide \"from\" date parameter, and optionally a \"to\" date"
        );
    }

    #[tokio::test]
    async fn data_rejects_bad_to() {
        let (status, json) = get_json("/data?from=2020-06-01&to=2020-06-31").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"]["message"],
            "Make sure the date format is \"YYYY-MM-DD\" (time is ignored)"
        );
    }

    #[tokio::test]
    async fn data_rejects_signed_years() {
        let (status, json) = get_json("/data?from=%2B020-06-01").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn data_echoes_bracketed_exclusions_as_a_list() {
        let (status, json) =
            get_json("/data?from=2020-06-01&withoutGroups%5B%5D=%2FMonitor").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["withoutGroups"], json!(["/Monitor"]));

        let (_, json) = get_json("/data?from=2020-06-01&withoutGroups=%2FMonitor").await;
        assert_eq!(json["withoutGroups"], "/Monitor");
    }

    #[tokio::test]
    async fn store_failures_return_only_the_generic_error() {
        let app = router(AppState::new(Arc::new(BrokenStore), London));
        for path in ["/data?from=2020-06-01", "/dashboard", "/history", "/"] {
            let (status, body) = call(app.clone(), path).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path}");

            let text = String::from_utf8(body).unwrap();
            assert!(!text.contains(BROKEN_PARAM), "{path} leaked: {text}");
            let json: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(
                json,
                json!({"error": {"code": "fetch_failed", "message": "Could not fetch data"}})
            );
        }
    }

    #[tokio::test]
    async fn default_view_tolerates_bad_dates() {
        let (status, json) = get_json("/anything/else?from=garbage").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["datasets"].as_array().map(Vec::len), Some(4));

        let (status, _) = get_json("/").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn dashboard_routes_share_a_model() {
        for path in ["/dashboard", "/dashboard/data?currentGroup=%2FTeam%20A"] {
            let (status, json) = get_json(path).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["today"], 57);
            assert_eq!(json["allTime"], 1_843_210);
        }
    }

    #[tokio::test]
    async fn history_lists_months() {
        let (status, json) = get_json("/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["month"], 1_585_695_600);
        assert_eq!(json["data"][2]["count"], 4567);
    }
}
