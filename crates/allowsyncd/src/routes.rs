//! HTTP surface of the daemon
//!
//! - `GET /sync`: run one reconciliation, answer 200 / 409 / 500 with the
//!   run's JSON body
//! - `GET /health`: liveness

use allowsync_core::traits::Notifier;
use allowsync_core::{Error, SyncEngine, SyncOutcome, SyncResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// What a `/sync` trigger runs against
pub enum SyncTarget {
    /// A fully wired engine
    Ready(Arc<SyncEngine>),

    /// The job cannot run; every trigger reports this error
    Misconfigured {
        error: Error,
        notifier: Option<Box<dyn Notifier>>,
        call_timeout: Duration,
    },
}

/// Shared application state
pub struct AppState {
    pub target: SyncTarget,
}

/// Build the router with request tracing
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sync", get(sync_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn sync_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SyncResponse>) {
    let outcome = match &state.target {
        SyncTarget::Ready(engine) => Arc::clone(engine).run_guarded().await,
        SyncTarget::Misconfigured {
            error,
            notifier,
            call_timeout,
        } => {
            warn!("Sync triggered while misconfigured: {}", error);
            let mut outcome = SyncOutcome::configuration_error(error);
            SyncEngine::notify_with(notifier.as_deref(), *call_timeout, &mut outcome.report)
                .await;
            outcome.response.report = outcome.report.lines().to_vec();
            outcome
        }
    };

    let status = StatusCode::from_u16(outcome.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.response))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use allowsync_core::traits::{AddResult, AllowlistProvider, DnsResolver, IpRange};
    use allowsync_core::{ProviderConfig, Result, SyncConfig};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct OneDomainDns;

    #[async_trait::async_trait]
    impl DnsResolver for OneDomainDns {
        async fn txt_records(&self, domain: &str) -> Result<Vec<String>> {
            match domain {
                "_spf.example.com" => Ok(vec!["v=spf1 ip4:10.0.0.0/8 ~all".to_string()]),
                other => Err(Error::resolution(format!("NXDOMAIN for {}", other))),
            }
        }

        async fn ipv4_addrs(&self, hostname: &str) -> Result<Vec<Ipv4Addr>> {
            Err(Error::resolution(format!("NXDOMAIN for {}", hostname)))
        }

        fn resolver_name(&self) -> &'static str {
            "test"
        }
    }

    struct FixedProvider {
        entries: Vec<&'static str>,
        fail_writes: bool,
    }

    #[async_trait::async_trait]
    impl AllowlistProvider for FixedProvider {
        async fn list(&self) -> Result<BTreeSet<IpRange>> {
            Ok(self.entries.iter().map(|e| IpRange::from(*e)).collect())
        }

        async fn add(&self, entries: &[IpRange]) -> Result<AddResult> {
            if self.fail_writes {
                return Err(Error::provider_write(
                    "SendGrid request failed. Status: 400 Bad Request",
                    vec!["invalid ip address".to_string()],
                ));
            }
            Ok(AddResult::from_entries(entries.to_vec()))
        }

        fn provider_name(&self) -> &'static str {
            "fixed"
        }
    }

    #[derive(Clone, Default)]
    struct Outbox(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl Notifier for Outbox {
        async fn notify(&self, subject: &str, _body: &str) -> Result<()> {
            self.0.lock().unwrap().push(subject.to_string());
            Ok(())
        }

        fn notifier_name(&self) -> &'static str {
            "outbox"
        }
    }

    fn ready_router(provider: FixedProvider) -> Router {
        let config = SyncConfig::new(ProviderConfig::Sendgrid {
            api_key: "SG.test".to_string(),
            base_url: None,
            dry_run: false,
        })
        .with_spf_root("_spf.example.com");

        let (engine, _rx) =
            SyncEngine::new(Box::new(OneDomainDns), Box::new(provider), None, &config).unwrap();

        build_router(Arc::new(AppState {
            target: SyncTarget::Ready(Arc::new(engine)),
        }))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_sync_adds_missing_ranges() {
        let app = ready_router(FixedProvider {
            entries: vec![],
            fail_writes: false,
        });

        let (status, json) = get_json(app, "/sync").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["added"], 1);
        assert!(json["message"].is_string());
        assert!(json["report"].as_array().unwrap().len() > 2);
    }

    #[tokio::test]
    async fn test_sync_up_to_date() {
        let app = ready_router(FixedProvider {
            entries: vec!["10.0.0.0/8"],
            fail_writes: false,
        });

        let (status, json) = get_json(app, "/sync").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["added"], 0);
    }

    #[tokio::test]
    async fn test_sync_failure_is_500_with_details() {
        let app = ready_router(FixedProvider {
            entries: vec![],
            fail_writes: true,
        });

        let (status, json) = get_json(app, "/sync").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to add IP ranges to the allowlist");
        assert_eq!(json["details"], json!(["invalid ip address"]));
        assert!(json.get("added").is_none());
    }

    #[tokio::test]
    async fn test_misconfigured_sync_is_500_and_mailed() {
        let outbox = Outbox::default();
        let app = build_router(Arc::new(AppState {
            target: SyncTarget::Misconfigured {
                error: Error::config("SendGrid API key is not configured"),
                notifier: Some(Box::new(outbox.clone())),
                call_timeout: Duration::from_secs(5),
            },
        }));

        let (status, json) = get_json(app, "/sync").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Configuration error");
        assert_eq!(
            outbox.0.lock().unwrap().as_slice(),
            &["ERROR: allowsync is misconfigured".to_string()]
        );
    }

    #[tokio::test]
    async fn test_health() {
        let app = ready_router(FixedProvider {
            entries: vec![],
            fail_writes: false,
        });

        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
