//! Integration tests for the price oracle.
//!
//! These tests drive a full oracle instance through its public API.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;
use tempfile::TempDir;

use price_oracle::access::{AuthorizationContext, Principal, Role};
use price_oracle::error::Error;
use price_oracle::oracle::{
    ExclusionReason, OracleAggregator, OracleConfig, OracleEventKind, PriceAggregator, Sample,
    SourceId, SourceSpec, StaticPriceFetcher, StaticReply,
};
use price_oracle::storage::{FileStore, StorageBackend};
use price_oracle::utils::constants::SNAPSHOT_KEY;
use price_oracle::utils::time::ManualClock;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const NOW: u64 = 1_700_000_000;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn admin() -> AuthorizationContext {
    AuthorizationContext::new("admin")
}

struct Harness {
    oracle: OracleAggregator,
    fetcher: Arc<StaticPriceFetcher>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let fetcher = Arc::new(StaticPriceFetcher::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let oracle = OracleAggregator::new("admin", fetcher.clone()).with_clock(clock.clone());
        Self {
            oracle,
            fetcher,
            clock,
        }
    }

    async fn with_sources(specs: &[(&str, u64)]) -> Self {
        let harness = Self::new();
        for (id, weight) in specs {
            harness
                .oracle
                .add_source(&admin(), SourceId::new(*id), *weight, 60)
                .await
                .unwrap();
        }
        harness
    }

    fn serve(&self, id: &str, price: &str, timestamp: u64) {
        self.fetcher
            .set_sample(id, Sample::new(dec(price), timestamp, 10_000))
            .unwrap();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_weight_bounds() {
    let h = Harness::new();

    for weight in [0u64, 10_001, u64::MAX] {
        let err = h
            .oracle
            .add_source(&admin(), "x".into(), weight, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidWeight { .. }));
    }

    h.oracle.add_source(&admin(), "low".into(), 1, 60).await.unwrap();
    h.oracle.add_source(&admin(), "high".into(), 10_000, 60).await.unwrap();
    assert_eq!(h.oracle.sources().len(), 2);
}

#[tokio::test]
async fn test_eleventh_source_rejected() {
    let h = Harness::new();
    for i in 0..10 {
        h.oracle
            .add_source(&admin(), SourceId::new(format!("feed-{}", i)), 1_000, 60)
            .await
            .unwrap();
    }
    // Inactive sources still count towards capacity
    h.oracle
        .set_source_active(&admin(), &"feed-0".into(), false)
        .await
        .unwrap();

    let err = h
        .oracle
        .add_source(&admin(), "feed-10".into(), 1_000, 60)
        .await
        .unwrap_err();
    assert_eq!(err, Error::TooManyRegistered { max: 10 });
    assert_eq!(h.oracle.sources().len(), 10);
}

#[tokio::test]
async fn test_duplicate_source_rejected() {
    let h = Harness::with_sources(&[("a", 1_000)]).await;
    let err = h
        .oracle
        .add_source(&admin(), "a".into(), 2_000, 60)
        .await
        .unwrap_err();
    assert_eq!(err, Error::SourceAlreadyExists("a".into()));
    assert_eq!(h.oracle.get_config(&"a".into()).unwrap().weight, 1_000);
}

#[tokio::test]
async fn test_removal_keeps_active_floor() {
    let h = Harness::with_sources(&[("a", 1_000), ("b", 1_000)]).await;

    for id in ["a", "b"] {
        let err = h.oracle.remove_source(&admin(), &id.into()).await.unwrap_err();
        assert_eq!(err, Error::InsufficientActiveSources { active: 2, min: 2 });
    }

    h.oracle.add_source(&admin(), "c".into(), 1_000, 60).await.unwrap();
    let removed = h.oracle.remove_source(&admin(), &"a".into()).await.unwrap();
    assert_eq!(removed.id, SourceId::new("a"));
    assert!(h.oracle.get_config(&"a".into()).is_none());

    let err = h.oracle.remove_source(&admin(), &"a".into()).await.unwrap_err();
    assert_eq!(err, Error::NotFound("a".into()));
}

#[tokio::test]
async fn test_update_weight() {
    let h = Harness::with_sources(&[("a", 1_000)]).await;
    h.oracle.update_weight(&admin(), &"a".into(), 7_500).await.unwrap();
    assert_eq!(h.oracle.get_config(&"a".into()).unwrap().weight, 7_500);

    assert!(matches!(
        h.oracle.update_weight(&admin(), &"a".into(), 0).await,
        Err(Error::InvalidWeight { .. })
    ));
    assert!(matches!(
        h.oracle.update_weight(&admin(), &"zz".into(), 100).await,
        Err(Error::NotFound(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_weighted_price() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "3355", NOW);

    let result = h.oracle.recompute_aggregate(&admin()).await.unwrap();
    assert_eq!(result.price, dec("3352"));
    assert_eq!(result.contributing_sources, vec![SourceId::new("a"), SourceId::new("b")]);
    assert_eq!(h.oracle.get_latest_price(), Some((dec("3352"), NOW)));
}

#[tokio::test]
async fn test_all_stale_keeps_previous_price() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "3355", NOW);
    h.oracle.recompute_aggregate(&admin()).await.unwrap();

    h.clock.advance(61);
    let err = h.oracle.recompute_aggregate(&admin()).await.unwrap_err();
    assert_eq!(err, Error::NoFreshSources { active: 2, excluded: 2 });
    assert_eq!(h.oracle.get_latest_price(), Some((dec("3352"), NOW)));
}

#[tokio::test]
async fn test_stale_source_weight_dropped() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "9000", NOW - 600);

    let result = h.oracle.recompute_aggregate(&admin()).await.unwrap();
    assert_eq!(result.price, dec("3350"));
    assert_eq!(result.total_weight, 6_000);
    assert!(matches!(
        result.excluded_sources[0].reason,
        ExclusionReason::Stale { age_secs: 600, max_staleness_secs: 60 }
    ));
}

#[tokio::test]
async fn test_inactive_sources_not_queried() {
    let h = Harness::with_sources(&[("a", 5_000), ("b", 5_000), ("c", 5_000)]).await;
    h.serve("a", "100", NOW);
    h.serve("b", "200", NOW);
    h.serve("c", "900", NOW);
    h.oracle
        .set_source_active(&admin(), &"c".into(), false)
        .await
        .unwrap();

    let result = h.oracle.recompute_aggregate(&admin()).await.unwrap();
    assert_eq!(result.price, dec("150"));
    assert!(result.excluded_sources.is_empty());
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let fetcher = Arc::new(StaticPriceFetcher::new());
    let clock = Arc::new(ManualClock::new(NOW));
    let oracle = OracleAggregator::new("admin", fetcher.clone())
        .with_clock(clock)
        .with_aggregator(PriceAggregator::new(
            Duration::from_millis(20),
            Duration::from_millis(50),
        ));

    oracle.add_source(&admin(), "fast".into(), 5_000, 60).await.unwrap();
    oracle.add_source(&admin(), "slow".into(), 5_000, 60).await.unwrap();
    fetcher
        .set_sample("fast", Sample::new(dec("10"), NOW, 10_000))
        .unwrap();
    fetcher
        .set_reply(
            "slow",
            StaticReply::Delayed(Sample::new(dec("99"), NOW, 10_000), Duration::from_secs(5)),
        )
        .unwrap();

    let result = oracle.recompute_aggregate(&admin()).await.unwrap();
    assert_eq!(result.price, dec("10"));
    assert!(matches!(
        result.excluded_sources[0].reason,
        ExclusionReason::Timeout { timeout_ms: 50 }
    ));
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "3355", NOW);
    h.oracle.recompute_aggregate(&admin()).await.unwrap();

    assert_eq!(h.oracle.get_latest_price(), h.oracle.get_latest_price());

    let first = h.oracle.get_all_prices().await;
    let second = h.oracle.get_all_prices().await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].source, SourceId::new("a"));

    // Feed changes are not visible until the next recompute
    h.serve("a", "9999", NOW);
    assert_eq!(h.oracle.get_all_prices().await, first);
    assert_eq!(h.oracle.get_latest_price(), Some((dec("3352"), NOW)));

    h.oracle.recompute_aggregate(&admin()).await.unwrap();
    let refreshed = h.oracle.get_all_prices().await;
    assert_eq!(refreshed[0].sample.price, dec("9999"));
    assert_eq!(refreshed[1].sample.price, dec("3355"));
}

#[tokio::test]
async fn test_all_prices_before_any_recompute() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "3355", NOW);

    let first = h.oracle.get_all_prices().await;
    assert_eq!(first.len(), 2);

    h.serve("a", "9999", NOW);
    assert_eq!(h.oracle.get_all_prices().await, first);
    assert_eq!(h.oracle.get_latest_price(), None);
}

#[tokio::test]
async fn test_all_prices_keeps_stale_samples() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW - 600);
    h.serve("b", "3355", NOW - 600);

    let err = h.oracle.recompute_aggregate(&admin()).await.unwrap_err();
    assert!(matches!(err, Error::NoFreshSources { .. }));

    let samples = h.oracle.get_all_prices().await;
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].sample.timestamp, NOW - 600);
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEVIATION MONITOR
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_deviation_against_published_price() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "3355", NOW);
    h.oracle.recompute_aggregate(&admin()).await.unwrap();

    let report = h.oracle.check_deviation(dec("3687.2")).unwrap();
    assert!(report.exceeded);
    assert_eq!(report.deviation_bps, 1_000);

    let report = h.oracle.check_deviation(dec("3419.04")).unwrap();
    assert!(!report.exceeded);
    assert_eq!(report.deviation_bps, 200);

    h.oracle
        .update_deviation_threshold(&admin(), 150)
        .await
        .unwrap();
    assert!(h.oracle.check_deviation(dec("3419.04")).unwrap().exceeded);
}

#[tokio::test]
async fn test_deviation_without_aggregate() {
    let h = Harness::new();
    assert_eq!(
        h.oracle.check_deviation(dec("100")).unwrap_err(),
        Error::NoAggregatePrice
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCESS CONTROL
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unauthorized_calls_change_nothing() {
    let h = Harness::with_sources(&[("a", 6_000), ("b", 4_000), ("c", 1_000)]).await;
    h.serve("a", "3350", NOW);
    h.serve("b", "3355", NOW);
    h.oracle.recompute_aggregate(&admin()).await.unwrap();

    let before = h.oracle.snapshot();
    let mut rx = h.oracle.subscribe();
    let mallory = AuthorizationContext::new("mallory");

    let results = vec![
        h.oracle.add_source(&mallory, "d".into(), 1_000, 60).await.map(|_| ()),
        h.oracle.remove_source(&mallory, &"c".into()).await.map(|_| ()),
        h.oracle.update_weight(&mallory, &"a".into(), 1).await,
        h.oracle
            .set_source_active(&mallory, &"c".into(), false)
            .await
            .map(|_| ()),
        h.oracle.recompute_aggregate(&mallory).await.map(|_| ()),
        h.oracle.update_deviation_threshold(&mallory, 1).await,
        h.oracle
            .grant_role(&mallory, Role::Admin, "mallory".into())
            .await
            .map(|_| ()),
        h.oracle
            .revoke_role(&mallory, Role::Admin, &"admin".into())
            .await
            .map(|_| ()),
    ];

    for result in results {
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }
    assert_eq!(*h.oracle.snapshot(), *before);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_role_changes_take_effect_immediately() {
    let h = Harness::new();
    let ops = AuthorizationContext::new("ops");

    assert!(h.oracle.add_source(&ops, "a".into(), 100, 60).await.is_err());

    h.oracle
        .grant_role(&admin(), Role::Manager, Principal::new("ops"))
        .await
        .unwrap();
    h.oracle.add_source(&ops, "a".into(), 100, 60).await.unwrap();

    h.oracle
        .revoke_role(&admin(), Role::Manager, &Principal::new("ops"))
        .await
        .unwrap();
    assert!(h.oracle.add_source(&ops, "b".into(), 100, 60).await.is_err());
}

#[tokio::test]
async fn test_last_admin_cannot_be_revoked() {
    let h = Harness::new();
    let err = h
        .oracle
        .revoke_role(&admin(), Role::Admin, &"admin".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
    assert!(h.oracle.has_role(&"admin".into(), Role::Admin));
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_events_follow_mutations() {
    let h = Harness::new();
    let mut rx = h.oracle.subscribe();

    h.oracle.add_source(&admin(), "a".into(), 6_000, 60).await.unwrap();
    h.oracle.add_source(&admin(), "b".into(), 4_000, 60).await.unwrap();
    h.oracle.update_weight(&admin(), &"a".into(), 5_000).await.unwrap();
    h.serve("a", "100", NOW);
    h.serve("b", "100", NOW);
    h.oracle.recompute_aggregate(&admin()).await.unwrap();

    let kinds: Vec<OracleEventKind> = (0..4).map(|_| rx.try_recv().unwrap().kind).collect();
    assert_eq!(
        kinds[0],
        OracleEventKind::SourceAdded {
            source: "a".into(),
            weight: 6_000
        }
    );
    assert_eq!(
        kinds[2],
        OracleEventKind::SourceWeightUpdated {
            source: "a".into(),
            weight: 5_000,
            previous_weight: 6_000
        }
    );
    assert!(matches!(
        kinds[3],
        OracleEventKind::PriceAggregated { source_count: 2, .. }
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn StorageBackend> = Arc::new(FileStore::new(dir.path()).unwrap());
    let fetcher = Arc::new(StaticPriceFetcher::new());
    let clock = Arc::new(ManualClock::new(NOW));

    let mut config = OracleConfig::default();
    config.sources = vec![
        SourceSpec {
            id: "a".into(),
            weight: 6_000,
            max_staleness_secs: 60,
            url: None,
            price: None,
            confidence_bps: None,
        },
        SourceSpec {
            id: "b".into(),
            weight: 4_000,
            max_staleness_secs: 60,
            url: None,
            price: None,
            confidence_bps: None,
        },
    ];

    {
        let oracle = OracleAggregator::from_config(
            &config,
            fetcher.clone(),
            clock.clone(),
            Some(store.clone()),
        )
        .unwrap();
        fetcher.set_sample("a", Sample::new(dec("3350"), NOW, 0)).unwrap();
        fetcher.set_sample("b", Sample::new(dec("3355"), NOW, 0)).unwrap();
        oracle.recompute_aggregate(&admin()).await.unwrap();
    }
    assert!(store.exists(SNAPSHOT_KEY).unwrap());

    let reopened = OracleAggregator::from_config(&config, fetcher, clock, Some(store)).unwrap();
    assert_eq!(reopened.get_latest_price(), Some((dec("3352"), NOW)));
    assert_eq!(reopened.sources().len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prop_add_source_accepts_exactly_valid_weights(weight in 0u64..20_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let h = Harness::new();
        let result = rt.block_on(h.oracle.add_source(&admin(), "s".into(), weight, 60));
        prop_assert_eq!(result.is_ok(), (1..=10_000).contains(&weight));
    }

    #[test]
    fn prop_aggregate_within_sample_range(
        prices in proptest::collection::vec(1u32..1_000_000, 1..=10),
        weights in proptest::collection::vec(1u64..=10_000, 10),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let h = Harness::new();
        rt.block_on(async {
            for (i, price) in prices.iter().enumerate() {
                let id = format!("s{}", i);
                h.oracle.add_source(&admin(), id.as_str().into(), weights[i], 60).await.unwrap();
                h.serve(&id, &price.to_string(), NOW);
            }
        });

        let result = rt.block_on(h.oracle.recompute_aggregate(&admin())).unwrap();
        let min = Decimal::from(*prices.iter().min().unwrap());
        let max = Decimal::from(*prices.iter().max().unwrap());
        prop_assert!(result.price >= min && result.price <= max);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP FRONT END
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "rpc-server")]
mod http {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use price_oracle::rpc::{router, PRINCIPAL_HEADER};
    use tower::ServiceExt;

    async fn call(
        app: axum::Router,
        method: &str,
        uri: &str,
        principal: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(principal) = principal {
            builder = builder.header(PRINCIPAL_HEADER, principal);
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_http_flow() {
        let h = Harness::new();
        h.serve("a", "3350", NOW);
        h.serve("b", "3355", NOW);
        let app = router(Arc::new(h.oracle));

        let add = |id: &str, weight: u64| {
            serde_json::json!({ "id": id, "weight": weight, "max_staleness_secs": 60 })
        };

        let (status, _) = call(app.clone(), "POST", "/sources", None, Some(add("a", 6_000))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            call(app.clone(), "POST", "/sources", Some("mallory"), Some(add("a", 6_000))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            call(app.clone(), "POST", "/sources", Some("admin"), Some(add("a", 6_000))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            call(app.clone(), "POST", "/sources", Some("admin"), Some(add("b", 4_000))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(app.clone(), "GET", "/price", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(app.clone(), "POST", "/recompute", Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        let price = body["data"]["price"].as_str().unwrap();
        assert_eq!(dec(price), dec("3352"));

        let (status, body) = call(
            app.clone(),
            "POST",
            "/deviation/check",
            None,
            Some(serde_json::json!({ "candidate": "3687.2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["exceeded"], true);
        assert_eq!(body["data"]["deviation_bps"], 1000);

        let (status, body) =
            call(app.clone(), "DELETE", "/sources/a", Some("admin"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], 1003);

        let (status, _) = call(app, "GET", "/sources/zz", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
