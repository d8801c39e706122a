// Generation pipeline tests
// Author: kelexine (https://github.com/kelexine)

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use velvet_gateway::cache::fingerprint;
use velvet_gateway::error::{GatewayError, Result};
use velvet_gateway::limiter::ManualClock;
use velvet_gateway::orchestrator::{GatewayFactory, GenerateRequest, SessionGateway, MAX_SEED};
use velvet_gateway::storage::MemoryStoreProvider;
use velvet_gateway::upstream::{GenerationParams, ImageModel};

/// Image model that fails its first `failures` calls.
#[derive(Default)]
struct FakeModel {
    failures: u32,
    calls: AtomicU32,
    seen: Mutex<Vec<(Instant, GenerationParams)>>,
}

impl FakeModel {
    fn failing(failures: u32) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageModel for FakeModel {
    async fn generate(&self, params: &GenerationParams) -> Result<Bytes> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().push((Instant::now(), params.clone()));
        if call <= self.failures {
            return Err(GatewayError::Upstream(format!("capacity exceeded (call {})", call)));
        }
        Ok(Bytes::from(format!("png:{}", params.prompt)))
    }

    fn name(&self) -> &str {
        "fake-model"
    }
}

fn gateway(model: Arc<FakeModel>, clock: Arc<ManualClock>, session: &str) -> SessionGateway {
    let model: Arc<dyn ImageModel> = model;
    GatewayFactory::new(Arc::new(MemoryStoreProvider::default()), Some(model), clock)
        .build(session)
        .unwrap()
}

#[tokio::test]
async fn test_eleventh_request_in_window_is_rate_limited() {
    let model = Arc::new(FakeModel::default());
    let clock = Arc::new(ManualClock::new(6_000_015));
    let gateway = gateway(model.clone(), clock, "abc");

    for i in 0..10 {
        let request = GenerateRequest::new(format!("a lighthouse at night, take {}", i));
        let result = gateway.generate(&request).await.unwrap();
        assert!(!result.cached);
    }

    let err = gateway
        .generate(&GenerateRequest::new("one request too many"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited { retry_after_secs: 45 }));
    assert_eq!(err.status_code().as_u16(), 429);
    assert_eq!(model.calls(), 10);

    let stats = gateway.stats().unwrap();
    assert_eq!(stats.admissions.admitted, 10);
    assert_eq!(stats.admissions.rejected, 1);
}

#[tokio::test]
async fn test_limit_resets_in_next_window() {
    let model = Arc::new(FakeModel::default());
    let clock = Arc::new(ManualClock::new(6_000_000));
    let gateway = gateway(model, clock.clone(), "abc");

    for i in 0..10 {
        gateway
            .generate(&GenerateRequest::new(format!("window filler {}", i)))
            .await
            .unwrap();
    }
    assert!(gateway.generate(&GenerateRequest::new("denied prompt")).await.is_err());

    clock.advance(60);
    assert!(gateway.generate(&GenerateRequest::new("allowed again")).await.is_ok());
    assert_eq!(gateway.stats().unwrap().requests_this_window, 1);
}

#[tokio::test]
async fn test_repeat_prompt_is_served_from_cache() {
    let model = Arc::new(FakeModel::default());
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");
    let request = GenerateRequest::new("a sunset over mountains");

    let first = gateway.generate(&request).await.unwrap();
    let second = gateway.generate(&request).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.image, second.image);
    assert_eq!(first.seed, second.seed);
    assert!(first.seed.unwrap() <= MAX_SEED);
    assert_eq!(model.calls(), 1);

    // Cache hits still count against the window
    let stats = gateway.stats().unwrap();
    assert_eq!(stats.requests_this_window, 2);
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache.misses, 1);
    assert_eq!(stats.cache_entries, 1);
}

#[tokio::test]
async fn test_surrounding_whitespace_hits_same_entry() {
    let model = Arc::new(FakeModel::default());
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    gateway.generate(&GenerateRequest::new("sunset over mountains")).await.unwrap();
    let hit = gateway
        .generate(&GenerateRequest::new("  sunset over mountains \n"))
        .await
        .unwrap();
    assert!(hit.cached);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_negative_prompt_is_part_of_the_key() {
    let model = Arc::new(FakeModel::default());
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    gateway.generate(&GenerateRequest::new("sunset over mountains")).await.unwrap();
    let other = gateway
        .generate(&GenerateRequest::new("sunset over mountains").with_negative_prompt("clouds"))
        .await
        .unwrap();
    assert!(!other.cached);
    assert_eq!(model.calls(), 2);

    let seen = model.seen.lock();
    assert!(seen[0].1.negative_prompt.contains("watermark"));
    assert_eq!(seen[1].1.negative_prompt, "clouds");
}

#[tokio::test]
async fn test_short_prompt_does_not_consume_budget() {
    let model = Arc::new(FakeModel::default());
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    let err = gateway.generate(&GenerateRequest::new("  hey  ")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(ref m) if m == "Prompt must be at least 5 characters"));
    assert_eq!(err.status_code().as_u16(), 400);

    let stats = gateway.stats().unwrap();
    assert_eq!(stats.requests_this_window, 0);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_missing_model_is_configuration_error_without_admission() {
    let gateway = GatewayFactory::new(
        Arc::new(MemoryStoreProvider::default()),
        None,
        Arc::new(ManualClock::new(1_000)),
    )
    .build("abc")
    .unwrap();

    let err = gateway
        .generate(&GenerateRequest::new("sunset over mountains"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
    assert_eq!(err.status_code().as_u16(), 500);
    assert_eq!(gateway.stats().unwrap().requests_this_window, 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_leave_no_cache_entry() {
    let model = Arc::new(FakeModel::failing(u32::MAX));
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    let err = gateway
        .generate(&GenerateRequest::new("sunset over mountains"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Upstream(ref m) if m.contains("call 3")));
    assert_eq!(model.calls(), 3);

    let stats = gateway.stats().unwrap();
    assert_eq!(stats.cache_entries, 0);
    assert_eq!(stats.upstream_attempts, 3);
    // Exactly one admission for the whole request
    assert_eq!(stats.requests_this_window, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_increase() {
    let model = Arc::new(FakeModel::failing(2));
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    let result = gateway
        .generate(&GenerateRequest::new("sunset over mountains"))
        .await
        .unwrap();
    assert!(!result.cached);
    assert_eq!(model.calls(), 3);

    let seen = model.seen.lock();
    let first_gap = seen[1].0 - seen[0].0;
    let second_gap = seen[2].0 - seen[1].0;
    assert!(first_gap >= Duration::from_millis(600));
    assert!(second_gap >= Duration::from_millis(1200));
    assert!(second_gap > first_gap);

    // The seed that produced the image is the one reported
    assert_eq!(result.seed, Some(seen[2].1.seed));
}

#[tokio::test]
async fn test_style_is_applied_before_invocation() {
    let model = Arc::new(FakeModel::default());
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    gateway
        .generate(&GenerateRequest::new("a red fox").with_style("Cinematic"))
        .await
        .unwrap();
    let plain = gateway.generate(&GenerateRequest::new("a red fox")).await.unwrap();

    assert!(!plain.cached);
    let seen = model.seen.lock();
    assert!(seen[0].1.prompt.starts_with("a red fox, "));
    assert_eq!(seen[1].1.prompt, "a red fox");
}

#[tokio::test]
async fn test_unknown_style_is_rejected() {
    let model = Arc::new(FakeModel::default());
    let gateway = gateway(model.clone(), Arc::new(ManualClock::new(1_000)), "abc");

    let err = gateway
        .generate(&GenerateRequest::new("a red fox").with_style("vaporwave"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(gateway.stats().unwrap().requests_this_window, 0);
}

#[tokio::test]
async fn test_sessions_do_not_share_counters() {
    let model: Arc<dyn ImageModel> = Arc::new(FakeModel::default());
    let factory = GatewayFactory::new(
        Arc::new(MemoryStoreProvider::default()),
        Some(model),
        Arc::new(ManualClock::new(1_000)),
    );
    let abc = factory.build("abc").unwrap();
    let xyz = factory.build("xyz").unwrap();

    for i in 0..10 {
        abc.generate(&GenerateRequest::new(format!("busy session {}", i)))
            .await
            .unwrap();
    }
    assert!(abc.generate(&GenerateRequest::new("busy session 10")).await.is_err());
    let fresh = xyz.generate(&GenerateRequest::new("busy session 0")).await.unwrap();
    assert!(!fresh.cached);
}

proptest! {
    #[test]
    fn prop_fingerprint_is_hash_of_concatenation(prompt in ".{0,40}", negative in ".{0,20}") {
        let joined = format!("{}{}", prompt, negative);
        prop_assert_eq!(fingerprint(&prompt, Some(&negative)), fingerprint(&joined, None));
        prop_assert_eq!(fingerprint(&prompt, None), fingerprint(&prompt, Some("")));

        let key = fingerprint(&prompt, Some(&negative));
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
