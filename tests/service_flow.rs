//! End-to-end behaviour of the service facade against scripted drivers.

mod common;

use adaptive_ai_service::drivers::{MockDriver, MockOutcome};
use adaptive_ai_service::error_code::ErrorCode;
use adaptive_ai_service::{
    AdaptiveAiService, CacheType, ComplexityTier, GenerateOutcome, Message, Priority, ProviderKind,
};
use common::{ask, fast_config, quiet_config, service, settle, snack};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_call() {
    let driver = Arc::new(
        MockDriver::new(ProviderKind::OpenAi)
            .with_reply("apples and almonds")
            .with_delay(Duration::from_millis(100)),
    );
    let svc = Arc::new(service(fast_config(), &[driver.clone()]));

    let calls = (0..5).map(|i| {
        let svc = Arc::clone(&svc);
        async move {
            svc.complete(snack(&format!("user-{i}")).with_priority(Priority::Critical))
                .await
        }
    });
    let responses = futures::future::join_all(calls).await;

    assert_eq!(driver.calls(), 1);
    for r in &responses {
        assert_eq!(r.as_ref().unwrap().content, "apples and almonds");
    }
    assert_eq!(svc.stats().coalesced, 4);
    assert_eq!(svc.stats().in_flight, 0);
}

#[tokio::test]
async fn test_identical_queued_requests_share_one_call() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi).with_reply("carrots and hummus"));
    let svc = Arc::new(service(fast_config(), &[driver.clone()]));

    let calls = (0..5).map(|i| {
        let svc = Arc::clone(&svc);
        async move { svc.complete(snack(&format!("user-{i}"))).await }
    });
    let responses = futures::future::join_all(calls).await;

    assert_eq!(driver.calls(), 1);
    let mut cached = 0;
    for r in &responses {
        let r = r.as_ref().unwrap();
        assert!(r.queued);
        assert_eq!(r.content, "carrots and hummus");
        cached += r.cached as usize;
    }
    assert_eq!(cached, 4);
    svc.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_batch_in_progress() {
    let driver = Arc::new(
        MockDriver::new(ProviderKind::OpenAi)
            .with_reply("slow but sure")
            .with_delay(Duration::from_secs(12)),
    );
    let svc = service(fast_config(), &[driver.clone()]);

    let outcome = svc.generate_completion(snack("u1")).await.unwrap();
    let GenerateOutcome::Queued(handle) = outcome else {
        panic!("normal priority should be queued");
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(svc.stats().processing_batch);

    svc.shutdown().await;

    let response = handle.wait().await.unwrap();
    assert_eq!(response.content, "slow but sure");
    assert!(response.queued);
    assert!(!svc.stats().processing_batch);
    assert_eq!(driver.calls(), 1);
}

#[tokio::test]
async fn test_flush_order_follows_priority() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi));
    let svc = service(quiet_config(), &[driver.clone()]);
    settle().await;

    let mut handles = Vec::new();
    for (priority, text) in [
        (Priority::Low, "low one"),
        (Priority::High, "high one"),
        (Priority::Normal, "normal one"),
        (Priority::High, "high two"),
    ] {
        let outcome = svc
            .generate_completion(ask("u1", text).with_priority(priority))
            .await
            .unwrap();
        let GenerateOutcome::Queued(handle) = outcome else {
            panic!("{priority} should be queued");
        };
        handles.push(handle);
    }

    let positions: Vec<usize> = handles.iter().map(|h| h.position).collect();
    assert_eq!(positions, vec![1, 1, 2, 2]);

    let sizes = svc.stats().queues;
    assert_eq!((sizes.critical, sizes.high, sizes.normal, sizes.low), (0, 2, 1, 1));

    svc.shutdown().await;

    let served: Vec<String> = driver
        .requests()
        .iter()
        .map(|r| r.messages[0].content.clone())
        .collect();
    assert_eq!(served, vec!["high one", "high two", "normal one", "low one"]);

    for handle in handles {
        assert!(handle.wait().await.unwrap().queued);
    }
}

#[tokio::test]
async fn test_critical_is_never_queued() {
    let driver = Arc::new(MockDriver::new(ProviderKind::Gemini).with_delay(Duration::from_millis(30)));
    let svc = Arc::new(service(quiet_config(), &[driver]));

    let background = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move {
            svc.complete(ask("u1", "urgent: dizzy after insulin").with_priority(Priority::Critical))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(svc.stats().queues.critical, 0);
    assert_eq!(svc.stats().queues.total(), 0);

    let response = background.await.unwrap().unwrap();
    assert!(!response.queued);
}

#[tokio::test]
async fn test_fallback_counts_once_per_request() {
    let primary = Arc::new(MockDriver::new(ProviderKind::OpenAi).always_failing("connection reset"));
    let secondary = Arc::new(MockDriver::new(ProviderKind::Gemini).with_reply("from gemini"));
    let mut config = fast_config();
    config.routing.cooldown_secs = 0;
    let svc = service(config, &[primary.clone(), secondary.clone()]);

    for (i, text) in ["first question", "second question", "third question"].iter().enumerate() {
        let response = svc
            .complete(ask("u1", text).with_priority(Priority::Critical))
            .await
            .unwrap();
        assert_eq!(response.provider, ProviderKind::Gemini);
        assert_eq!(svc.stats().fallbacks, i as u64 + 1);
    }
    assert_eq!(primary.calls(), 3);
    assert_eq!(svc.stats().providers["gemini"], 3);
    assert_eq!(svc.stats().providers["openai"], 0);
}

#[tokio::test]
async fn test_degraded_primary_is_skipped_while_cooling_down() {
    let primary = Arc::new(
        MockDriver::new(ProviderKind::OpenAi).then(MockOutcome::Status(503)),
    );
    let secondary = Arc::new(MockDriver::new(ProviderKind::Gemini));
    let svc = service(fast_config(), &[primary.clone(), secondary]);

    svc.complete(ask("u1", "one").with_priority(Priority::Critical)).await.unwrap();
    svc.complete(ask("u1", "two").with_priority(Priority::Critical)).await.unwrap();
    assert_eq!(primary.calls(), 1);

    let health = svc.health();
    assert!(health.is_healthy());
    assert_eq!(
        serde_json::to_value(&health).unwrap()["services"]["openai"],
        "degraded"
    );
}

#[tokio::test]
async fn test_second_identical_request_is_cached_and_faster() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi).with_delay(Duration::from_millis(50)));
    let svc = service(fast_config(), &[driver.clone()]);

    let first = svc.complete(snack("u1").with_priority(Priority::Critical)).await.unwrap();
    let second = svc.complete(snack("u2").with_priority(Priority::Critical)).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.cache_type, Some(CacheType::Exact));
    assert!(second.processing_time_ms < first.processing_time_ms);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(driver.calls(), 1);
    assert_eq!(svc.stats().cache.hits, 1);
}

#[tokio::test]
async fn test_near_duplicate_is_a_similarity_hit() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi));
    let svc = service(fast_config(), &[driver.clone()]);

    svc.complete(snack("u1").with_priority(Priority::Critical)).await.unwrap();
    let near = svc
        .complete(ask("u1", "what are some healthy snacks!").with_priority(Priority::Critical))
        .await
        .unwrap();

    assert!(near.cached);
    assert_eq!(near.cache_type, Some(CacheType::Similarity));
    assert!(near.similarity.unwrap() >= 0.85);
    assert_eq!(driver.calls(), 1);
    assert_eq!(svc.stats().cache.similarity_hits, 1);
}

#[tokio::test]
async fn test_classifier_picks_model_tier() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi));
    let svc = service(fast_config(), &[driver.clone()]);

    let simple = svc.complete(snack("u1").with_priority(Priority::Critical)).await.unwrap();
    assert_eq!(simple.complexity, ComplexityTier::Low);
    assert_eq!(simple.model, "gpt-3.5-turbo");

    let hard = svc
        .complete(
            ask(
                "u1",
                "Analyze the correlation between my blood pressure and medication dosage, \
                 compare it with my cholesterol trend, and evaluate the statistical variance \
                 before my next doctor visit.",
            )
            .with_priority(Priority::Critical),
        )
        .await
        .unwrap();
    assert!(hard.complexity >= ComplexityTier::High);
    assert_eq!(hard.model, "gpt-4o");

    let overridden = svc
        .complete(
            ask("u1", "Just say hi")
                .with_complexity(ComplexityTier::VeryHigh)
                .with_priority(Priority::Critical),
        )
        .await
        .unwrap();
    assert_eq!(overridden.complexity, ComplexityTier::VeryHigh);
}

#[tokio::test]
async fn test_system_prompt_changes_fingerprint() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi));
    let svc = service(fast_config(), &[driver.clone()]);

    svc.complete(snack("u1").with_priority(Priority::Critical)).await.unwrap();
    let mut with_system = snack("u1").with_priority(Priority::Critical);
    with_system.messages.insert(0, Message::system("You are a pediatric nutritionist."));
    let response = svc.complete(with_system).await.unwrap();

    assert!(!response.cached);
    assert_eq!(driver.calls(), 2);
}

#[tokio::test]
async fn test_queue_full_rejects_with_429_code() {
    let mut config = quiet_config();
    config.batching.queue_limit_low = 1;
    let svc = service(config, &[Arc::new(MockDriver::new(ProviderKind::OpenAi))]);
    settle().await;

    let _first = svc
        .generate_completion(ask("u1", "first").with_priority(Priority::Low))
        .await
        .unwrap();
    let err = svc
        .generate_completion(ask("u1", "second").with_priority(Priority::Low))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::QueueFull);
    assert_eq!(err.code().http_status(), 429);
}

#[tokio::test]
async fn test_dropped_handle_cancels_queued_item() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi));
    let svc = service(quiet_config(), &[driver.clone()]);
    settle().await;

    let outcome = svc
        .generate_completion(ask("u1", "never mind").with_priority(Priority::Normal))
        .await
        .unwrap();
    drop(outcome);
    assert_eq!(svc.stats().queues.normal, 0);

    svc.shutdown().await;
    assert_eq!(driver.calls(), 0);
}

#[tokio::test]
async fn test_disk_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config();
    config.cache.dir = Some(dir.path().to_path_buf());

    let first_driver = Arc::new(MockDriver::new(ProviderKind::OpenAi).with_reply("persisted"));
    let first = service(config.clone(), &[first_driver]);
    first.complete(snack("u1").with_priority(Priority::Critical)).await.unwrap();
    first.shutdown().await;

    let second_driver = Arc::new(MockDriver::new(ProviderKind::OpenAi));
    let second: AdaptiveAiService = service(config, &[second_driver.clone()]);
    let response = second
        .complete(snack("u2").with_priority(Priority::Critical))
        .await
        .unwrap();
    assert!(response.cached);
    assert_eq!(response.content, "persisted");
    assert_eq!(second_driver.calls(), 0);
}

#[tokio::test]
async fn test_queued_requests_flow_through_the_worker() {
    let driver = Arc::new(MockDriver::new(ProviderKind::OpenAi).with_reply("batched"));
    let svc = service(fast_config(), &[driver]);

    let responses = futures::future::join_all(
        ["a question", "b question", "c question"]
            .iter()
            .map(|t| svc.complete(ask("u1", t).with_priority(Priority::Normal))),
    )
    .await;
    for r in responses {
        let r = r.unwrap();
        assert!(r.queued);
        assert_eq!(r.content, "batched");
    }
    assert!(svc.stats().batches_processed >= 1);
    svc.shutdown().await;
}
