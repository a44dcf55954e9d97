//! Full service against mockito stand-ins for the OpenAI and Gemini APIs.

mod common;

use adaptive_ai_service::error_code::ErrorCode;
use adaptive_ai_service::{AdaptiveAiService, Priority, ProviderKind};
use common::{snack, UpstreamFixture};

#[tokio::test]
async fn test_openai_serves_when_healthy() {
    let mut upstream = UpstreamFixture::new().await;
    let mock = upstream.openai_reply("Hummus with carrots").await;

    let svc = AdaptiveAiService::from_config(upstream.config()).unwrap();
    let response = svc
        .complete(snack("u1").with_priority(Priority::Critical))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.provider, ProviderKind::OpenAi);
    assert_eq!(response.content, "Hummus with carrots");
    assert_eq!(svc.stats().fallbacks, 0);
}

#[tokio::test]
async fn test_openai_500_falls_back_to_gemini() {
    let mut upstream = UpstreamFixture::new().await;
    let failing = upstream.openai_status(500).await;
    let gemini = upstream.gemini_reply("gemini-1.5-flash-8b", "Trail mix").await;

    let svc = AdaptiveAiService::from_config(upstream.config()).unwrap();
    let response = svc
        .complete(snack("u1").with_priority(Priority::Critical))
        .await
        .unwrap();

    failing.assert_async().await;
    gemini.assert_async().await;
    assert_eq!(response.provider, ProviderKind::Gemini);
    assert_eq!(response.model, "gemini-1.5-flash-8b");
    assert_eq!(response.content, "Trail mix");
    assert_eq!(svc.stats().fallbacks, 1);

    let health = svc.health();
    let openai = health
        .providers
        .iter()
        .find(|p| p.provider == ProviderKind::OpenAi)
        .unwrap();
    assert!(!openai.available);
    assert!(openai.last_error.as_deref().unwrap().contains("HTTP 500"));
}

#[tokio::test]
async fn test_both_upstreams_failing_is_unavailable() {
    let mut upstream = UpstreamFixture::new().await;
    upstream.openai_status(503).await;
    let _gemini = upstream
        .server
        .mock(
            "POST",
            mockito::Matcher::Regex(r"^/v1beta/models/.*:generateContent".into()),
        )
        .with_status(500)
        .create_async()
        .await;

    let svc = AdaptiveAiService::from_config(upstream.config()).unwrap();
    let err = svc
        .complete(snack("u1").with_priority(Priority::Critical))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AllProvidersUnavailable);
    assert_eq!(err.retry_after_secs(), Some(30));
    assert_eq!(svc.stats().cache.size, 0);
}

#[tokio::test]
async fn test_provider_without_key_is_not_configured() {
    let mut upstream = UpstreamFixture::new().await;
    let gemini = upstream.gemini_reply("gemini-1.5-flash-8b", "Berries").await;

    let mut config = upstream.config();
    config.providers.openai.api_key = None;
    let svc = AdaptiveAiService::from_config(config).unwrap();
    assert_eq!(svc.orchestrator().providers(), vec![ProviderKind::Gemini]);

    let response = svc
        .complete(snack("u1").with_priority(Priority::Critical))
        .await
        .unwrap();
    gemini.assert_async().await;
    assert_eq!(response.provider, ProviderKind::Gemini);
    assert_eq!(svc.stats().fallbacks, 0);
}
