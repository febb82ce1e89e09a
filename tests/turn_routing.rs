//! Turn routing integration tests
//!
//! Drives the public API end to end with a scripted model and scripted
//! remote providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use relay::agent::{Agent, ChatRequest};
use relay::config::{Config, ProviderConfig, ProvidersConfig};
use relay::error::RelayError;
use relay::llm::{Fragment, FragmentStream, Message, MockChatModel, ToolCall, create_stream_channel};
use relay::remote::{MockConnector, MockProvider, ProviderPool};
use relay::tools::{RecallContextTool, ToolRegistry};
use relay::turn::{BranchRouter, PeekBudget, Route, ToolDispatcher};
use tokio_util::sync::CancellationToken;

fn providers(names: &[&str]) -> ProvidersConfig {
    ProvidersConfig {
        clients: names
            .iter()
            .map(|n| ProviderConfig::new(*n, format!("mock://{}", n)))
            .collect(),
        ..Default::default()
    }
}

fn router(budget: PeekBudget) -> BranchRouter {
    BranchRouter::new(Arc::new(ToolRegistry::with_builtin_tools().unwrap()), budget)
}

#[tokio::test]
async fn test_partial_provider_failure_keeps_connected_providers() {
    let connector = MockConnector::new()
        .with_provider(MockProvider::new("up").with_tool("echo", ""))
        .with_provider(MockProvider::new("down").with_tool("echo", "").failing_connects(1));
    let pool = ProviderPool::new(providers(&["up", "down", "missing"]), Arc::new(connector));

    pool.initialize().await.unwrap();
    assert_eq!(pool.provider_names().await, vec!["up".to_string()]);
    assert_eq!(pool.namespaced_tool_names().await, vec!["up.echo".to_string()]);
}

#[test]
fn test_duplicate_local_registration_keeps_first() {
    let registry = ToolRegistry::with_builtin_tools().unwrap();
    let before = registry.get("recall_context").unwrap();

    let result = registry.register(Arc::new(RecallContextTool));
    assert!(matches!(result, Err(RelayError::RegistrationConflict(_))));
    assert!(Arc::ptr_eq(&before, &registry.get("recall_context").unwrap()));
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn test_local_first_fragment_routes_local_and_closes_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    let stream = FragmentStream::from_items(vec![
        Ok(Fragment::tool_call(0, "c1", "remember_context", "{}")),
        Ok(Fragment::text("trailing")),
    ])
    .with_close_hook(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let route = router(PeekBudget::default()).route(stream, &CancellationToken::new()).await;
    assert_eq!(route, Route::LocalTool);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_first_fragment_routes_remote() {
    let stream = FragmentStream::from_items(vec![Ok(Fragment::tool_call(0, "c1", "echo", "{}"))]);
    let route = router(PeekBudget::default()).route(stream, &CancellationToken::new()).await;
    assert_eq!(route, Route::RemoteTool);
}

#[tokio::test]
async fn test_no_call_within_budget_terminates_in_time() {
    let (tx, stream) = create_stream_channel(4);
    tx.send(Ok(Fragment::text("thinking"))).await.unwrap();
    let budget = PeekBudget {
        max_fragments: 3,
        timeout: Duration::from_millis(100),
    };

    let started = Instant::now();
    let route = router(budget).route(stream, &CancellationToken::new()).await;
    assert_eq!(route, Route::Terminate);
    assert!(started.elapsed() < budget.timeout + Duration::from_millis(500));
    drop(tx);
}

#[tokio::test]
async fn test_remote_dispatch_falls_through_failing_provider() {
    let connector = MockConnector::new()
        .with_provider(MockProvider::new("a").with_tool("echo", "").with_failure("echo", "boom"))
        .with_provider(MockProvider::new("b").with_tool("echo", "").with_result("echo", "ok"));
    let pool = Arc::new(ProviderPool::new(providers(&["a", "b"]), Arc::new(connector)));
    pool.initialize().await.unwrap();

    let result = pool.execute_tool("echo", "{}", &CancellationToken::new()).await.unwrap();
    assert!(result.contains("ok"));

    let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::with_builtin_tools().unwrap()), pool);
    let message = Message::assistant("").with_tool_calls(vec![ToolCall::new("c1", "echo", "{}")]);
    let reply = dispatcher.dispatch_remote(message, &CancellationToken::new()).await;
    assert!(reply.content.ends_with("**Tool**: echo\n**Result**: ok\n\n"));
}

#[tokio::test]
async fn test_health_tick_recreates_tool_less_provider() {
    let connector = Arc::new(
        MockConnector::new().with_provider(MockProvider::new("flaky").with_tool("echo", "").empty_discoveries(1)),
    );
    let config = ProvidersConfig {
        health_interval_ms: 20,
        ..providers(&["flaky"])
    };
    let pool = Arc::new(ProviderPool::new(config, connector.clone()));
    pool.initialize().await.unwrap();
    assert_eq!(pool.provider_tool_count("flaky").await, Some(0));

    let cancel = CancellationToken::new();
    let checker = pool.spawn_health_checker(cancel.clone());

    let deadline = Instant::now() + Duration::from_secs(2);
    while pool.provider_tool_count("flaky").await != Some(1) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    checker.await.unwrap();

    assert_eq!(pool.provider_tool_count("flaky").await, Some(1));
    let provider = connector.provider("flaky").unwrap();
    assert_eq!(provider.connect_count(), 2);
    assert_eq!(provider.close_count(), 1);
}

#[tokio::test]
async fn test_streamed_turn_runs_only_local_call() {
    let connector = Arc::new(MockConnector::new().with_provider(MockProvider::new("remote").with_tool("echo", "")));
    let mut config = Config::default();
    config.providers = providers(&["remote"]);

    let model = MockChatModel::new().with_stream(vec![Fragment {
        tool_calls: vec![
            relay::llm::ToolCallDelta {
                index: 0,
                id: Some("c1".to_string()),
                name: Some("remember_context".to_string()),
                arguments: r#"{"key":"k","value":"v"}"#.to_string(),
            },
            relay::llm::ToolCallDelta {
                index: 1,
                id: Some("c2".to_string()),
                name: Some("echo".to_string()),
                arguments: "{}".to_string(),
            },
        ],
        ..Default::default()
    }]);
    let agent = Agent::start(config, Arc::new(model), connector.clone()).await.unwrap();

    let request = ChatRequest::new("r1", vec![Message::user("go")])
        .with_conversation("conv")
        .with_stream(true);
    let reply = agent.chat(request, &CancellationToken::new()).await.unwrap();

    assert!(reply.message.content.contains("**Tool**: remember_context"));
    assert!(!reply.message.content.contains("**Tool**: echo"));
    assert!(connector.provider("remote").unwrap().calls().is_empty());
    assert_eq!(agent.cache().get("conv").unwrap().get_note("k"), Some("v"));
    agent.shutdown().await;
}

#[tokio::test]
async fn test_plain_streamed_turn_returns_model_text() {
    let model = MockChatModel::new().with_stream(vec![Fragment::text("Hello, "), Fragment::text("world")]);
    let agent = Agent::start(Config::default(), Arc::new(model), Arc::new(MockConnector::new()))
        .await
        .unwrap();

    let request = ChatRequest::new("r1", vec![Message::user("hi")]).with_stream(true);
    let reply = agent.chat(request, &CancellationToken::new()).await.unwrap();
    assert_eq!(reply.message.content, "Hello, world");
    agent.shutdown().await;
}
