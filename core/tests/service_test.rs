/// End-to-end engine scenarios against scripted backends: discovery and
/// collision handling, routing, session-scoped dispatch, registry rules and
/// shutdown.
mod support;

use mcpblade_core::mcp::{CallToolParams, CallToolRequest, Content};
use mcpblade_core::{Config, Error, McpServerConfig, RequestContext, Service};
use serde_json::{json, Value};
use std::sync::Arc;
use support::{tool, Handles, MockBackend};

/// Two persistent backends that both expose `get_current_time`.
async fn aggregator() -> (Arc<Service>, Handles, Handles) {
    let time = MockBackend::with_tools(vec![tool(
        "get_current_time",
        Some("Get the current time in a specific timezone"),
    )]);
    let time2 = MockBackend::with_tools(vec![tool(
        "get_current_time",
        Some("Get the current time in a specific timezone"),
    )]);

    let (time_handles, time2_handles) = (time.handles(), time2.handles());

    let svc = Service::builder(Config::default())
        .backend("time", McpServerConfig::default(), Box::new(time))
        .backend("time2", McpServerConfig::default(), Box::new(time2))
        .start()
        .await
        .unwrap();

    (svc, time_handles, time2_handles)
}

fn text_content(content: &Content) -> Value {
    match content {
        Content::Text { text } => serde_json::from_str(text).unwrap(),
        other => panic!("expected text content, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_tool_names_are_qualified() {
    let (svc, _, _) = aggregator().await;

    let tools = svc.list_tools(&RequestContext::default()).await.unwrap();
    assert_eq!(tools.len(), 2);

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names.iter().filter(|n| **n == "get_current_time").count(),
        1
    );
    assert_eq!(
        names
            .iter()
            .filter(|n| **n == "time2:get_current_time")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_descriptions_are_annotated_with_owner() {
    let (svc, _, _) = aggregator().await;

    let tools = svc.list_tools(&RequestContext::default()).await.unwrap();
    for t in &tools {
        let description = t.description.as_deref().unwrap();
        assert!(
            description.ends_with("(provided by time)")
                || description.ends_with("(provided by time2)"),
            "unexpected description: {description}"
        );
    }
}

#[tokio::test]
async fn test_missing_description_gets_placeholder() {
    let backend = MockBackend::with_tools(vec![tool("bare_tool", None)]);

    let svc = Service::builder(Config::default())
        .backend("solo", McpServerConfig::default(), Box::new(backend))
        .start()
        .await
        .unwrap();

    let tools = svc.list_tools(&RequestContext::default()).await.unwrap();
    assert_eq!(tools[0].description.as_deref(), Some("Provided by solo"));
}

#[tokio::test]
async fn test_forward_routes_bare_name_to_first_server() {
    let (svc, time_handles, time2_handles) = aggregator().await;

    let req = CallToolRequest::new(CallToolParams {
        name: "get_current_time".to_string(),
        arguments: Some(json!({"timezone": "Asia/Taipei"})),
    });

    let result = svc.forward(&RequestContext::default(), req).await.unwrap();
    assert!(!result.is_error);

    let output = text_content(&result.content[0]);
    assert_eq!(output["arguments"]["timezone"], "Asia/Taipei");
    assert_eq!(output["is_dst"], json!(false));

    // sorted iteration order gives "time" the bare name
    assert_eq!(time_handles.last_call().unwrap().name, "get_current_time");
    assert!(time2_handles.last_call().is_none());
}

#[tokio::test]
async fn test_forward_strips_qualified_prefix() {
    let (svc, _, time2_handles) = aggregator().await;

    let req = CallToolRequest::new(CallToolParams {
        name: "time2:get_current_time".to_string(),
        arguments: None,
    });

    svc.forward(&RequestContext::default(), req).await.unwrap();

    // the backend sees its local name, not the qualified one
    assert_eq!(time2_handles.last_call().unwrap().name, "get_current_time");
}

#[tokio::test]
async fn test_forward_unknown_tool() {
    let (svc, _, _) = aggregator().await;

    let req = CallToolRequest::new(CallToolParams {
        name: "no_such_tool".to_string(),
        arguments: None,
    });

    let err = svc.forward(&RequestContext::default(), req).await.unwrap_err();
    assert!(matches!(err, Error::ToolNotFound));
}

#[tokio::test]
async fn test_session_list_tools_bypasses_cache() {
    let (svc, _, _) = aggregator().await;

    let backend = MockBackend::with_tools(vec![tool("get_current_time", Some("raw description"))]);
    svc.register_backend("test-time", McpServerConfig::default(), Box::new(backend))
        .await
        .unwrap();

    let ctx = RequestContext::with_server("test-time");
    let tools = svc.list_tools(&ctx).await.unwrap();

    // the live listing, not the aggregated cache: one tool, unannotated
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "get_current_time");
    assert_eq!(tools[0].description.as_deref(), Some("raw description"));
}

#[tokio::test]
async fn test_session_list_tools_unknown_server() {
    let (svc, _, _) = aggregator().await;

    let ctx = RequestContext::with_server("missing");
    let err = svc.list_tools(&ctx).await.unwrap_err();
    assert!(matches!(err, Error::ServerNotFound));
}

#[tokio::test]
async fn test_session_forward_is_verbatim() {
    let (svc, time_handles, _) = aggregator().await;

    let backend = MockBackend::with_tools(vec![]);
    let handles = backend.handles();
    svc.register_backend("session", McpServerConfig::default(), Box::new(backend))
        .await
        .unwrap();

    // a name the routing table has never heard of still reaches the
    // session's backend, unmodified
    let req = CallToolRequest::new(CallToolParams {
        name: "session:only_tool".to_string(),
        arguments: None,
    });

    let ctx = RequestContext::with_server("session");
    svc.forward(&ctx, req).await.unwrap();

    assert_eq!(handles.last_call().unwrap().name, "session:only_tool");
    assert!(time_handles.last_call().is_none());
}

#[tokio::test]
async fn test_session_forward_unknown_server() {
    let (svc, _, _) = aggregator().await;

    let req = CallToolRequest::new(CallToolParams {
        name: "get_current_time".to_string(),
        arguments: None,
    });

    let ctx = RequestContext::with_server("missing");
    let err = svc.forward(&ctx, req).await.unwrap_err();
    assert!(matches!(err, Error::ToolNotFound));
}

#[tokio::test]
async fn test_registration_rules() {
    let (svc, _, _) = aggregator().await;

    let register = |id: &'static str| {
        let svc = Arc::clone(&svc);
        async move {
            svc.register_backend(
                id,
                McpServerConfig::default(),
                Box::new(MockBackend::with_tools(vec![])),
            )
            .await
        }
    };

    assert!(matches!(
        register("").await.unwrap_err(),
        Error::InvalidServerId
    ));

    register("test-time").await.unwrap();
    assert!(matches!(
        register("test-time").await.unwrap_err(),
        Error::ServerAlreadyExists
    ));

    // ids are unique across both pools
    assert!(matches!(
        register("time").await.unwrap_err(),
        Error::ServerAlreadyExists
    ));
}

#[tokio::test]
async fn test_unregister_closes_client() {
    let (svc, _, _) = aggregator().await;

    let backend = MockBackend::with_tools(vec![]);
    let handles = backend.handles();
    svc.register_backend("test-time", McpServerConfig::default(), Box::new(backend))
        .await
        .unwrap();

    svc.unregister_mcp_server("test-time", false).await.unwrap();
    assert_eq!(handles.closes(), 1);

    let err = svc
        .unregister_mcp_server("test-time", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServerNotFound));
}

#[tokio::test]
async fn test_unregister_persistent_is_rejected() {
    let (svc, time_handles, _) = aggregator().await;

    let err = svc.unregister_mcp_server("time", true).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedPersistentServerRemoval));
    assert_eq!(time_handles.closes(), 0);
}

#[tokio::test]
async fn test_list_tools_snapshot_isolation() {
    let (svc, _, _) = aggregator().await;

    let ctx = RequestContext::default();
    let mut first = svc.list_tools(&ctx).await.unwrap();
    first.clear();

    let second = svc.list_tools(&ctx).await.unwrap();
    assert_eq!(second.len(), 2);
}

#[tokio::test]
async fn test_discovery_merges_paginated_listings() {
    let backend = MockBackend::with_pages(vec![
        vec![tool("first", Some("page one"))],
        vec![tool("second", Some("page two")), tool("third", None)],
    ]);

    let svc = Service::builder(Config::default())
        .backend("paged", McpServerConfig::default(), Box::new(backend))
        .start()
        .await
        .unwrap();

    let tools = svc.list_tools(&RequestContext::default()).await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_close_shuts_down_both_pools() {
    let (svc, time_handles, time2_handles) = aggregator().await;

    let backend = MockBackend::with_tools(vec![]);
    let temp_handles = backend.handles();
    svc.register_backend("test-time", McpServerConfig::default(), Box::new(backend))
        .await
        .unwrap();

    svc.close().await;

    assert_eq!(time_handles.closes(), 1);
    assert_eq!(time2_handles.closes(), 1);
    assert_eq!(temp_handles.closes(), 1);

    // temporary pool is reset
    let err = svc
        .unregister_mcp_server("test-time", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServerNotFound));

    // close is idempotent
    svc.close().await;
    assert_eq!(time_handles.closes(), 1);
}
