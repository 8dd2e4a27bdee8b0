//! Integration tests for the Scope Engine
//!
//! Drives full executions against scripted LLM clients and in-memory tools:
//! - Organic completion, turn budget and timeout stops
//! - Permission gate, unknown tools and tool failures
//! - Resource breaches reported by the host
//! - Scope isolation, emission and cleanup

mod common;

use common::{
    engine_with, standard_tools, tool_request, EchoTool, ScriptedClient, UnavailableClient,
};
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde_json::json;
use std::sync::Arc;
use subagent_engine::llm::{ChatResponse, LLMError, MessageRole};
use subagent_engine::scope::{ConstraintOverrides, OutputDefinition};
use subagent_engine::termination::{OutputsEmitted, StopOnEmission};
use subagent_engine::{
    EngineConfig, HostReportedUsage, ResourceUsage, ScopeConfig, ScopeEngine, ScopeStatus,
    TerminationStatus, TerminationType, ToolSet, Variables,
};

fn test_task(max_turns: u32) -> ScopeConfig {
    ScopeConfig::new("Execute test task")
        .with_tool_permissions(["Read"])
        .with_output("result", OutputDefinition::new("string"))
        .with_timeout_ms(5000)
        .with_max_turns(max_turns)
}

// Scenario A: a short run ends organically
#[tokio::test]
async fn test_execute_completes_organically() {
    let client = ScriptedClient::new(vec![
        tool_request("Read", json!({"path": "notes.txt"})),
        ChatResponse::text("All done"),
    ]);
    let engine = engine_with(client.clone());

    let mut scope = engine.initialize_scope(test_task(3), Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    assert!(result.termination.turns_executed > 0);
    assert_eq!(result.termination.turns_executed, 2);
    assert_eq!(result.termination.kind, TerminationType::Completed);
    assert_eq!(result.termination.status, TerminationStatus::Success);
    assert_eq!(scope.status(), ScopeStatus::Completed);
    assert_eq!(
        result.final_context.get("tool:Read"),
        Some(&json!({"path": "notes.txt"}))
    );
    assert_eq!(client.calls(), 2);

    engine.cleanup(&mut scope);
}

// Scenario B: a one-turn budget stops after the first turn
#[tokio::test]
async fn test_turn_budget_stops_gracefully() {
    let engine = engine_with(ScriptedClient::looping("Read"));

    let mut scope = engine.initialize_scope(test_task(1), Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    assert_eq!(result.termination.kind, TerminationType::MaxTurns);
    assert_eq!(result.termination.status, TerminationStatus::Success);
    assert_eq!(result.termination.turns_executed, 1);
    assert_eq!(scope.status(), ScopeStatus::Completed);
}

#[tokio::test]
async fn test_turn_budget_bounds_looping_agent() {
    let client = ScriptedClient::looping("Read");
    let engine = engine_with(client.clone());

    let mut scope = engine.initialize_scope(test_task(3), Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    assert_eq!(result.termination.kind, TerminationType::MaxTurns);
    assert_eq!(result.termination.turns_executed, 3);
    assert_eq!(client.calls(), 3);
}

// Scenario C, driven end to end: a tool outlasts a 1ms budget
#[tokio::test]
async fn test_timeout_is_a_successful_stop() {
    let engine = engine_with(ScriptedClient::looping("Slow"));
    let config = ScopeConfig::new("wait")
        .with_tool_permissions(["Slow"])
        .with_timeout_ms(1);

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    assert_eq!(result.termination.kind, TerminationType::Timeout);
    assert_eq!(result.termination.status, TerminationStatus::Success);
    assert_eq!(result.termination.turns_executed, 1);
    assert!(result.termination.execution_duration_ms >= 1);
    assert_eq!(result.final_context.get("tool:Slow"), Some(&json!("finished")));
}

// Scenario D: a tool outside the permission list aborts the run
#[tokio::test]
async fn test_unpermitted_tool_is_rejected() {
    let write = EchoTool::new("Write");
    let tools = ToolSet::new()
        .with_tool(EchoTool::new("Read"))
        .with_tool(write.clone());
    let engine = ScopeEngine::new(
        EngineConfig::default(),
        ScriptedClient::new(vec![tool_request("Write", json!({"path": "x"}))]),
        Arc::new(tools),
    );

    let mut scope = engine.initialize_scope(test_task(3), Variables::new()).unwrap();
    let err = engine.execute(&mut scope).await.unwrap_err();

    assert_eq!(err.to_string(), "Tool 'Write' not permitted for this SubAgent");
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::PermissionDenied("Write".into()))
    );
    assert_eq!(write.calls(), 0);
    assert!(scope.context().variables.is_empty());

    // Errors leave the scope registered until cleanup
    assert_eq!(scope.status(), ScopeStatus::Completed);
    assert_eq!(engine.live_scopes(), 1);
    engine.cleanup(&mut scope);
    assert_eq!(engine.live_scopes(), 0);
}

// Scenario E: ten scopes live side by side
#[tokio::test]
async fn test_concurrent_scopes_are_tracked() {
    let engine = Arc::new(engine_with(ScriptedClient::new(Vec::new())));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .initialize_scope(ScopeConfig::new(format!("Task {i}")), Variables::new())
                    .unwrap()
            })
        })
        .collect();

    let mut scopes = Vec::new();
    for handle in handles {
        scopes.push(handle.await.unwrap());
    }
    assert_eq!(engine.live_scopes(), 10);

    let results = futures::future::join_all(scopes.iter_mut().map(|s| engine.execute(s))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(engine.live_scopes(), 10);

    for scope in &mut scopes {
        engine.cleanup(scope);
    }
    assert_eq!(engine.live_scopes(), 0);
}

#[tokio::test]
async fn test_concurrent_executions_stay_isolated() {
    let engine = Arc::new(engine_with(ScriptedClient::new(Vec::new())));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut vars = Variables::new();
                vars.insert("id".into(), json!(i));
                let result = engine
                    .run(ScopeConfig::new("Task {{id}}"), vars)
                    .await
                    .unwrap();
                (i, result)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert_eq!(result.final_context.get("id"), Some(&json!(i)));
        assert_eq!(result.final_context.variables.len(), 1);
    }
    assert_eq!(engine.live_scopes(), 0);
}

#[tokio::test]
async fn test_unregistered_tool_is_not_found() {
    let engine = engine_with(ScriptedClient::new(vec![tool_request("Grep", json!({}))]));
    let config = ScopeConfig::new("search").with_tool_permissions(["Grep"]);

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    let err = engine.execute(&mut scope).await.unwrap_err();

    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::ToolNotFound("Grep".into()))
    );
}

#[tokio::test]
async fn test_tool_failure_propagates_unchanged() {
    let engine = engine_with(ScriptedClient::new(vec![tool_request("Flaky", json!({}))]));
    let config = ScopeConfig::new("try").with_tool_permissions(["Flaky"]);

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    let err = engine.execute(&mut scope).await.unwrap_err();

    assert_eq!(err.to_string(), "permission denied by filesystem");
    assert_eq!(
        err.downcast_ref::<ToolError>(),
        Some(&ToolError::ExecutionFailed(
            "permission denied by filesystem".into()
        ))
    );
    assert!(scope.context().get("tool:Flaky").is_none());
    assert!(engine.registry().contains(&scope.id()));
}

#[tokio::test]
async fn test_llm_failure_propagates() {
    let engine = ScopeEngine::new(
        EngineConfig::default(),
        Arc::new(UnavailableClient),
        Arc::new(standard_tools()),
    );

    let mut scope = engine
        .initialize_scope(ScopeConfig::new("hello"), Variables::new())
        .unwrap();
    let err = engine.execute(&mut scope).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<LLMError>(),
        Some(LLMError::ProviderUnavailable(_))
    ));
    assert_eq!(scope.status(), ScopeStatus::Completed);
    assert_eq!(scope.execution_turns(), 1);
}

#[tokio::test]
async fn test_memory_breach_is_a_failure() {
    let sampler = Arc::new(HostReportedUsage::new());
    let engine = engine_with(ScriptedClient::looping("Read")).with_sampler(sampler.clone());

    let mut scope = engine.initialize_scope(test_task(10), Variables::new()).unwrap();
    sampler.report(scope.id(), ResourceUsage::new(150.0, 0));

    let result = engine.execute(&mut scope).await.unwrap();
    assert_eq!(result.termination.kind, TerminationType::Error);
    assert_eq!(result.termination.status, TerminationStatus::Failure);
    assert_eq!(result.termination.turns_executed, 1);
    assert!(result
        .termination
        .reason
        .unwrap()
        .starts_with("Memory limit exceeded"));
    assert_eq!(scope.resources().memory_usage, 150.0);

    engine.cleanup(&mut scope);
    assert_eq!(sampler.tracked(), 0);
}

#[tokio::test]
async fn test_cpu_breach_is_a_failure() {
    let sampler = Arc::new(HostReportedUsage::new());
    let engine = engine_with(ScriptedClient::looping("Read")).with_sampler(sampler.clone());
    let config = test_task(10).with_cpu_time_limit_ms(50);

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    sampler.report(scope.id(), ResourceUsage::new(1.0, 51));

    let result = engine.execute(&mut scope).await.unwrap();
    assert_eq!(result.termination.kind, TerminationType::Error);
    assert!(result
        .termination
        .reason
        .unwrap()
        .starts_with("CPU time limit exceeded"));
}

#[tokio::test]
async fn test_custom_condition_stops_run() {
    let engine = engine_with(ScriptedClient::looping("Read"));
    let config = test_task(10).with_termination_condition(Arc::new(OutputsEmitted));

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    engine.emit_variable(&mut scope, "result", json!("ready")).unwrap();

    let result = engine.execute(&mut scope).await.unwrap();
    assert_eq!(result.termination.kind, TerminationType::Completed);
    assert_eq!(result.termination.turns_executed, 1);
    assert_eq!(
        result.termination.reason.as_deref(),
        Some("All declared outputs emitted")
    );
}

#[tokio::test]
async fn test_builtin_checks_precede_custom_conditions() {
    let engine = engine_with(ScriptedClient::looping("Read"));
    let config = test_task(1).with_termination_condition(Arc::new(StopOnEmission::new("result")));

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    engine.emit_variable(&mut scope, "result", json!("ready")).unwrap();

    let result = engine.execute(&mut scope).await.unwrap();
    assert_eq!(result.termination.kind, TerminationType::MaxTurns);
}

#[tokio::test]
async fn test_emissions_feed_later_prompts() {
    let client = ScriptedClient::new(Vec::new());
    let engine = engine_with(client.clone());
    let config = ScopeConfig::new("Continue from {{draft}}");

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    engine.emit_variable(&mut scope, "draft", json!("v1")).unwrap();
    assert_eq!(scope.emitted("draft").unwrap().turn, 0);

    let result = engine.execute(&mut scope).await.unwrap();
    assert_eq!(result.emitted_variables["draft"].value, json!("v1"));

    let first_prompt = &client.seen()[0][0];
    assert_eq!(first_prompt.role, MessageRole::User);
    assert_eq!(first_prompt.content, "Continue from v1");

    engine.emit_variable(&mut scope, "draft", json!("v2")).unwrap();
    assert_eq!(scope.emitted("draft").unwrap().turn, 1);
    assert_eq!(scope.context().get("draft"), Some(&json!("v2")));
}

#[tokio::test]
async fn test_agent_emission_mid_run_completes_outputs() {
    let client = ScriptedClient::new(vec![
        tool_request("Read", json!({"path": "notes.txt"})),
        tool_request("emit_variable", json!({"name": "result", "value": "done"})),
    ]);
    let engine = engine_with(client.clone());
    let config = test_task(10).with_termination_condition(Arc::new(OutputsEmitted));

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    assert_eq!(result.termination.kind, TerminationType::Completed);
    assert_eq!(result.termination.turns_executed, 2);
    assert_eq!(
        result.termination.reason.as_deref(),
        Some("All declared outputs emitted")
    );
    assert_eq!(result.emitted_variables["result"].value, json!("done"));
    assert_eq!(result.emitted_variables["result"].turn, 2);
    assert_eq!(result.final_context.get("result"), Some(&json!("done")));
    assert!(result.final_context.get("tool:emit_variable").is_none());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_agent_emission_feeds_next_turn_prompt() {
    let client = ScriptedClient::new(vec![tool_request(
        "emit_variable",
        json!({"name": "draft", "value": "v1"}),
    )]);
    let engine = engine_with(client.clone());
    let config = ScopeConfig::new("Continue from {{draft}}");

    let mut scope = engine.initialize_scope(config, Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    assert_eq!(result.termination.kind, TerminationType::Completed);
    assert_eq!(result.termination.turns_executed, 2);
    assert_eq!(scope.emitted("draft").unwrap().turn, 1);

    let seen = client.seen();
    assert_eq!(seen[0][0].content, "Continue from {{draft}}");
    assert_eq!(seen[1][0].content, "Continue from v1");
}

#[tokio::test]
async fn test_agent_emission_with_empty_name_fails_run() {
    let client = ScriptedClient::new(vec![tool_request(
        "emit_variable",
        json!({"name": "", "value": 1}),
    )]);
    let engine = engine_with(client);

    let mut scope = engine.initialize_scope(test_task(5), Variables::new()).unwrap();
    let err = engine.execute(&mut scope).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Validation(_))
    ));
    assert!(scope.emitted_variables().is_empty());
    assert!(engine.registry().contains(&scope.id()));
    engine.cleanup(&mut scope);
}

#[tokio::test]
async fn test_tool_results_carried_to_next_turn() {
    let client = ScriptedClient::new(vec![tool_request("Read", json!({"path": "a"}))]);
    let engine = engine_with(client.clone());

    let mut scope = engine.initialize_scope(test_task(5), Variables::new()).unwrap();
    engine.execute(&mut scope).await.unwrap();

    let seen = client.seen();
    assert_eq!(seen.len(), 2);

    // output instructions, prompt, assistant tool call, tool result
    let second = &seen[1];
    assert_eq!(second.len(), 4);
    assert_eq!(second[0].role, MessageRole::System);
    assert_eq!(second[2].role, MessageRole::Assistant);
    assert_eq!(second[2].tool_calls.len(), 1);
    assert_eq!(second[3].role, MessageRole::Tool);
    assert_eq!(second[3].content, r#"{"path":"a"}"#);
    assert_eq!(second[3].tool_call_id.as_deref(), Some("call_Read"));
}

#[tokio::test]
async fn test_reexecution_starts_fresh() {
    let engine = engine_with(ScriptedClient::looping("Read"));

    let mut scope = engine.initialize_scope(test_task(2), Variables::new()).unwrap();
    let first = engine.execute(&mut scope).await.unwrap();
    assert_eq!(first.termination.turns_executed, 2);

    scope
        .update_constraints(ConstraintOverrides {
            max_turns: Some(1),
            ..Default::default()
        })
        .unwrap();
    let second = engine.execute(&mut scope).await.unwrap();
    assert_eq!(second.termination.kind, TerminationType::MaxTurns);
    assert_eq!(second.termination.turns_executed, 1);
    assert!(scope.transcript().len() <= 2);
}

#[tokio::test]
async fn test_execute_after_cleanup_is_rejected() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));

    let mut scope = engine
        .initialize_scope(ScopeConfig::new("hello"), Variables::new())
        .unwrap();
    engine.cleanup(&mut scope);

    let err = engine.execute(&mut scope).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn test_run_releases_scope_on_every_path() {
    let engine = engine_with(ScriptedClient::new(vec![tool_request("Write", json!({}))]));

    let err = engine
        .run(test_task(3), Variables::new())
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<EngineError>().is_some());
    assert_eq!(engine.live_scopes(), 0);

    let result = engine.run(test_task(3), Variables::new()).await.unwrap();
    assert_eq!(result.termination.kind, TerminationType::Completed);
    assert_eq!(engine.live_scopes(), 0);
}

#[tokio::test]
async fn test_result_serializes_for_callers() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));

    let mut scope = engine.initialize_scope(test_task(3), Variables::new()).unwrap();
    engine.emit_variable(&mut scope, "result", json!("ok")).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["termination"]["type"], json!("COMPLETED"));
    assert_eq!(json["termination"]["status"], json!("SUCCESS"));
    assert_eq!(json["termination"]["turnsExecuted"], json!(1));
    assert_eq!(json["emittedVariables"]["result"]["value"], json!("ok"));
    assert_eq!(json["finalContext"]["variables"]["result"], json!("ok"));
    assert_eq!(json["scopeId"], json!(scope.id().as_uuid().to_string()));
}

#[test]
fn test_initialize_defaults_and_identity() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));

    let a = engine
        .initialize_scope(ScopeConfig::new("a"), Variables::new())
        .unwrap();
    let b = engine
        .initialize_scope(ScopeConfig::new("a"), Variables::new())
        .unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(a.status(), ScopeStatus::Initialized);
    assert_eq!(a.execution_turns(), 0);
    assert_eq!(a.constraints().timeout_ms, 900_000);
    assert_eq!(a.constraints().max_turns, 50);
    assert_eq!(a.constraints().resource_limits.max_memory_mb, 100.0);
    assert_eq!(a.constraints().resource_limits.max_cpu_time_ms, 300_000);
    assert_eq!(engine.live_scopes(), 2);
}

#[test]
fn test_invalid_config_is_never_registered() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));

    for raw in [
        json!(null),
        json!({}),
        json!({"prompt": ""}),
        json!({"prompt": "x", "toolPermissions": "Read"}),
    ] {
        let err = engine.initialize_scope_from_json(&raw, None).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
    assert!(engine
        .initialize_scope(ScopeConfig::new("x").with_max_turns(0), Variables::new())
        .is_err());
    assert_eq!(engine.live_scopes(), 0);
}

#[test]
fn test_initial_context_is_copied() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));
    let mut raw_context = json!({"shared": {"list": [1, 2]}});

    let mut first = engine
        .initialize_scope_from_json(&json!({"prompt": "x"}), Some(&raw_context))
        .unwrap();
    let second = engine
        .initialize_scope_from_json(&json!({"prompt": "x"}), Some(&raw_context))
        .unwrap();

    raw_context["shared"]["list"] = json!([]);
    engine.emit_variable(&mut first, "shared", json!("changed")).unwrap();

    assert_eq!(second.context().get("shared"), Some(&json!({"list": [1, 2]})));
    assert_eq!(first.context().get("shared"), Some(&json!("changed")));
}

#[test]
fn test_cleanup_is_idempotent() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));
    let mut scope = engine
        .initialize_scope(ScopeConfig::new("x"), Variables::new())
        .unwrap();
    let id = scope.id();

    engine.cleanup(&mut scope);
    assert!(!engine.registry().contains(&id));
    assert_eq!(scope.status(), ScopeStatus::Completed);

    engine.cleanup(&mut scope);
    assert_eq!(scope.status(), ScopeStatus::Completed);
    assert!(!engine.release(&id));
}

#[test]
fn test_emit_rejects_empty_name() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));
    let mut scope = engine
        .initialize_scope(ScopeConfig::new("x"), Variables::new())
        .unwrap();

    let err = engine.emit_variable(&mut scope, "", json!(1)).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn test_scope_capacity() {
    let mut config = EngineConfig::default();
    config.core.max_live_scopes = 2;
    let engine = ScopeEngine::new(
        config,
        ScriptedClient::new(Vec::new()),
        Arc::new(standard_tools()),
    );

    let mut first = engine
        .initialize_scope(ScopeConfig::new("1"), Variables::new())
        .unwrap();
    engine
        .initialize_scope(ScopeConfig::new("2"), Variables::new())
        .unwrap();

    let err = engine
        .initialize_scope(ScopeConfig::new("3"), Variables::new())
        .unwrap_err();
    assert_eq!(err, EngineError::ScopeCapacityExceeded { live: 2, limit: 2 });

    engine.cleanup(&mut first);
    assert!(engine
        .initialize_scope(ScopeConfig::new("3"), Variables::new())
        .is_ok());
}

#[test]
fn test_check_termination_on_fresh_scope() {
    let engine = engine_with(ScriptedClient::new(Vec::new()));
    let mut scope = engine
        .initialize_scope(ScopeConfig::new("x").with_memory_limit_mb(10.0), Variables::new())
        .unwrap();
    assert!(engine.check_termination(&scope).is_none());

    scope.record_resources(ResourceUsage::new(11.0, 0));
    let record = engine.check_termination(&scope).unwrap();
    assert_eq!(record.kind, TerminationType::Error);
    assert_eq!(record.status, TerminationStatus::Failure);
}

#[tokio::test]
async fn test_check_termination_after_turn_budget_stop() {
    let engine = engine_with(ScriptedClient::looping("Read"));

    let mut scope = engine.initialize_scope(test_task(3), Variables::new()).unwrap();
    let result = engine.execute(&mut scope).await.unwrap();
    assert_eq!(result.termination.kind, TerminationType::MaxTurns);
    assert_eq!(scope.execution_turns(), 3);

    // The loop stops at the budget; the public check only fires past it
    assert!(engine.check_termination(&scope).is_none());
}
