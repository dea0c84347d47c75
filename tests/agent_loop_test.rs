//! Agent 循环集成测试：终止提取、工具结果顺序、错误隔离、重试、崩溃重放、挂起与回调

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bee_durable::core::AgentError;
use bee_durable::durable::{
    CheckpointStore, ContextOptions, DurableContext, DurableError, MemoryCheckpointStore,
    RetryPolicy, WaitForCallbackOptions,
};
use bee_durable::llm::{InferenceGateway, InferenceResponse, LlmError, ScriptedTransport, StopKind};
use bee_durable::memory::{ContentBlock, ToolInput, ToolResult, Transcript, Turn};
use bee_durable::react::{AgentLoop, LoopEvent};
use bee_durable::tools::{
    GetLocationTool, GetWeatherTool, Tool, ToolRegistry, WaitForHumanReviewTool,
};

fn req(id: &str, name: &str, input: &[(&str, &str)]) -> ContentBlock {
    let input: ToolInput = input
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ContentBlock::tool_request(id, name, input)
}

fn tool_use(blocks: Vec<ContentBlock>) -> InferenceResponse {
    InferenceResponse::tool_use(Turn::assistant(blocks))
}

fn context(store: Arc<dyn CheckpointStore>, id: &str) -> DurableContext {
    DurableContext::new(
        id,
        store,
        ContextOptions {
            retry: RetryPolicy::immediate(3),
            callback_timeout: None,
        },
    )
}

fn weather_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(GetLocationTool).unwrap();
    registry.register(GetWeatherTool).unwrap();
    registry.register(WaitForHumanReviewTool::default()).unwrap();
    Arc::new(registry)
}

fn agent(transport: Arc<ScriptedTransport>, registry: Arc<ToolRegistry>) -> AgentLoop {
    AgentLoop::new(InferenceGateway::new(transport), registry, "test-model")
}

fn results_of(turn: &Turn) -> Vec<ToolResult> {
    turn.tool_results().into_iter().cloned().collect()
}

/// 按输入毫秒数睡眠后返回标签；记录执行次数
struct SleepyTool {
    calls: AtomicUsize,
}

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn description(&self) -> &str {
        "Sleep then echo the tag."
    }

    async fn execute(&self, input: &ToolInput, _ctx: &DurableContext) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ms: u64 = input.get("ms").and_then(|v| v.parse().ok()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(input.get("tag").cloned().unwrap_or_default())
    }
}

#[tokio::test]
async fn test_terminal_without_text_yields_empty_string() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse {
        stop_kind: StopKind::Terminal,
        message: Turn::assistant(vec![]),
    })]));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let run = agent(transport, weather_registry())
        .run(&context(store, "exec_empty"), "hi")
        .await
        .unwrap();
    assert_eq!(run.result, "");
    assert_eq!(run.transcript.len(), 2);
}

#[tokio::test]
async fn test_tool_results_follow_request_order() {
    let sleepy = Arc::new(SleepyTool {
        calls: AtomicUsize::new(0),
    });
    let mut registry = ToolRegistry::new();
    registry.register_arc(sleepy.clone()).unwrap();

    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_use(vec![
            req("a", "sleepy", &[("ms", "60"), ("tag", "first")]),
            req("b", "sleepy", &[("ms", "0"), ("tag", "second")]),
            req("c", "sleepy", &[("ms", "20"), ("tag", "third")]),
        ])),
        Ok(InferenceResponse::terminal("done")),
    ]));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let run = agent(transport.clone(), Arc::new(registry))
        .run(&context(store, "exec_order"), "go")
        .await
        .unwrap();

    assert_eq!(run.result, "done");
    let results = results_of(&run.transcript.turns()[2]);
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    let outputs: Vec<&str> = results.iter().map(|r| r.output.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(outputs, vec!["first", "second", "third"]);
    assert_eq!(sleepy.calls.load(Ordering::SeqCst), 3);

    // 第二次推理看到的对话记录以同一个结果 Turn 结尾
    let (_, seen) = &transport.requests()[1];
    assert_eq!(seen.last(), run.transcript.turns().get(2));
}

#[tokio::test]
async fn test_tool_use_without_requests_is_malformed() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::tool_use(
        Turn::assistant_text("I will call a tool"),
    ))]));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let err = agent(transport.clone(), weather_registry())
        .run(&context(store, "exec_malformed"), "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MalformedResponse(_)));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_unknown_tool_and_tool_failure_are_fed_back() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_use(vec![
            req("t1", "teleport", &[]),
            req("t2", "get_weather", &[]),
            req("t3", "get_location", &[]),
        ])),
        Ok(InferenceResponse::terminal("recovered")),
    ]));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let run = agent(transport, weather_registry())
        .run(&context(store, "exec_errors"), "hi")
        .await
        .unwrap();

    assert_eq!(run.result, "recovered");
    let results = results_of(&run.transcript.turns()[2]);
    assert_eq!(results.len(), 3);
    assert!(results[0].is_error);
    assert_eq!(results[0].output, "Error: Unknown tool: teleport");
    assert!(results[1].is_error);
    assert!(results[1].output.starts_with("Error: "));
    assert!(!results[2].is_error);
    assert_eq!(results[2].output, "London, UK");
}

#[tokio::test]
async fn test_transient_inference_failure_leaves_no_trace() {
    let flaky = Arc::new(ScriptedTransport::new(vec![
        Err(LlmError::ApiError("Throttled".into())),
        Ok(InferenceResponse::terminal("Paris")),
    ]));
    let steady = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::terminal(
        "Paris",
    ))]));

    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let flaky_run = agent(flaky.clone(), weather_registry())
        .run(&context(store.clone(), "exec_flaky"), "capital?")
        .await
        .unwrap();
    let steady_run = agent(steady, weather_registry())
        .run(&context(store, "exec_steady"), "capital?")
        .await
        .unwrap();

    assert_eq!(flaky.calls(), 2);
    assert_eq!(flaky_run, steady_run);
}

#[tokio::test]
async fn test_exhausted_inference_retries_fail_the_loop() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(LlmError::ApiError("down".into())),
        Err(LlmError::ApiError("down".into())),
        Err(LlmError::ApiError("down".into())),
    ]));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let err = agent(transport.clone(), weather_registry())
        .run(&context(store, "exec_down"), "hi")
        .await
        .unwrap_err();
    assert_eq!(err, AgentError::InferenceFailed("API error: down".into()));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_crash_between_steps_replays_recorded_work() {
    let sleepy = Arc::new(SleepyTool {
        calls: AtomicUsize::new(0),
    });
    let mut registry = ToolRegistry::new();
    registry.register_arc(sleepy.clone()).unwrap();
    let registry = Arc::new(registry);
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    // 第一次运行：完成一轮工具调用后，第二次推理调用永不返回（模拟进程崩溃）
    let first = Arc::new(
        ScriptedTransport::new(vec![Ok(tool_use(vec![req(
            "t1",
            "sleepy",
            &[("tag", "side effect")],
        )]))])
        .then_hang(),
    );
    let crashed = tokio::time::timeout(
        Duration::from_millis(200),
        agent(first.clone(), Arc::clone(&registry)).run(&context(store.clone(), "exec_crash"), "go"),
    )
    .await;
    assert!(crashed.is_err());
    assert_eq!(first.calls(), 2);
    assert_eq!(sleepy.calls.load(Ordering::SeqCst), 1);

    // 新进程：同一存储、新的传输
    let second = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::terminal(
        "finished",
    ))]));
    let run = agent(second.clone(), registry)
        .run(&context(store, "exec_crash"), "go")
        .await
        .unwrap();

    assert_eq!(run.result, "finished");
    assert_eq!(second.calls(), 1);
    assert_eq!(sleepy.calls.load(Ordering::SeqCst), 1);
    let (_, seen) = &first.requests()[1];
    assert_eq!(&second.requests()[0].1, seen);
    assert_eq!(results_of(&run.transcript.turns()[2])[0].output, "side effect");
}

#[tokio::test]
async fn test_weather_scenario_suspends_and_resumes_with_signal() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let script = || {
        vec![
            Ok(tool_use(vec![req("t1", "get_location", &[])])),
            Ok(tool_use(vec![req("t2", "get_weather", &[("location", "London, UK")])])),
            Ok(tool_use(vec![req(
                "t3",
                "wait_for_human_review",
                &[("question", "Is sunny, 72°F in London correct?")],
            )])),
        ]
    };
    let first = Arc::new(ScriptedTransport::new(script()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let err = agent(first.clone(), weather_registry())
        .with_events(tx)
        .run(&context(store.clone(), "exec_weather"), "What's the weather where I am?")
        .await
        .unwrap_err();
    let token = match err {
        AgentError::Durable(DurableError::Suspended { token }) => token,
        other => panic!("expected suspension, got {other:?}"),
    };
    assert_eq!(first.calls(), 3);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&LoopEvent::Suspended {
        token: token.clone()
    }));

    // 未收到信号前重放：仍挂起，不重复推理调用
    let idle = Arc::new(ScriptedTransport::new(vec![]));
    let still = agent(idle.clone(), weather_registry())
        .run(&context(store.clone(), "exec_weather"), "What's the weather where I am?")
        .await
        .unwrap_err();
    assert!(still.is_suspension());
    assert_eq!(idle.calls(), 0);

    store
        .resolve_callback(
            &token,
            bee_durable::durable::CallbackResolution::Success("Approved".into()),
        )
        .await
        .unwrap();
    let err = store
        .resolve_callback(
            &token,
            bee_durable::durable::CallbackResolution::Success("Again".into()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, DurableError::AlreadyResolved { token: token.clone() });

    let resumed = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::terminal(
        "It's sunny and 72°F in London. Reviewed and approved.",
    ))]));
    let run = agent(resumed.clone(), weather_registry())
        .run(&context(store, "exec_weather"), "What's the weather where I am?")
        .await
        .unwrap();

    assert_eq!(run.result, "It's sunny and 72°F in London. Reviewed and approved.");
    assert_eq!(resumed.calls(), 1);
    let turns = run.transcript.turns();
    assert_eq!(turns.len(), 8);
    assert_eq!(results_of(&turns[2])[0].output, "London, UK");
    assert_eq!(
        results_of(&turns[4])[0].output,
        "The weather in London, UK is sunny, 72°F."
    );
    assert_eq!(results_of(&turns[6])[0].output, "Approved");
}

#[tokio::test]
async fn test_callback_timeout_becomes_error_result() {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            WaitForHumanReviewTool::default()
                .with_options(WaitForCallbackOptions::with_timeout(Duration::from_millis(5))),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    let first = Arc::new(ScriptedTransport::new(vec![Ok(tool_use(vec![req(
        "t1",
        "wait_for_human_review",
        &[("question", "ok?")],
    )]))]));
    let err = agent(first, Arc::clone(&registry))
        .run(&context(store.clone(), "exec_timeout"), "check")
        .await
        .unwrap_err();
    assert!(err.is_suspension());

    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::terminal(
        "no review received",
    ))]));
    let run = agent(second.clone(), registry)
        .run(&context(store.clone(), "exec_timeout"), "check")
        .await
        .unwrap();
    assert_eq!(run.result, "no review received");
    let result = &results_of(&run.transcript.turns()[2])[0];
    assert!(result.is_error);
    assert!(result.output.contains("timed out"));

    let tokens: Vec<String> = store
        .callbacks_for("exec_timeout")
        .await
        .unwrap()
        .into_iter()
        .map(|cb| cb.token)
        .collect();
    let late = store
        .resolve_callback(
            &tokens[0],
            bee_durable::durable::CallbackResolution::Success("late".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(late, DurableError::CallbackTimeout { .. }));
}

#[tokio::test]
async fn test_transcript_is_serializable_checkpoint_state() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_use(vec![req("t1", "get_location", &[])])),
        Ok(InferenceResponse::terminal("London")),
    ]));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let run = agent(transport, weather_registry())
        .run(&context(store.clone(), "exec_ser"), "where?")
        .await
        .unwrap();

    let json = serde_json::to_string(&run.transcript).unwrap();
    let back: Transcript = serde_json::from_str(&json).unwrap();
    assert_eq!(back, run.transcript);

    let ops: Vec<String> = store
        .operations("exec_ser")
        .await
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(
        ops,
        vec!["/converse#0", "/tool:get_location:t1#0", "/converse#1"]
    );
}

#[tokio::test]
async fn test_sibling_tool_finishes_while_review_suspends() {
    let sleepy = Arc::new(SleepyTool {
        calls: AtomicUsize::new(0),
    });
    let registry = {
        let mut registry = ToolRegistry::new();
        registry.register_arc(sleepy.clone()).unwrap();
        registry.register(WaitForHumanReviewTool::default()).unwrap();
        Arc::new(registry)
    };
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    // 审核请求在前、慢工具在后：挂起要等兄弟单元跑完才上抛
    let first = Arc::new(ScriptedTransport::new(vec![Ok(tool_use(vec![
        req("r1", "wait_for_human_review", &[("question", "Proceed?")]),
        req("s1", "sleepy", &[("ms", "30"), ("tag", "slept")]),
    ]))]));
    let err = agent(first, registry.clone())
        .run(&context(store.clone(), "exec_sibling"), "go")
        .await
        .unwrap_err();
    let token = match err {
        AgentError::Durable(DurableError::Suspended { token }) => token,
        other => panic!("expected suspension, got {other:?}"),
    };
    assert_eq!(sleepy.calls.load(Ordering::SeqCst), 1);

    let ops = store.operations("exec_sibling").await.unwrap();
    assert!(ops.iter().any(|(id, _)| id == "/tool:sleepy:s1#0"));
    assert!(!ops.iter().any(|(id, _)| id == "/tool:wait_for_human_review:r1#0"));

    store
        .resolve_callback(
            &token,
            bee_durable::durable::CallbackResolution::Success("Go ahead".into()),
        )
        .await
        .unwrap();

    let resumed = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::terminal("done"))]));
    let run = agent(resumed.clone(), registry)
        .run(&context(store, "exec_sibling"), "go")
        .await
        .unwrap();

    assert_eq!(run.result, "done");
    assert_eq!(sleepy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(resumed.calls(), 1);
    let results = results_of(&run.transcript.turns()[2]);
    let pairs: Vec<(&str, &str)> = results
        .iter()
        .map(|r| (r.id.as_str(), r.output.as_str()))
        .collect();
    assert_eq!(pairs, vec![("r1", "Go ahead"), ("s1", "slept")]);
}
