//! End-to-end orchestration scenarios against a deterministic scripted
//! provider.

use hive_core::{system_clock, AgentProfile, AgentRole, HiveError};
use hive_llm::testing::ScriptedProvider;
use hive_llm::{MemorySink, MilBuilder, ModelIntegrationLayer};
use hive_runtime::{
    workflow_for_goal, ExecutionPolicy, HeavyAnalysisService, OnFailure, TaskSpec,
    WorkflowDefinition, WorkflowExecutor, WorkflowStatus,
};
use hive_sessions::{TaskRegistry, TaskStatus, TaskType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn mil() -> (Arc<ModelIntegrationLayer>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let mil = Arc::new(
        MilBuilder::new()
            .with_provider(Arc::new(ScriptedProvider::openai_echo()))
            .with_usage_sink(sink.clone())
            .build(),
    );
    (mil, sink)
}

#[tokio::test]
async fn test_heavy_analysis_end_to_end() {
    let (mil, sink) = mil();
    let service = HeavyAnalysisService::new(mil);

    let result = service
        .execute("How does the incident affect the rollout?", 3)
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.agent_results.len(), 3);
    assert!(result.agent_results.iter().all(|a| a.succeeded()));
    // Every worker call produced a usage record (plus decomposition
    // and synthesis calls).
    assert!(sink.len() >= 3);
}

#[tokio::test]
async fn test_research_workflow_end_to_end() {
    let (mil, _) = mil();
    let workflow = workflow_for_goal("Research and analyze current AI technology trends", None);
    let executor = WorkflowExecutor::new(mil).with_retry_base(Duration::from_millis(5));

    let outcome = executor
        .execute(
            &workflow,
            json!({"research_topic": "artificial intelligence trends"}),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.completed_tasks, 3);
    assert!(outcome.total_cost > 0.0);
    assert!(outcome.total_tokens > 0);
    assert!(outcome.execution_time > 0.0);

    // Downstream tasks see upstream output: the report prompt embeds
    // the analysis output, which the echo provider reflects back.
    let report = outcome.result_of("report").unwrap();
    assert!(report["response"].as_str().unwrap().contains("analysis"));
}

#[tokio::test]
async fn test_dynamic_workflow_for_unmatched_goal() {
    let (mil, _) = mil();
    let workflow = workflow_for_goal("Organize the quarterly planning offsite", None);
    let executor = WorkflowExecutor::new(mil).with_retry_base(Duration::from_millis(5));

    let outcome = executor.execute(&workflow, json!({})).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    let names: Vec<&str> = outcome.results.iter().map(|r| r.task_name.as_str()).collect();
    assert_eq!(names, vec!["plan", "execute", "review"]);
}

#[tokio::test]
async fn test_workflow_retry_seed_scenario() {
    // Task T: first two attempts fail with a transient provider error,
    // the third succeeds. The workflow completes and exactly three
    // usage records are attributed to T.
    let sink = Arc::new(MemorySink::new());
    let mil = Arc::new(
        MilBuilder::new()
            .with_provider(Arc::new(
                ScriptedProvider::openai_echo()
                    .failing_first_n(2, HiveError::provider("transient", true)),
            ))
            .with_usage_sink(sink.clone())
            .build(),
    );

    let team = vec![AgentProfile::new("worker", AgentRole::Executor)];
    let tasks = vec![TaskSpec::new("t", "T", "transient work")
        .with_role(AgentRole::Executor)
        .with_max_attempts(3)];
    let workflow = WorkflowDefinition::new("retry", team, tasks).with_policy(ExecutionPolicy {
        on_failure: OnFailure::FailFast,
        ..Default::default()
    });

    let outcome = WorkflowExecutor::new(mil)
        .with_retry_base(Duration::from_millis(5))
        .execute(&workflow, json!({}))
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    let attributed: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.task_type.as_deref() == Some("T"))
        .collect();
    assert_eq!(attributed.len(), 3);
    assert_eq!(attributed.iter().filter(|r| !r.success).count(), 2);
}

#[tokio::test]
async fn test_heavy_analysis_as_tracked_task() {
    // Orchestrator runs inside the session layer's task tracking:
    // monotone progress, then a completed record with the result.
    let (mil, _) = mil();
    let registry = TaskRegistry::new(system_clock());
    let task_id = registry.create_task(
        "session-1",
        TaskType::Workflow,
        "heavy-analysis",
        json!({"query": "tracked analysis"}),
    );

    let service = Arc::new(HeavyAnalysisService::new(mil));
    registry
        .start(&task_id, move |handle| async move {
            handle.update_progress(0.1, Some("decomposing"));
            handle.checkpoint()?;
            let result = service.execute("tracked analysis", 2).await?;
            handle.update_progress(0.9, Some("synthesizing"));
            Ok(serde_json::to_value(result)?)
        })
        .unwrap();

    let mut task = registry.get(&task_id).unwrap();
    for _ in 0..200 {
        if task.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        task = registry.get(&task_id).unwrap();
    }

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 1.0);
    assert_eq!(task.result.as_ref().unwrap()["status"], "completed");
    // Progress fractions never decreased.
    let fractions: Vec<f64> = task.events.iter().map(|e| e.progress).collect();
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_tracked_task_cancellation_wins_over_result() {
    let (mil, _) = mil();
    let registry = TaskRegistry::new(system_clock());
    let task_id = registry.create_task("session-1", TaskType::A2aTask, "slow", json!({}));

    let service = Arc::new(HeavyAnalysisService::new(mil));
    let gate = Arc::new(tokio::sync::Notify::new());
    let gate2 = gate.clone();
    registry
        .start(&task_id, move |handle| async move {
            gate2.notified().await;
            handle.checkpoint()?; // observes the cancel and aborts
            let result = service.execute("never runs", 2).await?;
            Ok(serde_json::to_value(result)?)
        })
        .unwrap();

    registry.cancel(&task_id, "operator", "changed my mind").unwrap();
    gate.notify_one();

    let mut task = registry.get(&task_id).unwrap();
    for _ in 0..200 {
        if task.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        task = registry.get(&task_id).unwrap();
    }
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.cancelled_by.as_deref(), Some("operator"));
}

#[tokio::test]
async fn test_workflow_without_providers_fails_cleanly() {
    let mil = Arc::new(MilBuilder::new().build());
    let workflow = workflow_for_goal("Research something", None);
    let executor = WorkflowExecutor::new(mil).with_retry_base(Duration::from_millis(5));

    let outcome = executor.execute(&workflow, json!({})).await.unwrap();
    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert!(!outcome.failed_tasks.is_empty());
}
