// Hive Runtime - Agent execution and orchestration
//
// The agents themselves (prompt engine + provider gateway composition)
// and the two top-level orchestrators that consume them: the
// heavy-analysis fan-out/fan-in ensemble and the workflow DAG executor,
// plus the quantum-task generalization and the built-in analysis tools.

pub mod agent;
pub mod heavy;
pub mod maof;
pub mod quantum;
pub mod tools;

pub use agent::{RouterPlanEstimator, WorkforceAgent};
pub use heavy::{
    fallback_questions, AgentOutcome, AnalysisProgress, HeavyAnalysisConfig, HeavyAnalysisResult,
    HeavyAnalysisService, WorkerState, WorkerUpdate,
};
pub use maof::{
    workflow_for_goal, ExecutionEvent, ExecutionPolicy, InputRef, OnFailure, TaskResultEntry,
    TaskSpec, WorkflowDefinition, WorkflowExecutor, WorkflowOutcome, WorkflowStatus,
    WorkflowTemplate,
};
pub use quantum::{
    CollapseStrategy, MetricsConfig, PromptModifiers, QuantumExecutor, QuantumOutcome,
    QuantumTask, ThreadResult, ThreadStatus, Variation, VariationParameters,
};
pub use tools::{
    evaluate, evaluate_value, AnalysisTool, CalculatorTool, FileReadTool, Number,
    TaskCompletionTool, ToolRegistry,
};
