// Hive Sessions - Protocol session and task bookkeeping
//
// Persistent state for the two external protocols (MCP and A2A), task
// executions with streaming progress and cooperative cancellation, and
// the consent decision contract.

pub mod a2a;
pub mod consent;
pub mod mcp;
pub mod tasks;

pub use a2a::{
    A2aFrame, A2aSession, A2aSessionRegistry, FrameKind, HandshakeRequest, HandshakeResponse,
    HeuristicPlanEstimator, Negotiation, PlanEstimator, ProposedPlan,
};
pub use consent::{AccessDecision, AutoApproveRule, ConsentGrant, ConsentPolicy};
pub use mcp::{ClientInfo, InitializeResult, McpSession, McpSessionRegistry};
pub use tasks::{
    ProgressEvent, StreamFrame, StreamFrameKind, TaskExecution, TaskHandle, TaskRegistry,
    TaskStatus, TaskType,
};
