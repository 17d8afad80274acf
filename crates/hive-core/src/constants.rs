//! Protocol identifiers and operational defaults

/// MCP protocol constants.
pub mod mcp {
    /// Protocol version identifier. MCP uses date-formatted versions.
    pub const PROTOCOL_VERSION: &str = "2025-03-26";
    pub const SERVER_NAME: &str = "Hive Workforce Runtime";
    pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// A2A protocol constants.
pub mod a2a {
    pub const PROTOCOL_VERSION: &str = "1.0.0";
    pub const HANDSHAKE_TIMEOUT_SECS: u64 = 30;
    pub const NEGOTIATION_TIMEOUT_SECS: u64 = 60;
}

/// Default deadlines, in seconds.
pub mod timeouts {
    /// One provider call
    pub const PROVIDER_CALL_SECS: u64 = 60;
    /// Synthesis call over collected worker output
    pub const SYNTHESIS_CALL_SECS: u64 = 120;
    /// Entire heavy analysis
    pub const HEAVY_ANALYSIS_SECS: u64 = 300;
    /// One workflow task
    pub const WORKFLOW_TASK_SECS: u64 = 300;
    /// Whole workflow ceiling
    pub const WORKFLOW_SECS: u64 = 86_400;
}

/// Response cache defaults.
pub mod cache {
    /// Default entry TTL
    pub const TTL_SECS: u64 = 3600;
}

/// Retry defaults for retriable task failures.
pub mod retry {
    /// Base backoff before doubling
    pub const BASE_DELAY_MS: u64 = 1000;
    /// Backoff ceiling
    pub const MAX_DELAY_MS: u64 = 30_000;
    /// Jitter applied around the computed delay
    pub const JITTER_FRACTION: f64 = 0.2;
}
