// Hive Graph - Typed entity/relation memory graph
//
// A network of entities and relationships rather than a list of facts:
// deterministic text ingestion, indexed multi-hop traversal, planning
// queries with evidence trails, and per-session persistence.

pub mod graph;
pub mod ingest;
pub mod planner;
pub mod store;

pub use graph::{Edge, EntityType, GraphDocument, MemoryGraph, Node, RelationType};
pub use ingest::{IngestReport, Ingestor, SourceInfo};
pub use planner::{detect_query_type, Evidence, Planner, PlannerResult, QueryType};
pub use store::GraphStore;
