//! Per-session graph persistence
//!
//! Graphs are owned by their session; cross-session access goes through
//! this store, which copies in on save and copies out on load. The file
//! backend keeps one JSON document per session under a base directory,
//! written immediately so graphs survive restarts. Without a base
//! directory the store runs purely in memory.

use hive_core::{HiveError, HiveResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::graph::{GraphDocument, MemoryGraph};

/// Session-keyed graph store.
pub struct GraphStore {
    /// Base directory for JSON documents; None means in-memory only
    dir: Option<PathBuf>,
    /// In-memory copies, also the cache in file mode
    graphs: RwLock<HashMap<String, GraphDocument>>,
}

impl GraphStore {
    /// Purely in-memory store.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// File-backed store rooted at the given directory.
    pub async fn file(dir: impl Into<PathBuf>) -> HiveResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            HiveError::internal(format!(
                "Failed to create graph store directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            dir: Some(dir),
            graphs: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, session_id: &str) -> Option<PathBuf> {
        // Session ids come from UUIDs; reject anything path-like.
        self.dir.as_ref().map(|dir| {
            let safe: String = session_id
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
                .collect();
            dir.join(format!("{}.json", safe))
        })
    }

    /// Save a snapshot of the graph for a session (copy-in).
    pub async fn save(&self, session_id: &str, graph: &MemoryGraph) -> HiveResult<()> {
        let doc = graph.to_document();
        tracing::debug!(
            session_id,
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "saving memory graph"
        );

        if let Some(path) = self.path_for(session_id) {
            let json = serde_json::to_string_pretty(&doc)?;
            tokio::fs::write(&path, json).await.map_err(|e| {
                HiveError::internal(format!(
                    "Failed to write graph file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        self.graphs.write().insert(session_id.to_string(), doc);
        Ok(())
    }

    /// Load an owned copy of a session's graph (copy-out). A session
    /// with no saved graph gets a fresh empty one.
    pub async fn load(&self, session_id: &str) -> HiveResult<MemoryGraph> {
        if let Some(doc) = self.graphs.read().get(session_id).cloned() {
            return MemoryGraph::from_document(doc);
        }

        if let Some(path) = self.path_for(session_id) {
            if path.exists() {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    HiveError::internal(format!(
                        "Failed to read graph file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let doc: GraphDocument = serde_json::from_str(&content).map_err(|e| {
                    HiveError::internal(format!(
                        "Failed to parse graph file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                self.graphs
                    .write()
                    .insert(session_id.to_string(), doc.clone());
                return MemoryGraph::from_document(doc);
            }
        }

        Ok(MemoryGraph::new())
    }

    /// Remove a session's graph.
    pub async fn delete(&self, session_id: &str) -> HiveResult<bool> {
        let existed = self.graphs.write().remove(session_id).is_some();
        if let Some(path) = self.path_for(session_id) {
            if path.exists() {
                tokio::fs::remove_file(&path).await.map_err(|e| {
                    HiveError::internal(format!(
                        "Failed to delete graph file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                return Ok(true);
            }
        }
        Ok(existed)
    }

    /// Known session ids, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut out: Vec<String> = self.graphs.read().keys().cloned().collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EntityType, Node, RelationType};

    fn sample_graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph.upsert_node(Node::new(EntityType::Service, "crm7"));
        graph.upsert_node(Node::new(EntityType::EnvVar, "DB_URL"));
        graph
            .add_edge(Edge::new(RelationType::ServiceRequiresEnvvar, "svc:crm7", "env:DB_URL"))
            .unwrap();
        graph
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = GraphStore::in_memory();
        store.save("session-1", &sample_graph()).await.unwrap();

        let loaded = store.load("session-1").await.unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_copy_out_isolation() {
        let store = GraphStore::in_memory();
        store.save("session-1", &sample_graph()).await.unwrap();

        // Mutating a loaded copy must not affect the stored snapshot.
        let mut copy = store.load("session-1").await.unwrap();
        copy.upsert_node(Node::new(EntityType::Service, "other"));

        let reloaded = store.load("session-1").await.unwrap();
        assert_eq!(reloaded.node_count(), 2);
    }

    #[tokio::test]
    async fn test_file_persistence_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = GraphStore::file(dir.path()).await.unwrap();
            store.save("session-1", &sample_graph()).await.unwrap();
        }

        let store = GraphStore::file(dir.path()).await.unwrap();
        let loaded = store.load("session-1").await.unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty_graph() {
        let store = GraphStore::in_memory();
        let graph = store.load("never-saved").await.unwrap();
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::file(dir.path()).await.unwrap();
        store.save("session-1", &sample_graph()).await.unwrap();

        assert!(store.delete("session-1").await.unwrap());
        let graph = store.load("session-1").await.unwrap();
        assert!(graph.is_empty());
        assert!(!store.delete("session-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_session_ids_are_sanitized_for_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::file(dir.path()).await.unwrap();
        store.save("../escape", &sample_graph()).await.unwrap();

        // The file lands inside the base directory.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
