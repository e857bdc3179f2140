use std::sync::Arc;

/// Read-only status snapshot of one component.
///
/// Components never write into a shared status object; each exposes a
/// snapshot and a dedicated aggregator pulls them on demand. Snapshots are
/// plain JSON so the HTTP surface can serve them without knowing any
/// component's concrete type.
pub trait StatusSource: Send + Sync {
    /// A short stable name used as the key in the aggregated report.
    fn name(&self) -> &str;

    /// The current snapshot. Must not block on I/O.
    fn status(&self) -> serde_json::Value;
}

/// Aggregates snapshots from every registered component.
#[derive(Clone, Default)]
pub struct StatusRegistry {
    sources: Vec<Arc<dyn StatusSource>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn StatusSource>) {
        self.sources.push(source);
    }

    /// Collect every component's snapshot into one JSON object, keyed by
    /// component name.
    pub fn report(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for source in &self.sources {
            map.insert(source.name().to_string(), source.status());
        }
        serde_json::Value::Object(map)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
