use super::event::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const BATCH_NUM_KEY: &str = "batch_num";

/// A sealed group of events plus enrichment metadata, the unit of network
/// transmission. Never mutated after construction; splitting produces new
/// batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub meta: Map<String, Value>,
    pub events: Vec<Event>,
}

impl Batch {
    /// Builds a batch, stamping the sequence number into the metadata map
    /// under `batch_num`.
    pub fn new(mut meta: Map<String, Value>, batch_num: i64, events: Vec<Event>) -> Self {
        meta.insert(BATCH_NUM_KEY.to_string(), Value::from(batch_num));
        Self { meta, events }
    }

    pub fn batch_num(&self) -> Option<i64> {
        self.meta.get(BATCH_NUM_KEY).and_then(Value::as_i64)
    }

    /// A batch can be split iff it holds more than one event.
    pub fn is_splittable(&self) -> bool {
        self.events.len() > 1
    }

    /// Splits the events into two nearly-equal halves preserving order:
    /// first half gets `floor(n / 2)` events, second half the remainder.
    pub fn split_halves(&self) -> (Vec<Event>, Vec<Event>) {
        let mid = self.events.len() / 2;
        let first = self.events[..mid].to_vec();
        let second = self.events[mid..].to_vec();
        (first, second)
    }
}

/// A batch plus the identity it is stored, tracked in flight, and
/// retry-keyed under. `synchronous` marks single-event batches created for
/// the blocking send path; those are never written to the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: String,
    pub batch: Batch,
    #[serde(default)]
    pub synchronous: bool,
}

impl BatchRecord {
    pub fn new(batch: Batch) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            batch,
            synchronous: false,
        }
    }

    pub fn synchronous(batch: Batch) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            batch,
            synchronous: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn event(n: i64) -> Event {
        Event::new(format!("e{n}"), Map::new(), "2024-01-01T00:00:00+00:00".to_string(), n)
    }

    #[test]
    fn batch_num_is_stamped_into_meta() {
        let batch = Batch::new(Map::new(), 17, vec![event(1)]);
        assert_eq!(batch.batch_num(), Some(17));
        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(value["meta"]["batch_num"], 17);
    }

    #[test]
    fn single_event_batch_is_not_splittable() {
        let batch = Batch::new(Map::new(), 1, vec![event(1)]);
        assert!(!batch.is_splittable());
        let batch = Batch::new(Map::new(), 2, vec![event(1), event(2)]);
        assert!(batch.is_splittable());
    }

    #[test]
    fn split_preserves_order_and_conserves_events() {
        let events: Vec<Event> = (1..=5).map(event).collect();
        let batch = Batch::new(Map::new(), 3, events.clone());
        let (first, second) = batch.split_halves();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        let rejoined: Vec<Event> = first.into_iter().chain(second).collect();
        assert_eq!(rejoined, events);
    }
}
