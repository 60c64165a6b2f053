use crate::domain::Event;

/// Partitions events, in original order, into chunks whose serialized size
/// stays under `max_bytes`.
///
/// A single event at or over the limit becomes its own chunk; it is still
/// delivered, accepting that the collector may reject it. An event whose
/// size cannot be computed is treated as exactly at the limit, forcing a
/// chunk boundary instead of silently dropping it.
pub fn split_events_by_max_bytes(events: Vec<Event>, max_bytes: usize) -> Vec<Vec<Event>> {
    let mut result: Vec<Vec<Event>> = Vec::new();
    let mut chunk: Vec<Event> = Vec::new();
    let mut chunk_size = 0usize;

    for event in events {
        let size = event_size(&event, max_bytes);
        if size >= max_bytes {
            // Over the limit on its own, gets a dedicated chunk.
            if !chunk.is_empty() {
                result.push(std::mem::take(&mut chunk));
                chunk_size = 0;
            }
            result.push(vec![event]);
        } else if chunk_size + size >= max_bytes {
            // Doesn't fit the running chunk, close it and start fresh.
            if !chunk.is_empty() {
                result.push(std::mem::take(&mut chunk));
            }
            chunk.push(event);
            chunk_size = size;
        } else {
            chunk.push(event);
            chunk_size += size;
        }
    }
    if !chunk.is_empty() {
        result.push(chunk);
    }
    result
}

fn event_size(event: &Event, max_bytes: usize) -> usize {
    match serde_json::to_vec(event) {
        Ok(data) => data.len(),
        Err(_) => max_bytes,
    }
}
