use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureState {
    Normal,
    Constrained,
}

/// Shared flag marking the durable store unusable (e.g. disk full). Flipped
/// to constrained by the engine when a store write fails, reset to normal
/// at engine setup. Injected everywhere it is read so independent pipeline
/// instances don't cross-contaminate.
#[derive(Clone, Default)]
pub struct MemoryPressure {
    constrained: Arc<AtomicBool>,
}

impl MemoryPressure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PressureState {
        if self.is_constrained() {
            PressureState::Constrained
        } else {
            PressureState::Normal
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.constrained.load(Ordering::Relaxed)
    }

    pub fn set_constrained(&self) {
        self.constrained.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.constrained.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_shared_between_clones() {
        let pressure = MemoryPressure::new();
        let observer = pressure.clone();
        assert_eq!(observer.state(), PressureState::Normal);

        pressure.set_constrained();
        assert_eq!(observer.state(), PressureState::Constrained);

        pressure.reset();
        assert!(!observer.is_constrained());
    }
}
