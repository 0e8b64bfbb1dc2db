use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide stop flag shared by the listener and every worker.
///
/// Cloning yields another handle to the same flag. The flag only ever moves
/// from clear to set; setting it again is a no-op. Readers observe it at their
/// polling points rather than being interrupted.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<Mutex<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        let mut requested = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        let first = !*requested;
        *requested = true;
        first
    }

    pub fn is_triggered(&self) -> bool {
        *self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        assert!(!ShutdownSignal::new().is_triggered());
    }

    #[test]
    fn trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[test]
    fn clones_share_the_flag() {
        let signal = ShutdownSignal::new();
        let worker_view = signal.clone();
        std::thread::spawn(move || worker_view.trigger())
            .join()
            .expect("trigger thread panicked");
        assert!(signal.is_triggered());
    }
}
