mod adaptive_concurrency;

pub use self::adaptive_concurrency::*;

/// Observability emitted by the middleware around the limiter.
pub trait InternalEvent {
    fn emit_logs(&self) {}
    fn emit_metrics(&self) {}
}

#[inline]
pub fn emit(event: impl InternalEvent) {
    event.emit_logs();
    event.emit_metrics();
}
