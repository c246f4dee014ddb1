/// Route `tracing` output to the test harness, once per process.
pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
