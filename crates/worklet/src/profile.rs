use std::time::Instant;

/// Times one dispatch step and reports it on the profiling log target.
pub(crate) fn profiled<T>(label: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    log::trace!(target: "worklet.profile", "{label}: {:?}", start.elapsed());
    out
}
