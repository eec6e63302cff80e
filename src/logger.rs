use tracing::Level;

/// Installs a plain formatting subscriber for embedders that don't bring
/// their own. Safe to call more than once; later calls are no-ops.
pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init();
}
