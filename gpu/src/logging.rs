//! Logging setup for webcs.
//!
//! The library logs through the `log` facade; binaries and tests pick an
//! `env_logger` configuration with one of the helpers below.
//!
//! Levels used by the crate:
//!
//! - `warn!` - recoverable oddities (unused uniforms, unsupported adapter features)
//! - `info!` - device selection, kernel definitions
//! - `debug!` - slot layouts, resource (re)allocation, bind group rebuilds
//! - `trace!` - generated shader source, per-dispatch group counts
//!
//! ```bash
//! RUST_LOG=webcs_gpu=debug webcs compile kernel.wgsl --params A,B,C
//! RUST_LOG=webcs_gpu::kernel=trace cargo test -p webcs-gpu
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging at `Warn` level. Later calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level. Later calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to `warn`.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Test-friendly initialization; safe to call from every test.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .is_test(true)
        .try_init();
}
