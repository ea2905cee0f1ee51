// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for tests of this crate and of applications integrating it.

/// Prints logs to stdout when `RUST_LOG` is set, for example `RUST_LOG=lynq_encryption=trace`.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
