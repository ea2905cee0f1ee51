// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for key material generation and ratchet sessions.
use serde::{Deserialize, Serialize};

/// Default maximum number of message keys a receiving chain may be advanced by in one step.
pub const DEFAULT_MAX_SKIP: u32 = 20;

/// Default number of one-time pre-keys generated with a new identity.
pub const DEFAULT_ONETIME_PREKEYS: u32 = 5;

/// Configuration parameters for identities and sessions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of messages a peer may ask us to skip in a receiving chain. This bounds the
    /// number of skipped message keys kept around for out-of-order delivery.
    pub max_skip: u32,

    /// Size of the one-time pre-key pool created with a new identity. Replenishing the pool is up
    /// to the application.
    pub onetime_prekeys: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            onetime_prekeys: DEFAULT_ONETIME_PREKEYS,
        }
    }
}
