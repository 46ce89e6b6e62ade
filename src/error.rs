// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the pump: protocol violations and system-level I/O
// failures are both fatal to the engine, but kept distinct so the driver
// can log and report them differently. Benign EOF is not represented here
// at all — it's a channel-state transition, never an `Err`.

use std::io;

/// A fatal condition that unwinds out of the pump.
///
/// Neither variant is locally recoverable: a protocol violation implies
/// divergent peer state, and a system error means the transport or a
/// channel fd can no longer be trusted.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("system error: {0}")]
    System(#[from] io::Error),
}

impl EngineError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        EngineError::Protocol(msg.into())
    }
}
