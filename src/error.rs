// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.

use thiserror::Error;

/// Errors produced by the session statistics engine.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid sequence number {seq}: {reason}")]
    InvalidSeq { seq: u32, reason: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session: {0}")]
    CorruptSession(String),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(&'static str),
}

pub type Result<T> = std::result::Result<T, StatsError>;
