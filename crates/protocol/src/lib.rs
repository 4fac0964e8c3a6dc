// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wire types for termrelay: the universal envelope (C1), the closed
//! error taxonomy, and the hallucination guard shared by the detector and
//! the streaming transcription loop.

pub mod envelope;
pub mod error;
pub mod hallucination;

pub use envelope::{now_secs, Envelope, ForwardingStep, ProcessingStep, GROUP_ALL_FRONTENDS};
pub use error::ErrorKind;
