// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed error taxonomy (§4.1), modeled after `MuxError` in
//! `crates/mux/src/error.rs`: a `Copy` enum whose `as_message_type` is the
//! dotted string used as an envelope `type`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    UnknownMessageType,
    InvalidInput,
    InvalidMessageFormat,
    InternalServerError,
    RoutingError,
    ProcessingError,
    QueueOverload,
    MessageUndeliverable,
    AuthenticationFailed,
    PermissionDenied,
    ConnectionError,
    SystemError,
}

impl ErrorKind {
    /// The dotted `error.*` string used as an envelope `type` (§4.1).
    pub fn as_message_type(&self) -> &'static str {
        match self {
            Self::Validation => "error.validation",
            Self::UnknownMessageType => "error.unknown_message_type",
            Self::InvalidInput => "error.invalid_input",
            Self::InvalidMessageFormat => "error.invalid_message_format",
            Self::InternalServerError => "error.internal_server_error",
            Self::RoutingError => "error.routing_error",
            Self::ProcessingError => "error.processing_error",
            Self::QueueOverload => "error.queue_overload",
            Self::MessageUndeliverable => "error.message_undeliverable",
            Self::AuthenticationFailed => "error.authentication_failed",
            Self::PermissionDenied => "error.permission_denied",
            Self::ConnectionError => "error.connection_error",
            Self::SystemError => "error.system_error",
        }
    }

    /// Any `type` not in this recognized set is an unknown-message-type for
    /// the receiver (§4.1).
    pub fn from_message_type(message_type: &str) -> Option<Self> {
        match message_type {
            "error.validation" => Some(Self::Validation),
            "error.unknown_message_type" => Some(Self::UnknownMessageType),
            "error.invalid_input" => Some(Self::InvalidInput),
            "error.invalid_message_format" => Some(Self::InvalidMessageFormat),
            "error.internal_server_error" => Some(Self::InternalServerError),
            "error.routing_error" => Some(Self::RoutingError),
            "error.processing_error" => Some(Self::ProcessingError),
            "error.queue_overload" => Some(Self::QueueOverload),
            "error.message_undeliverable" => Some(Self::MessageUndeliverable),
            "error.authentication_failed" => Some(Self::AuthenticationFailed),
            "error.permission_denied" => Some(Self::PermissionDenied),
            "error.connection_error" => Some(Self::ConnectionError),
            "error.system_error" => Some(Self::SystemError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_message_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_message_type() {
        for kind in [
            ErrorKind::Validation,
            ErrorKind::UnknownMessageType,
            ErrorKind::InvalidInput,
            ErrorKind::RoutingError,
            ErrorKind::SystemError,
        ] {
            let mt = kind.as_message_type();
            assert_eq!(ErrorKind::from_message_type(mt), Some(kind));
        }
    }

    #[test]
    fn unrecognized_type_has_no_kind() {
        assert_eq!(ErrorKind::from_message_type("stt.transcription"), None);
    }
}
