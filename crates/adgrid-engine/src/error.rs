// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::ValidationError;
use std::collections::BTreeMap;
use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while saving. Please try again.";
pub const CONFLICT_MESSAGE: &str = "This row changed since it was loaded and has been refreshed.";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{field}: {}", messages.join("; "))]
    Field {
        field: String,
        messages: Vec<String>,
    },
    #[error("row changed on the server: {message}")]
    Conflict { message: String },
    #[error("request failed: {message}")]
    Transport { message: String },
    #[error("sync status poll failed: {message}")]
    SyncPoll { message: String },
    #[error("invalid breakdown path: {0}")]
    InvalidBreakdownPath(String),
    #[error("unknown row {0}")]
    UnknownRow(String),
}

impl GridError {
    /// Text the renderer shows: inline for field errors, a reload toast for
    /// conflicts, a retry banner for transport failures.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(error) => error.to_string(),
            Self::Field { messages, .. } => messages.join(" "),
            Self::Conflict { .. } => CONFLICT_MESSAGE.to_owned(),
            Self::Transport { .. } => GENERIC_FAILURE_MESSAGE.to_owned(),
            Self::InvalidBreakdownPath(message) => message.clone(),
            Self::SyncPoll { .. } | Self::UnknownRow(_) => String::new(),
        }
    }

    pub const fn forces_refetch(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Server-side rejection of a save, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SaveFailure {
    #[error("server rejected {} field(s)", errors.len())]
    Field {
        errors: BTreeMap<String, Vec<String>>,
    },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("transport: {message}")]
    Transport { message: String },
}

impl SaveFailure {
    pub fn transport(error: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: error.to_string(),
        }
    }

    /// Narrows the failure to the error shown on `field`.
    pub fn into_grid_error(self, field: &str) -> GridError {
        match self {
            Self::Field { mut errors } => {
                let messages = errors
                    .remove(field)
                    .or_else(|| errors.into_values().next())
                    .unwrap_or_default();
                GridError::Field {
                    field: field.to_owned(),
                    messages,
                }
            }
            Self::Conflict { message } => GridError::Conflict { message },
            Self::Transport { message } => GridError::Transport { message },
        }
    }
}
