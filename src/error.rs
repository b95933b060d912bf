//! Crate-level error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::feedforward::{NewNetError, ProcessError, TrainError};

/// Everything that can stop a training run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Dataset file not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The dataset is readable but unusable for training.
    #[error("{0}")]
    Data(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The exported model doesn't describe a consistent network.
    #[error("invalid model: {0}")]
    Model(String),

    #[error(transparent)]
    Net(#[from] NewNetError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Train(#[from] TrainError),
}

impl Error {
    pub fn data(reason: impl Into<String>) -> Self {
        Self::Data(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn model(reason: impl Into<String>) -> Self {
        Self::Model(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
