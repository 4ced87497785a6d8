// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Errors raised while building or decoding shared types
#[derive(Error, Debug)]
pub enum TypesError {
    #[error("invalid mountable: {0}")]
    InvalidMountable(String),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TypesError>;
