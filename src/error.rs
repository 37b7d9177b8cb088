//! Error types for stake_rs
//!
//! This module defines domain-specific error types that provide clear,
//! actionable error messages to users.

use thiserror::Error;

/// Validation errors for a stake entered through the CLI, the TUI form or an
/// import file.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Platform is required")]
    PlatformRequired,

    #[error("Staked token is required")]
    TokenRequired,

    #[error("Quantity is required")]
    QuantityRequired,

    #[error("Invalid quantity format: {0}")]
    InvalidQuantity(String),

    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),

    #[error("Yield rate is required")]
    YieldRequired,

    #[error("Invalid yield rate format: {0}")]
    InvalidYield(String),

    #[error("Yield rate cannot be negative, got {0}")]
    NegativeYield(f64),

    #[error("Invalid fee format: {0}")]
    InvalidFee(String),

    #[error("Fee cannot be negative, got {0}")]
    NegativeFee(f64),

    #[error("Unknown yield kind '{0}', expected APR or APY")]
    UnknownYieldKind(String),
}

/// Failures of the persistent record slot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sled::Error),

    #[error("Failed to serialize stakes: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No stake at row {0}")]
    NoSuchStake(usize),
}
