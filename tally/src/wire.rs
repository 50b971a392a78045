//! Wire payload decoding for the HTTP API.
//!
//! Transaction submissions arrive as JSON objects with an `amount` and a
//! `timestamp` field. The amount is a decimal of arbitrary precision,
//! carried either as a string or a bare number token; the timestamp is
//! ISO-8601 with an explicit UTC offset, e.g. `2024-01-01T00:00:00.000Z`.
//! Decoding failures never reach the aggregator.

use chrono::DateTime;
use serde_json::Value;
use tally_window::Amount;

/// Errors produced when decoding a transaction payload.
#[derive(thiserror::Error, Debug)]
pub(crate) enum DecodeError {
    /// The payload was not valid JSON at all.
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// A required field was absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// The `amount` field was not a parseable decimal.
    #[error("failed to parse `amount` field")]
    InvalidAmount,
    /// The `timestamp` field was not a valid instant.
    #[error("failed to parse `timestamp` field")]
    InvalidTimestamp,
}

/// A decoded transaction submission.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CreateTransaction {
    pub(crate) amount: Amount,
    pub(crate) timestamp_millis: i64,
}

/// Decode a transaction submission from raw request bytes.
pub(crate) fn decode_transaction(body: &[u8]) -> Result<CreateTransaction, DecodeError> {
    let node: Value = serde_json::from_slice(body)?;

    let amount_node = node
        .get("amount")
        .ok_or(DecodeError::MissingField("amount"))?;
    let timestamp_node = node
        .get("timestamp")
        .ok_or(DecodeError::MissingField("timestamp"))?;

    let amount = match amount_node {
        Value::String(text) => text.parse::<Amount>(),
        // A bare number token round-trips through its textual form, the
        // same digits the client wrote for any amount of ordinary size.
        Value::Number(number) => number.to_string().parse::<Amount>(),
        _ => return Err(DecodeError::InvalidAmount),
    }
    .map_err(|_| DecodeError::InvalidAmount)?;

    let timestamp_millis = match timestamp_node {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map_err(|_| DecodeError::InvalidTimestamp)?
            .timestamp_millis(),
        _ => return Err(DecodeError::InvalidTimestamp),
    };

    Ok(CreateTransaction {
        amount,
        timestamp_millis,
    })
}
