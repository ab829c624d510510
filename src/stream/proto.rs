use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operator alert severity reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Valuation figures carried by a position update.
///
/// Numeric fields stay the exact decimal strings sent by the server; the
/// client performs no financial computation on them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionMetrics {
    /// Position value in the quote currency.
    pub value_usd: String,
    /// Profit and loss percentage since entry.
    pub pnl_percent: String,
    /// Impermanent loss percentage.
    pub il_percent: String,
    /// Whether the position is currently inside its liquidity range.
    pub in_range: bool,
}

/// Decoded, validated wire message ready for dispatch.
///
/// The `type` field discriminates the variants on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Incremental valuation update for one tracked position.
    PositionUpdate {
        /// On-chain address of the position.
        position_address: String,
        /// Server timestamp for the valuation.
        timestamp: String,
        /// Valuation payload.
        data: PositionMetrics,
    },
    /// Operator alert raised by the server.
    Alert {
        /// Alert severity.
        severity: AlertSeverity,
        /// Short alert title.
        title: String,
        /// Human-readable alert body.
        message: String,
        /// Server timestamp for the alert.
        timestamp: String,
    },
}

/// Rejected inbound frame.
///
/// Decode failures are always recovered locally: the offending frame is
/// dropped and reported, and the channel stays connected.
#[derive(Debug, Error)]
#[error("undecodable frame: {0}")]
pub struct DecodeFailure(#[from] serde_json::Error);

/// Decodes one raw text frame into a validated [`Envelope`].
///
/// Malformed JSON, a missing `type` tag, unrecognized tag values, and
/// schema mismatches all classify as [`DecodeFailure`].
pub fn decode_frame(text: &str) -> Result<Envelope, DecodeFailure> {
    Ok(serde_json::from_str(text)?)
}
