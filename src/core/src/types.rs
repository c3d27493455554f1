//! Identifier and quantity aliases shared across the DAAN managers

/// Node identifier: 32 lowercase hex chars, the first 16 bytes of the
/// SHA-256 digest of the node's public key.
pub type NodeId = String;

/// Bookkeeping amount for collateral and guarantees. Not a token; slashing
/// may confiscate fractional amounts, so this is a float rather than an
/// integer unit.
pub type Amount = f64;

/// Reputation score. The reputation engine keeps scores in [-1, 1]; the
/// admission layer keeps admitted-node reputation as a non-negative value.
pub type Reputation = f64;

/// Unix timestamp in seconds.
pub type Timestamp = i64;
