//! Encoding of write requests for the bitwise query dialect.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// First statement on every connection, switching the session to the
/// bitwise query dialect.
pub const MODE_DECLARATION: &str = "QUERY TYPE BITWISE;";

pub const DEFAULT_PAYLOAD_LENGTH: usize = 64;
/// One week.
pub const DEFAULT_RETENTION: u64 = 604_800;
pub const DEFAULT_PAYLOAD_TAG: &str = "s2.";

/// Parameters shared by every request a run generates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Number of random characters after the tag.
    pub payload_length: usize,
    /// Seconds added to the current time to form the expiration.
    pub retention: u64,
    /// Literal prefix identifying the payload encoding.
    pub payload_tag: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            payload_length: DEFAULT_PAYLOAD_LENGTH,
            retention: DEFAULT_RETENTION,
            payload_tag: DEFAULT_PAYLOAD_TAG.to_string(),
        }
    }
}

/// A single `NEW` statement. Generated fresh and dropped once written.
#[derive(Debug, Clone)]
pub struct Request {
    pub identifier: Uuid,
    /// Tag followed by the random characters.
    pub payload: String,
    /// Absolute unix timestamp in seconds.
    pub expiration: i64,
}

impl Request {
    /// Generates a request with a fresh identifier and payload. The
    /// expiration is computed from the clock at the time of this call.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, settings: &EncoderSettings) -> Self {
        let mut payload =
            String::with_capacity(settings.payload_tag.len() + settings.payload_length);
        payload.push_str(&settings.payload_tag);
        payload.push_str(&random_payload(rng, settings.payload_length));

        Self {
            identifier: Uuid::new_v4(),
            payload,
            expiration: expiration_from(Utc::now(), settings.retention),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NEW '{}' VALUE '{}' WITH TTL '{}';",
            self.identifier, self.payload, self.expiration
        )
    }
}

/// Generates and encodes one request.
pub fn encode_request<R: Rng + ?Sized>(rng: &mut R, settings: &EncoderSettings) -> String {
    Request::generate(rng, settings).encode()
}

/// Random string of exactly `len` lowercase ascii letters.
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect()
}

pub fn expiration_from(now: DateTime<Utc>, retention: u64) -> i64 {
    now.timestamp()
        .saturating_add(i64::try_from(retention).unwrap_or(i64::MAX))
}
