//! Message codec for domain events.
//!
//! Events cross process boundaries as protobuf bytes, published under a
//! subject equal to their message type. The type tag is the only versioning
//! signal: each tag maps to exactly one wire schema.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use prost::Message;
use prost_types::Timestamp;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised at the codec boundary. None of these are retryable.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode '{message_type}': {source}")]
    Encoding {
        message_type: &'static str,
        #[source]
        source: prost::EncodeError,
    },

    #[error("Failed to decode '{message_type}': {source}")]
    Decoding {
        message_type: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Field '{field}' missing from '{message_type}'")]
    MissingField {
        message_type: &'static str,
        field: &'static str,
    },

    #[error("Invalid timestamp: seconds={seconds}, nanos={nanos}")]
    InvalidTimestamp { seconds: i64, nanos: i32 },

    /// Leap seconds have no protobuf `Timestamp` representation.
    #[error("Leap-second timestamp at {seconds}s cannot be encoded")]
    LeapSecond { seconds: i64 },
}

/// A typed domain event with a stable message type and a protobuf wire shape.
///
/// `from_wire` is where schema mismatches are rejected: a wire message that
/// decodes but lacks required data must fail rather than produce a
/// half-populated event.
pub trait DomainEvent: Clone + Send + Sync + 'static {
    /// Type tag, used as the broker subject.
    const MESSAGE_TYPE: &'static str;

    /// Protobuf representation on the wire.
    type Wire: Message + Default;

    fn to_wire(&self) -> Result<Self::Wire>;

    fn from_wire(wire: Self::Wire) -> Result<Self>;
}

/// Encode an event into its transport payload.
pub fn encode<E: DomainEvent>(event: &E) -> Result<Bytes> {
    let wire = event.to_wire()?;
    let mut buf = BytesMut::with_capacity(wire.encoded_len());
    wire.encode(&mut buf).map_err(|source| CodecError::Encoding {
        message_type: E::MESSAGE_TYPE,
        source,
    })?;
    Ok(buf.freeze())
}

/// Decode a transport payload into a fresh event.
pub fn decode<E: DomainEvent>(payload: &[u8]) -> Result<E> {
    let wire = E::Wire::decode(payload).map_err(|source| CodecError::Decoding {
        message_type: E::MESSAGE_TYPE,
        source,
    })?;
    E::from_wire(wire)
}

/// Decode a payload into an existing value.
///
/// The target is only overwritten once decoding fully succeeds; on error it
/// keeps its previous contents.
pub fn decode_into<E: DomainEvent>(payload: &[u8], target: &mut E) -> Result<()> {
    let decoded = decode::<E>(payload)?;
    *target = decoded;
    Ok(())
}

/// Convert a UTC datetime into a protobuf timestamp.
///
/// chrono encodes a leap second as nanos of one second or more, which a
/// protobuf `Timestamp` cannot carry.
pub fn to_timestamp(at: &DateTime<Utc>) -> Result<Timestamp> {
    let nanos = at.timestamp_subsec_nanos();
    if nanos >= 1_000_000_000 {
        return Err(CodecError::LeapSecond {
            seconds: at.timestamp(),
        });
    }
    Ok(Timestamp {
        seconds: at.timestamp(),
        nanos: nanos as i32,
    })
}

/// Convert a protobuf timestamp into a UTC datetime.
pub fn from_timestamp(ts: &Timestamp) -> Result<DateTime<Utc>> {
    let invalid = || CodecError::InvalidTimestamp {
        seconds: ts.seconds,
        nanos: ts.nanos,
    };
    let nanos = u32::try_from(ts.nanos).map_err(|_| invalid())?;
    if nanos >= 1_000_000_000 {
        return Err(invalid());
    }
    DateTime::from_timestamp(ts.seconds, nanos).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_roundtrip_keeps_nanos() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let ts = to_timestamp(&at).unwrap();
        assert_eq!(ts.nanos, 123_456_789);
        assert_eq!(from_timestamp(&ts).unwrap(), at);
    }

    #[test]
    fn test_negative_nanos_rejected() {
        let ts = Timestamp {
            seconds: 10,
            nanos: -1,
        };
        assert!(matches!(
            from_timestamp(&ts),
            Err(CodecError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_nanos_overflow_rejected() {
        let ts = Timestamp {
            seconds: 10,
            nanos: 1_000_000_000,
        };
        assert!(from_timestamp(&ts).is_err());
    }

    #[test]
    fn test_out_of_range_seconds_rejected() {
        let ts = Timestamp {
            seconds: i64::MAX,
            nanos: 0,
        };
        assert!(from_timestamp(&ts).is_err());
    }

    #[test]
    fn test_leap_second_not_encodable() {
        let at = Utc
            .timestamp_opt(1_483_228_799, 1_500_000_000)
            .single()
            .unwrap();
        assert!(matches!(
            to_timestamp(&at),
            Err(CodecError::LeapSecond {
                seconds: 1_483_228_799
            })
        ));
    }
}
