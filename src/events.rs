//! Domain events published by the command side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, DomainEvent};
use crate::models::Feed;

/// Message type tag for [`CreatedFeedEvent`].
pub const CREATED_FEED: &str = "created_feed";

/// Wire shape of `created_feed`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CreatedFeedMessage {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub title: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(message, optional, tag = "4")]
    pub created_at: Option<prost_types::Timestamp>,
}

/// A feed was created and persisted on the command side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFeedEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent for CreatedFeedEvent {
    const MESSAGE_TYPE: &'static str = CREATED_FEED;

    type Wire = CreatedFeedMessage;

    fn to_wire(&self) -> codec::Result<CreatedFeedMessage> {
        Ok(CreatedFeedMessage {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            created_at: Some(codec::to_timestamp(&self.created_at)?),
        })
    }

    fn from_wire(wire: CreatedFeedMessage) -> codec::Result<Self> {
        let created_at = wire.created_at.as_ref().ok_or(CodecError::MissingField {
            message_type: CREATED_FEED,
            field: "created_at",
        })?;
        Ok(Self {
            created_at: codec::from_timestamp(created_at)?,
            id: wire.id,
            title: wire.title,
            description: wire.description,
        })
    }
}

impl From<&Feed> for CreatedFeedEvent {
    fn from(feed: &Feed) -> Self {
        Self {
            id: feed.id.clone(),
            title: feed.title.clone(),
            description: feed.description.clone(),
            created_at: feed.created_at,
        }
    }
}

impl From<CreatedFeedEvent> for Feed {
    fn from(event: CreatedFeedEvent) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            created_at: event.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, decode_into, encode};
    use chrono::{TimeZone, Timelike};
    use prost::Message;

    fn sample_event() -> CreatedFeedEvent {
        CreatedFeedEvent {
            id: "1".to_string(),
            title: "Go Releases".to_string(),
            description: "weekly digest".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_roundtrip_preserves_event() {
        let event = sample_event();
        let payload = encode(&event).unwrap();
        let decoded: CreatedFeedEvent = decode(&payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_roundtrip_with_empty_strings_and_unicode() {
        let event = CreatedFeedEvent {
            id: String::new(),
            title: "Ünïcødé ✓".to_string(),
            description: String::new(),
            created_at: Utc.timestamp_opt(0, 999_999_999).unwrap(),
        };
        let decoded: CreatedFeedEvent = decode(&encode(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let event = sample_event();
        assert_eq!(encode(&event).unwrap(), encode(&event).unwrap());
    }

    #[test]
    fn test_truncated_payload_fails() {
        let payload = encode(&sample_event()).unwrap();
        let truncated = &payload[..payload.len() - 3];
        let result = decode::<CreatedFeedEvent>(truncated);
        assert!(matches!(result, Err(CodecError::Decoding { .. })));
    }

    #[test]
    fn test_missing_timestamp_rejected() {
        let wire = CreatedFeedMessage {
            id: "1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            created_at: None,
        };
        let result = decode::<CreatedFeedEvent>(&wire.encode_to_vec());
        assert!(matches!(
            result,
            Err(CodecError::MissingField {
                field: "created_at",
                ..
            })
        ));
    }

    #[test]
    fn test_decode_into_leaves_target_untouched_on_error() {
        let original = sample_event();
        let mut target = original.clone();

        let result = decode_into(b"\xff\xff\xff", &mut target);

        assert!(result.is_err());
        assert_eq!(target, original);
    }

    #[test]
    fn test_decode_into_overwrites_on_success() {
        let mut target = sample_event();
        let other = CreatedFeedEvent {
            id: "2".to_string(),
            ..sample_event()
        };

        decode_into(&encode(&other).unwrap(), &mut target).unwrap();

        assert_eq!(target, other);
    }

    #[test]
    fn test_leap_second_rejected_at_encode() {
        let event = CreatedFeedEvent {
            created_at: Utc
                .with_ymd_and_hms(2016, 12, 31, 23, 59, 59)
                .unwrap()
                .with_nanosecond(1_500_000_000)
                .unwrap(),
            ..sample_event()
        };

        let result = encode(&event);

        assert!(matches!(result, Err(CodecError::LeapSecond { .. })));
    }

    #[test]
    fn test_feed_conversion_roundtrip() {
        let feed = Feed::new("title", "description");
        let event = CreatedFeedEvent::from(&feed);
        assert_eq!(Feed::from(event), feed);
    }
}
