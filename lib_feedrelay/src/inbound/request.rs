//! Inbound request variants, keyed by envelope `className`.

use serde::{Deserialize, Serialize};

use crate::core::envelope::Envelope;
use crate::errors::RelayResult;

/// Asks the gateway to poll one feed now and send what is new to the asker only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedTestRequest {
    /// Unique key of the feed to test.
    pub unique: u64,
}

/// Every request a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRequest {
    /// See [`FeedTestRequest`].
    FeedTest(FeedTestRequest),
}

impl InboundRequest {
    /// Tag of [`InboundRequest::FeedTest`].
    pub const FEED_TEST: &'static str = "FeedTestRequest";

    /// Matches the envelope's tag to a variant and decodes its data.
    /// Returns `Ok(None)` for tags no variant claims.
    pub fn from_envelope(envelope: &Envelope) -> RelayResult<Option<Self>> {
        match envelope.class_name.as_str() {
            Self::FEED_TEST => Ok(Some(Self::FeedTest(envelope.data_as()?))),
            _ => Ok(None),
        }
    }

    /// The variant's tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::FeedTest(_) => Self::FEED_TEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RelayError;

    #[test]
    fn known_tag_decodes() {
        let env = Envelope::decode(r#"{"data":"{\"unique\":12}","className":"FeedTestRequest"}"#).unwrap();
        let req = InboundRequest::from_envelope(&env).unwrap();
        assert_eq!(req, Some(InboundRequest::FeedTest(FeedTestRequest { unique: 12 })));
        assert_eq!(req.unwrap().tag(), "FeedTestRequest");
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        let env = Envelope::decode(r#"{"data":{},"className":"SomethingElse"}"#).unwrap();
        assert_eq!(InboundRequest::from_envelope(&env).unwrap(), None);
    }

    #[test]
    fn bad_data_for_a_known_tag_is_a_decode_error() {
        let env = Envelope::decode(r#"{"data":{"unique":"twelve"},"className":"FeedTestRequest"}"#).unwrap();
        assert!(matches!(InboundRequest::from_envelope(&env), Err(RelayError::Decode(_))));
    }
}
