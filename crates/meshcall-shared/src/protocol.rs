//! Signaling envelope and its wire format.
//!
//! On the wire every envelope is a JSON object
//! `{ "from": .., "to": .., "type": "offer"|"answer"|"ice", "data": .. }`.
//! Inside the process the payload is a tagged union, so a description can
//! never be mistaken for a candidate once [`SignalingEnvelope::decode`] has
//! accepted it.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_ENVELOPE_SIZE;
use crate::error::ProtocolError;
use crate::types::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description in the browser `RTCSessionDescriptionInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate in the browser `RTCIceCandidateInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Envelope payload, keyed by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Ice(IceCandidate),
}

impl SignalPayload {
    /// Wire name of the payload type.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer(_) => "offer",
            SignalPayload::Answer(_) => "answer",
            SignalPayload::Ice(_) => "ice",
        }
    }
}

/// Addressed signaling message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingEnvelope {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub payload: SignalPayload,
}

#[derive(Serialize)]
struct WireEnvelopeOut<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct WireEnvelopeIn {
    from: Option<String>,
    to: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<serde_json::Value>,
}

impl SignalingEnvelope {
    pub fn new(from: ParticipantId, to: ParticipantId, payload: SignalPayload) -> Self {
        Self { from, to, payload }
    }

    pub fn is_addressed_to(&self, participant: &ParticipantId) -> bool {
        &self.to == participant
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let data = match &self.payload {
            SignalPayload::Offer(desc) | SignalPayload::Answer(desc) => {
                serde_json::to_value(desc)
            }
            SignalPayload::Ice(candidate) => serde_json::to_value(candidate),
        }
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let wire = WireEnvelopeOut {
            from: self.from.as_str(),
            to: self.to.as_str(),
            kind: self.payload.kind(),
            data,
        };
        serde_json::to_vec(&wire).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Parse and validate an envelope from the JSON wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::TooLarge(bytes.len()));
        }

        let wire: WireEnvelopeIn =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let from = non_empty(wire.from, "from")?;
        let to = non_empty(wire.to, "to")?;
        let kind = wire.kind.ok_or(ProtocolError::MissingField("type"))?;
        let data = wire.data.ok_or(ProtocolError::MissingField("data"))?;

        let payload = match kind.as_str() {
            "offer" => SignalPayload::Offer(description(data, SdpKind::Offer)?),
            "answer" => SignalPayload::Answer(description(data, SdpKind::Answer)?),
            "ice" => {
                let candidate: IceCandidate = serde_json::from_value(data).map_err(|e| {
                    ProtocolError::InvalidPayload {
                        kind: "ice",
                        reason: e.to_string(),
                    }
                })?;
                SignalPayload::Ice(candidate)
            }
            _ => return Err(ProtocolError::UnknownType(kind)),
        };

        Ok(Self {
            from: ParticipantId(from),
            to: ParticipantId(to),
            payload,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, ProtocolError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProtocolError::MissingField(field)),
    }
}

fn description(
    data: serde_json::Value,
    expected: SdpKind,
) -> Result<SessionDescription, ProtocolError> {
    let kind = match expected {
        SdpKind::Offer => "offer",
        SdpKind::Answer => "answer",
    };
    let desc: SessionDescription =
        serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
            kind,
            reason: e.to_string(),
        })?;
    if desc.kind != expected {
        return Err(ProtocolError::InvalidPayload {
            kind,
            reason: format!("description type {:?} does not match envelope", desc.kind),
        });
    }
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    fn bob() -> ParticipantId {
        ParticipantId::new("bob")
    }

    #[test]
    fn test_encode_uses_flat_wire_shape() {
        let env = SignalingEnvelope::new(
            alice(),
            bob(),
            SignalPayload::Offer(SessionDescription::offer("v=0")),
        );
        let value: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();

        assert_eq!(value["from"], "alice");
        assert_eq!(value["to"], "bob");
        assert_eq!(value["type"], "offer");
        assert_eq!(value["data"]["type"], "offer");
        assert_eq!(value["data"]["sdp"], "v=0");
    }

    #[test]
    fn test_decode_browser_candidate() {
        let raw = br#"{"from":"bob","to":"alice","type":"ice","data":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":null}}"#;
        let env = SignalingEnvelope::decode(raw).unwrap();

        assert_eq!(env.from, bob());
        assert!(env.is_addressed_to(&alice()));
        match env.payload {
            SignalPayload::Ice(c) => {
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
                assert_eq!(c.sdp_mline_index, Some(0));
                assert!(c.username_fragment.is_none());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let raw = br#"{"from":"a","to":"b","type":"hangup","data":{}}"#;
        assert!(matches!(
            SignalingEnvelope::decode(raw),
            Err(ProtocolError::UnknownType(t)) if t == "hangup"
        ));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let no_to = br#"{"from":"a","type":"ice","data":{"candidate":"x"}}"#;
        assert!(matches!(
            SignalingEnvelope::decode(no_to),
            Err(ProtocolError::MissingField("to"))
        ));

        let no_data = br#"{"from":"a","to":"b","type":"offer"}"#;
        assert!(matches!(
            SignalingEnvelope::decode(no_data),
            Err(ProtocolError::MissingField("data"))
        ));

        let empty_from = br#"{"from":"","to":"b","type":"offer","data":{"type":"offer","sdp":"x"}}"#;
        assert!(matches!(
            SignalingEnvelope::decode(empty_from),
            Err(ProtocolError::MissingField("from"))
        ));
    }

    #[test]
    fn test_decode_rejects_payload_of_wrong_shape() {
        // a candidate sent under the "offer" type
        let raw = br#"{"from":"a","to":"b","type":"offer","data":{"candidate":"x"}}"#;
        assert!(matches!(
            SignalingEnvelope::decode(raw),
            Err(ProtocolError::InvalidPayload { kind: "offer", .. })
        ));

        // answer description inside an offer envelope
        let raw = br#"{"from":"a","to":"b","type":"offer","data":{"type":"answer","sdp":"x"}}"#;
        assert!(SignalingEnvelope::decode(raw).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage_and_oversize() {
        assert!(matches!(
            SignalingEnvelope::decode(b"not json"),
            Err(ProtocolError::Malformed(_))
        ));
        let big = vec![b' '; MAX_ENVELOPE_SIZE + 1];
        assert!(matches!(
            SignalingEnvelope::decode(&big),
            Err(ProtocolError::TooLarge(_))
        ));
    }

    #[test]
    fn test_answer_survives_transit() {
        let env = SignalingEnvelope::new(
            bob(),
            alice(),
            SignalPayload::Answer(SessionDescription::answer("v=0\r\no=- 1 1 IN IP4 0.0.0.0")),
        );
        let decoded = SignalingEnvelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
    }
}
