use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;

/// A typed blob attached to a bus message.
///
/// `po_type` identifies the encoding of `content` (the sensor feeds publish
/// their field maps as MessagePack under a dotted type number such as
/// `2.0.11.2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadObject {
    pub po_type: String,

    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
}

impl PayloadObject {
    /// Wrap already-encoded bytes.
    pub fn new(po_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            po_type: po_type.into(),
            content,
        }
    }

    /// Encode `value` as MessagePack. Structs are written as maps so they
    /// decode into a plain key/value mapping on the receiving side.
    pub fn msgpack<T: Serialize>(
        po_type: impl Into<String>,
        value: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self::new(po_type, rmp_serde::to_vec_named(value)?))
    }

    /// Decode the MessagePack content into the expected type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.content)
    }
}

/// Wire-format message envelope.
///
/// On the bus a message is two frames: the topic as UTF-8, which SUB
/// sockets match against their prefixes, then the MessagePack envelope.
/// The envelope repeats the topic and the two must agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,

    #[serde(default)]
    pub payload_objects: Vec<PayloadObject>,

    /// When the publisher created this message (not the sample time).
    pub published_at: DateTime<Utc>,

    pub correlation_id: Uuid,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload_objects: Vec<PayloadObject>) -> Self {
        Self {
            topic: topic.into(),
            payload_objects,
            published_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Convenience for the common single-object message.
    pub fn with_payload(topic: impl Into<String>, payload: PayloadObject) -> Self {
        Self::new(topic, vec![payload])
    }

    /// First payload object of the given type, if any.
    pub fn payload_object(&self, po_type: &str) -> Option<&PayloadObject> {
        self.payload_objects.iter().find(|po| po.po_type == po_type)
    }

    /// Serialize this entire message envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize a message envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }

    /// The `[topic, envelope]` frames this message is sent as.
    pub fn to_frames(&self) -> Result<[Vec<u8>; 2], BusError> {
        Ok([self.topic.as_bytes().to_vec(), self.to_bytes()?])
    }

    /// Rebuild a message from `[topic, envelope]` frames.
    pub fn from_frames(frames: &[&[u8]]) -> Result<Self, BusError> {
        let [topic, envelope] = frames else {
            return Err(BusError::Framing(format!(
                "expected topic and envelope frames, got {}",
                frames.len()
            )));
        };
        let topic = std::str::from_utf8(topic)
            .map_err(|_| BusError::Framing("topic frame is not UTF-8".into()))?;

        let message = Self::from_bytes(envelope)?;
        if message.topic != topic {
            return Err(BusError::Framing(format!(
                "topic frame {topic:?} does not match envelope topic {:?}",
                message.topic
            )));
        }
        Ok(message)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Serialize)]
    struct Reading {
        time: f64,
        temp: f64,
        open: bool,
    }

    #[test]
    fn envelope_keeps_topic_and_payload_objects() {
        let po = PayloadObject::new("64.0.1.1", b"raw".to_vec());
        let msg = Message::with_payload("hamiltonbackend/sensors/acme/s.hamilton/1/i", po.clone());

        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.topic, msg.topic);
        assert_eq!(decoded.correlation_id, msg.correlation_id);
        assert_eq!(decoded.payload_objects, vec![po]);
    }

    #[test]
    fn payload_object_lookup_by_type() {
        let msg = Message::new(
            "t",
            vec![
                PayloadObject::new("64.0.1.1", b"text".to_vec()),
                PayloadObject::new("2.0.11.2", vec![0x80]),
                PayloadObject::new("2.0.11.2", vec![0x81]),
            ],
        );

        let po = msg.payload_object("2.0.11.2").unwrap();
        assert_eq!(po.content, vec![0x80], "first matching object wins");
        assert!(msg.payload_object("1.2.3.4").is_none());
    }

    #[test]
    fn msgpack_structs_decode_as_maps() {
        let po = PayloadObject::msgpack(
            "2.0.11.2",
            &Reading {
                time: 1000.0,
                temp: 21.5,
                open: true,
            },
        )
        .unwrap();

        let map: BTreeMap<String, serde_json::Value> = po.decode().unwrap();
        assert_eq!(map["time"], serde_json::json!(1000.0));
        assert_eq!(map["temp"], serde_json::json!(21.5));
        assert_eq!(map["open"], serde_json::json!(true));
    }

    #[test]
    fn frames_are_topic_then_envelope() {
        let po = PayloadObject::new("2.0.11.2", vec![0x80]);
        let msg = Message::with_payload("hamiltonbackend/sensors/acme/x", po);
        let [topic, envelope] = msg.to_frames().unwrap();
        assert_eq!(topic, b"hamiltonbackend/sensors/acme/x");

        let back = Message::from_frames(&[topic.as_slice(), envelope.as_slice()]).unwrap();
        assert_eq!(back.correlation_id, msg.correlation_id);
        assert_eq!(back.payload_objects, msg.payload_objects);
    }

    #[test]
    fn mismatched_topic_frame_is_rejected() {
        let msg = Message::new("hamiltonbackend/sensors/acme/x", Vec::new());
        let [_, envelope] = msg.to_frames().unwrap();

        let frames: [&[u8]; 2] = [b"hamiltonbackend/sensors/globex/x", &envelope];
        let err = Message::from_frames(&frames).unwrap_err();
        assert!(matches!(err, BusError::Framing(ref m) if m.contains("globex")));
    }

    #[test]
    fn wrong_frame_count_is_rejected() {
        let msg = Message::new("t", Vec::new());
        let [topic, envelope] = msg.to_frames().unwrap();
        let (topic, envelope) = (topic.as_slice(), envelope.as_slice());

        let counts: [&[&[u8]]; 3] = [&[], &[envelope], &[topic, envelope, topic]];
        for frames in counts {
            assert!(matches!(Message::from_frames(frames), Err(BusError::Framing(_))));
        }
        let not_utf8: [&[u8]; 2] = [&[0xff], envelope];
        assert!(matches!(Message::from_frames(&not_utf8), Err(BusError::Framing(_))));
    }

    #[test]
    fn garbage_envelope_is_a_decode_error() {
        let frames: [&[u8]; 2] = [b"t", &[0xc1]];
        assert!(matches!(
            Message::from_frames(&frames),
            Err(BusError::Deserialization(_))
        ));
    }

    #[test]
    fn garbage_content_fails_to_decode() {
        let po = PayloadObject::new("2.0.11.2", vec![0xc1]);
        assert!(po.decode::<BTreeMap<String, serde_json::Value>>().is_err());
    }
}
