use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// Binds a PUB socket that sensor feeds (or tests) publish readings on.
///
/// Each [`Message`] goes out as its [`Message::to_frames`] pair.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    /// Bind the given endpoint; subscribers connect directly to it.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        transport.ensure_ipc_dir()?;
        let mut socket = PubSocket::new();
        socket.bind(&transport.endpoint()).await?;
        info!("PUB socket bound");
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        let [topic, envelope] = message.to_frames()?;
        let mut zmq_msg = ZmqMessage::from(topic);
        zmq_msg.push_back(envelope.into());

        self.socket.lock().await.send(zmq_msg).await?;
        debug!(topic = %message.topic, "published message");
        Ok(())
    }
}

/// Connects a SUB socket to the sensor bus and yields the messages whose
/// topics match a subscribed prefix.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        socket.connect(&transport.endpoint()).await?;
        info!("SUB socket connected");
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    /// An empty prefix subscribes to all topics.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    /// Anything other than a well-formed `[topic, envelope]` pair is a
    /// [`BusError::Framing`]; the socket stays usable.
    async fn recv(&self) -> Result<Message, BusError> {
        let zmq_msg = self.socket.lock().await.recv().await?;
        let frames: Vec<&[u8]> = zmq_msg.iter().map(|frame| frame.as_ref()).collect();

        let message = Message::from_frames(&frames)?;
        debug!(topic = %message.topic, "received message");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::PayloadObject;

    #[tokio::test]
    async fn envelope_without_topic_frame_is_a_framing_error() {
        let transport = Transport::tcp("127.0.0.1", 15801);
        let mut raw = PubSocket::new();
        raw.bind(&transport.endpoint()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let subscriber = ZmqSubscriber::connect(&transport).await.unwrap();
        subscriber.subscribe("").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let envelope = Message::new("hamiltonbackend/sensors/acme/x", Vec::new())
            .to_bytes()
            .unwrap();
        raw.send(ZmqMessage::from(envelope)).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .expect("timed out waiting for message");
        assert!(matches!(result, Err(BusError::Framing(_))));
    }

    #[tokio::test]
    async fn direct_pub_sub_roundtrip() {
        let transport = Transport::tcp("127.0.0.1", 15800);

        let publisher = ZmqPublisher::bind(&transport).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let subscriber = ZmqSubscriber::connect(&transport).await.unwrap();
        subscriber.subscribe("hamiltonbackend/").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let po = PayloadObject::new("2.0.11.2", vec![0x80]);
        let msg = Message::with_payload("hamiltonbackend/sensors/acme/x", po.clone());
        let correlation_id = msg.correlation_id;
        publisher.publish(msg).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .expect("timed out waiting for message")
            .unwrap();

        assert_eq!(received.topic, "hamiltonbackend/sensors/acme/x");
        assert_eq!(received.correlation_id, correlation_id);
        assert_eq!(received.payload_object("2.0.11.2"), Some(&po));
    }
}
