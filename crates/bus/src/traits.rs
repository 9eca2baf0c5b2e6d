use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::Message;

/// Publishes messages to every subscriber whose prefix matches the topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), BusError>;
}

/// Blanket implementation so `Arc<dyn EventPublisher>` can be used directly.
#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        (**self).publish(message).await
    }
}

/// Receives messages whose topics match the subscribed prefixes.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to messages with topics matching the given prefix.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError>;

    /// Receive the next message. Blocks until a message is available.
    async fn recv(&self) -> Result<Message, BusError>;
}

#[async_trait]
impl<T: EventSubscriber + ?Sized> EventSubscriber for Arc<T> {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        (**self).subscribe(topic_prefix).await
    }

    async fn recv(&self) -> Result<Message, BusError> {
        (**self).recv().await
    }
}
