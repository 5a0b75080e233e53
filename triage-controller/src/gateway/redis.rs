//! Redis-backed bus gateway
//!
//! One dedicated pub/sub connection per subscription (Redis demands it),
//! one shared multiplexed connection for publishes. The `SUBSCRIBE`
//! round-trip completes before `subscribe` returns, which is what lets the
//! coordinator dispatch jobs without racing their earliest publication.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::Client;
use tracing::{debug, warn};

use crate::gateway::{BusError, BusGateway, BusMessage, Subscription};

pub struct RedisBus {
    client: Client,
    publisher: MultiplexedConnection,
}

impl RedisBus {
    /// Connects and pings the server; the controller refuses to start on an
    /// unreachable bus.
    pub async fn connect(address: &str) -> Result<Self, BusError> {
        let client = Client::open(format!("redis://{address}"))
            .map_err(|err| BusError::Unavailable(err.to_string()))?;
        let mut publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| BusError::Unavailable(err.to_string()))?;

        let pong: String = redis::cmd("PING").query_async(&mut publisher).await?;
        debug!("Bus ping replied '{}'", pong);

        Ok(Self { client, publisher })
    }
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Transport(err.to_string())
    }
}

#[async_trait]
impl BusGateway for RedisBus {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        Ok(Box::new(RedisSubscription {
            channel: channel.to_string(),
            pubsub: Some(pubsub),
        }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut connection = self.publisher.clone();
        let _: () = redis::AsyncCommands::publish(&mut connection, channel, payload).await?;
        Ok(())
    }
}

struct RedisSubscription {
    channel: String,
    pubsub: Option<PubSub>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Option<BusMessage> {
        let pubsub = self.pubsub.as_mut()?;
        let mut stream = pubsub.on_message();

        loop {
            let message = stream.next().await?;
            let channel = message.get_channel_name().to_string();
            match message.get_payload::<String>() {
                Ok(payload) => return Some(BusMessage { channel, payload }),
                // Non-UTF8 frames cannot be a recipe result; skip rather
                // than tearing down the whole collection window.
                Err(err) => {
                    warn!("Dropping undecodable bus frame on '{}': {}", channel, err)
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut pubsub) = self.pubsub.take() {
            if let Err(err) = pubsub.unsubscribe(&self.channel).await {
                warn!(
                    "Failed to unsubscribe from channel '{}': {}",
                    self.channel, err
                );
            }
        }
    }
}
