//! Pending bookings held between checkout creation and payment confirmation
//!
//! Entries live server-side with an expiry, keyed by checkout session id, so
//! a visitor who pays on another device (or whose payment is confirmed by
//! webhook) still finds their booking data.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    error::{AppError, AppResult},
    models::booking::PendingBooking,
};

#[async_trait]
pub trait PendingBookingStore: Send + Sync {
    async fn put(&self, booking: &PendingBooking, ttl: Duration) -> AppResult<()>;

    async fn get(&self, session_id: &str) -> AppResult<Option<PendingBooking>>;

    async fn remove(&self, session_id: &str) -> AppResult<()>;
}

fn key(session_id: &str) -> String {
    format!("pending_booking:{}", session_id)
}

/// Redis-backed pending bookings
#[derive(Clone)]
pub struct RedisPendingBookings {
    client: Client,
}

impl RedisPendingBookings {
    /// Connect and verify the server answers
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PendingBookingStore for RedisPendingBookings {
    async fn put(&self, booking: &PendingBooking, ttl: Duration) -> AppResult<()> {
        let payload = serde_json::to_string(booking)
            .map_err(|e| AppError::Internal(format!("Failed to encode pending booking: {}", e)))?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key(&booking.session_id), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> AppResult<Option<PendingBooking>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stored: Option<String> = conn.get(key(session_id)).await?;
        stored
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| {
                    AppError::Internal(format!("Malformed pending booking {}: {}", session_id, e))
                })
            })
            .transpose()
    }

    async fn remove(&self, session_id: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key(session_id)).await?;
        Ok(())
    }
}

/// In-process pending bookings
#[derive(Default)]
pub struct MemoryPendingBookings {
    entries: Mutex<HashMap<String, (PendingBooking, Instant)>>,
}

impl MemoryPendingBookings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingBookingStore for MemoryPendingBookings {
    async fn put(&self, booking: &PendingBooking, ttl: Duration) -> AppResult<()> {
        self.entries.lock().await.insert(
            booking.session_id.clone(),
            (booking.clone(), Instant::now() + ttl),
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> AppResult<Option<PendingBooking>> {
        let mut entries = self.entries.lock().await;
        match entries.get(session_id) {
            Some((booking, expires)) if *expires > Instant::now() => Ok(Some(booking.clone())),
            Some(_) => {
                entries.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, session_id: &str) -> AppResult<()> {
        self.entries.lock().await.remove(session_id);
        Ok(())
    }
}
