//! Collection clients: thin, validated wrappers over the document store,
//! one per logical collection.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::store::{Document, Subscription, SubscriptionHandle};

pub mod logs;
pub mod sos_alerts;
pub mod system_alerts;
pub mod users;

pub use logs::{AnalysisLogClient, NotificationLogClient};
pub use sos_alerts::SosAlertClient;
pub use system_alerts::SystemAlertClient;
pub use users::UserClient;

/// Typed live feed: each item is the full current matching set, newest
/// first. Ends after one snapshot when the underlying path is degraded.
pub struct Feed<T> {
    sub: Subscription,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> Feed<T> {
    pub(crate) fn new(sub: Subscription) -> Self {
        Self {
            sub,
            _marker: PhantomData,
        }
    }

    pub async fn next(&mut self) -> Option<Vec<T>> {
        self.sub.next().await.map(decode_batch)
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.sub.handle()
    }
}

/// Documents that fail to decode are skipped, not fatal: one malformed
/// record must not blind the whole feed.
pub(crate) fn decode_batch<T: DeserializeOwned>(docs: Vec<Document>) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(item) => Some(item),
            Err(err) => {
                warn!("skipping malformed document {}: {}", doc.id, err);
                None
            }
        })
        .collect()
}
