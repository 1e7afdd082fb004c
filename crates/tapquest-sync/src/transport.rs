//! Transport abstraction for the message relay.
//!
//! The relay is a dumb, untrusted mailbox: it stores sealed messages by
//! recipient key and returns them in the order it numbered them.
//! Implementations may use HTTP or anything else; the in-memory relay below
//! backs the tests.

use async_trait::async_trait;
use tapquest_core::LogCursor;

use crate::error::Result;
use crate::messages::{EncryptedMessage, InboundMessage};

/// Relay client.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Store messages in their recipients' mailboxes.
    async fn post_messages(&self, token: &str, messages: Vec<EncryptedMessage>) -> Result<()>;

    /// Fetch the caller's mailbox, strictly after `after` or everything when
    /// `None`, in ascending `seq` order.
    async fn get_messages(&self, token: &str, after: Option<LogCursor>) -> Result<Vec<InboundMessage>>;
}

/// An in-process relay for tests and local wiring.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use tapquest_core::EncryptionPublicKey;
    use tapquest_store::TokenResolver;
    use tokio::sync::RwLock;

    use crate::error::SyncError;
    use crate::messages::limits;

    #[derive(Debug, Clone)]
    struct Stored {
        seq: u64,
        recipient: EncryptionPublicKey,
        body: Bytes,
    }

    #[derive(Default)]
    struct RelayInner {
        next_seq: u64,
        messages: Vec<Stored>,
    }

    /// In-memory relay. Tokens are resolved to mailboxes through the account
    /// store's [`TokenResolver`].
    pub struct MemoryRelay {
        resolver: Arc<dyn TokenResolver>,
        inner: RwLock<RelayInner>,
        offline: AtomicBool,
        reject_posts: AtomicBool,
    }

    impl MemoryRelay {
        pub fn new(resolver: Arc<dyn TokenResolver>) -> Self {
            Self {
                resolver,
                inner: RwLock::new(RelayInner::default()),
                offline: AtomicBool::new(false),
                reject_posts: AtomicBool::new(false),
            }
        }

        /// Every call fails with a transport error while set.
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Posts fail while set; fetches keep working.
        pub fn set_reject_posts(&self, reject: bool) {
            self.reject_posts.store(reject, Ordering::SeqCst);
        }

        /// Store a raw body without any validation.
        pub async fn inject_raw(&self, recipient: EncryptionPublicKey, body: impl Into<Bytes>) -> u64 {
            let mut inner = self.inner.write().await;
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.messages.push(Stored {
                seq,
                recipient,
                body: body.into(),
            });
            seq
        }

        /// Number of messages held for `recipient`.
        pub async fn mailbox_len(&self, recipient: &EncryptionPublicKey) -> usize {
            let inner = self.inner.read().await;
            inner.messages.iter().filter(|m| &m.recipient == recipient).count()
        }

        fn check_online(&self) -> Result<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("relay unreachable".into()));
            }
            Ok(())
        }

        async fn mailbox(&self, token: &str) -> Result<EncryptionPublicKey> {
            self.resolver
                .resolve(token)
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?
                .ok_or(SyncError::Unauthorized)
        }
    }

    #[async_trait]
    impl MessageTransport for MemoryRelay {
        async fn post_messages(&self, token: &str, messages: Vec<EncryptedMessage>) -> Result<()> {
            self.check_online()?;
            if self.reject_posts.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("post rejected".into()));
            }
            self.mailbox(token).await?;
            if messages.len() > limits::MAX_MESSAGES_PER_POST {
                return Err(SyncError::InvalidMessage("too many messages".into()));
            }

            let mut bodies = Vec::with_capacity(messages.len());
            for message in &messages {
                message
                    .validate_limits()
                    .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
                bodies.push((message.sealed.recipient_public_key, message.to_json()?));
            }

            // All or nothing: validated before anything is stored.
            let mut inner = self.inner.write().await;
            for (recipient, body) in bodies {
                inner.next_seq += 1;
                let seq = inner.next_seq;
                inner.messages.push(Stored { seq, recipient, body });
            }
            Ok(())
        }

        async fn get_messages(&self, token: &str, after: Option<LogCursor>) -> Result<Vec<InboundMessage>> {
            self.check_online()?;
            let mailbox = self.mailbox(token).await?;
            let floor = after.map(|c| c.0).unwrap_or(0);

            let inner = self.inner.read().await;
            Ok(inner
                .messages
                .iter()
                .filter(|m| m.recipient == mailbox && m.seq > floor)
                .map(|m| InboundMessage {
                    seq: m.seq,
                    body: m.body.clone(),
                })
                .collect())
        }
    }
}
