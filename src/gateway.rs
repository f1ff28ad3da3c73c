use crate::group::GroupId;
use game_group_protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per group before a slow subscriber starts lagging.
const GROUP_CHANNEL_CAPACITY: usize = 64;

/// Fan-out seam used by the session coordinator.
pub trait Broadcaster: Send + Sync {
    /// Best-effort delivery to every current subscriber of `group_id`.
    fn emit(&self, group_id: GroupId, event: ServerEvent);
}

/// One broadcast channel per group; connections subscribe to the groups they follow.
#[derive(Clone, Default)]
pub struct ChannelGateway {
    channels: Arc<RwLock<HashMap<GroupId, broadcast::Sender<Arc<ServerEvent>>>>>,
}

impl ChannelGateway {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn subscribe(&self, group_id: GroupId) -> broadcast::Receiver<Arc<ServerEvent>> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(group_id)
            .or_insert_with(|| broadcast::channel(GROUP_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, group_id: GroupId) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(&group_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drops the channel of a group nobody follows any more.
    pub fn release(&self, group_id: GroupId) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if channels
            .get(&group_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&group_id);
        }
    }
}

impl Broadcaster for ChannelGateway {
    fn emit(&self, group_id: GroupId, event: ServerEvent) {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = channels.get(&group_id) else {
            debug!(%group_id, event = event.name(), "no subscribers for group");
            return;
        };
        let name = event.name();
        match sender.send(Arc::new(event)) {
            Ok(receivers) => debug!(%group_id, event = name, receivers, "event emitted"),
            Err(_) => debug!(%group_id, event = name, "all subscribers gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn emits_only_to_the_target_group() {
        let gateway = ChannelGateway::new();
        let (alpha, beta) = (Uuid::new_v4(), Uuid::new_v4());
        let mut alpha_rx = gateway.subscribe(alpha);
        let mut beta_rx = gateway.subscribe(beta);

        gateway.emit(alpha, ServerEvent::StartGame { group_id: alpha });

        let event = alpha_rx.recv().await.unwrap();
        assert_eq!(*event, ServerEvent::StartGame { group_id: alpha });
        assert!(beta_rx.try_recv().is_err());
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let gateway = ChannelGateway::new();
        let group_id = Uuid::new_v4();
        gateway.emit(group_id, ServerEvent::StartGame { group_id });
        assert_eq!(gateway.subscriber_count(group_id), 0);
    }

    #[test]
    fn release_keeps_followed_channels() {
        let gateway = ChannelGateway::new();
        let group_id = Uuid::new_v4();
        let rx = gateway.subscribe(group_id);

        gateway.release(group_id);
        assert_eq!(gateway.subscriber_count(group_id), 1);

        drop(rx);
        gateway.release(group_id);
        assert_eq!(gateway.subscriber_count(group_id), 0);
    }
}
