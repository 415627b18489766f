use crate::backchannel::error::{BackchannelError, Result};
use crate::backchannel::types::{ContainerRef, MessageView, UserId};
use crate::backchannel::Backchannel;

impl Backchannel {
    /// Finds every live message visible to the actor whose body contains
    /// `query` as a case-sensitive substring.
    ///
    /// Results are grouped per container, channels (join order) before DMs
    /// (creation order), most-recent-first within each. An empty or
    /// over-long query is a `Validation` error.
    pub async fn search(&self, actor_id: UserId, query: &str) -> Result<Vec<MessageView>> {
        if query.is_empty() {
            return Err(BackchannelError::validation("search query is empty"));
        }
        if query.chars().count() > self.config.max_body_chars {
            return Err(BackchannelError::validation(format!(
                "search query exceeds {} characters",
                self.config.max_body_chars
            )));
        }

        // Container enumeration goes through the directory before the state
        // lock is taken; the scan itself then sees one consistent snapshot.
        let containers: Vec<ContainerRef> = self
            .directory
            .channels_of(actor_id)
            .await
            .into_iter()
            .map(ContainerRef::Channel)
            .chain(
                self.directory
                    .dms_of(actor_id)
                    .await
                    .into_iter()
                    .map(ContainerRef::Dm),
            )
            .collect();

        let state = self.state.read().await;
        let mut hits = Vec::new();
        for container in containers {
            for id in state.threads.iter_recent(container) {
                let message = state.store.get_live(id)?;
                if message.body.contains(query) {
                    hits.push(message.view_for(actor_id));
                }
            }
        }

        tracing::debug!(
            target: "backchannel::search",
            "search by user {} matched {} message(s)",
            actor_id,
            hits.len()
        );
        Ok(hits)
    }
}
