use std::collections::HashMap;

use crate::backchannel::types::{ContainerRef, MessageId};

/// Per-container ordered id lists backing pagination and search.
///
/// Threads hold live ids only: removal drops the id here while the tombstone
/// stays behind in the store.
#[derive(Debug, Default)]
pub(crate) struct ContainerIndex {
    threads: HashMap<ContainerRef, Vec<MessageId>>,
}

impl ContainerIndex {
    /// Appends a freshly created id to the container's thread.
    pub(crate) fn append(&mut self, container: ContainerRef, id: MessageId) {
        self.threads.entry(container).or_default().push(id);
    }

    /// Drops a removed id from the container's thread.
    pub(crate) fn remove(&mut self, container: ContainerRef, id: MessageId) {
        if let Some(thread) = self.threads.get_mut(&container) {
            thread.retain(|&m| m != id);
        }
    }

    /// Number of live messages in the container. Unknown containers are
    /// simply empty.
    pub(crate) fn live_len(&self, container: ContainerRef) -> usize {
        self.threads.get(&container).map_or(0, |t| t.len())
    }

    /// Live ids of the container, most-recent-first.
    pub(crate) fn iter_recent(
        &self,
        container: ContainerRef,
    ) -> impl Iterator<Item = MessageId> + '_ {
        self.threads
            .get(&container)
            .into_iter()
            .flat_map(|t| t.iter().rev().copied())
    }

    /// One pagination window of up to `page_size` ids starting at offset
    /// `start`, most-recent-first, plus the `end` sentinel (`-1` when the
    /// thread is exhausted).
    pub(crate) fn page(
        &self,
        container: ContainerRef,
        start: usize,
        page_size: usize,
    ) -> (Vec<MessageId>, i64) {
        let ids: Vec<MessageId> = self
            .iter_recent(container)
            .skip(start)
            .take(page_size)
            .collect();
        let end = if start + page_size < self.live_len(container) {
            (start + page_size) as i64
        } else {
            -1
        };
        (ids, end)
    }

    pub(crate) fn clear(&mut self) {
        self.threads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: ContainerRef = ContainerRef::Channel(1);

    fn index_with(n: u64) -> ContainerIndex {
        let mut index = ContainerIndex::default();
        for id in 1..=n {
            index.append(CHANNEL, id);
        }
        index
    }

    #[test]
    fn test_page_is_most_recent_first() {
        let index = index_with(3);
        let (ids, end) = index.page(CHANNEL, 0, 50);
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(end, -1);
    }

    #[test]
    fn test_page_windows_and_end_sentinel() {
        let index = index_with(120);

        let (first, end) = index.page(CHANNEL, 0, 50);
        assert_eq!(first.len(), 50);
        assert_eq!(first[0], 120);
        assert_eq!(end, 50);

        let (second, end) = index.page(CHANNEL, 50, 50);
        assert_eq!(second[0], 70);
        assert_eq!(end, 100);

        let (third, end) = index.page(CHANNEL, 100, 50);
        assert_eq!(third.len(), 20);
        assert_eq!(end, -1);
    }

    #[test]
    fn test_page_at_exact_total_is_empty_with_end_sentinel() {
        let index = index_with(50);
        let (ids, end) = index.page(CHANNEL, 50, 50);
        assert!(ids.is_empty());
        assert_eq!(end, -1);
    }

    #[test]
    fn test_unknown_container_is_empty() {
        let index = ContainerIndex::default();
        assert_eq!(index.live_len(CHANNEL), 0);
        let (ids, end) = index.page(CHANNEL, 0, 50);
        assert!(ids.is_empty());
        assert_eq!(end, -1);
    }

    #[test]
    fn test_remove_drops_id_from_thread() {
        let mut index = index_with(3);
        index.remove(CHANNEL, 2);
        let (ids, _) = index.page(CHANNEL, 0, 50);
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(index.live_len(CHANNEL), 2);
    }
}
