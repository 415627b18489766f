use chrono::{DateTime, Utc};

use crate::backchannel::directory::{display_name, Directory};
use crate::backchannel::notifications::{Notification, NotificationKind, NotificationLog};
use crate::backchannel::types::ContainerRef;

/// Number of body characters quoted in a tag notification.
pub(crate) const PREVIEW_CHARS: usize = 20;

/// Extracts mention handles from a message body.
///
/// A mention token is a maximal run starting with `@` followed by one or
/// more alphanumeric characters. Repeated handles are reported once, in
/// first-occurrence order; whether a token names a live member is decided
/// later against the directory.
pub(crate) fn scan_mentions(body: &str) -> Vec<&str> {
    let mut handles: Vec<&str> = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '@' {
            continue;
        }
        let start = match chars.peek() {
            Some(&(idx, next)) if next.is_ascii_alphanumeric() => idx,
            _ => continue,
        };
        let mut end = body.len();
        while let Some(&(idx, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() {
                chars.next();
            } else {
                end = idx;
                break;
            }
        }
        let handle = &body[start..end];
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }

    handles
}

/// Scans `body` for mentions and notifies every matched live member of
/// `container`, at most once each per evaluation. Tokens that resolve to
/// nobody are ignored silently. Returns the number of notifications sent.
pub(crate) async fn dispatch_tag_notifications(
    directory: &dyn Directory,
    log: &mut NotificationLog,
    container: ContainerRef,
    body: &str,
    created_at: DateTime<Utc>,
) -> usize {
    let mentions = scan_mentions(body);
    if mentions.is_empty() {
        return 0;
    }

    let name = display_name(directory, container).await;
    let preview: String = body.chars().take(PREVIEW_CHARS).collect();
    let mut notified = 0;

    for handle in mentions {
        let Some(recipient) = directory.resolve_handle(container, handle).await else {
            continue;
        };
        log.append(Notification {
            recipient_id: recipient,
            kind: NotificationKind::Tag,
            container,
            text: format!("tagged you in {}: {}", name, preview),
            created_at,
        });
        notified += 1;
    }

    if notified > 0 {
        tracing::debug!(
            target: "backchannel::tagging",
            "{} member(s) tagged in {}",
            notified,
            container
        );
    }
    notified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backchannel::test_support::TestDirectory;

    #[test]
    fn test_scan_mentions_dedups_repeats() {
        assert_eq!(scan_mentions("@alice hi @alice"), vec!["alice"]);
    }

    #[test]
    fn test_scan_mentions_stops_at_non_alphanumerics() {
        assert_eq!(scan_mentions("hey @bob! and @carol2, hi"), vec!["bob", "carol2"]);
        assert_eq!(scan_mentions("@a@b"), vec!["a", "b"]);
    }

    #[test]
    fn test_scan_mentions_ignores_bare_and_trailing_at() {
        assert!(scan_mentions("nothing here").is_empty());
        assert!(scan_mentions("@ alone and trailing @").is_empty());
        assert!(scan_mentions("@!?").is_empty());
    }

    #[test]
    fn test_scan_mentions_is_case_sensitive() {
        assert_eq!(scan_mentions("@Alice @alice"), vec!["Alice", "alice"]);
    }

    #[tokio::test]
    async fn test_dispatch_notifies_members_once_and_skips_strangers() {
        let directory = TestDirectory::new();
        directory.add_user(1, "alice");
        directory.add_user(2, "bob");
        directory.add_user(3, "eve");
        directory.add_channel(10, "general", 1, &[2]);

        let mut log = NotificationLog::default();
        let container = ContainerRef::Channel(10);
        let sent = dispatch_tag_notifications(
            &directory,
            &mut log,
            container,
            "@alice hi @alice, meet @bob and @eve",
            Utc::now(),
        )
        .await;

        // eve is not a member, alice is mentioned twice but notified once
        assert_eq!(sent, 2);
        let alice = log.recent(1, 20);
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].kind, NotificationKind::Tag);
        assert_eq!(alice[0].text, "tagged you in general: @alice hi @alice, me");
        assert_eq!(log.recent(2, 20).len(), 1);
        assert!(log.recent(3, 20).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_preview_is_twenty_characters() {
        let directory = TestDirectory::new();
        directory.add_user(1, "alice");
        directory.add_channel(10, "general", 1, &[]);

        let mut log = NotificationLog::default();
        let body = format!("@alice {}", "x".repeat(100));
        dispatch_tag_notifications(
            &directory,
            &mut log,
            ContainerRef::Channel(10),
            &body,
            Utc::now(),
        )
        .await;

        let text = &log.recent(1, 20)[0].text;
        let preview = text.strip_prefix("tagged you in general: ").unwrap();
        assert_eq!(preview.chars().count(), 20);
        assert_eq!(preview, &body.chars().take(20).collect::<String>());
    }
}
