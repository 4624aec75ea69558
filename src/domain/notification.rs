//! Notification preferences and filter decisions.

use serde::{Deserialize, Serialize};

/// Kinds of notification a user can toggle individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Mention,
    Recommendation,
    System,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Follow => "follow",
            Self::Mention => "mention",
            Self::Recommendation => "recommendation",
            Self::System => "system",
        }
    }

    /// Map a producer-side kind string onto a toggleable kind.
    ///
    /// Unknown strings fall back to [`System`](Self::System), which users
    /// cannot disable piecemeal (the master switch still applies).
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "like" => Self::Like,
            "comment" => Self::Comment,
            "follow" => Self::Follow,
            "mention" => Self::Mention,
            "recommendation" => Self::Recommendation,
            _ => Self::System,
        }
    }
}

/// Per-user notification switches, owned by the profile system.
///
/// Fetched on demand and never cached for long; a stale copy would keep
/// suppressing notifications after the user re-enables them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub push_notifications_enabled: bool,
    pub likes_enabled: bool,
    pub comments_enabled: bool,
    pub follows_enabled: bool,
    pub mentions_enabled: bool,
    pub recommendations_enabled: bool,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            push_notifications_enabled: true,
            likes_enabled: true,
            comments_enabled: true,
            follows_enabled: true,
            mentions_enabled: true,
            recommendations_enabled: true,
        }
    }
}

impl NotificationPreference {
    /// Whether the user accepts notifications of the given kind.
    #[must_use]
    pub fn allows(&self, kind: NotificationKind) -> bool {
        if !self.push_notifications_enabled {
            return false;
        }
        match kind {
            NotificationKind::Like => self.likes_enabled,
            NotificationKind::Comment => self.comments_enabled,
            NotificationKind::Follow => self.follows_enabled,
            NotificationKind::Mention => self.mentions_enabled,
            NotificationKind::Recommendation => self.recommendations_enabled,
            // System notices only honor the master switch.
            NotificationKind::System => true,
        }
    }
}

/// Why the filter blocked a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// The recipient disabled this kind (or all notifications).
    UserPreference,
    /// The recipient already received too many of this class this window.
    FrequencyLimitExceeded,
    /// The sender is blacklisted or over the abuse threshold for this pair.
    SpamOrAbuse,
}

impl BlockReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserPreference => "user preference",
            Self::FrequencyLimitExceeded => "frequency limit exceeded",
            Self::SpamOrAbuse => "spam or abuse",
        }
    }
}

/// Outcome of running the notification filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Deliver normally.
    Admit,
    /// Deliver now, but flag the event as a candidate for future batching.
    AdmitWithBatchingSuggested,
    /// Do not deliver.
    Block(BlockReason),
}

impl FilterDecision {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Block(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_switch_overrides_kind_toggles() {
        let prefs = NotificationPreference {
            push_notifications_enabled: false,
            ..Default::default()
        };
        assert!(!prefs.allows(NotificationKind::Like));
        assert!(!prefs.allows(NotificationKind::System));
    }

    #[test]
    fn kind_toggle_blocks_only_that_kind() {
        let prefs = NotificationPreference {
            likes_enabled: false,
            ..Default::default()
        };
        assert!(!prefs.allows(NotificationKind::Like));
        assert!(prefs.allows(NotificationKind::Comment));
    }

    #[test]
    fn unknown_labels_map_to_system() {
        assert_eq!(
            NotificationKind::from_label("something_new"),
            NotificationKind::System
        );
        assert_eq!(NotificationKind::from_label("like"), NotificationKind::Like);
    }
}
