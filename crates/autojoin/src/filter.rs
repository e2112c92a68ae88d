//! Join filter policy.

use database::AutoJoinSettings;

/// Why an invite was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Disabled,
    DailyLimitReached,
    SenderNotWhitelisted,
    KeywordBlacklisted,
    AlreadyJoined,
    InvalidCode,
    RateLimit,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::Disabled => "auto_join_disabled",
            FilterReason::DailyLimitReached => "daily_limit_reached",
            FilterReason::SenderNotWhitelisted => "sender_not_whitelisted",
            FilterReason::KeywordBlacklisted => "keyword_blacklisted",
            FilterReason::AlreadyJoined => "already_joined",
            FilterReason::InvalidCode => "invalid_invite_code",
            FilterReason::RateLimit => "rate_limit",
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account join policy, built from stored settings.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub enabled: bool,
    pub daily_limit: i64,
    /// Sender identifiers; empty means allow all.
    pub whitelist_contacts: Vec<String>,
    /// Keywords matched case-insensitively against the group name.
    pub blacklist_keywords: Vec<String>,
}

impl From<&AutoJoinSettings> for Filter {
    fn from(settings: &AutoJoinSettings) -> Self {
        Self {
            enabled: settings.enabled,
            daily_limit: settings.daily_limit,
            whitelist_contacts: settings.whitelist_contacts.clone(),
            blacklist_keywords: settings.blacklist_keywords.clone(),
        }
    }
}

impl Filter {
    /// Decide whether a join may proceed.
    pub fn should_join(
        &self,
        sender: &str,
        group_name: &str,
        joins_today: i64,
    ) -> Result<(), FilterReason> {
        if !self.enabled {
            return Err(FilterReason::Disabled);
        }
        if joins_today >= self.daily_limit {
            return Err(FilterReason::DailyLimitReached);
        }
        if !self.whitelist_contacts.is_empty() && !self.is_whitelisted(sender) {
            return Err(FilterReason::SenderNotWhitelisted);
        }
        if !group_name.is_empty() && self.is_blacklisted(group_name) {
            return Err(FilterReason::KeywordBlacklisted);
        }
        Ok(())
    }

    fn is_whitelisted(&self, sender: &str) -> bool {
        self.whitelist_contacts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(sender))
    }

    fn is_blacklisted(&self, group_name: &str) -> bool {
        let name = group_name.to_lowercase();
        self.blacklist_keywords
            .iter()
            .any(|keyword| name.contains(&keyword.to_lowercase()))
    }
}
