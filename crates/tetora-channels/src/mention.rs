/// Result of classifying an inbound message per spec §4.6 step 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Arrived as a direct message — always addressed to the agent.
    Dm,
    /// Arrived in a shared channel with an explicit bot mention.
    Mentioned,
    /// Arrived in a shared channel the adapter is configured to listen to
    /// unconditionally, with no mention required.
    Allowed,
    /// None of the above — drop without dispatching.
    Ignored,
}

pub fn classify_message(is_dm: bool, mentions_bot: bool, channel_allowed: bool) -> MessageClass {
    if is_dm {
        MessageClass::Dm
    } else if mentions_bot {
        MessageClass::Mentioned
    } else if channel_allowed {
        MessageClass::Allowed
    } else {
        MessageClass::Ignored
    }
}

/// Strip a leading bot-mention token from `content` (spec §4.6 step 3).
/// Returns `None` if nothing is left after stripping and trimming — an
/// empty result is ignored rather than dispatched as a blank prompt.
pub fn strip_mention(content: &str, token: Option<&str>) -> Option<String> {
    let stripped = match token {
        Some(t) => content.strip_prefix(t).unwrap_or(content),
        None => content,
    };
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_always_classifies_as_dm_even_if_also_mentioned() {
        assert_eq!(classify_message(true, true, false), MessageClass::Dm);
    }

    #[test]
    fn mention_wins_over_a_non_allowed_channel() {
        assert_eq!(classify_message(false, true, false), MessageClass::Mentioned);
    }

    #[test]
    fn allowed_channel_without_mention_still_addresses_the_agent() {
        assert_eq!(classify_message(false, false, true), MessageClass::Allowed);
    }

    #[test]
    fn unmentioned_message_in_a_disallowed_channel_is_ignored() {
        assert_eq!(classify_message(false, false, false), MessageClass::Ignored);
    }

    #[test]
    fn mention_token_is_stripped_and_trimmed() {
        assert_eq!(strip_mention("<@bot> hello there", Some("<@bot>")), Some("hello there".to_string()));
    }

    #[test]
    fn mention_only_with_no_remaining_text_is_none() {
        assert_eq!(strip_mention("<@bot>   ", Some("<@bot>")), None);
    }

    #[test]
    fn no_token_configured_passes_content_through_trimmed() {
        assert_eq!(strip_mention("  hi  ", None), Some("hi".to_string()));
    }
}
