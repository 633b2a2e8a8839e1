//! Rule evaluation against a normalized message

use crate::models::{ConditionType, NormalizedMessage, Rule};

/// Check whether `rule` applies to `message`
///
/// All comparisons are case-insensitive substring containment. Rules with an
/// unrecognised condition type never match.
pub fn matches(message: &NormalizedMessage, rule: &Rule) -> bool {
    let needle = rule.condition_value.to_lowercase();

    match rule.condition_type {
        ConditionType::Sender => message.sender_header.to_lowercase().contains(&needle),
        ConditionType::Subject => message.subject_header.to_lowercase().contains(&needle),
        ConditionType::Keyword => {
            message.subject_header.to_lowercase().contains(&needle)
                || message.text_snippet.to_lowercase().contains(&needle)
        }
        ConditionType::Unknown => false,
    }
}

/// First rule in stored order that matches, with its position
pub fn first_match<'a>(message: &NormalizedMessage, rules: &'a [Rule]) -> Option<(usize, &'a Rule)> {
    rules.iter().enumerate().find(|(_, rule)| matches(message, rule))
}
