//! Sinks for newly created suggestions
use crate::models::Suggestion;

pub trait SuggestionNotifier: Send + Sync {
    fn suggestion_created(&self, suggestion: &Suggestion);
}

/// Reports new suggestions through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl SuggestionNotifier for LogNotifier {
    fn suggestion_created(&self, suggestion: &Suggestion) {
        tracing::info!(
            suggestion_id = %suggestion.id,
            domain = %suggestion.based_on_domain,
            "New label suggested: '{}' (approve with `gmail-labeler approve {}`)",
            suggestion.suggested_name,
            suggestion.id
        );
    }
}
