//! Trace matching against the awaited transaction.
//!
//! The matcher scans every message accumulated so far and keeps the ones whose
//! trace id equals the target exactly. It holds no state between evaluations.

use serde::{Deserialize, Serialize};

use crate::trace::{MatchingAction, StreamMessage, TransactionId, TransactionTrace};

/// Characters kept from each end of an abbreviated transaction id.
pub const ID_AFFIX_CHARS: usize = 8;

/// Result of matching accumulated messages against a target id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "matches", rename_all = "snake_case")]
pub enum MatchState {
    /// No message for the target has been seen (or there is no target yet).
    #[default]
    Waiting,
    /// Matches, most recently received first. Duplicates are kept.
    Found(Vec<MatchedTrace>),
}

impl MatchState {
    /// True once at least one trace for the target was seen.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Matched traces, newest first. Empty while waiting.
    #[must_use]
    pub fn matches(&self) -> &[MatchedTrace] {
        match self {
            Self::Waiting => &[],
            Self::Found(matches) => matches,
        }
    }
}

/// A trace that matched the awaited transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedTrace {
    trace: TransactionTrace,
}

impl MatchedTrace {
    /// The matched trace as received.
    #[must_use]
    pub const fn trace(&self) -> &TransactionTrace {
        &self.trace
    }

    /// The action shown for this trace. Later actions are not surfaced.
    #[must_use]
    pub fn first_action(&self) -> Option<&MatchingAction> {
        self.trace.matching_actions.first()
    }

    /// Trace id shortened with `abbreviate_id`.
    #[must_use]
    pub fn abbreviated_id(&self) -> String {
        abbreviate_id(self.trace.id.as_str())
    }

    /// `account:name - <json> (abcdefgh...ijklmnop)`
    #[must_use]
    pub fn display_line(&self) -> String {
        match self.first_action() {
            Some(action) => format!("{action} ({})", self.abbreviated_id()),
            None => format!("<no matching action> ({})", self.abbreviated_id()),
        }
    }
}

/// Match `messages` (in arrival order) against `target`.
#[must_use]
pub fn evaluate(messages: &[StreamMessage], target: Option<&TransactionId>) -> MatchState {
    let Some(target) = target else {
        return MatchState::Waiting;
    };

    let matched: Vec<MatchedTrace> = messages
        .iter()
        .rev()
        .filter(|m| m.trace_id() == target)
        .map(|m| MatchedTrace {
            trace: m.trace().clone(),
        })
        .collect();

    if matched.is_empty() {
        MatchState::Waiting
    } else {
        MatchState::Found(matched)
    }
}

/// First and last eight characters joined by `...`.
///
/// Ids shorter than sixteen characters are not special-cased: the two halves
/// overlap, so `abc` becomes `abc...abc`.
#[must_use]
pub fn abbreviate_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let prefix: String = chars.iter().take(ID_AFFIX_CHARS).collect();
    let suffix: String = chars[chars.len().saturating_sub(ID_AFFIX_CHARS)..]
        .iter()
        .collect();
    format!("{prefix}...{suffix}")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn message(id: &str, action: &str) -> StreamMessage {
        StreamMessage::new(TransactionTrace::new(
            id,
            vec![MatchingAction {
                account: "hooks".to_string(),
                name: action.to_string(),
                json: json!({ "data": action }),
            }],
        ))
    }

    #[test]
    fn no_target_is_waiting() {
        let messages = vec![message("t", "a")];
        assert_eq!(evaluate(&messages, None), MatchState::Waiting);
    }

    #[test]
    fn unrelated_traces_are_waiting() {
        let messages = vec![message("x", "a"), message("y", "b")];
        let target = TransactionId::new("t");
        assert_eq!(evaluate(&messages, Some(&target)), MatchState::Waiting);
    }

    #[test]
    fn duplicates_kept_newest_first() {
        let messages = vec![
            message("x", "first-x"),
            message("t", "first-t"),
            message("x", "second-x"),
            message("t", "second-t"),
        ];
        let target = TransactionId::new("t");

        let state = evaluate(&messages, Some(&target));
        let matches = state.matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].first_action().unwrap().name, "second-t");
        assert_eq!(matches[1].first_action().unwrap().name, "first-t");
    }

    #[test]
    fn matching_is_exact_not_prefix() {
        let messages = vec![message("abc123", "a"), message("abc", "b")];
        let target = TransactionId::new("abc1");
        assert_eq!(evaluate(&messages, Some(&target)), MatchState::Waiting);
    }

    #[test]
    fn only_first_action_is_surfaced() {
        let trace = TransactionTrace::new(
            "abcdefgh12345678ijklmnop",
            vec![
                MatchingAction {
                    account: "hooks".to_string(),
                    name: "event".to_string(),
                    json: json!({"data": "key=foo"}),
                },
                MatchingAction {
                    account: "other".to_string(),
                    name: "ignored".to_string(),
                    json: json!(null),
                },
            ],
        );
        let target = trace.id.clone();
        let state = evaluate(&[StreamMessage::new(trace)], Some(&target));
        assert_eq!(
            state.matches()[0].display_line(),
            r#"hooks:event - {"data":"key=foo"} (abcdefgh...ijklmnop)"#
        );
    }

    #[test]
    fn trace_without_actions_still_renders() {
        let trace = TransactionTrace::new("abcdefgh12345678ijklmnop", Vec::new());
        let target = trace.id.clone();
        let state = evaluate(&[StreamMessage::new(trace)], Some(&target));
        assert_eq!(
            state.matches()[0].display_line(),
            "<no matching action> (abcdefgh...ijklmnop)"
        );
    }

    #[test]
    fn abbreviates_long_ids() {
        assert_eq!(abbreviate_id("abcdefgh12345678ijklmnop"), "abcdefgh...ijklmnop");
        assert_eq!(abbreviate_id("abcdefgh12345678"), "abcdefgh...12345678");
    }

    // Current behaviour for short ids: the halves overlap or repeat.
    #[test]
    fn short_ids_overlap() {
        assert_eq!(abbreviate_id("abc"), "abc...abc");
        assert_eq!(abbreviate_id("abcdefghij"), "abcdefgh...cdefghij");
        assert_eq!(abbreviate_id(""), "...");
    }

    #[test]
    fn multibyte_ids_do_not_panic() {
        assert_eq!(abbreviate_id("ééééééééééééééééé"), "éééééééé...éééééééé");
    }

    fn ids() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-f0-9]{4,12}", 0..32)
    }

    proptest! {
        #[test]
        fn waiting_when_no_trace_matches(ids in ids(), target in "[g-z]{4,12}") {
            let messages: Vec<StreamMessage> = ids.iter().map(|id| message(id, "a")).collect();
            let target = TransactionId::new(target);
            prop_assert_eq!(evaluate(&messages, Some(&target)), MatchState::Waiting);
        }

        #[test]
        fn found_count_equals_occurrences(ids in ids(), pick in any::<prop::sample::Index>()) {
            prop_assume!(!ids.is_empty());
            let target = TransactionId::new(pick.get(&ids).clone());
            let messages: Vec<StreamMessage> = ids.iter().map(|id| message(id, "a")).collect();
            let expected = ids.iter().filter(|id| id.as_str() == target.as_str()).count();

            let state = evaluate(&messages, Some(&target));
            prop_assert_eq!(state.matches().len(), expected);
            prop_assert!(state.matches().iter().all(|m| m.trace().id == target));
        }

        #[test]
        fn long_ids_abbreviate_to_affixes(id in "[a-z0-9]{16,64}") {
            let abbreviated = abbreviate_id(&id);
            prop_assert_eq!(abbreviated.len(), 19);
            prop_assert!(abbreviated.starts_with(&id[..8]));
            prop_assert!(abbreviated.ends_with(&id[id.len() - 8..]));
        }

        #[test]
        fn short_ids_repeat_whole_id(id in "[a-z0-9]{0,8}") {
            prop_assert_eq!(abbreviate_id(&id), format!("{id}...{id}"));
        }
    }
}
