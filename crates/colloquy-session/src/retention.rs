// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention engine: bounds a transcript by turn count, then by characters.
//!
//! A turn is one user message plus the reply that follows it; an unanswered
//! trailing user message counts as one. Trimming only ever drops a
//! contiguous prefix of the non-system messages, at message granularity.
//! A leading system message is exempt from both budgets.

use colloquy_config::model::RetentionConfig;
use colloquy_core::{Message, Role};

/// Turn and character budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_turns: usize,
    pub max_chars: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_chars: 24_000,
        }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            max_chars: config.max_chars,
        }
    }
}

/// Where to cut a transcript.
///
/// Everything before `keep_from` (an absolute index into the input) is
/// dropped, except the leading system message when `keep_system` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPlan {
    pub keep_from: usize,
    pub keep_system: bool,
}

impl RetentionPlan {
    /// Whether applying the plan changes nothing: the cut sits at the start
    /// of the body, right after the system message if there is one.
    pub fn is_noop(&self) -> bool {
        self.keep_from <= usize::from(self.keep_system)
    }

    /// Number of messages retained from an input of `len` messages.
    pub fn retained_len(&self, len: usize) -> usize {
        let tail = len.saturating_sub(self.keep_from);
        if self.keep_system && self.keep_from > 0 {
            tail + 1
        } else {
            tail
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_turns: usize, max_chars: usize) -> Self {
        Self {
            max_turns,
            max_chars,
        }
    }

    /// Compute the trim boundary for `transcript` without materializing it.
    pub fn plan(&self, transcript: &[Message]) -> RetentionPlan {
        let keep_system = transcript.first().is_some_and(|m| m.role == Role::System);
        let body_start = usize::from(keep_system);
        let body = &transcript[body_start..];

        let turn_start = self.turn_boundary(body);
        let char_start = self.char_boundary(body, turn_start);

        RetentionPlan {
            keep_from: body_start + char_start,
            keep_system,
        }
    }

    /// Materialize the retained transcript.
    pub fn apply(&self, transcript: &[Message]) -> Vec<Message> {
        let plan = self.plan(transcript);
        let mut retained = Vec::with_capacity(plan.retained_len(transcript.len()));
        if plan.keep_system && plan.keep_from > 0 {
            retained.push(transcript[0].clone());
        }
        retained.extend_from_slice(&transcript[plan.keep_from..]);
        retained
    }

    /// Index in `body` of the N-th most recent user message, when more than
    /// N user messages exist. Zero otherwise.
    ///
    /// With exactly N user messages nothing is cut, so tool or assistant
    /// messages ahead of the first user message are kept as well.
    fn turn_boundary(&self, body: &[Message]) -> usize {
        if self.max_turns == 0 {
            return body.len();
        }
        let mut seen = 0;
        let mut candidate = None;
        for (index, message) in body.iter().enumerate().rev() {
            if message.role != Role::User {
                continue;
            }
            seen += 1;
            if seen == self.max_turns {
                candidate = Some(index);
            } else if seen > self.max_turns {
                return candidate.unwrap_or(0);
            }
        }
        0
    }

    /// Start of the longest suffix of `body[from..]` within the character budget.
    fn char_boundary(&self, body: &[Message], from: usize) -> usize {
        let mut total = 0usize;
        for index in (from..body.len()).rev() {
            total += body[index].char_len();
            if total > self.max_chars {
                return index + 1;
            }
        }
        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(content: &str) -> Message {
        Message::user(content)
    }

    fn reply(to: &Message, content: &str) -> Message {
        Message::assistant_reply(to.id.clone().unwrap_or_default(), content)
    }

    fn conversation(pairs: usize) -> Vec<Message> {
        let mut transcript = vec![Message::system("sys")];
        for i in 0..pairs {
            let question = user(&format!("q{i}"));
            let answer = reply(&question, &format!("a{i}"));
            transcript.push(question);
            transcript.push(answer);
        }
        transcript
    }

    fn contents(transcript: &[Message]) -> Vec<&str> {
        transcript.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn empty_transcript_is_unchanged() {
        let policy = RetentionPolicy::default();
        assert!(policy.apply(&[]).is_empty());
        assert!(policy.plan(&[]).is_noop());
    }

    #[test]
    fn eleven_pairs_with_ten_turn_budget_drops_first_pair() {
        let policy = RetentionPolicy::new(10, 24_000);
        let transcript = conversation(11);

        let plan = policy.plan(&transcript);
        assert_eq!(plan.keep_from, 3);
        assert!(plan.keep_system);

        let retained = policy.apply(&transcript);
        assert_eq!(retained.len(), 21);
        assert_eq!(retained[0].role, Role::System);
        assert_eq!(retained[1].content, "q1");
        assert_eq!(retained.last().unwrap().content, "a10");
    }

    #[test]
    fn exactly_budgeted_turns_are_kept() {
        let policy = RetentionPolicy::new(10, 24_000);
        let transcript = conversation(10);
        assert!(policy.plan(&transcript).is_noop());
        assert_eq!(policy.apply(&transcript), transcript);
    }

    #[test]
    fn system_plus_one_question_is_a_noop() {
        let policy = RetentionPolicy::default();
        let transcript = vec![Message::system("s"), user("hi")];
        let plan = policy.plan(&transcript);
        assert_eq!(plan.keep_from, 1);
        assert!(plan.keep_system);
        assert!(plan.is_noop());
    }

    #[test]
    fn trim_past_body_start_is_not_a_noop() {
        let policy = RetentionPolicy::new(1, 24_000);
        let transcript = vec![Message::system("s"), user("old"), user("new")];
        let plan = policy.plan(&transcript);
        assert_eq!(plan.keep_from, 2);
        assert!(!plan.is_noop());

        let without_system = vec![user("old"), user("new")];
        assert!(!policy.plan(&without_system).is_noop());
    }

    #[test]
    fn leading_non_user_messages_survive_when_turns_fit() {
        let policy = RetentionPolicy::new(2, 24_000);
        let transcript = vec![
            Message::system("s"),
            Message {
                id: None,
                parent_id: None,
                role: Role::Tool,
                content: "lookup".into(),
            },
            user("q0"),
            user("q1"),
        ];
        assert!(policy.plan(&transcript).is_noop());
        assert_eq!(
            contents(&policy.apply(&transcript)),
            vec!["s", "lookup", "q0", "q1"]
        );

        // One more question crosses the budget and the cut lands on q1.
        let mut longer = transcript.clone();
        longer.push(user("q2"));
        assert_eq!(contents(&policy.apply(&longer)), vec!["s", "q1", "q2"]);
    }

    #[test]
    fn trailing_unanswered_user_counts_as_a_turn() {
        let policy = RetentionPolicy::new(2, 24_000);
        let mut transcript = conversation(2);
        transcript.push(user("pending"));

        let retained = policy.apply(&transcript);
        assert_eq!(contents(&retained), vec!["sys", "q1", "a1", "pending"]);
    }

    #[test]
    fn char_budget_trims_at_message_granularity() {
        let policy = RetentionPolicy::new(10, 10);
        let transcript = vec![
            Message::system("a very long system prompt that is exempt"),
            user("aaaa"),
            user("bbbb"),
            user("cccc"),
        ];

        let retained = policy.apply(&transcript);
        assert_eq!(
            contents(&retained),
            vec!["a very long system prompt that is exempt", "bbbb", "cccc"]
        );
    }

    #[test]
    fn char_budget_counts_characters_not_bytes() {
        let policy = RetentionPolicy::new(10, 4);
        let transcript = vec![user("old"), user("ééüü")];
        assert_eq!(contents(&policy.apply(&transcript)), vec!["ééüü"]);
    }

    #[test]
    fn oversized_last_message_leaves_only_system() {
        let policy = RetentionPolicy::new(10, 3);
        let transcript = vec![Message::system("sys"), user("far too long")];

        let plan = policy.plan(&transcript);
        assert_eq!(plan.keep_from, 2);
        assert_eq!(contents(&policy.apply(&transcript)), vec!["sys"]);
    }

    #[test]
    fn char_trim_never_restores_turn_trimmed_messages() {
        let policy = RetentionPolicy::new(1, 24_000);
        let transcript = conversation(3);
        let retained = policy.apply(&transcript);
        assert_eq!(contents(&retained), vec!["sys", "q2", "a2"]);
    }

    #[test]
    fn transcript_without_system_has_nothing_to_keep() {
        let policy = RetentionPolicy::new(1, 24_000);
        let transcript = vec![user("q0"), user("q1")];
        let plan = policy.plan(&transcript);
        assert!(!plan.keep_system);
        assert_eq!(plan.keep_from, 1);
        assert_eq!(plan.retained_len(transcript.len()), 1);
    }

    fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::Tool)]
    }

    fn arb_transcript() -> impl Strategy<Value = Vec<Message>> {
        (
            any::<bool>(),
            prop::collection::vec((arb_role(), "[a-zé]{0,40}"), 0..40),
        )
            .prop_map(|(with_system, body)| {
                let mut transcript = Vec::new();
                if with_system {
                    transcript.push(Message::system("system prompt"));
                }
                for (role, content) in body {
                    transcript.push(Message {
                        id: None,
                        parent_id: None,
                        role,
                        content,
                    });
                }
                transcript
            })
    }

    proptest! {
        #[test]
        fn retained_is_system_plus_suffix(
            transcript in arb_transcript(),
            max_turns in 1usize..8,
            max_chars in 0usize..300,
        ) {
            let policy = RetentionPolicy::new(max_turns, max_chars);
            let retained = policy.apply(&transcript);
            let had_system = transcript.first().is_some_and(|m| m.role == Role::System);

            let body = if had_system && !retained.is_empty() {
                prop_assert_eq!(&retained[0], &transcript[0]);
                &retained[1..]
            } else {
                &retained[..]
            };
            prop_assert!(transcript.ends_with(body));
            prop_assert!(body.iter().all(|m| m.role != Role::System));
            let plan = policy.plan(&transcript);
            prop_assert_eq!(retained.len(), plan.retained_len(transcript.len()));
            prop_assert_eq!(plan.is_noop(), retained == transcript);
        }

        #[test]
        fn retained_respects_both_budgets(
            transcript in arb_transcript(),
            max_turns in 1usize..8,
            max_chars in 0usize..300,
        ) {
            let policy = RetentionPolicy::new(max_turns, max_chars);
            let retained = policy.apply(&transcript);
            let body: Vec<&Message> = retained.iter().filter(|m| m.role != Role::System).collect();

            let users = body.iter().filter(|m| m.role == Role::User).count();
            prop_assert!(users <= max_turns);
            let chars: usize = body.iter().map(|m| m.char_len()).sum();
            prop_assert!(chars <= max_chars);
        }

        #[test]
        fn system_message_is_never_evicted(
            transcript in arb_transcript(),
            max_turns in 1usize..8,
            max_chars in 0usize..300,
        ) {
            let policy = RetentionPolicy::new(max_turns, max_chars);
            let retained = policy.apply(&transcript);
            if transcript.first().is_some_and(|m| m.role == Role::System) {
                prop_assert_eq!(retained.first().map(|m| m.role), Some(Role::System));
            }
        }

        #[test]
        fn char_trim_keeps_the_longest_fitting_suffix(
            transcript in arb_transcript(),
            max_chars in 0usize..300,
        ) {
            // With no effective turn budget only the char trim applies.
            let policy = RetentionPolicy::new(usize::MAX, max_chars);
            let plan = policy.plan(&transcript);
            let body_start = usize::from(plan.keep_system);
            if plan.keep_from > body_start {
                let one_more: usize = transcript[plan.keep_from - 1..]
                    .iter()
                    .map(Message::char_len)
                    .sum();
                prop_assert!(one_more > max_chars);
            }
        }
    }
}
