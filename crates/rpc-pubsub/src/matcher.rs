//! 4-segment STOMP-style topic routing: `receiver|component|operation|unique`.
//!
//! `*|*|*|*` is rejected at registration — it would receive every event
//! ever published and almost certainly indicates a caller forgot to
//! narrow their filter. Everything else is indexed into up to three
//! coarse buckets (by specific receiver/component/operation) plus an
//! exclusive `by_unique` bucket when the unique segment is specific.

use crate::error::PubSubError;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Specific(String),
    Wildcard,
}

impl Segment {
    fn parse(raw: &str) -> Result<Segment, &'static str> {
        if raw.is_empty() {
            Err("segment must not be empty")
        } else if raw == "*" {
            Ok(Segment::Wildcard)
        } else {
            Ok(Segment::Specific(raw.to_owned()))
        }
    }

    pub fn is_specific(&self) -> bool {
        matches!(self, Segment::Specific(_))
    }

    pub fn specific(&self) -> Option<&str> {
        match self {
            Segment::Specific(s) => Some(s.as_str()),
            Segment::Wildcard => None,
        }
    }

    fn matches(&self, event: &Segment) -> bool {
        match self {
            Segment::Wildcard => true,
            Segment::Specific(want) => event.specific() == Some(want.as_str()),
        }
    }
}

/// A parsed, validated subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    pub receiver: Segment,
    pub component: Segment,
    pub operation: Segment,
    pub unique: Segment,
    raw: String,
}

impl SubscriptionId {
    pub fn parse(raw: &str) -> Result<SubscriptionId, PubSubError> {
        let parts: Vec<&str> = raw.split('|').collect();
        if parts.len() != 4 {
            return Err(PubSubError::InvalidSubscription(
                raw.to_owned(),
                "must have exactly 4 `|`-separated segments",
            ));
        }
        let seg = |s: &str| Segment::parse(s).map_err(|e| PubSubError::InvalidSubscription(raw.to_owned(), e));
        let receiver = seg(parts[0])?;
        let component = seg(parts[1])?;
        let operation = seg(parts[2])?;
        let unique = seg(parts[3])?;
        if !receiver.is_specific() && !component.is_specific() && !operation.is_specific() && !unique.is_specific() {
            return Err(PubSubError::InvalidSubscription(
                raw.to_owned(),
                "`*|*|*|*` matches every event and is rejected",
            ));
        }
        Ok(SubscriptionId {
            receiver,
            component,
            operation,
            unique,
            raw: raw.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// A topic parsed from an inbound event's method. Unlike a
/// `SubscriptionId` this is never rejected for being all-wildcard: the
/// response worker synthesizes exactly such an event (`"<host>|*|*|*"`)
/// for host-scoped broadcast errors.
struct EventTopic {
    receiver: Segment,
    component: Segment,
    operation: Segment,
    unique: Segment,
}

impl EventTopic {
    fn parse(raw: &str) -> Option<EventTopic> {
        let parts: Vec<&str> = raw.split('|').collect();
        if parts.len() != 4 {
            return None;
        }
        Some(EventTopic {
            receiver: Segment::parse(parts[0]).ok()?,
            component: Segment::parse(parts[1]).ok()?,
            operation: Segment::parse(parts[2]).ok()?,
            unique: Segment::parse(parts[3]).ok()?,
        })
    }

    fn has_specific_beyond_receiver(&self) -> bool {
        self.component.is_specific() || self.operation.is_specific() || self.unique.is_specific()
    }
}

/// Routes inbound events to the subscription holders whose filter
/// matches, without re-scanning every registered subscription per
/// event.
#[derive(Default)]
pub struct SubscriptionMatcher<H> {
    by_unique: HashMap<String, H>,
    by_operation: HashMap<String, Vec<(SubscriptionId, H)>>,
    by_component: HashMap<String, Vec<(SubscriptionId, H)>>,
    by_receiver: HashMap<String, Vec<(SubscriptionId, H)>>,
}

impl<H: Clone> SubscriptionMatcher<H> {
    pub fn new() -> Self {
        SubscriptionMatcher {
            by_unique: HashMap::new(),
            by_operation: HashMap::new(),
            by_component: HashMap::new(),
            by_receiver: HashMap::new(),
        }
    }

    pub fn add(&mut self, id: SubscriptionId, holder: H) -> Result<(), PubSubError> {
        if let Some(unique) = id.unique.specific() {
            if self.by_unique.contains_key(unique) {
                return Err(PubSubError::DuplicateSubscription(id.as_str().to_owned()));
            }
            self.by_unique.insert(unique.to_owned(), holder);
            return Ok(());
        }
        if let Some(op) = id.operation.specific() {
            self.by_operation.entry(op.to_owned()).or_default().push((id.clone(), holder.clone()));
        }
        if let Some(component) = id.component.specific() {
            self.by_component
                .entry(component.to_owned())
                .or_default()
                .push((id.clone(), holder.clone()));
        }
        if let Some(receiver) = id.receiver.specific() {
            self.by_receiver.entry(receiver.to_owned()).or_default().push((id, holder));
        }
        Ok(())
    }

    /// Reverses `add`: drops every index entry for `id`. A no-op if
    /// `id` was never registered.
    pub fn remove(&mut self, id: &SubscriptionId) {
        if let Some(unique) = id.unique.specific() {
            self.by_unique.remove(unique);
            return;
        }
        if let Some(op) = id.operation.specific() {
            if let Some(bucket) = self.by_operation.get_mut(op) {
                bucket.retain(|(existing, _)| existing != id);
            }
        }
        if let Some(component) = id.component.specific() {
            if let Some(bucket) = self.by_component.get_mut(component) {
                bucket.retain(|(existing, _)| existing != id);
            }
        }
        if let Some(receiver) = id.receiver.specific() {
            if let Some(bucket) = self.by_receiver.get_mut(receiver) {
                bucket.retain(|(existing, _)| existing != id);
            }
        }
    }

    /// Returns every holder whose filter matches `event_method`,
    /// without duplicates even when a holder is indexed in more than
    /// one bucket.
    pub fn matching(&self, event_method: &str) -> Vec<H> {
        let Some(event) = EventTopic::parse(event_method) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();

        if let Some(unique) = event.unique.specific() {
            if let Some(holder) = self.by_unique.get(unique) {
                out.push(holder.clone());
                seen.insert("unique".to_owned());
            }
        }

        let subset_matches = |id: &SubscriptionId| {
            id.receiver.matches(&event.receiver)
                && id.component.matches(&event.component)
                && id.operation.matches(&event.operation)
        };

        if let Some(op) = event.operation.specific() {
            if let Some(bucket) = self.by_operation.get(op) {
                for (id, holder) in bucket {
                    if subset_matches(id) && seen.insert(id.as_str().to_owned()) {
                        out.push(holder.clone());
                    }
                }
            }
        }
        if let Some(component) = event.component.specific() {
            if let Some(bucket) = self.by_component.get(component) {
                for (id, holder) in bucket {
                    if subset_matches(id) && seen.insert(id.as_str().to_owned()) {
                        out.push(holder.clone());
                    }
                }
            }
        }
        if event.has_specific_beyond_receiver() {
            if let Some(receiver) = event.receiver.specific() {
                if let Some(bucket) = self.by_receiver.get(receiver) {
                    for (id, holder) in bucket {
                        if subset_matches(id) && seen.insert(id.as_str().to_owned()) {
                            out.push(holder.clone());
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_all_wildcard_subscription() {
        assert!(SubscriptionId::parse("*|*|*|*").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(SubscriptionId::parse("host1||Image.create|x").is_err());
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(SubscriptionId::parse("host1|storage|Image.create").is_err());
    }

    #[test]
    fn unique_subscription_matches_only_exact_unique() {
        let mut matcher: SubscriptionMatcher<&'static str> = SubscriptionMatcher::new();
        let id = SubscriptionId::parse("host1|storage|Image.create|x").unwrap();
        matcher.add(id, "holder-a").unwrap();

        assert_eq!(matcher.matching("host1|storage|Image.create|x"), vec!["holder-a"]);
        assert!(matcher.matching("host1|storage|Image.create|y").is_empty());
    }

    #[test]
    fn event_fan_out_scenario_from_spec_examples() {
        let mut matcher: SubscriptionMatcher<&'static str> = SubscriptionMatcher::new();
        matcher
            .add(SubscriptionId::parse("*|storage|*|*").unwrap(), "subscriber-storage")
            .unwrap();
        matcher
            .add(SubscriptionId::parse("host1|*|*|*").unwrap(), "subscriber-host1")
            .unwrap();

        let mut hits = matcher.matching("host1|storage|Image.create|x");
        hits.sort();
        assert_eq!(hits, vec!["subscriber-host1", "subscriber-storage"]);

        assert!(matcher.matching("host2|virt|VM.start|y").is_empty());
    }

    #[test]
    fn receiver_only_subscription_ignores_pure_broadcast_with_no_other_specific_segment() {
        let mut matcher: SubscriptionMatcher<&'static str> = SubscriptionMatcher::new();
        matcher
            .add(SubscriptionId::parse("host1|*|*|*").unwrap(), "subscriber-host1")
            .unwrap();

        assert!(matcher.matching("host1|*|*|*").is_empty());
    }

    #[test]
    fn add_then_remove_returns_matcher_to_prior_state() {
        let mut matcher: SubscriptionMatcher<&'static str> = SubscriptionMatcher::new();
        let id = SubscriptionId::parse("*|storage|*|*").unwrap();
        matcher.add(id.clone(), "holder-a").unwrap();
        assert_eq!(matcher.matching("host1|storage|Image.create|x"), vec!["holder-a"]);

        matcher.remove(&id);
        assert!(matcher.matching("host1|storage|Image.create|x").is_empty());
    }

    #[test]
    fn duplicate_unique_subscription_is_rejected() {
        let mut matcher: SubscriptionMatcher<&'static str> = SubscriptionMatcher::new();
        let id = SubscriptionId::parse("host1|storage|Image.create|x").unwrap();
        matcher.add(id.clone(), "holder-a").unwrap();
        assert!(matcher.add(id, "holder-b").is_err());
    }
}
