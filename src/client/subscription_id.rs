use std::fmt;

use uuid::Uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// The client generated identifier for a subscription.
///
/// A new one is generated for every subscription attempt, and it's sent to
/// the server in the `start` & `stop` frames.
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(super) fn generate() -> Self {
        SubscriptionId(Uuid::new_v4())
    }

    pub(super) fn matches(self, id: &str) -> bool {
        Uuid::parse_str(id).is_ok_and(|id| id == self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
