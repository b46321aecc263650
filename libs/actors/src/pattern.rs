//! Receive patterns

use std::time::Duration;
use strand_types::{MatchType, Recver};

/// What a `recv` accepts and how long it waits.
///
/// An empty `match_list` accepts the oldest envelope of any type. Types are tried
/// left to right; the first type with a pending envelope wins even if an envelope
/// of a later type arrived earlier. When nothing matches and `recver` is set, a
/// cached exit from that actor or service satisfies the receive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub match_list: Vec<MatchType>,
    /// `None` waits forever; `Some(ZERO)` never suspends.
    pub timeout: Option<Duration>,
    pub recver: Option<Recver>,
}

impl Pattern {
    /// Any type, no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<MatchType>,
    {
        Self {
            match_list: types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn add(mut self, ty: impl Into<MatchType>) -> Self {
        self.match_list.push(ty.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn recver(mut self, recver: impl Into<Recver>) -> Self {
        self.recver = Some(recver.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::{atom, Aid, EXIT};

    #[test]
    fn test_builder() {
        let peer = Aid::nil();
        let pat = Pattern::of([atom("a"), atom("b")])
            .add(EXIT)
            .timeout(Duration::from_millis(5))
            .recver(peer);
        assert_eq!(pat.match_list, vec![atom("a"), atom("b"), EXIT]);
        assert_eq!(pat.timeout, Some(Duration::from_millis(5)));
        assert_eq!(pat.recver, Some(Recver::Aid(peer)));
        assert!(Pattern::new().match_list.is_empty());
    }
}
