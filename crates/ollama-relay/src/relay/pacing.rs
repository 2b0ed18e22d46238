use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Split a fragment into maximal runs of whitespace and non-whitespace
///
/// Joining the tokens back together always yields the original fragment.
pub fn tokenize(fragment: &str) -> Tokens<'_> {
    Tokens { rest: fragment }
}

/// Iterator returned by [`tokenize`]
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let whitespace = first.is_whitespace();

        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != whitespace)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());

        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(token)
    }
}

/// Enforces a minimum interval between paced writes
///
/// The first tick also waits one full interval. A zero delay disables pacing.
#[derive(Debug)]
pub struct Pacer {
    interval: Option<Interval>,
}

impl Pacer {
    /// Must be called from within a tokio runtime
    pub fn new(delay: Duration) -> Self {
        let interval = (!delay.is_zero()).then(|| {
            let mut interval = tokio::time::interval_at(Instant::now() + delay, delay);
            // A slow consumer must not cause a burst of catch-up writes
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval }
    }

    pub async fn tick(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_words_and_spaces() {
        let tokens: Vec<&str> = tokenize("hello world").collect();
        assert_eq!(tokens, vec!["hello", " ", "world"]);
    }

    #[test]
    fn test_tokenize_keeps_whitespace_runs() {
        let tokens: Vec<&str> = tokenize("  a\n\n b\t").collect();
        assert_eq!(tokens, vec!["  ", "a", "\n\n ", "b", "\t"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert_eq!(tokenize("").count(), 0);
    }

    #[test]
    fn test_tokenize_unicode() {
        let tokens: Vec<&str> = tokenize("héllo\u{00A0}wörld 日本").collect();
        assert_eq!(tokens, vec!["héllo", "\u{00A0}", "wörld", " ", "日本"]);
    }

    #[test]
    fn test_tokenize_join_is_identity() {
        let samples = [
            "hello world",
            " leading",
            "trailing ",
            "multi\nline\r\ntext",
            "   ",
            "single",
            "mixed  \t tabs and ✓ marks",
        ];
        for sample in samples {
            let joined: String = tokenize(sample).collect();
            assert_eq!(joined, sample);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_waits_between_ticks() {
        let delay = Duration::from_millis(10);
        let mut pacer = Pacer::new(delay);

        let start = Instant::now();
        pacer.tick().await;
        pacer.tick().await;
        pacer.tick().await;

        assert!(start.elapsed() >= delay * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_pacer_does_not_wait() {
        let mut pacer = Pacer::new(Duration::ZERO);
        let start = Instant::now();
        pacer.tick().await;
        pacer.tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
