//! Options shared by every transport.
//!
//! Two protocol behaviours differ between historical revisions of the
//! service, so both are kept selectable instead of hard-coded.

use std::time::Duration;

use clap::ValueEnum;

/// Bounded wait used at every suspension point (accept and read).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a connection worker does when the peer closes its write half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EofPolicy {
    /// Treat the close as a connection fault and drop any unterminated input.
    #[default]
    Close,
    /// Execute the unterminated remainder as a final command, then end the
    /// session as if `STOP_SESSION` had been sent.
    Drain,
}

/// How `GET` arguments are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IdentifierPolicy {
    /// Both identifiers must be decimal digits; anything else is invalid input.
    #[default]
    Numeric,
    /// Any two tokens are looked up as-is.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub eof: EofPolicy,
    pub identifiers: IdentifierPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            eof: EofPolicy::default(),
            identifiers: IdentifierPolicy::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_eof(mut self, eof: EofPolicy) -> Self {
        self.eof = eof;
        self
    }

    pub fn with_identifiers(mut self, identifiers: IdentifierPolicy) -> Self {
        self.identifiers = identifiers;
        self
    }
}
