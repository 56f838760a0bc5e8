use thiserror::Error;
use time::Duration;

/// Strictly positive span, e.g. a token lifetime.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    /// `None` for zero, which callers read as "never expires".
    #[must_use]
    pub fn from_seconds(seconds: u32) -> Option<Self> {
        Self::new(Duration::seconds(seconds.into()))
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn whole_seconds(&self) -> i64 {
        self.0.whole_seconds()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}
