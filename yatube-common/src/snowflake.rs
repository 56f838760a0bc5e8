//! Time-ordered 64-bit ids.
//!
//! Layout, most significant bit first: 42 bits of milliseconds since the
//! epoch, 5 bits of worker id, 5 bits of process id, 12 bits of a rolling
//! increment. Ids generated later compare greater, which listings rely on as
//! a tie breaker for equal creation times.

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::{Duration, OffsetDateTime, macros::datetime};

pub const EPOCH: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;
pub const WORKER_ID_OFFSET: u32 = 17;
pub const WORKER_ID_LENGTH: u32 = 5;
pub const PROCESS_ID_OFFSET: u32 = 12;
pub const PROCESS_ID_LENGTH: u32 = 5;
pub const INCREMENT_LENGTH: u32 = 12;

const fn mask(length: u32) -> u64 {
    (1 << length) - 1
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Snowflake part was out of range: {0}")]
pub struct SnowflakePartOutOfRangeError(u64);

/// Which machine generated an id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct WorkerId(u8);

/// Which process on a worker generated an id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct ProcessId(u8);

macro_rules! five_bit_part {
    ($name:ident, $length:ident) => {
        impl $name {
            #[must_use]
            pub fn new(id: u8) -> Option<Self> {
                (u64::from(id) <= mask($length)).then_some(Self(id))
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError(value.into()))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = u8::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

five_bit_part!(WorkerId, WORKER_ID_LENGTH);
five_bit_part!(ProcessId, PROCESS_ID_LENGTH);

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Snowflake(u64);

impl Snowflake {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner)
    }

    /// Builds a snowflake from its parts. `increment` wraps at 12 bits.
    pub fn from_parts(
        time: OffsetDateTime,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: u16,
    ) -> Result<Self, SnowflakeTimestampError> {
        let millis = millis_since_epoch(time)?;

        Ok(Self(
            millis << TIMESTAMP_OFFSET
                | u64::from(worker_id.get()) << WORKER_ID_OFFSET
                | u64::from(process_id.get()) << PROCESS_ID_OFFSET
                | u64::from(increment) & mask(INCREMENT_LENGTH),
        ))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn created_at(self) -> OffsetDateTime {
        let millis = (self.0 >> TIMESTAMP_OFFSET) & mask(TIMESTAMP_LENGTH);
        // 42 bits always fit into an i64.
        EPOCH + Duration::milliseconds(millis.cast_signed())
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> WorkerId {
        WorkerId(((self.0 >> WORKER_ID_OFFSET) & mask(WORKER_ID_LENGTH)) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> ProcessId {
        ProcessId(((self.0 >> PROCESS_ID_OFFSET) & mask(PROCESS_ID_LENGTH)) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn increment(self) -> u16 {
        (self.0 & mask(INCREMENT_LENGTH)) as u16
    }
}

fn millis_since_epoch(time: OffsetDateTime) -> Result<u64, SnowflakeTimestampError> {
    let millis = (time - EPOCH).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeTimestampError::TimeBeforeEpoch);
    }

    u64::try_from(millis)
        .ok()
        .filter(|millis| *millis <= mask(TIMESTAMP_LENGTH))
        .ok_or(SnowflakeTimestampError::TimestampTooLarge)
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(value: Snowflake) -> Self {
        value.get()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator {
    worker_id: WorkerId,
    process_id: ProcessId,
    next_increment: u16,
}

impl SnowflakeGenerator {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            next_increment: 0,
        }
    }

    pub fn generate_at(
        &mut self,
        time: OffsetDateTime,
    ) -> Result<Snowflake, SnowflakeTimestampError> {
        let increment = self.next_increment;
        self.next_increment = (increment + 1) & 0x0FFF;

        Snowflake::from_parts(time, self.worker_id, self.process_id, increment)
    }
}
