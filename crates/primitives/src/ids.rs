//! Identifiers of tasks, batches and executors.

use std::{fmt, str::FromStr};

use borsh::{
    io::{Read, Result as IoResult, Write},
    BorshDeserialize, BorshSerialize,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_uuid_id {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl BorshSerialize for $name {
            fn serialize<W: Write>(&self, writer: &mut W) -> IoResult<()> {
                writer.write_all(self.0.as_bytes())
            }
        }

        impl BorshDeserialize for $name {
            fn deserialize_reader<R: Read>(reader: &mut R) -> IoResult<Self> {
                let mut bytes = [0u8; 16];
                reader.read_exact(&mut bytes)?;
                Ok(Self::from_bytes(bytes))
            }
        }
    };
}

define_uuid_id!(
    /// Identifier of a proof task. Random (uuid v4).
    TaskId
);

define_uuid_id!(
    /// Identifier of a block batch.
    ///
    /// Time ordered (uuid v7), so batches created earlier compare lower both as values and as
    /// big-endian key bytes.
    BatchId
);

impl TaskId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl BatchId {
    pub fn new_time_ordered() -> Self {
        Self(Uuid::now_v7())
    }
}

/// Identifier of a remote proof executor.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ExecutorId(pub u32);

impl ExecutorId {
    /// Owner of a task nobody has claimed.
    pub const UNKNOWN: ExecutorId = ExecutorId(0);

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            f.write_str("unknown")
        } else {
            write!(f, "executor-{}", self.0)
        }
    }
}
