//! Schema-versioned value encoding: `[version: u8] ‖ borsh(body)`.
//!
//! Bodies only ever grow by appending fields, so bytes left over after decoding the current
//! body are ignored. Values written by an older version go through [`VersionedValue::upgrade`].

use borsh::{BorshDeserialize, BorshSerialize};
use typed_sled::CodecError;

/// A stored value carrying its schema version.
pub(crate) trait VersionedValue: BorshSerialize + BorshDeserialize {
    /// Version written by this build.
    const VERSION: u8;

    /// Decodes a body written by an older `version`.
    fn upgrade(schema: &'static str, version: u8, _body: &[u8]) -> Result<Self, CodecError> {
        Err(CodecError::UnsupportedVersion {
            schema,
            version,
            latest: Self::VERSION,
        })
    }
}

pub(crate) fn encode_versioned<T: VersionedValue>(
    schema: &'static str,
    value: &T,
) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![T::VERSION];
    value
        .serialize(&mut out)
        .map_err(|err| CodecError::SerializationFailed {
            schema,
            source: err.into(),
        })?;
    Ok(out)
}

pub(crate) fn decode_versioned<T: VersionedValue>(
    schema: &'static str,
    data: &[u8],
) -> Result<T, CodecError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(CodecError::Other(format!("empty value in '{schema}'")));
    };

    if version > T::VERSION {
        return Err(CodecError::UnsupportedVersion {
            schema,
            version,
            latest: T::VERSION,
        });
    }
    if version < T::VERSION {
        return T::upgrade(schema, version, body);
    }

    // `deserialize` leaves unread bytes alone, unlike `borsh::from_slice`.
    T::deserialize(&mut &body[..]).map_err(|err| CodecError::DeserializationFailed {
        schema,
        source: err.into(),
    })
}
