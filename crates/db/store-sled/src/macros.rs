/// Declares a table schema.
///
/// Keys go through the lexicographic codec so range scans follow key order. The keyword in
/// front of the value type picks the value codec:
///
/// - `versioned`: `[version] ‖ borsh(value)`, see [`crate::versioned`]
/// - `borsh`: plain borsh
/// - `int`: fixed-width big-endian integer
#[macro_export]
macro_rules! define_table {
    (@schema $(#[$docs:meta])+ ($table_name:ident) $key:ty => $value:ty) => {
        $(#[$docs])+
        ///
        #[doc = concat!("Maps [`", stringify!($key), "`] to [`", stringify!($value), "`]")]
        #[derive(Clone, Copy, Debug, Default)]
        pub(crate) struct $table_name;

        impl ::typed_sled::Schema for $table_name {
            const TREE_NAME: ::typed_sled::schema::TreeName =
                ::typed_sled::schema::TreeName($table_name::tree_name());
            type Key = $key;
            type Value = $value;
        }

        impl $table_name {
            const fn tree_name() -> &'static str {
                ::core::stringify!($table_name)
            }
        }

        impl ::std::fmt::Display for $table_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($table_name::tree_name())
            }
        }

        impl ::typed_sled::codec::KeyCodec<$table_name> for $key {
            fn encode_key(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::typed_sled::codec::CodecError> {
                Ok($crate::lexicographic::encode_key(self))
            }

            fn decode_key(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::typed_sled::codec::CodecError> {
                $crate::lexicographic::decode_key(data).map_err(|err| {
                    ::typed_sled::codec::CodecError::DeserializationFailed {
                        schema: $table_name::tree_name(),
                        source: err.into(),
                    }
                })
            }
        }
    };

    ($(#[$docs:meta])+ ($table_name:ident) $key:ty => versioned $value:ty) => {
        $crate::define_table!(@schema $(#[$docs])+ ($table_name) $key => $value);

        impl ::typed_sled::codec::ValueCodec<$table_name> for $value {
            fn encode_value(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::typed_sled::codec::CodecError> {
                $crate::versioned::encode_versioned($table_name::tree_name(), self)
            }

            fn decode_value(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::typed_sled::codec::CodecError> {
                $crate::versioned::decode_versioned($table_name::tree_name(), data)
            }
        }
    };

    ($(#[$docs:meta])+ ($table_name:ident) $key:ty => borsh $value:ty) => {
        $crate::define_table!(@schema $(#[$docs])+ ($table_name) $key => $value);

        impl ::typed_sled::codec::ValueCodec<$table_name> for $value {
            fn encode_value(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::typed_sled::codec::CodecError> {
                ::borsh::to_vec(self).map_err(|err| {
                    ::typed_sled::codec::CodecError::SerializationFailed {
                        schema: $table_name::tree_name(),
                        source: err.into(),
                    }
                })
            }

            fn decode_value(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::typed_sled::codec::CodecError> {
                ::borsh::from_slice(data).map_err(|err| {
                    ::typed_sled::codec::CodecError::DeserializationFailed {
                        schema: $table_name::tree_name(),
                        source: err.into(),
                    }
                })
            }
        }
    };

    ($(#[$docs:meta])+ ($table_name:ident) $key:ty => int $value:ty) => {
        $crate::define_table!(@schema $(#[$docs])+ ($table_name) $key => $value);

        impl ::typed_sled::codec::ValueCodec<$table_name> for $value {
            fn encode_value(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::typed_sled::codec::CodecError> {
                Ok(self.to_be_bytes().to_vec())
            }

            fn decode_value(
                data: &[u8],
            ) -> ::std::result::Result<Self, ::typed_sled::codec::CodecError> {
                let bytes = data.try_into().map_err(|_| {
                    ::typed_sled::codec::CodecError::Other(format!(
                        "'{}' holds {} bytes, expected {}",
                        $table_name::tree_name(),
                        data.len(),
                        ::std::mem::size_of::<$value>(),
                    ))
                })?;
                Ok(<$value>::from_be_bytes(bytes))
            }
        }
    };
}

/// Runs a shared test suite against a database opened on a temporary sled instance.
#[macro_export]
macro_rules! sled_db_test_setup {
    ($db_type:ty, $test_macro:ident) => {
        fn setup_db() -> $db_type {
            let db = sled::Config::new().temporary(true).open().unwrap();
            let sled_db = typed_sled::SledDb::new(db.into()).unwrap();
            <$db_type>::new(sled_db.into(), $crate::SledDbConfig::test()).unwrap()
        }

        $test_macro!(setup_db());
    };
}

/// Declares a sled database struct holding one typed tree per field.
///
/// Fields listed after `extra` are not trees; they are initialized with the given expression.
#[macro_export]
macro_rules! define_sled_database {
    (
        $(#[$meta:meta])*
        pub struct $db_name:ident {
            $($vis:vis $field:ident: $schema:ty),* $(,)?
        }
        $(extra {
            $($extra_vis:vis $extra_field:ident: $extra_ty:ty = $extra_init:expr),* $(,)?
        })?
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $db_name {
            $(
                $vis $field: typed_sled::SledTree<$schema>,
            )*
            $($(
                $extra_vis $extra_field: $extra_ty,
            )*)?
            config: $crate::SledDbConfig,
        }

        impl $db_name {
            pub fn new(
                db: std::sync::Arc<typed_sled::SledDb>,
                config: $crate::SledDbConfig,
            ) -> committee_db_types::DbResult<Self> {
                Ok(Self {
                    $(
                        $field: db.get_tree()?,
                    )*
                    $($(
                        $extra_field: $extra_init,
                    )*)?
                    config,
                })
            }
        }
    };
}
