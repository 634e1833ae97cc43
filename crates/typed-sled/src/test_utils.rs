use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{CodecError, CodecResult, KeyCodec, Schema, SledTree, TreeName, ValueCodec};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub(crate) struct TestValue {
    pub(crate) id: u32,
    pub(crate) name: String,
}

impl TestValue {
    pub(crate) fn new_with_name(id: u32) -> Self {
        Self {
            id,
            name: format!("Item {id}"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TestSchema;

impl Schema for TestSchema {
    const TREE_NAME: TreeName = TreeName("test");
    type Key = u32;
    type Value = TestValue;
}

impl KeyCodec<TestSchema> for u32 {
    fn encode_key(&self) -> CodecResult<Vec<u8>> {
        Ok(self.to_be_bytes().to_vec())
    }

    fn decode_key(buf: &[u8]) -> CodecResult<Self> {
        let bytes: [u8; 4] = buf.try_into().map_err(|_| CodecError::InvalidKeyLength {
            schema: TestSchema::TREE_NAME.0,
            expected: 4,
            actual: buf.len(),
        })?;
        Ok(u32::from_be_bytes(bytes))
    }
}

impl ValueCodec<TestSchema> for TestValue {
    fn encode_value(&self) -> CodecResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|e| CodecError::SerializationFailed {
            schema: TestSchema::TREE_NAME.0,
            source: e.into(),
        })
    }

    fn decode_value(buf: &[u8]) -> CodecResult<Self> {
        borsh::from_slice(buf).map_err(|e| CodecError::DeserializationFailed {
            schema: TestSchema::TREE_NAME.0,
            source: e.into(),
        })
    }
}

pub(crate) fn create_test_tree() -> SledTree<TestSchema> {
    let sled_db = sled::Config::new().temporary(true).open().unwrap();
    let tree = Arc::new(sled_db.open_tree("test").unwrap());
    SledTree::new(tree)
}
