use std::{
    marker::PhantomData,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use sled::{IVec, Iter, Tree, transaction::TransactionalTree};

use crate::{
    KeyCodec, Schema, ValueCodec,
    error::{Result, TxResult},
};

/// Decodes a raw key-value pair into typed schema types.
fn decode_pair<S: Schema>((k, v): (IVec, IVec)) -> Result<(S::Key, S::Value)> {
    let key = S::Key::decode_key(&k)?;
    let value = S::Value::decode_value(&v)?;
    Ok((key, value))
}

/// Converts a typed key bound to a raw byte bound.
fn key_bound<S: Schema>(k: Bound<&S::Key>) -> Result<Bound<Vec<u8>>> {
    let bound = match k {
        Bound::Included(k) => Bound::Included(k.encode_key()?),
        Bound::Excluded(k) => Bound::Excluded(k.encode_key()?),
        Bound::Unbounded => Bound::Unbounded,
    };
    Ok(bound)
}

/// Type-safe wrapper around a sled tree with schema-enforced operations.
#[derive(Debug)]
pub struct SledTree<S: Schema> {
    pub(crate) inner: Arc<Tree>,
    _phantom: PhantomData<S>,
}

impl<S: Schema> SledTree<S> {
    /// Creates a new typed tree wrapper.
    pub fn new(inner: Arc<Tree>) -> Self {
        Self {
            inner,
            _phantom: PhantomData,
        }
    }

    /// Inserts a key-value pair into the tree.
    pub fn insert(&self, key: &S::Key, value: &S::Value) -> Result<()> {
        let key = key.encode_key()?;
        let value = value.encode_value()?;
        self.inner.insert(key, value)?;

        self.inner.flush()?;
        Ok(())
    }

    /// Retrieves a value for the given key.
    pub fn get(&self, key: &S::Key) -> Result<Option<S::Value>> {
        let key = key.encode_key()?;
        let val = self.inner.get(key)?;
        let val = val.as_deref();
        Ok(val.map(|v| S::Value::decode_value(v)).transpose()?)
    }

    /// Removes a key-value pair from the tree.
    pub fn remove(&self, key: &S::Key) -> Result<()> {
        let key = key.encode_key()?;
        self.inner.remove(key)?;

        self.inner.flush()?;
        Ok(())
    }

    /// Returns true if the tree contains no key-value pairs.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the first key-value pair in the tree.
    pub fn first(&self) -> Result<Option<(S::Key, S::Value)>> {
        self.inner.first()?.map(decode_pair::<S>).transpose()
    }

    /// Returns the last key-value pair in the tree.
    pub fn last(&self) -> Result<Option<(S::Key, S::Value)>> {
        self.inner.last()?.map(decode_pair::<S>).transpose()
    }

    /// Returns true if the tree holds a value for the given key.
    pub fn contains_key(&self, key: &S::Key) -> Result<bool> {
        let key = key.encode_key()?;
        Ok(self.inner.contains_key(key)?)
    }

    /// Returns the number of entries in the tree. Walks the whole tree.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over all key-value pairs in the tree.
    pub fn iter(&self) -> SledTreeIter<S> {
        SledTreeIter {
            inner: self.inner.iter(),
            _phantom: PhantomData,
        }
    }

    /// Returns an iterator over key-value pairs within the specified range.
    pub fn range<R>(&self, range: R) -> Result<SledTreeIter<S>>
    where
        R: RangeBounds<S::Key>,
    {
        let start = key_bound::<S>(range.start_bound())?;
        let end = key_bound::<S>(range.end_bound())?;
        Ok(SledTreeIter {
            inner: self.inner.range((start, end)),
            _phantom: PhantomData,
        })
    }
}

/// Type-safe wrapper around sled's transactional tree.
///
/// Sled transactions only support point reads and writes; range scans have to happen on the
/// plain [`SledTree`] before the transaction starts.
pub struct SledTransactionalTree<S: Schema> {
    inner: TransactionalTree,
    _phantom: PhantomData<S>,
}

impl<S: Schema> SledTransactionalTree<S> {
    /// Creates a new transactional tree wrapper.
    pub fn new(inner: TransactionalTree) -> Self {
        Self {
            inner,
            _phantom: PhantomData,
        }
    }

    /// Inserts a key-value pair in the transaction.
    pub fn insert(&self, key: &S::Key, value: &S::Value) -> TxResult<()> {
        let key = key.encode_key()?;
        let value = value.encode_value()?;
        self.inner.insert(key, value)?;
        Ok(())
    }

    /// Retrieves a value for the given key within the transaction.
    pub fn get(&self, key: &S::Key) -> TxResult<Option<S::Value>> {
        let key = key.encode_key()?;
        let val = self.inner.get(key)?;
        let val = val.as_deref();
        Ok(val.map(|v| S::Value::decode_value(v)).transpose()?)
    }

    /// Removes a key-value pair within the transaction, returning whether it existed.
    pub fn remove(&self, key: &S::Key) -> TxResult<bool> {
        let key = key.encode_key()?;
        Ok(self.inner.remove(key)?.is_some())
    }

    /// Returns true if the key is present as seen by the transaction.
    pub fn contains_key(&self, key: &S::Key) -> TxResult<bool> {
        let key = key.encode_key()?;
        Ok(self.inner.get(key)?.is_some())
    }
}

/// A typed iterator over key-value pairs in a sled tree.
pub struct SledTreeIter<S: Schema> {
    inner: Iter,
    _phantom: PhantomData<S>,
}

impl<S: Schema> Iterator for SledTreeIter<S> {
    type Item = Result<(S::Key, S::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|result| result.map_err(Into::into).and_then(decode_pair::<S>))
    }
}

impl<S: Schema> DoubleEndedIterator for SledTreeIter<S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner
            .next_back()
            .map(|result| result.map_err(Into::into).and_then(decode_pair::<S>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestValue, create_test_tree};

    fn named(id: u32, name: &str) -> TestValue {
        TestValue {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_iter_empty() {
        let tree = create_test_tree();
        let mut iter = tree.iter();
        assert!(iter.next().is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_iter_forward_and_backward() {
        let tree = create_test_tree();

        tree.insert(&1, &named(1, "Alice")).unwrap();
        tree.insert(&3, &named(3, "Charlie")).unwrap();
        tree.insert(&2, &named(2, "Bob")).unwrap();

        let items: Vec<_> = tree.iter().collect::<Result<_>>().unwrap();
        let keys: Vec<u32> = items.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(items[1].1.name, "Bob");

        let items: Vec<_> = tree.iter().rev().collect::<Result<_>>().unwrap();
        let keys: Vec<u32> = items.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![3, 2, 1]);
    }

    #[test]
    fn test_range_bounds() {
        let tree = create_test_tree();
        for i in 1..=5 {
            tree.insert(&i, &TestValue::new_with_name(i)).unwrap();
        }

        let keys = |items: Vec<(u32, TestValue)>| {
            items.into_iter().map(|(k, _)| k).collect::<Vec<_>>()
        };

        let inclusive = tree.range(2..=4).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys(inclusive), vec![2, 3, 4]);

        let exclusive = tree.range(2..4).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys(exclusive), vec![2, 3]);

        let from = tree.range(3..).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys(from), vec![3, 4, 5]);

        let reversed = tree.range(..=3).unwrap().rev().collect::<Result<_>>().unwrap();
        assert_eq!(keys(reversed), vec![3, 2, 1]);
    }

    #[test]
    fn test_u32_key_ordering_large_values() {
        let tree = create_test_tree();
        for key in [500, 255, 100, 300, 256] {
            tree.insert(&key, &TestValue::new_with_name(key)).unwrap();
        }

        let keys: Vec<u32> = tree
            .iter()
            .map(|res| res.map(|(k, _)| k))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(keys, vec![100, 255, 256, 300, 500]);
        assert_eq!(tree.first().unwrap().unwrap().0, 100);
        assert_eq!(tree.last().unwrap().unwrap().0, 500);
    }

    #[test]
    fn test_remove_and_contains() {
        let tree = create_test_tree();
        tree.insert(&9, &TestValue::new_with_name(9)).unwrap();
        assert!(tree.contains_key(&9).unwrap());

        tree.remove(&9).unwrap();
        assert!(!tree.contains_key(&9).unwrap());
        assert!(tree.get(&9).unwrap().is_none());
    }
}
