//! Mutation events and their handlers.

use alloc::vec::Vec;
use mapfold_core::Result;

/// A change to one key of a watched range.
///
/// `value` holds the value current at delivery time; None means the key
/// has been deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    /// Key relative to the watched range.
    pub key: Vec<u8>,
    /// Current value, or None for a deletion.
    pub value: Option<Vec<u8>>,
}

impl Mutation {
    /// Creates a mutation that sets `key` to `value`.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a mutation that deletes `key`.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns true if this mutation removes the key.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

/// Receives mutations delivered by a trigger.
///
/// Returning an error leaves the mutation in the trigger's backlog so it is
/// delivered again by the next drain.
pub trait MutationHandler {
    /// Processes one mutation.
    fn handle(&mut self, mutation: &Mutation) -> Result<()>;
}

impl<F> MutationHandler for F
where
    F: FnMut(&Mutation) -> Result<()>,
{
    fn handle(&mut self, mutation: &Mutation) -> Result<()> {
        self(mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_mutation_constructors() {
        let m = Mutation::put(b"k".as_slice(), b"v".as_slice());
        assert!(!m.is_delete());
        assert_eq!(m.value, Some(b"v".to_vec()));

        let m = Mutation::delete(b"k".as_slice());
        assert!(m.is_delete());
        assert_eq!(m.key, b"k".to_vec());
    }

    #[test]
    fn test_closure_handler() {
        let mut seen = vec![];
        {
            let mut handler = |m: &Mutation| -> Result<()> {
                seen.push(m.key.clone());
                Ok(())
            };
            handler.handle(&Mutation::put(b"a".as_slice(), b"1".as_slice())).unwrap();
            handler.handle(&Mutation::delete(b"b".as_slice())).unwrap();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
