//! Records of training quantities.
//!
//! Training steps report scalar values such as the loss or per-parameter statistics
//! in a [`Record`], which the driving loop forwards to its own logger.
//!
//! ```rust
//! use dtmine_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.7);
//! record.insert("lr", RecordValue::Scalar(1e-4));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.7);
//! ```
use crate::error::DtError;
use std::collections::{
    hash_map::Iter,
    HashMap,
};

/// Values stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value.
    Scalar(f32),

    /// A 1-dimensional array.
    Array1(Vec<f32>),
}

/// Key-value container of recorded quantities.
#[derive(Debug, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record holding a single scalar.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Inserts a key-value pair.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns the value of the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records. Values of `record` win on key collisions.
    pub fn merge(self, record: Record) -> Self {
        let mut merged = self;
        merged.0.extend(record.0);
        merged
    }

    /// Returns the scalar value of the given key.
    pub fn get_scalar(&self, k: &str) -> Result<f32, DtError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(DtError::RecordValueTypeError("Scalar".into())),
            None => Err(DtError::RecordKeyError(k.into())),
        }
    }

    /// Returns the array value of the given key.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, DtError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(DtError::RecordValueTypeError("Array1".into())),
            None => Err(DtError::RecordKeyError(k.into())),
        }
    }

    /// Returns `true` if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_merge() {
        let r1 = Record::from_scalar("loss", 1.0);
        let mut r2 = Record::empty();
        r2.insert("loss", RecordValue::Scalar(0.5));
        r2.insert("w_mean", RecordValue::Array1(vec![0.1, 0.2]));
        let r = r1.merge(r2);

        assert_eq!(r.len(), 2);
        assert_eq!(r.get_scalar("loss").unwrap(), 0.5);
        assert_eq!(r.get_array1("w_mean").unwrap(), vec![0.1, 0.2]);
        assert_eq!(
            r.get_scalar("w_mean"),
            Err(DtError::RecordValueTypeError("Scalar".into()))
        );
        assert_eq!(
            r.get_scalar("missing"),
            Err(DtError::RecordKeyError("missing".into()))
        );
    }

    #[test]
    fn test_get_and_iter() {
        let mut r = Record::from_scalar("loss", 2.0);
        r.insert("grad_norm", RecordValue::Scalar(0.5));

        assert_eq!(r.get("loss"), Some(&RecordValue::Scalar(2.0)));
        assert_eq!(r.get("lr"), None);

        let mut keys = r.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
        keys.sort();
        assert_eq!(keys, vec!["grad_norm", "loss"]);
    }
}
