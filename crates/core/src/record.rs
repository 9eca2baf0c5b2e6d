use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One normalized point, ready to be written to the store.
///
/// Records are built once by the normalizer and then moved from stage to
/// stage; fields are private so nothing downstream can alter them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRecord {
    series_path: String,
    /// Nanoseconds since the Unix epoch, as provided by the source.
    timestamp: i64,
    fields: BTreeMap<String, f64>,
}

impl InsertRecord {
    pub fn new(series_path: impl Into<String>, timestamp: i64, fields: BTreeMap<String, f64>) -> Self {
        Self {
            series_path: series_path.into(),
            timestamp,
            fields,
        }
    }

    pub fn series_path(&self) -> &str {
        &self.series_path
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_expose_constructor_values() {
        let fields = BTreeMap::from([("a".to_string(), 1.0), ("b".to_string(), 3.0)]);
        let record = InsertRecord::new("hamilton/dev1", 1000, fields.clone());

        assert_eq!(record.series_path(), "hamilton/dev1");
        assert_eq!(record.timestamp(), 1000);
        assert_eq!(record.fields(), &fields);
        assert_eq!(record.field("b"), Some(3.0));
        assert_eq!(record.field("missing"), None);
    }
}
