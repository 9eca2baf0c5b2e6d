//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use bridge_core::{InsertRecord, SinkError};

/// Encode one record as a single line, using the series path as the
/// measurement name.
///
/// Tags are sorted by key for canonical form. Fields keep the record's
/// (sorted) order. Every field is written as a float; InfluxDB reads an
/// unsuffixed number as a float, so `3.0` is encoded as `3`.
pub fn encode_point(record: &InsertRecord, tags: &[(&str, &str)]) -> Result<String, SinkError> {
    if record.fields().is_empty() {
        return Err(SinkError::Encode(format!(
            "point for {} has no fields",
            record.series_path()
        )));
    }

    let mut line = escape_measurement(record.series_path());

    let mut sorted_tags: Vec<_> = tags.iter().collect();
    sorted_tags.sort_by_key(|(k, _)| *k);
    for (key, value) in sorted_tags {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    for (i, (key, value)) in record.fields().iter().enumerate() {
        if !value.is_finite() {
            return Err(SinkError::Encode(format!("field {key} is not finite: {value}")));
        }
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_string());
    }

    line.push(' ');
    line.push_str(&record.timestamp().to_string());
    Ok(line)
}

/// Spaces and commas must be escaped in measurement names.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys additionally escape `=`.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(series: &str, ts: i64, fields: &[(&str, f64)]) -> InsertRecord {
        let fields: BTreeMap<String, f64> =
            fields.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        InsertRecord::new(series, ts, fields)
    }

    #[test]
    fn simple_point() {
        let line = encode_point(&record("hamilton/dev1", 1000, &[("a", 1.0), ("b", 3.5)]), &[])
            .unwrap();
        assert_eq!(line, "hamilton/dev1 a=1,b=3.5 1000");
    }

    #[test]
    fn tags_are_sorted() {
        let line = encode_point(
            &record("temperature", 1_000_000_000, &[("value", 23.5)]),
            &[("sensor", "A1"), ("location", "room1")],
        )
        .unwrap();
        assert_eq!(
            line,
            "temperature,location=room1,sensor=A1 value=23.5 1000000000"
        );
    }

    #[test]
    fn special_characters_are_escaped() {
        let line = encode_point(
            &record("my series", 3, &[("field=key", 1.25), ("air temp", -4.0)]),
            &[("tag key", "tag,value")],
        )
        .unwrap();
        assert_eq!(
            line,
            "my\\ series,tag\\ key=tag\\,value air\\ temp=-4,field\\=key=1.25 3"
        );
    }

    #[test]
    fn negative_timestamps_are_kept() {
        let line = encode_point(&record("s", -5, &[("v", 0.0)]), &[]).unwrap();
        assert_eq!(line, "s v=0 -5");
    }

    #[test]
    fn empty_fields_are_rejected() {
        let err = encode_point(&record("s", 1, &[]), &[]).unwrap_err();
        assert!(matches!(err, SinkError::Encode(_)));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let err = encode_point(&record("s", 1, &[("v", f64::NAN)]), &[]).unwrap_err();
        assert!(err.to_string().contains("not finite"));
    }
}
