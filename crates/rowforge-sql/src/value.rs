//! Bind values for positional statement parameters.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A typed value bound to one positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// NULL value.
    Null,
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Naive date/time value.
    Date(NaiveDateTime),
}

impl BindValue {
    /// Returns whether this is the NULL value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One row of bind values, in the exact order the statement text references
/// its placeholders.
pub type BindRow = Vec<BindValue>;

/// Trait for types that can be converted to bind values.
pub trait ToBindValue {
    /// Converts the value to a `BindValue`.
    fn to_bind_value(self) -> BindValue;
}

impl ToBindValue for BindValue {
    fn to_bind_value(self) -> BindValue {
        self
    }
}

impl ToBindValue for i64 {
    fn to_bind_value(self) -> BindValue {
        BindValue::Int(self)
    }
}

impl ToBindValue for i32 {
    fn to_bind_value(self) -> BindValue {
        BindValue::Int(i64::from(self))
    }
}

impl ToBindValue for i16 {
    fn to_bind_value(self) -> BindValue {
        BindValue::Int(i64::from(self))
    }
}

impl ToBindValue for u32 {
    fn to_bind_value(self) -> BindValue {
        BindValue::Int(i64::from(self))
    }
}

impl ToBindValue for f64 {
    fn to_bind_value(self) -> BindValue {
        BindValue::Float(self)
    }
}

impl ToBindValue for f32 {
    fn to_bind_value(self) -> BindValue {
        BindValue::Float(f64::from(self))
    }
}

impl ToBindValue for String {
    fn to_bind_value(self) -> BindValue {
        BindValue::Text(self)
    }
}

impl ToBindValue for &str {
    fn to_bind_value(self) -> BindValue {
        BindValue::Text(String::from(self))
    }
}

impl ToBindValue for NaiveDateTime {
    fn to_bind_value(self) -> BindValue {
        BindValue::Date(self)
    }
}

impl ToBindValue for NaiveDate {
    fn to_bind_value(self) -> BindValue {
        BindValue::Date(self.and_time(NaiveTime::MIN))
    }
}

impl<T: ToBindValue> ToBindValue for Option<T> {
    fn to_bind_value(self) -> BindValue {
        match self {
            Some(v) => v.to_bind_value(),
            None => BindValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(42_i32.to_bind_value(), BindValue::Int(42));
        assert_eq!(2.5_f64.to_bind_value(), BindValue::Float(2.5));
        assert_eq!("x".to_bind_value(), BindValue::Text(String::from("x")));
        assert_eq!(None::<i64>.to_bind_value(), BindValue::Null);
        assert_eq!(Some(7_i64).to_bind_value(), BindValue::Int(7));
    }

    #[test]
    fn date_conversion_is_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let BindValue::Date(dt) = date.to_bind_value() else {
            panic!("expected a date bind value");
        };
        assert_eq!(dt.time(), NaiveTime::MIN);
    }

    #[test]
    fn null_detection() {
        assert!(BindValue::Null.is_null());
        assert!(!BindValue::Int(0).is_null());
    }
}
