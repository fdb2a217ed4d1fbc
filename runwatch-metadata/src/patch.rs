// Copyright (c) The runwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A tri-state field in a partial update.
///
/// Real-time patches only carry the fields that changed. A field that is
/// missing from the JSON object deserializes to [`Patch::Absent`] and must be
/// left untouched; a field that is explicitly `null` deserializes to
/// [`Patch::Clear`]; anything else is [`Patch::Set`].
///
/// Fields of this type must be annotated with `#[serde(default)]` so that
/// omission maps to `Absent`, and with
/// `#[serde(skip_serializing_if = "Patch::is_absent")]` so that `Absent` is
/// omitted again on output.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Patch<T> {
    /// The field was omitted: leave the existing value unchanged.
    #[default]
    Absent,

    /// The field was explicitly cleared.
    Clear,

    /// The field was set to a value.
    Set(T),
}

impl<T> Patch<T> {
    /// Returns true if the field was omitted.
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Returns the value if the field was set.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Absent | Patch::Clear => None,
        }
    }

    /// Converts a `Patch<T>` to a `Patch<&T>`.
    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Absent => Patch::Absent,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(value),
        }
    }

    /// Maps the set value with the given function.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Absent => Patch::Absent,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` becomes [`Patch::Set`], `None` becomes [`Patch::Absent`].
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Absent,
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only called when the key is present, so `null` is an explicit clear.
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Absent | Patch::Clear => serializer.serialize_none(),
            Patch::Set(value) => value.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct Sample {
        #[serde(default, skip_serializing_if = "Patch::is_absent")]
        name: Patch<String>,
    }

    #[test]
    fn omitted_null_and_value_are_distinct() {
        let absent: Sample = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.name, Patch::Absent);

        let clear: Sample = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert_eq!(clear.name, Patch::Clear);

        let set: Sample = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(set.name, Patch::Set("x".to_owned()));
    }

    #[test]
    fn serialization_preserves_tri_state() {
        let absent = Sample::default();
        assert_eq!(serde_json::to_string(&absent).unwrap(), "{}");

        let clear = Sample {
            name: Patch::Clear,
        };
        assert_eq!(serde_json::to_string(&clear).unwrap(), r#"{"name":null}"#);
    }
}
