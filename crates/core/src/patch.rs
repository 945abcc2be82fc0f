//! Helpers for partial-update (PATCH) payloads.

use serde::{Deserialize, Deserializer};

/// Distinguish "field absent" (`None`) from "explicit null" (`Some(None)`).
///
/// Use as `#[serde(default, deserialize_with = "double_option")]` on an
/// `Option<Option<T>>` field.
pub fn double_option<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        brand: Option<Option<String>>,
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"brand":null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"brand":"Weber"}"#).unwrap();

        assert_eq!(absent.brand, None);
        assert_eq!(null.brand, Some(None));
        assert_eq!(set.brand, Some(Some("Weber".into())));
    }
}
