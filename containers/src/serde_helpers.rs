use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serializer};

/// Accepts `5` as well as `"5"`; serializes as a string.
pub mod quoted_u64 {
    use super::{Deserialize, Deserializer, SerdeError, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(value) => Ok(value),
            NumberOrString::String(value) => value
                .parse::<u64>()
                .map_err(|err| SerdeError::custom(format!("invalid u64: {err}"))),
        }
    }
}
