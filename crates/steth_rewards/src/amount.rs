//! Integer amounts on the wire: every magnitude is a decimal string.

use alloy::primitives::{I256, U256};

use crate::error::RewardsError;

/// `#[serde(with = "decimal")]` for any `Display + FromStr` integer (U256, I256).
pub mod decimal {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(
        value: &T,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(de::Error::custom)
    }
}

/// Parse a decimal (or 0x-prefixed) unsigned integer as returned by GraphQL `BigInt` fields.
pub fn parse_u256(field: &str, s: &str) -> Result<U256, crate::chain::FetchError> {
    s.trim()
        .parse::<U256>()
        .map_err(|e| crate::chain::FetchError::Decode(format!("{field}: {s:?}: {e}")))
}

/// Lift an unsigned amount into the signed domain used for deltas.
pub fn to_signed(value: U256) -> Result<I256, RewardsError> {
    I256::try_from(value)
        .map_err(|_| RewardsError::Invariant(format!("amount {value} exceeds signed range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Pair {
        #[serde(with = "decimal")]
        a: U256,
        #[serde(with = "decimal")]
        b: I256,
    }

    #[test]
    fn amounts_serialize_as_decimal_strings() {
        let p = Pair {
            a: U256::from(1_000_000_000_000_000_000u128),
            b: I256::try_from(-42i64).unwrap(),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"a":"1000000000000000000","b":"-42"}"#);
        let back: Pair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn parse_u256_rejects_garbage() {
        assert_eq!(parse_u256("value", "12").unwrap(), U256::from(12));
        assert!(parse_u256("value", "twelve").is_err());
    }

    #[test]
    fn signed_lift_bounds() {
        assert!(to_signed(U256::MAX).is_err());
        assert_eq!(to_signed(U256::from(7)).unwrap(), I256::try_from(7i64).unwrap());
    }
}
