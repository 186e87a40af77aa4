pub mod message;

pub use message::{
    decode, decode_compact_nodes_v4, decode_compact_nodes_v6, encode, encode_compact_nodes_v4,
    encode_compact_nodes_v6, KrpcError, Msg, MsgBody, QueryArgs, ReturnValues,
};

use crate::domain::address::Family;

/// Resolves the `want` argument: explicit families if given, otherwise
/// inferred from the querier's own address family.
pub fn resolve_want(want: Option<&[String]>, querier_family: Family) -> Vec<Family> {
    match want {
        Some(values) if !values.is_empty() => values
            .iter()
            .filter_map(|v| match v.as_str() {
                "n4" => Some(Family::V4),
                "n6" => Some(Family::V6),
                _ => None,
            })
            .collect(),
        _ => vec![querier_family],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn want_explicit_overrides_inference() {
        let want = vec!["n6".to_string()];
        assert_eq!(resolve_want(Some(&want), Family::V4), vec![Family::V6]);
    }

    #[test]
    fn want_absent_infers_from_querier_family() {
        assert_eq!(resolve_want(None, Family::V4), vec![Family::V4]);
        assert_eq!(resolve_want(None, Family::V6), vec![Family::V6]);
    }
}
