//! Reference Rewrite Engine
//!
//! Replaces every occurrence of an old identifier (the template's canonical
//! domain) with a new one (the tenant's subdomain) across a value tree.
//! Pure: the input is never mutated, a fresh tree comes back. Composites
//! are decoded, rewritten, and re-encoded so their length prefixes stay
//! consistent with the payload they describe.

use crate::value::{decode_with_limit, encode, ContentError, Scalar, Value, DEFAULT_DEPTH_LIMIT};

/// Rewrite with the default depth bound
pub fn rewrite(value: &Value, old: &str, new: &str) -> Result<Value, ContentError> {
    rewrite_with_limit(value, old, new, DEFAULT_DEPTH_LIMIT)
}

/// Rewrite `old` to `new` everywhere in `value`
///
/// Nesting past `depth_limit` or an undecodable composite fails with
/// `MalformedEncoding`; the caller keeps the original tree, so nothing is
/// ever left partially rewritten.
pub fn rewrite_with_limit(
    value: &Value,
    old: &str,
    new: &str,
    depth_limit: u32,
) -> Result<Value, ContentError> {
    rewrite_inner(value, old, new, 0, depth_limit)
}

fn rewrite_inner(
    value: &Value,
    old: &str,
    new: &str,
    depth: u32,
    limit: u32,
) -> Result<Value, ContentError> {
    if depth > limit {
        return Err(ContentError::MalformedEncoding(format!(
            "nesting exceeds depth bound {limit}"
        )));
    }
    match value {
        Value::Scalar(Scalar::Str(s)) => Ok(Value::str(s.replace(old, new))),
        Value::Scalar(_) => Ok(value.clone()),
        Value::Sequence(items) => {
            let rewritten = items
                .iter()
                .map(|item| rewrite_inner(item, old, new, depth + 1, limit))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Sequence(rewritten))
        }
        Value::Mapping(entries) => {
            // Keys are identifiers, not content: rewriting one could
            // collide with a sibling key and silently drop an entry.
            let rewritten = entries
                .iter()
                .map(|(key, child)| {
                    rewrite_inner(child, old, new, depth + 1, limit).map(|c| (key.clone(), c))
                })
                .collect::<Result<_, _>>()?;
            Ok(Value::Mapping(rewritten))
        }
        Value::Composite(raw) => {
            // Remaining budget bounds the inner decode too, so a composite
            // stuffed with deeply nested containers cannot sidestep the cap.
            let inner = decode_with_limit(raw, limit.saturating_sub(depth))?;
            let rewritten = rewrite_inner(&inner, old, new, depth + 1, limit)?;
            Ok(Value::Composite(encode(&rewritten)))
        }
    }
}
