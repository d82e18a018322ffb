//! Placeholder rendering for step paths and payloads.
//!
//! A placeholder is `{name}` or `{name.field.sub}`, optionally with a literal
//! default: `{invoiceId|1}`. The root name is looked up in the session's
//! extracted values first, then among the identity fields `name`, `email`
//! and `password`. Nested segments walk JSON objects by key and arrays by
//! index. A `null` counts as absent.
//!
//! Rendering reads the session and nothing else, so it is deterministic:
//! anything random a flow needs is drawn into the session beforehand.

use serde_json::{Map, Value};

use crate::{error::Failure, session::SessionState};

/// Render a path (or any plain string) template.
pub fn render_str(template: &str, state: &SessionState) -> Result<String, Failure> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let expr = &rest[open + 1..open + len];
        out.push_str(&to_text(&resolve(expr, state)?));
        rest = &rest[open + len + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Render a JSON payload template.
///
/// String leaves are templates. A leaf made of exactly one placeholder is
/// replaced by the resolved value itself, keeping its JSON type, so
/// `"{product.id}"` renders to `3` rather than `"3"`.
pub fn render_value(template: &Value, state: &SessionState) -> Result<Value, Failure> {
    match template {
        Value::String(s) => match sole_placeholder(s) {
            Some(expr) => resolve(expr, state),
            None => render_str(s, state).map(Value::String),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, state))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), render_value(v, state)?)))
            .collect::<Result<Map<_, _>, Failure>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn sole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    if inner.contains(['{', '}']) {
        return None;
    }
    Some(inner)
}

fn resolve(expr: &str, state: &SessionState) -> Result<Value, Failure> {
    let (path, default) = match expr.split_once('|') {
        Some((path, default)) => (path.trim(), Some(default.trim())),
        None => (expr.trim(), None),
    };

    let mut segments = path.split('.');
    let root = segments.next().unwrap_or_default();
    let found = lookup_root(root, state).and_then(|mut current| {
        for segment in segments {
            current = match current {
                Value::Object(mut fields) => fields.remove(segment)?,
                Value::Array(mut items) => {
                    let index: usize = segment.parse().ok()?;
                    if index >= items.len() {
                        return None;
                    }
                    items.swap_remove(index)
                }
                _ => return None,
            };
        }
        Some(current)
    });

    match (found, default) {
        (Some(value), _) if !value.is_null() => Ok(value),
        (_, Some(default)) => {
            Ok(serde_json::from_str(default).unwrap_or_else(|_| Value::String(default.to_string())))
        }
        _ => Err(Failure::MissingExtractedValue(path.to_string())),
    }
}

fn lookup_root(root: &str, state: &SessionState) -> Option<Value> {
    if let Some(value) = state.value(root) {
        return Some(value.clone());
    }
    let identity = state.identity();
    match root {
        "name" => Some(Value::String(identity.name.clone())),
        "email" => Some(Value::String(identity.email.clone())),
        "password" => Some(Value::String(identity.password.clone())),
        _ => None,
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use serde_json::json;

    fn state() -> SessionState {
        let mut state = SessionState::new(Identity {
            name: "LoadUser".into(),
            email: "a@example.com".into(),
            password: "pw".into(),
        });
        state.store("product", json!({"id": 3, "price": 9.5, "tags": ["x", "y"]}));
        state.store("invoiceId", json!(42));
        state
    }

    #[test]
    fn path_placeholders() {
        let state = state();
        assert_eq!(render_str("/product-page/{product.id}", &state).unwrap(), "/product-page/3");
        assert_eq!(render_str("/invoice/{invoiceId}", &state).unwrap(), "/invoice/42");
        assert_eq!(render_str("/t/{product.tags.1}", &state).unwrap(), "/t/y");
        assert_eq!(render_str("/", &state).unwrap(), "/");
    }

    #[test]
    fn defaults_cover_missing_values() {
        let state = state();
        assert_eq!(render_str("/order/{orderId|1}", &state).unwrap(), "/order/1");
        assert_eq!(
            render_value(&json!("{product.discount|none}"), &state).unwrap(),
            json!("none")
        );
    }

    #[test]
    fn missing_value_without_default_fails() {
        let state = state();
        assert_eq!(
            render_str("/wishlist/{wishlistId}", &state),
            Err(Failure::MissingExtractedValue("wishlistId".into()))
        );
        assert_eq!(
            render_str("/p/{product.tags.9}", &state),
            Err(Failure::MissingExtractedValue("product.tags.9".into()))
        );
    }

    #[test]
    fn sole_placeholders_keep_their_json_type() {
        let state = state();
        let rendered = render_value(
            &json!({
                "cart": [{"id": "{product.id}", "quantity": 1, "price": "{product.price|1}"}],
                "note": "product {product.id}",
            }),
            &state,
        )
        .unwrap();
        assert_eq!(
            rendered,
            json!({
                "cart": [{"id": 3, "quantity": 1, "price": 9.5}],
                "note": "product 3",
            })
        );
    }

    #[test]
    fn identity_fields_resolve() {
        let state = state();
        assert_eq!(
            render_value(&json!({"email": "{email}", "password": "{password}"}), &state).unwrap(),
            json!({"email": "a@example.com", "password": "pw"})
        );
    }

    #[test]
    fn extracted_values_shadow_identity_fields() {
        let mut state = state();
        state.store("email", json!("override@example.com"));
        assert_eq!(render_str("{email}", &state).unwrap(), "override@example.com");
    }

    #[test]
    fn unbalanced_brace_is_literal() {
        let state = state();
        assert_eq!(render_str("/odd/{product", &state).unwrap(), "/odd/{product");
    }
}
