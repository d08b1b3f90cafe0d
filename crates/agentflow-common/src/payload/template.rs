//! `{{ path }}` interpolation against a message payload

use super::{render, value_at};
use crate::types::Payload;

/// Replace every `{{ path }}` in `template` with the rendered value at that
/// path. Unknown paths render as the empty string; an unterminated `{{` is
/// kept verbatim.
pub fn interpolate(template: &str, payload: &Payload) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Ok(value) = value_at(payload, after[..end].trim()) {
                    out.push_str(&render(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
