//! Command templating: renders a host-specific command (or output path)
//! from a shared template and a fixed set of per-instance variables.
//!
//! Placeholder syntax is `{{var}}` with optional inner whitespace. Exactly
//! four variables exist: `index`, `address`, `name`, `ports`. Anything else
//! is a hard error so a typo never silently runs the wrong command on a
//! whole fleet.

use crate::error::TemplateError;

/// The per-instance substitution variables.
#[derive(Debug, Clone, Default)]
pub struct RenderVars<'a> {
    /// Zero-padded, 1-based creation-order index.
    pub index: &'a str,
    /// Public IPv4 address, empty until the instance is ready.
    pub address: &'a str,
    /// Instance name (`<prefix>-<suffix>`).
    pub name: &'a str,
    /// Assigned port bucket; empty when port distribution is off.
    pub ports: &'a str,
}

/// Renders `template` with `vars`. Pure: same inputs, same output.
pub fn render(template: &str, vars: &RenderVars<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0usize;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated(offset + open))?;
        let var = after_open[..close].trim();
        match var {
            "index" => out.push_str(vars.index),
            "address" => out.push_str(vars.address),
            "name" => out.push_str(vars.name),
            "ports" => out.push_str(vars.ports),
            other => return Err(TemplateError::UnknownVariable(other.to_string())),
        }
        offset += open + 2 + close + 2;
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
