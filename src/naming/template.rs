//! Placeholder substitution for name templates.
//!
//! Templates use `{field}` placeholders. Literal braces are written as
//! `{{` and `}}`.

use crate::error::TemplateError;

/// Per-site values available to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteContext {
    /// Organization name.
    pub org: String,
    /// Two-letter state code.
    pub state: String,
    /// Site code.
    pub site_code: String,
    /// Human-readable site detail.
    pub site_detail: String,
    /// City name.
    pub city: String,
}

impl SiteContext {
    /// Looks up a template field.
    ///
    /// `site` and `site_name` are accepted as aliases of `site_code` and
    /// `site_detail`, the names blueprint templates use.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        match field {
            "org" => Some(&self.org),
            "state" => Some(&self.state),
            "site_code" | "site" => Some(&self.site_code),
            "site_detail" | "site_name" => Some(&self.site_detail),
            "city" => Some(&self.city),
            _ => None,
        }
    }
}

/// Renders a template against a site context.
///
/// # Errors
///
/// Returns an error if the template names a field the context does not
/// provide, or if its braces are unbalanced.
pub fn render_template(template: &str, ctx: &SiteContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for f in chars.by_ref() {
                    if f == '}' {
                        closed = true;
                        break;
                    }
                    field.push(f);
                }
                if !closed {
                    return Err(TemplateError::Malformed {
                        template: template.to_string(),
                        reason: String::from("unclosed '{'"),
                    });
                }
                let field = field.trim();
                let value = ctx.get(field).ok_or_else(|| TemplateError::UnknownField {
                    template: template.to_string(),
                    field: field.to_string(),
                })?;
                out.push_str(value);
            }
            '}' => {
                return Err(TemplateError::Malformed {
                    template: template.to_string(),
                    reason: String::from("single '}' encountered"),
                });
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
