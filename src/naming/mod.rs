//! Naming module for rendering object names and descriptions.
//!
//! Object names are produced from per-type templates such as
//! `"DP_{site_code}_{city}"`, filled from a per-site context.

mod profile;
mod template;

pub use profile::{NameResolver, NamingProfile, ObjectTemplate, RenderedName};
pub use template::{SiteContext, render_template};
