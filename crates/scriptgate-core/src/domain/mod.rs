//! Domain models for Scriptgate.
//!
//! - `ScrapedData` / `TemplateProfile`: inputs from external collaborators
//! - `ScriptResult`: the mutable artifact under evaluation
//! - `Section`: closed set of regenerable script sections

pub mod error;
pub mod scraped;
pub mod script;
pub mod text;

pub use error::{Result, ScriptGateError};
pub use scraped::{ScrapedData, ScrapedLink, TemplateProfile};
pub use script::{
    feature_segment, normalize_script_payload, to_persisted_script, Feature, ScriptResult,
    Section,
};
