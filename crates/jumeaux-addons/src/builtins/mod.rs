//! Built-in stages
//!
//! Each submodule registers the stages of one category under their
//! qualified names with the default implementation class.

pub mod dump;
pub mod hooks;
pub mod judgement;
pub mod persistence;
pub mod projection;
pub mod request_source;
pub mod request_transform;
pub mod response_transform;

use crate::StageRegistry;

/// Register every built-in stage
pub fn register_all(registry: &StageRegistry) {
    request_source::register(registry);
    request_transform::register(registry);
    response_transform::register(registry);
    projection::register(registry);
    judgement::register(registry);
    persistence::register(registry);
    dump::register(registry);
    hooks::register(registry);
}
