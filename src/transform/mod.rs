pub mod headers;
pub mod model;

pub use headers::outbound_headers;
pub use model::rewrite_completion_model;
