pub mod backend;
pub mod cache;
pub mod key;
pub mod sampler;
pub mod selector;

pub use backend::{mask_credential, BackendDescriptor, BackendId};
pub use cache::SelectorCache;
pub use key::RoutingKey;
pub use selector::FailoverSelector;
