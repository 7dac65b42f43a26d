pub mod client;
pub mod dispatcher;
pub mod retry;
pub mod router;

pub use client::ProxyClient;
pub use dispatcher::RequestDispatcher;
pub use router::ModelRouter;
