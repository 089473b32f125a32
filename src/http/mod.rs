//! Outbound request plumbing: the transport seam and the pipeline on top.

pub mod pipeline;
pub mod transport;

pub use pipeline::RequestPipeline;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
