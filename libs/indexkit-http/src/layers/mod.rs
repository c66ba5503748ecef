//! Tower layers of the transport stack.

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
