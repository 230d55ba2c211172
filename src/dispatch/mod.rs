//! Request dispatch
//!
//! Every inbound message is decoded, split on `:` and routed on its first
//! token to a [`RequestHandler`] method.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::Dispatcher;
pub use handler::{LoggingHandler, RequestHandler};
