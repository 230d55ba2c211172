//! Per-message dispatch: parse the payload and call the matching handler

use super::handler::RequestHandler;
use crate::error::AgentError;
use crate::protocol::{InboundMessage, Request};
use tracing::{debug, info, Instrument};

/// Routes inbound messages to a [`RequestHandler`]
pub struct Dispatcher<H: RequestHandler> {
    handler: H,
}

impl<H: RequestHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Log the arrival, parse the payload and invoke the handler
    ///
    /// Returns the parsed request so callers can report what was dispatched.
    /// A handler error is returned unchanged; the request is not retried.
    pub async fn dispatch(&self, message: &InboundMessage) -> Result<Request, AgentError> {
        info!("{}", message.summary());

        let request = message.request();
        let span = crate::request_span!(kind = request.kind(), topic = %message.topic);

        async {
            debug!("Dispatching {}", request);
            match &request {
                Request::Facebook { argument } => self.handler.handle_facebook(argument).await?,
                Request::Twitter { argument } => self.handler.handle_twitter(argument).await?,
                Request::Unknown { keyword } => self.handler.handle_unknown(keyword).await?,
            }
            Ok::<(), AgentError>(())
        }
        .instrument(span)
        .await?;

        Ok(request)
    }
}
