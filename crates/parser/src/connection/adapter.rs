//! Bridges tokenizer events into message building and consumer callbacks.

use tracing::{trace, warn};

use crate::codec::{ContentDecoder, ContentEncoding, MessageHead, StartLine, TokenizerHandler};
use crate::config::ParserConfig;
use crate::handler::{BodyStart, HeadersOutcome, ParserCallbacks};
use crate::protocol::{ConnectionId, Error, HttpMessage, MessageKind};

/// Per-message state of a session.
#[derive(Debug, Default)]
pub(crate) struct Exchange {
    message: Option<HttpMessage>,
    kind: Option<MessageKind>,
    in_field: bool,
    body: BodyState,
}

#[derive(Debug, Default)]
enum BodyState {
    #[default]
    NotStarted,
    Streaming(ContentDecoder),
    /// The consumer or the inflater failed, the rest of the body is dropped.
    Abandoned,
}

impl Exchange {
    /// Returns true between message begin and message complete.
    pub(crate) fn in_message(&self) -> bool {
        self.message.is_some()
    }

    /// Drops the working message and any decode state, without callbacks.
    pub(crate) fn clear(&mut self) {
        if let BodyState::Streaming(decoder) = &mut self.body {
            decoder.end();
        }
        *self = Exchange::default();
    }
}

/// Short-lived view over a session, handed to the tokenizer for one call.
pub(crate) struct Adapter<'a, C> {
    pub(crate) id: ConnectionId,
    pub(crate) callbacks: &'a mut C,
    pub(crate) exchange: &'a mut Exchange,
    pub(crate) config: &'a ParserConfig,
    /// Body errors, returned by the session once the tokenizer call is over
    pub(crate) pending: &'a mut Vec<Error>,
}

fn body_started<C: ParserCallbacks>(callbacks: &mut C, kind: MessageKind, id: ConnectionId) -> BodyStart {
    match kind {
        MessageKind::Request => callbacks.on_request_body_started(id),
        MessageKind::Response => callbacks.on_response_body_started(id),
    }
}

fn body_data<C: ParserCallbacks>(callbacks: &mut C, kind: MessageKind, id: ConnectionId, data: &[u8]) -> Result<(), Error> {
    match kind {
        MessageKind::Request => callbacks.on_request_body_data(id, data),
        MessageKind::Response => callbacks.on_response_body_data(id, data),
    }
    .map_err(Error::callback)
}

impl<C: ParserCallbacks> TokenizerHandler for Adapter<'_, C> {
    fn on_message_begin(&mut self, kind: MessageKind) {
        trace!(id = self.id, ?kind, "message begin");
        self.exchange.clear();
        self.exchange.message = Some(HttpMessage::new());
        self.exchange.kind = Some(kind);
    }

    fn on_url(&mut self, url: &[u8]) {
        if let Some(message) = self.exchange.message.as_mut() {
            message.append_url(url);
        }
    }

    fn on_status(&mut self, status_code: u16, reason: &[u8]) {
        let Some(message) = self.exchange.message.as_mut() else {
            return;
        };
        message.append_status(reason);
        if let Err(error) = message.set_status_code(status_code) {
            self.pending.push(error);
        }
    }

    fn on_header_field(&mut self, name: &[u8]) {
        let Some(message) = self.exchange.message.as_mut() else {
            return;
        };
        if !self.exchange.in_field {
            self.exchange.in_field = true;
            message.open_field();
        }
        if let Some(field) = message.current_field() {
            field.append_name(name);
        }
    }

    fn on_header_value(&mut self, value: &[u8]) {
        self.exchange.in_field = false;
        if let Some(field) = self.exchange.message.as_mut().and_then(HttpMessage::current_field) {
            field.append_value(value);
        }
    }

    fn on_headers_complete(&mut self, head: &MessageHead) -> HeadersOutcome {
        let Some(message) = self.exchange.message.as_mut() else {
            return HeadersOutcome::Proceed;
        };

        if let StartLine::Request { method, .. } = head.start_line() {
            if let Err(error) = message.set_method(method) {
                self.pending.push(error);
            }
        }

        let snapshot = message.clone();
        let outcome = match head.kind() {
            MessageKind::Request => self.callbacks.on_request_received(self.id, snapshot),
            MessageKind::Response => self.callbacks.on_response_received(self.id, snapshot),
        };
        trace!(id = self.id, kind = ?head.kind(), ?outcome, "headers delivered");
        outcome
    }

    fn on_body(&mut self, data: &[u8]) {
        let Adapter { id, callbacks, exchange, config, pending } = self;
        let (Some(kind), false) = (exchange.kind, data.is_empty()) else {
            return;
        };

        if matches!(exchange.body, BodyState::NotStarted) {
            let start = body_started(*callbacks, kind, *id);
            let encoding = match (&exchange.message, start.decode) {
                (Some(message), true) => ContentEncoding::select(message),
                _ => ContentEncoding::Identity,
            };
            exchange.body = BodyState::Streaming(ContentDecoder::begin(encoding, config));
        }

        let BodyState::Streaming(decoder) = &mut exchange.body else {
            trace!(id = *id, len = data.len(), "drop body bytes of abandoned message");
            return;
        };

        if let Err(error) = decoder.feed(data, |chunk| body_data(*callbacks, kind, *id, chunk)) {
            warn!(id = *id, ?kind, cause = %error, "abandon message body");
            decoder.end();
            exchange.body = BodyState::Abandoned;
            pending.push(error);
        }
    }

    fn on_message_complete(&mut self) {
        if let (BodyState::Streaming(decoder), Some(kind)) = (&mut self.exchange.body, self.exchange.kind) {
            decoder.end();
            match kind {
                MessageKind::Request => self.callbacks.on_request_body_finished(self.id),
                MessageKind::Response => self.callbacks.on_response_body_finished(self.id),
            }
        }
        trace!(id = self.id, kind = ?self.exchange.kind, "message complete");
        self.exchange.clear();
    }
}
