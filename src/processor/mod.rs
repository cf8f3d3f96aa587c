//! Envoy external-processing endpoint
//!
//! The proxy opens one bidirectional stream per HTTP request and sends a
//! request-headers event first. That event is answered with either a
//! header mutation carrying the internal token or an immediate error
//! response. Every other event is acknowledged with an empty continue of
//! the matching kind.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use crate::authz::{AuthRequest, AuthorizationEngine, Decision};

/// Generated external-processing protocol types
#[allow(clippy::pedantic, missing_docs)]
pub mod proto {
    tonic::include_proto!("envoy.service.ext_proc.v3");
}

use proto::external_processor_server::{ExternalProcessor, ExternalProcessorServer};
use proto::header_value_option::HeaderAppendAction;
use proto::processing_request::Request as Event;
use proto::processing_response::Response as Reply;
use proto::{
    BodyResponse, CommonResponse, HeaderMap, HeaderMutation, HeaderValue, HeaderValueOption,
    HeadersResponse, HttpStatus, ImmediateResponse, ProcessingRequest, ProcessingResponse,
    TrailersResponse,
};

/// Header the internal token is forwarded in
pub const ACCESS_TOKEN_HEADER: &str = "x-auth-request-access-token";

/// `details` field of immediate responses
const DENIED_DETAILS: &str = "edge_auth_denied";

/// gRPC service adapting the proxy's stream to the authorization engine
#[derive(Clone)]
pub struct ProcessorServer {
    engine: Arc<AuthorizationEngine>,
}

impl ProcessorServer {
    /// Create a processor backed by `engine`
    #[must_use]
    pub fn new(engine: Arc<AuthorizationEngine>) -> Self {
        Self { engine }
    }

    /// Wrap into a tonic service
    #[must_use]
    pub fn into_service(self) -> ExternalProcessorServer<Self> {
        ExternalProcessorServer::new(self)
    }

    /// Answer one stream event.
    pub async fn handle(&self, request: ProcessingRequest) -> ProcessingResponse {
        let reply = match request.request {
            Some(Event::RequestHeaders(headers)) => {
                let request = AuthRequest::from_headers(header_pairs(headers.headers));
                decision_reply(self.engine.authorize(&request).await)
            }
            Some(Event::ResponseHeaders(_)) => Reply::ResponseHeaders(HeadersResponse::default()),
            Some(Event::RequestBody(_)) => Reply::RequestBody(BodyResponse::default()),
            Some(Event::ResponseBody(_)) => Reply::ResponseBody(BodyResponse::default()),
            Some(Event::RequestTrailers(_)) => Reply::RequestTrailers(TrailersResponse::default()),
            Some(Event::ResponseTrailers(_)) => {
                Reply::ResponseTrailers(TrailersResponse::default())
            }
            None => {
                debug!("Processing request without an event");
                Reply::RequestHeaders(HeadersResponse::default())
            }
        };
        ProcessingResponse {
            response: Some(reply),
        }
    }
}

#[tonic::async_trait]
impl ExternalProcessor for ProcessorServer {
    type ProcessStream =
        Pin<Box<dyn Stream<Item = Result<ProcessingResponse, Status>> + Send + 'static>>;

    async fn process(
        &self,
        request: Request<Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let mut inbound = request.into_inner();
        let processor = self.clone();

        // Dropping the stream drops the in-flight decision, cancelling any
        // Directory Service call with it.
        let output = async_stream::try_stream! {
            while let Some(event) = inbound.message().await? {
                yield processor.handle(event).await;
            }
        };

        Ok(Response::new(Box::pin(output)))
    }
}

/// Header names and values; `value` wins, `raw_value` is used when it is empty.
fn header_pairs(map: Option<HeaderMap>) -> impl Iterator<Item = (String, String)> {
    map.into_iter().flat_map(|m| m.headers).filter_map(|h| {
        if h.value.is_empty() {
            String::from_utf8(h.raw_value).ok().map(|v| (h.key, v))
        } else {
            Some((h.key, h.value))
        }
    })
}

fn decision_reply(decision: Decision) -> Reply {
    match decision {
        Decision::Allow(allowed) => headers_reply(HeaderMutation {
            set_headers: vec![HeaderValueOption {
                header: Some(HeaderValue {
                    key: ACCESS_TOKEN_HEADER.to_string(),
                    value: String::new(),
                    raw_value: allowed.token.into_bytes(),
                }),
                append_action: HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
                keep_empty_value: false,
            }],
            remove_headers: Vec::new(),
        }),
        Decision::Anonymous | Decision::PassThrough => headers_reply(HeaderMutation {
            set_headers: Vec::new(),
            remove_headers: vec![ACCESS_TOKEN_HEADER.to_string()],
        }),
        Decision::Deny(denial) => Reply::ImmediateResponse(ImmediateResponse {
            status: Some(HttpStatus {
                code: i32::from(denial.status_code()),
            }),
            headers: None,
            body: denial.message().to_string(),
            details: DENIED_DETAILS.to_string(),
        }),
    }
}

fn headers_reply(mutation: HeaderMutation) -> Reply {
    Reply::RequestHeaders(HeadersResponse {
        response: Some(CommonResponse {
            header_mutation: Some(mutation),
            ..CommonResponse::default()
        }),
    })
}
