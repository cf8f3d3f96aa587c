//! External-processing stream over a real gRPC connection

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

use common::*;
use edge_auth_gateway::processor::proto::external_processor_client::ExternalProcessorClient;
use edge_auth_gateway::processor::proto::processing_request::Request as Event;
use edge_auth_gateway::processor::proto::processing_response::Response as Reply;
use edge_auth_gateway::processor::proto::{
    HeaderMap, HeaderValue, HttpBody, HttpHeaders, ProcessingRequest, ProcessingResponse,
};
use edge_auth_gateway::processor::{ACCESS_TOKEN_HEADER, ProcessorServer};

async fn start(directory: &Arc<FakeDirectory>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let processor = ProcessorServer::new(Arc::new(engine(directory, external_issuers())));
    tokio::spawn(async move {
        Server::builder()
            .add_service(processor.into_service())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

async fn client(addr: SocketAddr) -> ExternalProcessorClient<Channel> {
    ExternalProcessorClient::connect(format!("http://{addr}"))
        .await
        .unwrap()
}

fn headers(pairs: &[(&str, &str)]) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(Event::RequestHeaders(HttpHeaders {
            headers: Some(HeaderMap {
                headers: pairs
                    .iter()
                    .map(|(key, value)| HeaderValue {
                        key: (*key).to_string(),
                        value: String::new(),
                        raw_value: value.as_bytes().to_vec(),
                    })
                    .collect(),
            }),
            end_of_stream: false,
        })),
        observability_mode: false,
    }
}

async fn exchange(addr: SocketAddr, events: Vec<ProcessingRequest>) -> Vec<ProcessingResponse> {
    let mut client = client(addr).await;
    let mut replies = client
        .process(tokio_stream::iter(events))
        .await
        .unwrap()
        .into_inner();
    let mut collected = Vec::new();
    while let Some(reply) = replies.message().await.unwrap() {
        collected.push(reply);
    }
    collected
}

#[tokio::test]
async fn allowed_request_carries_internal_token() {
    // GIVEN: a known user and a processor listening on loopback
    let directory = FakeDirectory::new();
    directory.add_user("U1", user("U1", &["org-1"]));
    let addr = start(&directory).await;
    let token = identity_token(&json!({
        "sub": "U1",
        "iss": EXTERNAL_ISSUER,
        "aud": EXTERNAL_AUDIENCE,
        "auth_time": 100,
    }));
    let authorization = format!("Bearer {token}");

    // WHEN: the proxy streams request headers followed by a body chunk
    let replies = exchange(
        addr,
        vec![
            headers(&[(":path", "/api/v1/projects"), ("authorization", &authorization)]),
            ProcessingRequest {
                request: Some(Event::RequestBody(HttpBody {
                    body: b"{}".to_vec(),
                    end_of_stream: true,
                })),
                observability_mode: false,
            },
        ],
    )
    .await;

    // THEN: the headers reply sets the token and the body is acknowledged
    assert_eq!(replies.len(), 2);
    let Some(Reply::RequestHeaders(reply)) = &replies[0].response else {
        panic!("expected headers reply: {:?}", replies[0]);
    };
    let mutation = reply
        .response
        .as_ref()
        .and_then(|common| common.header_mutation.as_ref())
        .unwrap();
    let header = mutation.set_headers[0].header.as_ref().unwrap();
    assert_eq!(header.key, ACCESS_TOKEN_HEADER);
    let claims = verify(std::str::from_utf8(&header.raw_value).unwrap());
    assert_eq!(claims.sub.as_deref(), Some("user-U1"));
    assert!(matches!(replies[1].response, Some(Reply::RequestBody(_))));
}

#[tokio::test]
async fn denied_request_gets_immediate_response() {
    let directory = FakeDirectory::new();
    let addr = start(&directory).await;

    let replies = exchange(addr, vec![headers(&[("x-api-key", "geti_pat_x_y")])]).await;

    let Some(Reply::ImmediateResponse(immediate)) = &replies[0].response else {
        panic!("expected immediate response: {:?}", replies[0]);
    };
    assert_eq!(immediate.status.as_ref().map(|s| s.code), Some(400));
    assert_eq!(immediate.body, "Bad request");
}

#[tokio::test]
async fn anonymous_request_strips_token_header() {
    let directory = FakeDirectory::new();
    let addr = start(&directory).await;

    let replies = exchange(
        addr,
        vec![headers(&[
            (":path", "/api/v1/projects"),
            (ACCESS_TOKEN_HEADER, "forged"),
        ])],
    )
    .await;

    let Some(Reply::RequestHeaders(reply)) = &replies[0].response else {
        panic!("expected headers reply");
    };
    let mutation = reply
        .response
        .as_ref()
        .and_then(|common| common.header_mutation.as_ref())
        .unwrap();
    assert!(mutation.set_headers.is_empty());
    assert_eq!(mutation.remove_headers, vec![ACCESS_TOKEN_HEADER.to_string()]);
}

#[tokio::test]
async fn one_stream_answers_each_request_in_order() {
    let directory = FakeDirectory::new();
    let addr = start(&directory).await;

    let replies = exchange(
        addr,
        vec![
            headers(&[(":path", "/api/v1/projects")]),
            headers(&[]),
        ],
    )
    .await;

    assert_eq!(replies.len(), 2);
    assert!(matches!(replies[0].response, Some(Reply::RequestHeaders(_))));
    assert!(matches!(replies[1].response, Some(Reply::ImmediateResponse(_))));
}
