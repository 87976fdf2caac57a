mod common;

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use common::{Call, FakeApi, Recorder};
use parley_core::{
    ConversationCreation, LocalAttachment, SendCancellation, ServiceContext, StreamingTransport,
    TransportError,
};

fn transport(api: &Arc<FakeApi>) -> StreamingTransport {
    let context = ServiceContext {
        service_code: Some("support".to_string()),
        provider_id: Some("prov-1".to_string()),
        model: Some("gpt-4o-mini".to_string()),
    };
    StreamingTransport::new(api.clone(), context, ConversationCreation::Eager)
}

fn deferred(api: &Arc<FakeApi>) -> StreamingTransport {
    StreamingTransport::new(
        api.clone(),
        ServiceContext::default(),
        ConversationCreation::Deferred,
    )
}

#[tokio::test]
async fn test_deltas_arrive_in_order() {
    let api = Arc::new(FakeApi::streaming(&[
        "data: {\"delta\":\"uno\"}\n\ndata: {\"delta\":\" dos\"}\n\n",
        "data: {\"delta\":\" tres\"}\n\n",
        "data: {\"delta\":\" cuatro\"}\n\n",
    ]));
    let mut rec = Recorder::default();

    let outcome = transport(&api)
        .send(Some("c0"), "cuenta", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(rec.deltas(), vec!["uno", " dos", " tres", " cuatro"]);
    assert_eq!(outcome.conversation_id.as_deref(), Some("c0"));
    assert_eq!(outcome.stats.deltas, 4);
}

#[tokio::test]
async fn test_known_id_skips_creation() {
    let api = Arc::new(FakeApi::streaming(&["data: {\"delta\":\"x\"}\n\n"]));
    let mut rec = Recorder::default();

    transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(api.create_calls(), 0);
    assert!(matches!(
        &api.calls()[0],
        Call::Open { conversation_id: Some(id), .. } if id == "c0"
    ));
}

#[tokio::test]
async fn test_invalid_json_frame_is_delivered_verbatim() {
    let api = Arc::new(FakeApi::streaming(&[
        "data: {\"delta\":\"a\"}\n\ndata: plain <b>text</b>\n\ndata: {\"delta\":\"b\"}\n\n",
    ]));
    let mut rec = Recorder::default();

    let result = transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await;

    assert!(result.is_ok());
    assert_eq!(rec.deltas(), vec!["a", "plain <b>text</b>", "b"]);
}

#[tokio::test]
async fn test_missing_id_creates_exactly_once() {
    let api = Arc::new(FakeApi::streaming(&[
        "data: {\"delta\":\"Hola\"}\n\n",
        "data: {\"delta\":\" mundo\"}\n\n",
    ]));
    let mut rec = Recorder::default();

    let outcome = transport(&api)
        .send(None, "Hola, necesito ayuda con mi factura del mes pasado por favor", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(api.create_calls(), 1);
    assert!(rec
        .calls
        .iter()
        .all(|(_, id)| id.as_deref() == Some("created-1")));
    assert_eq!(outcome.conversation_id.as_deref(), Some("created-1"));

    let calls = api.calls();
    let Call::Create(request) = &calls[0] else {
        panic!("first call should create the conversation: {calls:?}");
    };
    assert_eq!(request.title, "Hola, necesito ayuda con mi factura del mes pasa");
    assert_eq!(request.service_code.as_deref(), Some("support"));
    assert_eq!(request.provider_id.as_deref(), Some("prov-1"));
    assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
    assert!(matches!(
        &calls[1],
        Call::Open { conversation_id: Some(id), .. } if id == "created-1"
    ));
}

#[tokio::test]
async fn test_empty_id_counts_as_missing() {
    let api = Arc::new(FakeApi::streaming(&[]));
    let mut rec = Recorder::default();

    transport(&api)
        .send(Some(""), "hola", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(api.create_calls(), 1);
}

#[tokio::test]
async fn test_create_failure_fails_fast() {
    let mut fake = FakeApi::streaming(&["data: {\"delta\":\"never\"}\n\n"]);
    fake.create_status = StatusCode::INTERNAL_SERVER_ERROR;
    let api = Arc::new(fake);
    let mut rec = Recorder::default();

    let err = transport(&api)
        .send(None, "hola", &[], rec.sink())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(rec.calls.is_empty());
    // No retry, and the send is never issued
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test]
async fn test_asserted_id_overrides_for_rest_of_stream() {
    let api = Arc::new(FakeApi::streaming(&[
        "data: {\"delta\":\"a\"}\n\n",
        "data: {\"delta\":\"b\",\"conversationId\":\"c1\"}\n\n",
        "data: {\"delta\":\"c\"}\n\n",
        "data: {\"delta\":\"d\"}\n\n",
    ]));
    let mut rec = Recorder::default();

    let outcome = transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap();

    let ids: Vec<Option<&str>> = rec.calls.iter().map(|(_, id)| id.as_deref()).collect();
    assert_eq!(ids, vec![Some("c0"), Some("c1"), Some("c1"), Some("c1")]);
    assert_eq!(outcome.conversation_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_rejected_send_emits_nothing() {
    let mut fake = FakeApi::streaming(&["{\"error\":\"quota exceeded\"}"]);
    fake.stream_status = StatusCode::PAYMENT_REQUIRED;
    let api = Arc::new(fake);
    let mut rec = Recorder::default();

    let err = transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap_err();

    assert!(rec.calls.is_empty());
    match err {
        TransportError::Rejected { status, body } => {
            assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
            assert_eq!(body, "{\"error\":\"quota exceeded\"}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_frame_split_across_chunks() {
    let api = Arc::new(FakeApi::streaming(&["data: {\"delta\":\"Hol", "a\"}\n\n"]));
    let mut rec = Recorder::default();

    let outcome = transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(rec.deltas(), vec!["Hola"]);
    assert_eq!(outcome.stats.frames, 1);
}

#[tokio::test]
async fn test_server_assigned_id_scenario() {
    let api = Arc::new(FakeApi::streaming(&[
        "data: {\"delta\":\"Hola\"}\n\n",
        "data: {\"delta\":\" mundo\",\"conversationId\":\"c1\"}\n\n",
    ]));
    let mut rec = Recorder::default();

    let outcome = deferred(&api)
        .send(None, "hola", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(
        rec.calls,
        vec![
            ("Hola".to_string(), None),
            (" mundo".to_string(), Some("c1".to_string())),
        ]
    );
    assert_eq!(outcome.conversation_id.as_deref(), Some("c1"));
    assert_eq!(api.create_calls(), 0);
    assert!(matches!(
        &api.calls()[0],
        Call::Open {
            conversation_id: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_deferred_without_assertion_ends_without_id() {
    let api = Arc::new(FakeApi::streaming(&["data: {\"delta\":\"x\"}\n\n"]));
    let mut rec = Recorder::default();

    let outcome = deferred(&api)
        .send(None, "hola", &[], rec.sink())
        .await
        .unwrap();

    assert!(outcome.conversation_id.is_none());
    assert_eq!(rec.deltas(), vec!["x"]);
}

#[tokio::test]
async fn test_unterminated_trailing_frame_is_flushed() {
    let api = Arc::new(FakeApi::streaming(&[
        "data: {\"delta\":\"casi\"}\n\n",
        "data: {\"delta\":\"fin\"}",
    ]));
    let mut rec = Recorder::default();

    transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap();

    assert_eq!(
        rec.calls.last(),
        Some(&("fin".to_string(), Some("c0".to_string())))
    );
    assert_eq!(rec.deltas(), vec!["casi", "fin"]);
}

#[tokio::test]
async fn test_missing_body_is_unsupported() {
    let api = Arc::new(FakeApi::with_body(None));
    let mut rec = Recorder::default();

    let err = transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::StreamingUnsupported));
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_delivered_deltas() {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"data: {\"delta\":\"parcial\"}\n\n")),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        )),
        Ok(Bytes::from_static(b"data: {\"delta\":\"never\"}\n\n")),
    ];
    let api = Arc::new(FakeApi::with_body(Some(futures::stream::iter(chunks).boxed())));
    let mut rec = Recorder::default();

    let err = transport(&api)
        .send(Some("c0"), "hi", &[], rec.sink())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Stream(_)));
    assert_eq!(rec.deltas(), vec!["parcial"]);
}

#[tokio::test]
async fn test_attachments_are_mapped_into_request() {
    let api = Arc::new(FakeApi::streaming(&[]));
    let attachment = LocalAttachment {
        url: "https://files.example/contrato.pdf".to_string(),
        key: Some("tenant-1/contrato.pdf".to_string()),
        filename: Some("contrato.pdf".to_string()),
        mime_type: Some("application/pdf".to_string()),
        size_bytes: Some(1024),
        ..LocalAttachment::default()
    };
    let mut rec = Recorder::default();

    transport(&api)
        .send(Some("c0"), "revisa esto", &[attachment], rec.sink())
        .await
        .unwrap();

    let calls = api.calls();
    let Call::Open { message, .. } = &calls[0] else {
        panic!("expected a send: {calls:?}");
    };
    assert_eq!(message.content, "revisa esto");
    assert_eq!(message.attachments.len(), 1);
    assert_eq!(message.attachments[0].name.as_deref(), Some("contrato.pdf"));
    assert_eq!(
        message.attachments[0].storage_key.as_deref(),
        Some("tenant-1/contrato.pdf")
    );
}

#[tokio::test]
async fn test_cancel_stops_reading() {
    // One frame, then a body that never ends
    let body = futures::stream::iter(vec![Ok(Bytes::from_static(
        b"data: {\"delta\":\"first\"}\n\n",
    ))])
    .chain(futures::stream::pending())
    .boxed();
    let api = Arc::new(FakeApi::with_body(Some(body)));
    let cancel = CancellationToken::new();
    let mut deltas = Vec::new();

    let err = transport(&api)
        .send_with_cancel(Some("c0"), "hi", &[], &cancel, |delta: &str, _: Option<&str>| {
            deltas.push(delta.to_string());
            cancel.cancel();
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(deltas, vec!["first"]);
}

#[tokio::test]
async fn test_cancelled_before_start_issues_no_calls() {
    let api = Arc::new(FakeApi::streaming(&["data: {\"delta\":\"x\"}\n\n"]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut rec = Recorder::default();

    let err = transport(&api)
        .send_with_cancel(None, "hi", &[], &cancel, rec.sink())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(api.calls().is_empty());
    assert!(rec.calls.is_empty());
}

#[tokio::test]
async fn test_cancel_drops_rest_of_chunk() {
    let api = Arc::new(FakeApi::streaming(&[concat!(
        "data: {\"delta\":\"one\"}\n\n",
        "data: {\"delta\":\"two\"}\n\n",
        "data: {\"delta\":\"three\"}\n\n",
    )]));
    let cancellation = SendCancellation::new();
    let mut deltas = Vec::new();

    let err = transport(&api)
        .send_with_cancel(
            Some("c0"),
            "hi",
            &[],
            cancellation.token(),
            |delta: &str, _: Option<&str>| {
                deltas.push(delta.to_string());
                cancellation.cancel();
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(cancellation.was_interrupted());
    assert_eq!(deltas, vec!["one"]);
}

#[tokio::test]
async fn test_concurrent_sends_are_independent() {
    let api = Arc::new(FakeApi::routed(&[
        (
            "x",
            &[
                "data: {\"delta\":\"a1\",\"conversationId\":\"A\"}\n\n",
                "data: {\"delta\":\"a2\"}\n\n",
            ],
        ),
        (
            "y",
            &[
                "data: {\"delta\":\"b1\"}\n\n",
                "data: {\"delta\":\"b2\",\"conversationId\":\"B\"}\n\n",
            ],
        ),
    ]));
    let shared = transport(&api);
    let (mut r1, mut r2) = (Recorder::default(), Recorder::default());

    let (o1, o2) = tokio::join!(
        shared.send(Some("x"), "1", &[], r1.sink()),
        shared.send(Some("y"), "2", &[], r2.sink()),
    );

    assert_eq!(o1.unwrap().conversation_id.as_deref(), Some("A"));
    assert_eq!(o2.unwrap().conversation_id.as_deref(), Some("B"));
    assert_eq!(
        r1.calls,
        vec![
            ("a1".to_string(), Some("A".to_string())),
            ("a2".to_string(), Some("A".to_string())),
        ]
    );
    assert_eq!(
        r2.calls,
        vec![
            ("b1".to_string(), Some("y".to_string())),
            ("b2".to_string(), Some("B".to_string())),
        ]
    );
    assert_eq!(api.create_calls(), 0);
}
