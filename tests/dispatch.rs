mod support;

use contact_dispatch::{Dispatcher, ErrorKind, RawRequest, TransportError};
use support::{config, RecordingConnector, Script};

fn ada() -> RawRequest {
    RawRequest {
        name: Some("Ada".into()),
        from: Some("ada@x.com".into()),
        to: Some("owner@y.com".into()),
        subject: Some("Hi".into()),
        message: Some("Hello\nWorld".into()),
        urgency: Some("urgent".into()),
        requester_id: Some("user-7".into()),
        timestamp: Some("2024-05-01T10:00:00.000Z".into()),
        reply_to: None,
    }
}

#[tokio::test]
async fn delivers_primary_and_acknowledgment() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.message_id.as_deref(), Some("<receipt-1@double.test>"));

    let journal = journal.borrow();
    assert_eq!(journal.opens, 1);
    assert_eq!(journal.verifies, 1);
    assert_eq!(journal.sent.len(), 2);
    assert_eq!(journal.closes, 1);

    let primary = &journal.sent[0];
    assert_eq!(primary.to[0].email, "owner@y.com");
    assert!(primary.subject.contains("🔴"));
    assert!(primary.subject.contains("Hi"));
    assert!(primary.subject.contains("Ada"));
    let text = primary.text.as_deref().unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let hello = lines.iter().position(|l| *l == "Hello").unwrap();
    assert_eq!(lines[hello + 1], "World");
    assert!(primary.html.as_deref().unwrap().contains("Hello<br>\nWorld"));
    assert_eq!(primary.reply_to.as_ref().unwrap().email, "ada@x.com");
    assert_eq!(primary.from.email, "contact@site.com");

    let ack = &journal.sent[1];
    assert_eq!(ack.to[0].email, "ada@x.com");
    assert!(ack.subject.contains("Hi"));
    assert!(!ack.text.as_deref().unwrap().contains("Hello\nWorld"));
    assert!(!ack.html.as_deref().unwrap().contains("World"));
}

#[tokio::test]
async fn invalid_sender_address_never_touches_transport() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let mut request = ada();
    request.from = Some("not-an-email".into());
    let outcome = dispatcher.dispatch(request).await;

    assert!(!outcome.success);
    assert_eq!(outcome.kind(), Some(ErrorKind::ValidationError));
    assert_eq!(outcome.message_id, None);
    assert_eq!(journal.borrow().calls(), 0);
}

#[tokio::test]
async fn missing_required_fields_never_touch_transport() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let mut no_name = ada();
    no_name.name = None;
    let mut no_from = ada();
    no_from.from = Some(String::new());
    let mut no_message = ada();
    no_message.message = None;

    for request in [no_name, no_from, no_message] {
        let outcome = dispatcher.dispatch(request).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::ValidationError));
        assert!(outcome.error.unwrap().message.starts_with("Missing required field"));
    }
    assert_eq!(journal.borrow().calls(), 0);
}

#[tokio::test]
async fn undotted_recipient_domain_is_rejected() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let mut request = ada();
    request.to = Some("owner@localhost".into());
    let outcome = dispatcher.dispatch(request).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::ValidationError));
    assert_eq!(journal.borrow().calls(), 0);
}

#[tokio::test]
async fn authentication_failure_on_verify_sends_nothing() {
    let (connector, journal) = RecordingConnector::failing_verify(TransportError::Authentication(
        "535 5.7.8 Username and Password not accepted".into(),
    ));
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.kind(), Some(ErrorKind::AuthenticationError));
    let journal = journal.borrow();
    assert_eq!(journal.send_attempts, 0);
    assert_eq!(journal.closes, 1);
}

#[tokio::test]
async fn connection_refused_on_verify_is_connectivity_error() {
    let (connector, journal) = RecordingConnector::failing_verify(TransportError::Connection(
        "connection refused".into(),
    ));
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::ConnectivityError));
    let failure = outcome.error.unwrap();
    assert_eq!(failure.message, ErrorKind::ConnectivityError.user_message());
    assert!(failure.diagnostic.unwrap().contains("connection refused"));
    assert_eq!(journal.borrow().send_attempts, 0);
}

#[tokio::test]
async fn acknowledgment_failure_does_not_change_outcome() {
    let (connector, journal) =
        RecordingConnector::failing_send(1, TransportError::Rejected("550 mailbox unavailable".into()));
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.message_id.as_deref(), Some("<receipt-1@double.test>"));

    let journal = journal.borrow();
    assert_eq!(journal.send_attempts, 2);
    assert_eq!(journal.sent.len(), 1);
    assert_eq!(journal.failures.len(), 1);
    assert!(journal.failures[0].contains("ada@x.com"));
}

#[tokio::test]
async fn primary_failure_skips_acknowledgment() {
    let (connector, journal) =
        RecordingConnector::failing_send(0, TransportError::Rejected("552 message too large".into()));
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.kind(), Some(ErrorKind::UnknownTransportError));
    assert!(outcome
        .error
        .unwrap()
        .diagnostic
        .unwrap()
        .contains("552 message too large"));
    let journal = journal.borrow();
    assert_eq!(journal.send_attempts, 1);
    assert!(journal.sent.is_empty());
}

#[tokio::test]
async fn timeout_during_primary_send_is_connectivity_error() {
    let (connector, _journal) =
        RecordingConnector::failing_send(0, TransportError::Timeout("SMTP send after 60000ms".into()));
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::ConnectivityError));
}

#[tokio::test]
async fn open_failure_skips_verify() {
    let (connector, journal) = RecordingConnector::new(Script {
        open_error: Some(TransportError::Config("empty SMTP host".into())),
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(connector, config());

    let outcome = dispatcher.dispatch(ada()).await;

    assert_eq!(outcome.kind(), Some(ErrorKind::UnknownTransportError));
    let journal = journal.borrow();
    assert_eq!(journal.opens, 1);
    assert_eq!(journal.verifies, 0);
    assert_eq!(journal.closes, 0);
}

#[tokio::test]
async fn repeated_calls_produce_distinct_receipts() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let first = dispatcher.dispatch(ada()).await;
    let second = dispatcher.dispatch(ada()).await;

    assert!(first.success && second.success);
    assert_ne!(first.message_id, second.message_id);
    let journal = journal.borrow();
    assert_eq!(journal.opens, 2);
    assert_ne!(journal.sent[0].message_id, journal.sent[2].message_id);
}

#[tokio::test]
async fn missing_recipient_falls_back_to_configured_one() {
    let (connector, journal) = RecordingConnector::succeeding();
    let mut cfg = config();
    cfg.default_recipient = Some("inbox@site.com".into());
    let dispatcher = Dispatcher::new(connector, cfg);

    let mut request = ada();
    request.to = None;
    let outcome = dispatcher.dispatch(request).await;

    assert!(outcome.success);
    assert_eq!(journal.borrow().sent[0].to[0].email, "inbox@site.com");
}

#[tokio::test]
async fn reply_to_override_and_lenient_urgency() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let mut request = ada();
    request.reply_to = Some("desk@x.com".into());
    request.urgency = Some("whenever".into());
    let outcome = dispatcher.dispatch(request).await;

    assert!(outcome.success);
    let journal = journal.borrow();
    let primary = &journal.sent[0];
    assert_eq!(primary.reply_to.as_ref().unwrap().email, "desk@x.com");
    assert!(primary.subject.starts_with("🟢"));
    // the acknowledgment still goes to the sender address
    assert_eq!(journal.sent[1].to[0].email, "ada@x.com");
}

#[tokio::test]
async fn markup_in_message_is_escaped_in_envelope() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let mut request = ada();
    request.message = Some("<img src=x onerror=alert(1)> & more".into());
    dispatcher.dispatch(request).await;

    let journal = journal.borrow();
    let html = journal.sent[0].html.as_deref().unwrap();
    assert!(!html.contains("<img"));
    assert!(html.contains("&lt;img src=x onerror=alert(1)&gt; &amp; more"));
}

#[tokio::test]
async fn line_breaks_in_name_and_subject_stay_inside_their_headers() {
    let (connector, journal) = RecordingConnector::succeeding();
    let dispatcher = Dispatcher::new(connector, config());

    let mut request = ada();
    request.name = Some("Ada\r\nX-Injected: evil".into());
    request.subject = Some("Hi\r\nX-Ack-Injected: evil".into());
    let outcome = dispatcher.dispatch(request).await;

    assert!(outcome.success);
    let journal = journal.borrow();
    assert_eq!(journal.sent.len(), 2);
    for envelope in &journal.sent {
        let mime = envelope.to_mime();
        let head = &mime[..mime.find("\r\n\r\n").unwrap()];
        for line in head.split("\r\n") {
            assert!(!line.starts_with("X-Injected"), "{}", line);
            assert!(!line.starts_with("X-Ack-Injected"), "{}", line);
        }
    }
}
