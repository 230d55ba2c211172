//! Request dispatch tests
//!
//! The keyword grammar end to end: payload text in, handler call out.

use minecraft_agent::dispatch::{Dispatcher, LoggingHandler};
use minecraft_agent::protocol::{InboundMessage, Request};
use minecraft_agent::testing::{CapturedLogs, HandlerCall, RecordingHandler};
use proptest::prelude::*;

fn message(payload: &str) -> InboundMessage {
    InboundMessage::new("minecraft", payload.to_string(), 2)
}

#[tokio::test]
async fn test_documented_examples() {
    let dispatcher = Dispatcher::new(RecordingHandler::new());

    let facebook = dispatcher.dispatch(&message("fb:hello")).await.unwrap();
    let twitter = dispatcher.dispatch(&message("tw:world")).await.unwrap();
    let unknown = dispatcher.dispatch(&message("other:x")).await.unwrap();

    assert_eq!(
        facebook,
        Request::Facebook {
            argument: "hello".to_string()
        }
    );
    assert_eq!(
        twitter,
        Request::Twitter {
            argument: "world".to_string()
        }
    );
    assert_eq!(
        unknown,
        Request::Unknown {
            keyword: "other".to_string()
        }
    );
    assert_eq!(
        dispatcher.handler().calls(),
        vec![
            HandlerCall::Facebook("hello".to_string()),
            HandlerCall::Twitter("world".to_string()),
            HandlerCall::Unknown("other".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_logging_handler_accepts_everything() {
    let dispatcher = Dispatcher::new(LoggingHandler::new());

    for payload in ["fb:hello", "twitter:", "", ":", "other:x", "FaceBook:Mixed"] {
        assert!(dispatcher.dispatch(&message(payload)).await.is_ok());
    }
}

#[tokio::test]
async fn test_logging_handler_reports_each_branch() {
    let logs = CapturedLogs::new();
    let _guard = tracing::subscriber::set_default(logs.subscriber(tracing::Level::INFO));
    let dispatcher = Dispatcher::new(LoggingHandler::new());

    for payload in ["fb:hello", "tw:world", "other:x"] {
        dispatcher.dispatch(&message(payload)).await.unwrap();
    }

    assert_eq!(
        logs.lines_containing("Processing Facebook request: hello").len(),
        1
    );
    assert_eq!(
        logs.lines_containing("Processing Twitter request: world").len(),
        1
    );
    let unknown = logs.lines_containing("Unknown request");
    assert_eq!(unknown.len(), 1);
    assert!(unknown[0].contains("keyword=other"));
    // Each arrival is announced before dispatch
    assert_eq!(logs.lines_containing("Message:\tfb:hello").len(), 1);
}

#[test]
fn test_edge_payloads() {
    assert_eq!(
        Request::parse(""),
        Request::Unknown {
            keyword: String::new()
        }
    );
    assert_eq!(
        Request::parse(":hello"),
        Request::Unknown {
            keyword: String::new()
        }
    );
    // Whitespace is part of the keyword
    assert_eq!(
        Request::parse(" fb:hello"),
        Request::Unknown {
            keyword: " fb".to_string()
        }
    );
    assert_eq!(
        Request::parse("tw"),
        Request::Twitter {
            argument: String::new()
        }
    );
}

fn facebook_keyword() -> impl Strategy<Value = String> {
    prop_oneof![Just("facebook"), Just("fb")].prop_flat_map(|keyword| {
        proptest::collection::vec(any::<bool>(), keyword.len()).prop_map(move |upper| {
            keyword
                .chars()
                .zip(upper)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn prop_facebook_keyword_any_case(keyword in facebook_keyword(), argument in "[^:]*") {
        let request = Request::parse(&format!("{keyword}:{argument}"));
        prop_assert_eq!(request, Request::Facebook { argument });
    }

    #[test]
    fn prop_argument_is_second_token_only(argument in "[^:]*", rest in ".*") {
        let request = Request::parse(&format!("tw:{argument}:{rest}"));
        prop_assert_eq!(request, Request::Twitter { argument });
    }

    #[test]
    fn prop_other_keywords_are_unknown(keyword in "[a-z]{1,12}", argument in "[^:]*") {
        prop_assume!(!["facebook", "fb", "twitter", "tw"].contains(&keyword.as_str()));
        let request = Request::parse(&format!("{keyword}:{argument}"));
        prop_assert_eq!(request, Request::Unknown { keyword });
    }

    #[test]
    fn prop_parse_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let message = InboundMessage::new("minecraft", payload, 0);
        let _ = message.request();
        let _ = message.summary();
    }
}
