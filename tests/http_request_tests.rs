use webserv::buffer::Buffer;
use webserv::http::request::{HttpRequest, ParseOutcome};

fn parse(bytes: &[u8]) -> (HttpRequest, ParseOutcome) {
    let mut req = HttpRequest::new();
    let mut buf = Buffer::new();
    buf.append(bytes);
    let outcome = req.parse(&mut buf);
    (req, outcome)
}

#[test]
fn get_root_is_rewritten_to_index_and_keeps_alive() {
    let (req, outcome) =
        parse(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::Complete);
    assert_eq!(req.path, "/index.html");
    assert!(req.keep_alive());
}

#[test]
fn malformed_request_line_rejected() {
    let (_req, outcome) = parse(b"GET /\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::Malformed(400));
}

#[test]
fn a_byte_at_a_time_feed_eventually_completes() {
    let bytes = b"GET /welcome HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
    let mut req = HttpRequest::new();
    let mut buf = Buffer::new();
    let mut outcome = ParseOutcome::Incomplete;

    for &b in bytes {
        buf.append(&[b]);
        outcome = req.parse(&mut buf);
        if outcome == ParseOutcome::Complete {
            break;
        }
        assert_eq!(outcome, ParseOutcome::Incomplete);
    }
    assert_eq!(outcome, ParseOutcome::Complete);
    assert_eq!(req.path, "/welcome.html");
}

#[test]
fn registration_form_decodes_into_field_map() {
    let body = b"username=alice&password=secret";
    let mut bytes = format!(
        "POST /register.html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(b"\r\n");

    let (req, outcome) = parse(&bytes);
    assert_eq!(outcome, ParseOutcome::Complete);
    assert_eq!(req.path, "/register.html");
    assert_eq!(req.form.get("username").map(String::as_str), Some("alice"));
    assert_eq!(req.form.get("password").map(String::as_str), Some("secret"));
}
