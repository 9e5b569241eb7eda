//! Forwarding headers and loop detection.
//!
//! # Responsibilities
//! - Detect requests that already passed through this proxy
//! - Add `X-Forwarded-For` and `X-Forwarded-Proto` before relaying

use crate::http::Request;

pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
pub const X_FORWARDED_PROTO: &str = "X-Forwarded-Proto";

/// True when the client's address already appears in `X-Forwarded-For`.
pub fn contains_loop(request: &Request) -> bool {
    let client = request.client_addr();
    request
        .header()
        .list(X_FORWARDED_FOR)
        .any(|hop| hop == client)
}

/// Record this hop on a request about to be relayed.
pub fn add_forwarding_headers(request: &mut Request) {
    let client = request.client_addr().to_string();
    let header = request.header_mut();
    header.set(X_FORWARDED_PROTO, "http");
    header.append_list(X_FORWARDED_FOR, &client);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn request_from(client: &str, forwarded_for: Option<&str>) -> Request {
        let mut request = Request::new(Method::Get, "example.com", 80, "/");
        request.set_client_addr(client);
        if let Some(chain) = forwarded_for {
            request.header_mut().set(X_FORWARDED_FOR, chain);
        }
        request
    }

    #[test]
    fn loop_detected_anywhere_in_chain() {
        assert!(contains_loop(&request_from("10.0.0.5", Some("203.0.113.9, 10.0.0.5"))));
        assert!(contains_loop(&request_from("203.0.113.9", Some("203.0.113.9, 10.0.0.5"))));
        assert!(!contains_loop(&request_from("10.0.0.6", Some("203.0.113.9, 10.0.0.5"))));
    }

    #[test]
    fn missing_header_is_not_a_loop() {
        assert!(!contains_loop(&request_from("10.0.0.5", None)));
    }

    #[test]
    fn entries_match_whole() {
        assert!(!contains_loop(&request_from("10.0.0.5", Some("10.0.0.50"))));
    }

    #[test]
    fn forwarding_headers_are_added() {
        let mut request = request_from("10.0.0.5", None);
        add_forwarding_headers(&mut request);
        assert_eq!(request.header().get(X_FORWARDED_FOR), Some("10.0.0.5"));
        assert_eq!(request.header().get(X_FORWARDED_PROTO), Some("http"));

        let mut request = request_from("10.0.0.5", Some("203.0.113.9"));
        request.header_mut().set(X_FORWARDED_PROTO, "https");
        add_forwarding_headers(&mut request);
        assert_eq!(request.header().get(X_FORWARDED_FOR), Some("203.0.113.9, 10.0.0.5"));
        assert_eq!(request.header().get(X_FORWARDED_PROTO), Some("http"));
    }
}
