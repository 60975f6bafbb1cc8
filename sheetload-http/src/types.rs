use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
    /// Time from sending the request until the body was fully read.
    pub latency: Duration,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        let mut req = Self::new(http::Method::POST, url);
        req.body = body;
        req
    }

    /// POST with a JSON-encoded body and `content-type: application/json`.
    pub fn post_json<T: Serialize + ?Sized>(url: impl Into<String>, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        Ok(Self::post(url, Bytes::from(bytes)).header("content-type", "application/json"))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_json_sets_body_and_content_type() {
        let req = HttpRequest::post_json(
            "http://localhost/api/auth/login",
            &serde_json::json!({"username": "u", "password": "p"}),
        )
        .unwrap_or_else(|e| panic!("encode: {e}"));

        assert_eq!(req.method, http::Method::POST);
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let decoded: serde_json::Value =
            serde_json::from_slice(&req.body).unwrap_or_else(|e| panic!("decode: {e}"));
        assert_eq!(decoded["username"], "u");
    }

    #[test]
    fn bearer_adds_authorization_header() {
        let req = HttpRequest::get("http://localhost/api/auth/me").bearer("abc");
        assert_eq!(
            req.headers,
            vec![("authorization".to_string(), "Bearer abc".to_string())]
        );
    }

    #[test]
    fn response_helpers() {
        let res = HttpResponse {
            status: 201,
            body: Bytes::from_static(br#"{"token":"t"}"#),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            latency: Duration::from_millis(3),
        };
        assert!(res.is_success());
        let v: serde_json::Value = res.json().unwrap_or_else(|e| panic!("json: {e}"));
        assert_eq!(v["token"], "t");
    }
}
