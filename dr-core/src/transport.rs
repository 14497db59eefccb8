//! HTTP transport to a Site Manager endpoint: GET/POST dispatch by body
//! presence, bounded retry, and SSL error classification.
//!
//! Grounded in `examples/original_source/common/utils.py::io_make_http_json_request`
//! (a `requests.Session` with a `Retry` adapter, POST iff the body is
//! non-empty, and SSL errors classified via `ssl.SSLErrorNumber` substring
//! matching) and in the teacher's `reqwest::Client` usage in
//! `k8s/operators/ph_operator/src/controllers/dr_controller.rs::send_notification`.

use std::time::Duration;

use serde_json::Value;

use crate::error::TransportError;

/// `SSL_ERROR_SSL` from Python's `ssl.SSLErrorNumber` — certificate
/// verification / handshake failure.
pub const SSL_ERROR_SSL: i64 = 1;
/// `SSL_ERROR_EOF` — the peer closed the connection mid-handshake.
pub const SSL_ERROR_EOF: i64 = 8;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub verify: bool,
    /// CA bundles to trust in addition to the system roots. Both sites'
    /// bundles are added to the single process-global client (spec.md §5's
    /// "transport session pool is process-global"), since `-k/--insecure`
    /// is the only per-run TLS override and it applies uniformly.
    pub ca_certs: Vec<std::path::PathBuf>,
    pub token: Option<String>,
    pub use_auth: bool,
    pub retries: u32,
    pub get_timeout: Duration,
    pub post_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            verify: true,
            ca_certs: Vec::new(),
            token: None,
            use_auth: true,
            retries: 3,
            get_timeout: Duration::from_secs(10),
            post_timeout: Duration::from_secs(30),
        }
    }
}

/// The triple the original returns from every request: success flag,
/// decoded JSON body (empty object on any failure), and a classified code.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub ok: bool,
    pub body: Value,
    /// `Some(http_status)` on a real response, `Some(SSL_ERROR_SSL|SSL_ERROR_EOF)`
    /// on a classified SSL failure, `None` on the false-sentinel (decode or
    /// network error).
    pub code: Option<i64>,
}

pub struct Transport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl Transport {
    pub fn new(config: TransportConfig) -> crate::error::Result<Self> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!config.verify);
        for ca in &config.ca_certs {
            let pem = std::fs::read(ca).map_err(|e| {
                crate::error::DrError::Configuration(format!(
                    "failed to read cacert {}: {e}",
                    ca.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                crate::error::DrError::Configuration(format!("invalid cacert {}: {e}", ca.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| crate::error::DrError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Transport { client, config })
    }

    /// POSTs if `body` is `Some`, GETs otherwise. Retries up to
    /// `config.retries` times on network errors; never retries an
    /// SSL-classified failure. `token_override` takes precedence over the
    /// client's configured token — sites carry distinct bearer tokens in
    /// configuration, while the HTTP client itself (and its retry/TLS
    /// policy) is shared process-wide per spec.md §5's "transport session
    /// pool is process-global" rule.
    pub async fn request(&self, url: &str, body: Option<Value>, token_override: Option<&str>) -> TransportResponse {
        let timeout = if body.is_some() {
            self.config.post_timeout
        } else {
            self.config.get_timeout
        };

        let mut attempts_left = self.config.retries.max(1);
        loop {
            let mut req = if let Some(b) = &body {
                self.client.post(url).json(b)
            } else {
                self.client.get(url)
            };
            req = req.timeout(timeout);
            if self.config.use_auth {
                let token = token_override.or(self.config.token.as_deref());
                if let Some(token) = token {
                    if !token.is_empty() {
                        req = req.bearer_auth(token);
                    }
                }
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    return match resp.json::<Value>().await {
                        Ok(body) => TransportResponse {
                            ok: (200..300).contains(&status),
                            body,
                            code: Some(status as i64),
                        },
                        Err(_) => TransportResponse {
                            ok: false,
                            body: Value::Object(Default::default()),
                            code: None,
                        },
                    };
                }
                Err(err) => {
                    if let Some(ssl) = classify_ssl_error(&err) {
                        let code = match ssl {
                            TransportError::SslUntrusted => SSL_ERROR_SSL,
                            TransportError::SslEof => SSL_ERROR_EOF,
                            _ => unreachable!(),
                        };
                        return TransportResponse {
                            ok: false,
                            body: Value::Object(Default::default()),
                            code: Some(code),
                        };
                    }
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        return TransportResponse {
                            ok: false,
                            body: Value::Object(Default::default()),
                            code: None,
                        };
                    }
                }
            }
        }
    }
}

/// Inspects a `reqwest::Error`'s source chain for substrings identifying
/// an SSL verification or EOF failure, the same way the Python original
/// string-matches `ssl.SSLError.args` before mapping to `SSLErrorNumber`.
fn classify_ssl_error(err: &reqwest::Error) -> Option<TransportError> {
    let mut source: Option<&(dyn std::error::Error + 'static)> = err.source();
    while let Some(cause) = source {
        let msg = cause.to_string().to_lowercase();
        if msg.contains("certificate verify failed")
            || msg.contains("unknownissuer")
            || msg.contains("unknown issuer")
            || msg.contains("self signed certificate")
            || msg.contains("invalidcertificate")
        {
            return Some(TransportError::SslUntrusted);
        }
        if msg.contains("unexpected eof") || msg.contains("eof while parsing") || msg.contains("connection closed") {
            return Some(TransportError::SslEof);
        }
        source = cause.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_dispatches_when_body_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemanager"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"services": {}})))
            .mount(&server)
            .await;

        let t = Transport::new(TransportConfig::default()).unwrap();
        let resp = t.request(&format!("{}/sitemanager", server.uri()), None, None).await;
        assert!(resp.ok);
        assert_eq!(resp.code, Some(200));
    }

    #[tokio::test]
    async fn post_dispatches_when_body_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sitemanager"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "ok"})))
            .mount(&server)
            .await;

        let t = Transport::new(TransportConfig::default()).unwrap();
        let body = serde_json::json!({"procedure": "active", "run-service": "svc"});
        let resp = t.request(&format!("{}/sitemanager", server.uri()), Some(body), None).await;
        assert!(resp.ok);
    }

    #[tokio::test]
    async fn non_2xx_status_is_not_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sitemanager"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({"wrong-service": "svc"})))
            .mount(&server)
            .await;

        let t = Transport::new(TransportConfig::default()).unwrap();
        let body = serde_json::json!({"procedure": "active", "run-service": "svc"});
        let resp = t.request(&format!("{}/sitemanager", server.uri()), Some(body), None).await;
        assert!(!resp.ok);
        assert_eq!(resp.code, Some(400));
    }
}
