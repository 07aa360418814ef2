use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::template::{render_value, substitute, substitute_value};
use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// Issues one HTTP request described by the node config.
///
/// `url`, header values, query params and the body all go through
/// placeholder substitution against the node input before sending.
#[derive(Debug, Clone)]
pub struct HttpNode {
    client: Client,
}

impl HttpNode {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for HttpNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let data = Value::Object(input);

        let method = parse_method(node.config_str("method").unwrap_or("GET"))?;
        let url = substitute(node.config_str("url").unwrap_or(""), &data);
        if url.trim().is_empty() {
            return Err(NodeError::InvalidConfig {
                field: "url",
                message: "no url provided".into(),
            });
        }

        info!(node_id = %node.id, %method, %url, "http request");
        let mut request = self.client.request(method.clone(), &url);

        for (name, value) in string_pairs(node, "headers", &data)? {
            request = request.header(name, value);
        }
        let params = string_pairs(node, "params", &data)?;
        if !params.is_empty() {
            request = request.query(&params);
        }

        if method == Method::POST || method == Method::PUT {
            request = match request_body(node, &data) {
                Body::Json(body) => request.json(&body),
                Body::Text(text) => request.body(text),
            };
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), Value::String(val.to_string())))
            })
            .collect();

        let body = response.text().await?;
        debug!(node_id = %node.id, status, bytes = body.len(), "http response");

        // JSON when it parses, raw text otherwise.
        let body = serde_json::from_str(&body).unwrap_or(Value::String(body));

        Ok(json!({
            "status_code": status,
            "headers": headers,
            "data": body,
        }))
    }
}

fn parse_method(method: &str) -> Result<Method, NodeError> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        other => Err(NodeError::Unsupported(format!("unsupported HTTP method: {other}"))),
    }
}

enum Body {
    Json(Value),
    Text(String),
}

fn request_body(node: &NodeDefinition, data: &Value) -> Body {
    match node.config_field("data") {
        None => Body::Json(Value::Object(Map::new())),
        Some(Value::String(raw)) => {
            let raw = substitute(raw, data);
            match serde_json::from_str(&raw) {
                Ok(parsed) => Body::Json(parsed),
                Err(_) => Body::Text(raw),
            }
        }
        Some(structured) => Body::Json(substitute_value(structured, data)),
    }
}

/// A config object flattened to `(name, rendered value)` pairs.
fn string_pairs(
    node: &NodeDefinition,
    field: &'static str,
    data: &Value,
) -> Result<Vec<(String, String)>, NodeError> {
    match node.config_field(field) {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), render_value(&substitute_value(v, data))))
            .collect()),
        Some(other) => Err(NodeError::InvalidConfig {
            field,
            message: format!("expected an object, found {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot server that answers with a JSON echo of the request line,
    /// the `x-token` header and the body.
    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let head_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while raw.len() < head_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
            }

            let token = head
                .lines()
                .find_map(|line| line.strip_prefix("x-token: "))
                .unwrap_or("")
                .to_string();
            let body = String::from_utf8_lossy(&raw[head_end..]).to_string();
            let payload = json!({
                "request_line": head.lines().next().unwrap_or(""),
                "token": token,
                "body": body,
            })
            .to_string();

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn http() -> HttpNode {
        HttpNode::with_client(Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn get_with_substituted_url_headers_and_params() {
        let base = echo_server().await;
        let config = json!({
            "url": format!("{base}/users/{{{{src.id}}}}"),
            "headers": { "x-token": "t-{{src.id}}" },
            "params": { "page": 2 },
        });

        let out = http()
            .execute(&node(NodeKind::Http, config), input(json!({ "src": { "id": 7 } })), &ctx())
            .await
            .unwrap();

        assert_eq!(out["status_code"], 200);
        assert_eq!(out["headers"]["content-type"], "application/json");
        assert_eq!(out["data"]["request_line"], "GET /users/7?page=2 HTTP/1.1");
        assert_eq!(out["data"]["token"], "t-7");
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let base = echo_server().await;
        let config = json!({
            "method": "post",
            "url": base,
            "data": "{\"name\": \"{{src.name}}\"}",
        });

        let out = http()
            .execute(&node(NodeKind::Http, config), input(json!({ "src": { "name": "ada" } })), &ctx())
            .await
            .unwrap();

        assert_eq!(out["data"]["request_line"], "POST / HTTP/1.1");
        let sent: Value = serde_json::from_str(out["data"]["body"].as_str().unwrap()).unwrap();
        assert_eq!(sent, json!({ "name": "ada" }));
    }

    #[tokio::test]
    async fn unsupported_method_is_reported() {
        let err = http()
            .execute(
                &node(NodeKind::Http, json!({ "method": "patch", "url": "http://localhost" })),
                input(json!({})),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported HTTP method: PATCH");
    }

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let err = http()
            .execute(&node(NodeKind::Http, json!({})), input(json!({})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig { field: "url", .. }));
    }
}
