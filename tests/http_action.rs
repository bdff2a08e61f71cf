//! `http` action against a throwaway local responder

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crash::action::{Action, Http};
use crash::common::config::HttpConfig;
use crash::{Error, Value};

/// Answers every request with 201, echoing the method in `X-Echo-Method`
/// and the request body (or `hello`) as the response body
async fn responder() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let (head_len, content_length) = loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                        let length = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .map(|v| v.trim().parse::<usize>().unwrap())
                            .unwrap_or(0);
                        break (pos + 4, length);
                    }
                };
                while buf.len() < head_len + content_length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }

                let head = String::from_utf8_lossy(&buf[..head_len]).to_string();
                let method = head.split_whitespace().next().unwrap_or("").to_string();
                let body = match &buf[head_len..] {
                    b"" => "hello".to_string(),
                    rest => String::from_utf8_lossy(rest).to_string(),
                };
                let response = format!(
                    "HTTP/1.1 201 Created\r\nContent-Type: text/plain\r\nX-Echo-Method: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    method,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_get_result_data() {
    let addr = responder().await;
    let http = Http::new(&HttpConfig::default()).unwrap();

    let result = http
        .run(&params(&[("url", &format!("http://{}/", addr))]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.data["status-code"], Value::Int(201));
    assert_eq!(result.data["body"], Value::from("hello"));
    assert_eq!(result.data["raw-body"], Value::Bytes(b"hello".to_vec()));
    let Value::Map(headers) = &result.data["headers"] else {
        panic!("headers is not a map");
    };
    assert_eq!(headers["content-type"], Value::from("text/plain"));
    assert_eq!(headers["x-echo-method"], Value::from("GET"));
}

#[tokio::test]
async fn test_post_with_body_and_lowercase_method() {
    let addr = responder().await;
    let http = Http::new(&HttpConfig::default()).unwrap();

    let result = http
        .run(
            &params(&[
                ("url", &format!("http://{}/items", addr)),
                ("method", "post"),
                ("body", "ping"),
            ]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.data["body"], Value::from("ping"));
    let headers = &result.data["headers"];
    assert_eq!(
        headers.extract(&Value::from("X-Echo-Method")),
        Value::from("POST")
    );
}

#[tokio::test]
async fn test_connection_refused_is_action_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let http = Http::new(&HttpConfig::default()).unwrap();
    let err = http
        .run(&params(&[("url", &format!("http://{}/", addr))]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_action_failure());
}

#[tokio::test]
async fn test_missing_url() {
    let http = Http::new(&HttpConfig::default()).unwrap();
    let err = http.run(&HashMap::new(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::MissingParam { .. }));
}

#[tokio::test]
async fn test_cancelled_request() {
    // Accepts but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let http = Http::new(&HttpConfig::default()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = http
        .run(&params(&[("url", &format!("http://{}/", addr))]), cancel)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "http failed: cancelled");
}
