//! Shared helpers for the stage integration tests.

#![allow(dead_code)]

use sb_resources::{MemoryCache, MemorySink, Resources};
use sb_script::{ScriptOutput, ScriptProcessor};
use sb_types::{OutputConfig, ScriptConfig};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Builds a processor over inline `code` with a single cache named `memo`.
pub async fn processor_with_cache(code: &str) -> ScriptProcessor {
    let resources = Resources::new().with_cache("memo", MemoryCache::new());
    let config = ScriptConfig::with_code(code).with_cache_res(["memo"]);
    ScriptProcessor::new(&config, Arc::new(resources))
        .await
        .unwrap()
}

/// Builds an output stage whose sinks are registered under `sinks`.
pub async fn output_with_sinks(
    code: &str,
    sinks: Vec<MemorySink>,
    config: impl FnOnce(OutputConfig) -> OutputConfig,
) -> ScriptOutput {
    let mut resources = Resources::new();
    let mut names = Vec::new();
    for sink in sinks {
        names.push(sink_name(&sink));
        resources = resources.with_sink(sink_name(&sink), sink);
    }

    let config = config(OutputConfig::new(ScriptConfig::with_code(code)).with_output_res(names));
    ScriptOutput::new(&config, Arc::new(resources)).await.unwrap()
}

fn sink_name(sink: &MemorySink) -> String {
    use sb_traits::Sink;
    sink.name().to_string()
}

/// Serves one HTTP request with `body`, reporting the raw request text.
pub async fn serve_once(body: &'static str) -> (String, oneshot::Receiver<String>) {
    serve(body, None).await
}

/// Like [`serve_once`], but holds the response until `release` fires.
pub async fn serve_held(
    body: &'static str,
    release: oneshot::Receiver<()>,
) -> (String, oneshot::Receiver<String>) {
    serve(body, Some(release)).await
}

async fn serve(
    body: &'static str,
    release: Option<oneshot::Receiver<()>>,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                break;
            }
        }

        if let Some(release) = release {
            let _ = release.await;
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
    });

    (format!("http://{addr}/"), rx)
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}
