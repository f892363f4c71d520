use async_trait::async_trait;
use awc::http::{header, StatusCode};
use bytes::Bytes;
use futures::stream::{LocalBoxStream, StreamExt};
use std::time::Duration;

use super::error::{DownloadError, DownloadResult};
use crate::config::Config;

/// 探测得到的资源信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub supports_range: bool,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// 半开区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

pub type ByteStream = LocalBoxStream<'static, DownloadResult<Bytes>>;

/// 资源传输层
///
/// awc 客户端不是 `Send` 的，实现只在创建它的 arbiter 上使用。
#[async_trait(?Send)]
pub trait Transport {
    async fn probe(&self, url: &str) -> DownloadResult<FileInfo>;

    /// `range` 为 `None` 时请求整个资源
    async fn open(&self, url: &str, range: Option<ByteRange>) -> DownloadResult<ByteStream>;
}

pub struct HttpTransport {
    client: awc::Client,
    probe_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Self {
        let client = awc::Client::builder()
            .disable_timeout()
            .add_default_header((header::USER_AGENT, config.user_agent.clone()))
            .finish();
        Self { client, probe_timeout: config.probe_timeout() }
    }
}

fn header_str(headers: &awc::http::header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

#[async_trait(?Send)]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str) -> DownloadResult<FileInfo> {
        let mut request = self.client.head(url).insert_header((header::ACCEPT_ENCODING, "identity"));
        if let Some(timeout) = self.probe_timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(format!("连接失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(DownloadError::ServerError(response.status().as_u16()));
        }

        let headers = response.headers();
        let size = header_str(headers, header::CONTENT_LENGTH)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);
        if size == 0 {
            return Err(DownloadError::UnknownLength);
        }

        Ok(FileInfo {
            size,
            supports_range: header_str(headers, header::ACCEPT_RANGES)
                .map(|s| s.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false),
            last_modified: header_str(headers, header::LAST_MODIFIED),
            etag: header_str(headers, header::ETAG),
        })
    }

    async fn open(&self, url: &str, range: Option<ByteRange>) -> DownloadResult<ByteStream> {
        // 压缩会打乱字节偏移
        let mut request = self.client.get(url).insert_header((header::ACCEPT_ENCODING, "identity"));
        if let Some(range) = range {
            request = request.insert_header((header::RANGE, range.header_value()));
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(format!("连接失败: {}", e)))?;

        let status = response.status();
        let accepted = match range {
            Some(_) => status == StatusCode::PARTIAL_CONTENT,
            None => status.is_success(),
        };
        if !accepted {
            return Err(DownloadError::ServerError(status.as_u16()));
        }

        Ok(response
            .map(|chunk| chunk.map_err(|e| DownloadError::network(format!("网络流错误: {}", e))))
            .boxed_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(&Config::default())
    }

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn test_range_header() {
        assert_eq!(ByteRange { start: 2500, end: 5000 }.header_value(), "bytes=2500-4999");
    }

    #[actix_rt::test]
    async fn test_probe_reads_length_and_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 10_000])
                    .insert_header("accept-ranges", "bytes")
                    .insert_header("etag", "\"v1\""),
            )
            .mount(&server)
            .await;

        let info = transport().probe(&format!("{}/file.bin", server.uri())).await.unwrap();
        assert_eq!(info.size, 10_000);
        assert!(info.supports_range);
        assert_eq!(info.etag.as_deref(), Some("\"v1\""));
    }

    #[actix_rt::test]
    async fn test_probe_failures() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let missing = transport().probe(&format!("{}/missing", server.uri())).await;
        assert_eq!(missing.unwrap_err(), DownloadError::ServerError(404));

        let empty = transport().probe(&format!("{}/empty", server.uri())).await;
        assert_eq!(empty.unwrap_err(), DownloadError::UnknownLength);
    }

    #[actix_rt::test]
    async fn test_open_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header_is("range", "bytes=2-5"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"2345".to_vec()))
            .mount(&server)
            .await;

        let stream = transport()
            .open(&format!("{}/file.bin", server.uri()), Some(ByteRange { start: 2, end: 6 }))
            .await
            .unwrap();
        assert_eq!(collect(stream).await, b"2345".to_vec());
    }

    #[actix_rt::test]
    async fn test_range_ignored_by_server_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/file.bin", server.uri());
        let result = transport().open(&url, Some(ByteRange { start: 2, end: 6 })).await;
        assert!(matches!(result, Err(DownloadError::ServerError(200))));

        let whole = transport().open(&url, None).await.unwrap();
        assert_eq!(collect(whole).await, b"0123456789".to_vec());
    }
}
