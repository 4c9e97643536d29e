use crate::metrics::FailureKind;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use http_test_util::drain::{DrainBodyFuture, DrainedBody};
use http_test_util::empty_body;
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{self, Client};
use hyper_util::rt::TokioExecutor;

/// Bytes of each response body kept around for error logs.
const RETAINED_BODY: usize = 512;

pub struct Response {
    pub status: StatusCode,
    pub body: DrainedBody,
}

/// Pooled HTTP/1.1 client shared by all virtual users.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    #[must_use]
    pub fn new(max_idle_per_host: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(max_idle_per_host)
            .build(connector);
        Self { client }
    }

    /// Issues one GET and reads the body to the end.
    pub async fn get(&self, uri: &Uri) -> Result<Response> {
        let request = Request::get(uri.clone())
            .body(empty_body())
            .context("Failed to build get")?;
        let resp = self
            .client
            .request(request)
            .await
            .context("Failed to send request")?;
        let status = resp.status();
        let body = DrainBodyFuture::new(resp.into_body(), RETAINED_BODY)
            .await
            .context("Failed to read body")?;
        Ok(Response { status, body })
    }
}

/// Maps a failed request onto the sentinel recorded in its sample.
#[must_use]
pub fn classify(err: &anyhow::Error) -> FailureKind {
    let connect = err
        .chain()
        .filter_map(|e| e.downcast_ref::<legacy::Error>())
        .any(legacy::Error::is_connect);
    if connect {
        FailureKind::Connect
    } else {
        FailureKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_status_and_body() {
        let (addr, hits) = http_test_util::stub::spawn("127.0.0.1:0").await.unwrap();
        let client = HttpClient::new(4);
        let uri: Uri = format!("http://{addr}/api/kategori").parse().unwrap();
        let resp = client.get(&uri).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.total > 0);
        assert!(resp.body.snippet().contains("Kecap"));
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpClient::new(1);
        let uri: Uri = format!("http://{addr}/").parse().unwrap();
        let err = client.get(&uri).await.err().unwrap();
        assert_eq!(classify(&err), FailureKind::Connect);
    }
}
