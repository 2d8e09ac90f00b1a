//! Origin fallback: plain HTTP GET of a segment URL.

use std::time::Duration;

use anyhow::Context;

/// HTTP client shared by room discovery and origin fetches. `timeout` bounds each whole request.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")
}

pub async fn fetch_segment(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<u8>> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()
        .with_context(|| format!("origin refused {}", url))?;
    let body = resp
        .bytes()
        .await
        .with_context(|| format!("reading body of {}", url))?;
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn stalled_origin_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the socket without ever answering.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = http_client(Duration::from_millis(200)).unwrap();
        let url = format!("http://{}/seg1.ts", addr);
        let res = tokio::time::timeout(Duration::from_secs(5), fetch_segment(&client, &url))
            .await
            .expect("client timeout should fire first");
        assert!(res.is_err());
    }
}
