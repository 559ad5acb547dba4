use crate::config;
use std::sync::Arc;
use tracing::error;

#[must_use]
pub fn get_client(config: &Arc<config::Config>) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "TRANSPORT | Unable to build intake client: {}, falling back to defaults without proxy",
                e
            );
            reqwest::Client::builder()
                .connect_timeout(config.http_timeout())
                .timeout(config.http_timeout())
                .build()
                .unwrap_or_default()
        }
    }
}

fn build_client(config: &Arc<config::Config>) -> Result<reqwest::Client, reqwest::Error> {
    // Covers connect, read and write: reqwest has no separate read/write knobs
    let client = reqwest::Client::builder()
        .connect_timeout(config.http_timeout())
        .timeout(config.http_timeout());
    // This covers FLUSHGUARD_HTTPS_PROXY and HTTPS_PROXY
    if let Some(https_uri) = &config.https_proxy {
        let proxy = reqwest::Proxy::https(https_uri.clone())?;
        client.proxy(proxy).build()
    } else {
        client.build()
    }
}
