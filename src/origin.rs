use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config;
use crate::timeseries::{decode_samples, OriginRequest, Sample};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The origin collaborator: read-only sample fetches for one missing
/// extent. The proxy bounds every call with its configured timeout.
pub trait OriginClient: Send + Sync {
    fn fetch(&self, req: OriginRequest) -> BoxFuture<Result<Vec<Sample>>>;
}

/// HTTP origin client. Expects the origin to answer a range query with a
/// JSON array of `{"timestamp": .., "value": ..}` objects.
#[derive(Clone)]
pub struct HttpOriginClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpOriginClient {
    pub fn new(cfg: &config::Origin) -> HttpOriginClient {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let https = if cfg.insecure_skip_verify {
            let tls = insecure_tls_config();
            HttpsConnectorBuilder::new()
                .with_tls_config(tls)
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .wrap_connector(connector)
        } else {
            HttpsConnectorBuilder::new()
                .with_native_roots()
                .expect("native tls roots")
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .wrap_connector(connector)
        };
        let mut builder = Client::builder(TokioExecutor::new());
        if cfg.max_idle_conns_per_host > 0 {
            builder.pool_max_idle_per_host(cfg.max_idle_conns_per_host);
        }
        HttpOriginClient {
            client: builder.build(https),
        }
    }
}

impl OriginClient for HttpOriginClient {
    fn fetch(&self, req: OriginRequest) -> BoxFuture<Result<Vec<Sample>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let request = http::Request::builder()
                .method(Method::GET)
                .uri(req.uri.clone())
                .body(Full::new(Bytes::new()))
                .context("build origin request")?;
            let resp = client.request(request).await.context("origin request")?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .context("read origin body")?
                .to_bytes();
            if !status.is_success() {
                return Err(anyhow!(
                    "origin returned {status} for {} {}",
                    req.statement,
                    req.extent
                ));
            }
            decode_samples(&body)
        })
    }
}

fn insecure_tls_config() -> rustls::ClientConfig {
    let provider = rustls::crypto::ring::default_provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.into())
        .with_safe_default_protocol_versions()
        .expect("tls versions");
    let verifier = Arc::new(NoVerifier {});
    builder
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth()
}

#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
