//! Certificate authority and a live mutual-TLS endpoint standing in for a
//! cluster's Docker daemon.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use carina::bundle::CredentialBundle;
use carina::shell::Shell;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName, DnType,
    DnValue, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// PEM material for a CA, a server certificate for 127.0.0.1 and a client
/// certificate, all signed by the CA.
pub struct TlsMaterial {
    pub ca_pem: String,
    pub ca_key_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
    pub client_cert_pem: String,
    pub client_key_pem: String,
}

fn named(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_owned()));
    dn
}

impl TlsMaterial {
    /// Generate a fresh CA and leaf certificates.
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().expect("CA key should generate");
        let mut ca_params = CertificateParams::default();
        ca_params.distinguished_name = named("carina test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .expect("CA should self-sign");
        let ca_pem = ca_cert.pem();
        let issuer =
            Issuer::from_ca_cert_pem(&ca_pem, &ca_key).expect("issuer should load from PEM");

        let server_key = KeyPair::generate().expect("server key should generate");
        let mut server_params = CertificateParams::default();
        server_params.distinguished_name = named("swarm");
        server_params.subject_alt_names =
            vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params
            .signed_by(&server_key, &issuer)
            .expect("server certificate should sign");

        let client_key = KeyPair::generate().expect("client key should generate");
        let mut client_params = CertificateParams::default();
        client_params.distinguished_name = named("alice");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_cert = client_params
            .signed_by(&client_key, &issuer)
            .expect("client certificate should sign");

        Self {
            ca_key_pem: ca_key.serialize_pem(),
            ca_pem,
            server_cert_pem: server_cert.pem(),
            server_key_pem: server_key.serialize_pem(),
            client_cert_pem: client_cert.pem(),
            client_key_pem: client_key.serialize_pem(),
        }
    }

    /// Sign a PEM certificate signing request with the CA.
    pub fn sign_csr(&self, csr_pem: &str) -> String {
        let ca_key = KeyPair::from_pem(&self.ca_key_pem).expect("CA key should parse");
        let issuer = Issuer::from_ca_cert_pem(&self.ca_pem, &ca_key)
            .expect("issuer should load from PEM");
        CertificateSigningRequestParams::from_pem(csr_pem)
            .expect("CSR should parse")
            .signed_by(&issuer)
            .expect("CSR should sign")
            .pem()
    }

    /// A bundle whose `DOCKER_HOST` points at `address`.
    pub fn bundle_for(&self, address: SocketAddr) -> CredentialBundle {
        let docker_host = format!("tcp://{address}");
        let mut bundle = CredentialBundle {
            ca: self.ca_pem.clone().into_bytes(),
            ca_key: b"not released".to_vec(),
            cert: self.client_cert_pem.clone().into_bytes(),
            key: self.client_key_pem.clone().into_bytes(),
            docker_env: Shell::Bash.env_script(&docker_host).into_bytes(),
            ..CredentialBundle::default()
        };
        for shell in [Shell::Fish, Shell::Powershell, Shell::Cmd] {
            bundle.extra.insert(
                shell.script_name().to_owned(),
                shell.env_script(&docker_host).into_bytes(),
            );
        }
        bundle
    }
}

/// A TLS listener requiring client certificates signed by the test CA.
pub struct DockerEndpoint {
    pub address: SocketAddr,
    task: JoinHandle<()>,
}

impl Drop for DockerEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl DockerEndpoint {
    /// Listen on an ephemeral port and complete handshakes until dropped.
    pub async fn spawn(material: &TlsMaterial) -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut roots = RootCertStore::empty();
        roots
            .add(
                CertificateDer::from_pem_slice(material.ca_pem.as_bytes())
                    .expect("CA should parse"),
            )
            .expect("CA should be accepted as a root");
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .expect("client verifier should build");
        let chain = vec![
            CertificateDer::from_pem_slice(material.server_cert_pem.as_bytes())
                .expect("server certificate should parse"),
        ];
        let key = PrivateKeyDer::from_pem_slice(material.server_key_pem.as_bytes())
            .expect("server key should parse");
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("protocol versions should be supported")
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .expect("server config should build");
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");
        let task = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut stream) = acceptor.accept(tcp).await {
                        stream.shutdown().await.ok();
                    }
                });
            }
        });

        Self { address, task }
    }
}
