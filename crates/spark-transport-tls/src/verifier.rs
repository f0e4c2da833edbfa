//! 证书链校验与握手后的信任决策。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - `rustls` 默认在握手中直接拒绝无法校验的证书链，而数据库客户端需要把“自签名”“缺失颁发者”
//!   这类软失败交给 TOFU 账本处理；
//! - 因此校验器只**记录**链校验结论（[`ChainVerdict`]），让握手继续，握手结束后再由
//!   [`evaluate`] 结合主机名与配置给出最终决定。
//!
//! ## 逻辑（How）
//! - [`RecordingVerifier::verify_server_cert`] 调用 `verify_server_cert_signed_by_trust_anchor`
//!   做纯链校验（不含主机名），把 `rustls::Error` 按出示的证书链形态映射为细分结论；
//! - 握手签名（TLS 1.2/1.3 `CertificateVerify`）照常强制校验，证书持有者必须握有私钥；
//! - [`evaluate`] 是纯函数：链有效时再看主机名，主机名不符与软失败同路；内存不足与其它失败直接拒绝。
//!
//! ## 契约（What）
//! - 每个会话独享一个校验器实例，结论只写一次、读一次；
//! - 软失败集合：叶子自签名、链中含自签名证书、找不到颁发者（本地或整体）、孤立叶子无法验证；
//!   签名与颁发者公钥不符（伪造证书）一律是硬失败。
//!
//! ## 风险与权衡（Trade-offs）
//! - 握手在链未通过时仍会完成，调用方必须在交付任何应用数据前调用 [`evaluate`]，
//!   `TlsSession::connect` 保证了这一点。

use std::sync::Arc;

use rustls::{
    CertificateError, DigitallySignedStruct, Error as RustlsError, RootCertStore, SignatureScheme,
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        verify_server_cert_signed_by_trust_anchor,
    },
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    server::ParsedCertificate,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tracing::debug;
use x509_parser::{certificate::X509Certificate, prelude::FromDer};

use crate::{
    error::{TlsError, TlsErrorKind},
    hostname::HostnameMatch,
};

/// 加密引擎原生链校验的结论。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainVerdict {
    Valid,
    /// 叶子证书自签名且不在信任锚中。
    DepthZeroSelfSigned,
    /// 链中出现了不受信任的自签名证书。
    SelfSignedInChain,
    /// 出示了中间证书，但叶子的颁发者不在其中，链在中途断开。
    UnableToGetIssuer,
    /// 出示的链首尾相接，但链顶证书的颁发者在本地信任锚中找不到。
    UnableToGetIssuerLocally,
    /// 只出示了一张非自签名叶子证书，且找不到其颁发者。
    UnableToVerifyLeafSignature,
    OutOfMemory,
    /// 其它硬失败（过期、吊销、用途不符等），保留原始描述。
    Rejected(String),
}

impl ChainVerdict {
    /// 是否属于可回退到 TOFU 的软失败。
    pub fn is_soft_failure(&self) -> bool {
        matches!(
            self,
            ChainVerdict::DepthZeroSelfSigned
                | ChainVerdict::SelfSignedInChain
                | ChainVerdict::UnableToGetIssuer
                | ChainVerdict::UnableToGetIssuerLocally
                | ChainVerdict::UnableToVerifyLeafSignature
        )
    }

    pub fn description(&self) -> &str {
        match self {
            ChainVerdict::Valid => "ok",
            ChainVerdict::DepthZeroSelfSigned => "self-signed certificate",
            ChainVerdict::SelfSignedInChain => "self-signed certificate in certificate chain",
            ChainVerdict::UnableToGetIssuer => "unable to get issuer certificate",
            ChainVerdict::UnableToGetIssuerLocally => "unable to get local issuer certificate",
            ChainVerdict::UnableToVerifyLeafSignature => {
                "unable to verify the first certificate"
            }
            ChainVerdict::OutOfMemory => "out of memory",
            ChainVerdict::Rejected(reason) => reason,
        }
    }
}

/// 握手结束后的最终决定。
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// 软失败且允许回退：以指纹咨询 TOFU 账本。
    ConsultKnownHosts,
    Reject(TlsError),
}

/// 根据链结论、主机名匹配结果与 `trust_known_hosts` 给出决定。
pub fn evaluate(verdict: &ChainVerdict, hostname: HostnameMatch, trust_known_hosts: bool) -> Decision {
    let soft = match verdict {
        ChainVerdict::Valid => match hostname {
            HostnameMatch::Matched => return Decision::Accept,
            HostnameMatch::Malformed => {
                return Decision::Reject(TlsError::new(
                    TlsErrorKind::MalformedCertificate,
                    "malformed certificate: embedded NUL in host identity",
                ));
            }
            // 链有效但主机名不符，与软失败走同一条回退路径。
            HostnameMatch::NotMatched => "certificate does not match hostname",
        },
        ChainVerdict::OutOfMemory => {
            return Decision::Reject(TlsError::new(
                TlsErrorKind::Allocation,
                "out of memory during certificate verification",
            ));
        }
        soft if soft.is_soft_failure() => soft.description(),
        hard => {
            return Decision::Reject(TlsError::new(
                TlsErrorKind::VerificationFailed,
                format!("certificate verify failed: {}", hard.description()),
            ));
        }
    };

    if trust_known_hosts {
        Decision::ConsultKnownHosts
    } else {
        Decision::Reject(TlsError::new(
            TlsErrorKind::VerificationFailed,
            format!("certificate verify failed: {soft}"),
        ))
    }
}

/// 把 `rustls` 的链校验错误映射为细分结论。
pub(crate) fn classify_chain(
    error: &RustlsError,
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
) -> ChainVerdict {
    match error {
        RustlsError::InvalidCertificate(CertificateError::UnknownIssuer) => {
            if is_self_signed(end_entity) {
                ChainVerdict::DepthZeroSelfSigned
            } else if intermediates.iter().any(is_self_signed) {
                ChainVerdict::SelfSignedInChain
            } else if intermediates.is_empty() {
                ChainVerdict::UnableToVerifyLeafSignature
            } else if issued_by_any(end_entity, intermediates) {
                ChainVerdict::UnableToGetIssuerLocally
            } else {
                ChainVerdict::UnableToGetIssuer
            }
        }
        // 签名与信任锚公钥不符即伪造证书，归入硬失败。
        other => ChainVerdict::Rejected(other.to_string()),
    }
}

fn is_self_signed(cert: &CertificateDer<'_>) -> bool {
    X509Certificate::from_der(cert.as_ref())
        .map(|(_, parsed)| parsed.subject().as_raw() == parsed.issuer().as_raw())
        .unwrap_or(false)
}

fn issued_by_any(cert: &CertificateDer<'_>, candidates: &[CertificateDer<'_>]) -> bool {
    let Ok((_, parsed)) = X509Certificate::from_der(cert.as_ref()) else {
        return false;
    };
    let issuer = parsed.issuer().as_raw();
    candidates.iter().any(|candidate| {
        X509Certificate::from_der(candidate.as_ref())
            .map(|(_, parsed)| parsed.subject().as_raw() == issuer)
            .unwrap_or(false)
    })
}

/// 只记录链校验结论、不中断握手的服务端证书校验器。
#[derive(Debug)]
pub struct RecordingVerifier {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
    verdict: spin::Mutex<Option<ChainVerdict>>,
}

impl RecordingVerifier {
    pub fn new(roots: Arc<RootCertStore>, provider: Arc<CryptoProvider>) -> Self {
        Self {
            roots,
            provider,
            verdict: spin::Mutex::new(None),
        }
    }

    /// 取走握手期间记录的结论；对端未出示证书时为 `None`。
    pub fn take_verdict(&self) -> Option<ChainVerdict> {
        self.verdict.lock().take()
    }

    fn check_chain(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> ChainVerdict {
        let result = ParsedCertificate::try_from(end_entity).and_then(|leaf| {
            verify_server_cert_signed_by_trust_anchor(
                &leaf,
                &self.roots,
                intermediates,
                now,
                self.provider.signature_verification_algorithms.all,
            )
        });
        match result {
            Ok(()) => ChainVerdict::Valid,
            Err(err) => classify_chain(&err, end_entity, intermediates),
        }
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        let verdict = self.check_chain(end_entity, intermediates, now);
        debug!(
            verdict = verdict.description(),
            intermediates = intermediates.len(),
            "server certificate chain checked"
        );
        *self.verdict.lock() = Some(verdict);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
