use std::{borrow::Cow, io};

use rustls::{CertificateError, Error as RustlsError};
use thiserror::Error;

use crate::known_hosts::KnownHostsError;

/// TLS 传输错误映射模块。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将 `rustls`/IO 层的错误统一收敛到少数几个稳定类别，协议层据此决定是否重试或提示用户；
/// - 错误码使用 `spark.transport.tls.*` 命名空间，运维脚本无需解析底层库的文案即可定位问题。
///
/// ## 逻辑（How）
/// - `Stage` 描述一次 TLS 操作所处的阶段（构建上下文、握手、校验），提供默认文案；
/// - `map_handshake_error` 先从 `io::Error` 中取出嵌套的 `rustls::Error`（即“引擎错误栈”中唯一待处理的错误），
///   再结合已收到的字节数判断对端是否根本不支持 TLS；
/// - `engine_error` 用于上下文构建阶段直接返回 `rustls::Error` 的场景。
///
/// ## 契约（What）
/// - 所有映射函数返回的 [`TlsError`] 均带稳定错误码与可读文案；
/// - 本层不做任何重试，失败一律原样上抛。
///
/// ## 风险与权衡（Trade-offs）
/// - 证书类 `rustls` 错误统一归为 `VerificationFailed`，其余协议错误归为 `UnexpectedError`，细节保留在文案中。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TlsErrorKind {
    /// 内存分配失败。
    Allocation,
    /// 描述符、文件或账本读写失败。
    Io,
    /// 对端完成了交互却未发送任何 TLS 字节，通常意味着服务端未启用 TLS。
    NoServerTlsSupport,
    /// 证书链或主机身份校验失败，或 TOFU 决策为不信任。
    VerificationFailed,
    /// 证书结构异常，例如主机名字段内嵌 NUL。
    MalformedCertificate,
    /// 加密引擎返回的其它不透明错误。
    UnexpectedError,
}

impl TlsErrorKind {
    /// 稳定错误码。
    pub const fn code(self) -> &'static str {
        match self {
            TlsErrorKind::Allocation => "spark.transport.tls.allocation_failed",
            TlsErrorKind::Io => "spark.transport.tls.io_failed",
            TlsErrorKind::NoServerTlsSupport => "spark.transport.tls.no_server_tls_support",
            TlsErrorKind::VerificationFailed => "spark.transport.tls.verification_failed",
            TlsErrorKind::MalformedCertificate => "spark.transport.tls.malformed_certificate",
            TlsErrorKind::UnexpectedError => "spark.transport.tls.unexpected_error",
        }
    }
}

/// TLS 层对外暴露的唯一错误类型。
///
/// 只携带类别与文案，可廉价克隆；加密引擎的一次性初始化结果会被记录下来并分发给所有调用者。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}: {message}", .kind.code())]
pub struct TlsError {
    kind: TlsErrorKind,
    message: Cow<'static, str>,
}

impl TlsError {
    pub fn new(kind: TlsErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TlsErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<KnownHostsError> for TlsError {
    fn from(error: KnownHostsError) -> Self {
        TlsError::new(TlsErrorKind::Io, error.to_string())
    }
}

/// 描述一次 TLS 操作所处阶段的默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct Stage {
    pub message: &'static str,
}

pub(crate) const CONTEXT: Stage = Stage {
    message: "tls context",
};

pub(crate) const HANDSHAKE: Stage = Stage {
    message: "tls handshake",
};

pub(crate) const VERIFY: Stage = Stage {
    message: "tls verify",
};

pub(crate) const ENGINE_INIT: Stage = Stage {
    message: "crypto engine init",
};

/// 上下文构建等阶段直接拿到 `rustls::Error` 时的映射。
pub(crate) fn engine_error(stage: Stage, error: RustlsError) -> TlsError {
    TlsError::new(
        categorize_rustls_error(&error),
        format!("{}: {}", stage.message, error),
    )
}

/// 文件类错误（证书、私钥、CA 目录）统一映射为 `UnexpectedError`，并带上路径。
pub(crate) fn material_error(
    stage: Stage,
    what: &str,
    path: &std::path::Path,
    detail: impl std::fmt::Display,
) -> TlsError {
    TlsError::new(
        TlsErrorKind::UnexpectedError,
        format!("{}: {} {}: {}", stage.message, what, path.display(), detail),
    )
}

/// 将握手阶段的 `io::Error` 映射为 [`TlsError`]。
///
/// # 契约（What）
/// - `received`：握手期间从对端实际收到的字节数；
/// - 对端未发送任何字节即关闭、且没有待处理的引擎错误时，返回 `NoServerTlsSupport`；
/// - 嵌套 `rustls::Error` 时按其语义归类，其余 IO 错误保留为 `Io`（内存不足为 `Allocation`）。
pub(crate) fn map_handshake_error(error: io::Error, received: u64) -> TlsError {
    if let Some(engine) = drain_engine_error(&error) {
        return TlsError::new(
            categorize_rustls_error(engine),
            format!("{}: {}", HANDSHAKE.message, engine),
        );
    }
    match error.kind() {
        io::ErrorKind::UnexpectedEof if received == 0 => TlsError::new(
            TlsErrorKind::NoServerTlsSupport,
            "server does not support TLS",
        ),
        io::ErrorKind::OutOfMemory => TlsError::new(
            TlsErrorKind::Allocation,
            format!("{}: {}", HANDSHAKE.message, error),
        ),
        _ => TlsError::new(
            TlsErrorKind::Io,
            format!("{}: {}", HANDSHAKE.message, error),
        ),
    }
}

/// 取出 `io::Error` 内嵌的引擎错误；`rustls` 每次只携带一个错误，不存在需要枚举的错误栈。
pub(crate) fn drain_engine_error(error: &io::Error) -> Option<&RustlsError> {
    error.get_ref()?.downcast_ref::<RustlsError>()
}

fn categorize_rustls_error(error: &RustlsError) -> TlsErrorKind {
    match error {
        RustlsError::InvalidCertificate(CertificateError::BadEncoding) => {
            TlsErrorKind::MalformedCertificate
        }
        RustlsError::InvalidCertificate(_) | RustlsError::NoCertificatesPresented => {
            TlsErrorKind::VerificationFailed
        }
        _ => TlsErrorKind::UnexpectedError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_peer_means_no_tls_support() {
        let err = map_handshake_error(io::Error::from(io::ErrorKind::UnexpectedEof), 0);
        assert_eq!(err.kind(), TlsErrorKind::NoServerTlsSupport);
        assert_eq!(err.code(), "spark.transport.tls.no_server_tls_support");
    }

    #[test]
    fn eof_after_bytes_is_plain_io() {
        let err = map_handshake_error(io::Error::from(io::ErrorKind::UnexpectedEof), 42);
        assert_eq!(err.kind(), TlsErrorKind::Io);
    }

    #[test]
    fn nested_engine_error_takes_precedence() {
        let nested = io::Error::new(
            io::ErrorKind::InvalidData,
            RustlsError::InvalidCertificate(CertificateError::Expired),
        );
        let err = map_handshake_error(nested, 0);
        assert_eq!(err.kind(), TlsErrorKind::VerificationFailed);
        assert!(err.message().starts_with("tls handshake"));

        let protocol = io::Error::new(io::ErrorKind::InvalidData, RustlsError::DecryptError);
        assert_eq!(
            map_handshake_error(protocol, 10).kind(),
            TlsErrorKind::UnexpectedError
        );
    }

    #[test]
    fn display_carries_code_and_message() {
        let err = TlsError::new(TlsErrorKind::MalformedCertificate, "embedded NUL");
        assert_eq!(
            err.to_string(),
            "spark.transport.tls.malformed_certificate: embedded NUL"
        );
    }
}
