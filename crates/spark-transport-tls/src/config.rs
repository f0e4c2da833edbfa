use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use crate::{
    error::{TlsError, TlsErrorKind},
    known_hosts::{KnownHosts, UnverifiedHostCallback},
};

/// 默认账本位于用户主目录下的 `.spark/known_hosts`。
const DEFAULT_KNOWN_HOSTS_DIR: &str = ".spark";
const DEFAULT_KNOWN_HOSTS_FILE: &str = "known_hosts";

/// 私钥口令回调。
///
/// 私钥文件为加密 PKCS#8 时被调用一次；返回 `None` 表示放弃，连接以错误结束。
pub trait PasswordCallback: Send + Sync {
    fn password(&self, key_path: &Path) -> Option<String>;
}

impl<F> PasswordCallback for F
where
    F: Fn(&Path) -> Option<String> + Send + Sync,
{
    fn password(&self, key_path: &Path) -> Option<String> {
        self(key_path)
    }
}

/// 单次连接尝试所引用的 TLS 配置。
///
/// # 设计动机（Why）
/// - 配置由调用方持有，本层只读引用；会话以 `Arc<TlsConfig>` 共享，连接期间保持不可变；
/// - 路径类字段可以直接从 TOML 片段反序列化，回调只能通过代码挂载。
///
/// # 契约（What）
/// - `private_key_path`：PEM 文件，同时包含客户端证书链与私钥；
/// - `ca_file`/`ca_dir`：信任锚来源，二者均未设置时信任锚为空，所有证书都会进入 TOFU 流程；
/// - `known_hosts_path`：指纹账本路径，未设置时使用 [`default_known_hosts_path`]；
/// - `trust_known_hosts`：为 `false` 时，链校验的软失败直接视为硬失败，不再咨询账本。
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    private_key_path: Option<PathBuf>,
    ca_file: Option<PathBuf>,
    ca_dir: Option<PathBuf>,
    known_hosts_path: Option<PathBuf>,
    trust_known_hosts: bool,
    #[serde(skip)]
    password_callback: Option<Arc<dyn PasswordCallback>>,
    #[serde(skip)]
    unverified_host_callback: Option<Arc<dyn UnverifiedHostCallback>>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            private_key_path: None,
            ca_file: None,
            ca_dir: None,
            known_hosts_path: None,
            trust_known_hosts: true,
            password_callback: None,
            unverified_host_callback: None,
        }
    }
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 片段解析路径类配置。
    ///
    /// ```toml
    /// ca_file = "/etc/spark/ca.pem"
    /// known_hosts_path = "/var/lib/spark/known_hosts"
    /// trust_known_hosts = false
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, TlsError> {
        toml::from_str(source).map_err(|err| {
            TlsError::new(
                TlsErrorKind::UnexpectedError,
                format!("tls config: {}", err.message()),
            )
        })
    }

    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_password_callback(mut self, callback: impl PasswordCallback + 'static) -> Self {
        self.password_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    pub fn with_ca_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_dir = Some(path.into());
        self
    }

    pub fn with_known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn with_trust_known_hosts(mut self, trust: bool) -> Self {
        self.trust_known_hosts = trust;
        self
    }

    pub fn with_unverified_host_callback(
        mut self,
        callback: impl UnverifiedHostCallback + 'static,
    ) -> Self {
        self.unverified_host_callback = Some(Arc::new(callback));
        self
    }

    pub fn private_key_path(&self) -> Option<&Path> {
        self.private_key_path.as_deref()
    }

    pub fn password_callback(&self) -> Option<&dyn PasswordCallback> {
        self.password_callback.as_deref()
    }

    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }

    pub fn ca_dir(&self) -> Option<&Path> {
        self.ca_dir.as_deref()
    }

    pub fn trust_known_hosts(&self) -> bool {
        self.trust_known_hosts
    }

    pub fn unverified_host_callback(&self) -> Option<&dyn UnverifiedHostCallback> {
        self.unverified_host_callback.as_deref()
    }

    /// 实际生效的账本路径。
    pub fn known_hosts_path(&self) -> PathBuf {
        self.known_hosts_path
            .clone()
            .unwrap_or_else(default_known_hosts_path)
    }

    /// 打开（但不读取）配置指向的指纹账本。
    pub fn known_hosts(&self) -> KnownHosts {
        KnownHosts::new(self.known_hosts_path())
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("private_key_path", &self.private_key_path)
            .field("ca_file", &self.ca_file)
            .field("ca_dir", &self.ca_dir)
            .field("known_hosts_path", &self.known_hosts_path)
            .field("trust_known_hosts", &self.trust_known_hosts)
            .field("password_callback", &self.password_callback.is_some())
            .field(
                "unverified_host_callback",
                &self.unverified_host_callback.is_some(),
            )
            .finish()
    }
}

/// 用户级默认账本路径：`$HOME/.spark/known_hosts`，无主目录时退化为当前目录下的同名路径。
pub fn default_known_hosts_path() -> PathBuf {
    let base = std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .unwrap_or_default();
    base.join(DEFAULT_KNOWN_HOSTS_DIR)
        .join(DEFAULT_KNOWN_HOSTS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::known_hosts::{HostDecision, TrustReason};

    #[test]
    fn defaults_trust_known_hosts_and_use_home_ledger() {
        let config = TlsConfig::new();
        assert!(config.trust_known_hosts());
        assert!(config.private_key_path().is_none());
        assert!(
            config
                .known_hosts_path()
                .ends_with(Path::new(".spark").join("known_hosts"))
        );
    }

    #[test]
    fn toml_fills_paths_and_keeps_defaults() {
        let config = TlsConfig::from_toml_str(
            r#"
            ca_file = "/etc/spark/ca.pem"
            known_hosts_path = "/tmp/ledger"
            "#,
        )
        .expect("valid config");
        assert_eq!(config.ca_file(), Some(Path::new("/etc/spark/ca.pem")));
        assert_eq!(config.known_hosts_path(), PathBuf::from("/tmp/ledger"));
        assert!(config.trust_known_hosts());
        assert!(config.unverified_host_callback().is_none());
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = TlsConfig::from_toml_str("trust_everything = true").expect_err("unknown key");
        assert_eq!(err.kind(), TlsErrorKind::UnexpectedError);
        assert!(err.message().starts_with("tls config"));
    }

    #[test]
    fn callbacks_are_attached_in_code() {
        let config = TlsConfig::new()
            .with_password_callback(|_: &Path| Some("secret".to_owned()))
            .with_unverified_host_callback(|_: &str, _: &str, _: TrustReason| {
                HostDecision::AcceptOnce
            });
        let password = config
            .password_callback()
            .and_then(|cb| cb.password(Path::new("key.pem")));
        assert_eq!(password.as_deref(), Some("secret"));
        assert!(format!("{config:?}").contains("unverified_host_callback: true"));
    }
}
