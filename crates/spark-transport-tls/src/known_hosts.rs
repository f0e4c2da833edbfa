//! TOFU（首次使用即信任）主机指纹账本。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 证书链无法校验（自签名、缺失颁发者）时，由用户或应用决定是否信任该主机，
//!   并把决定以 `host:port fingerprint` 的形式记录下来，之后的连接直接比对；
//! - 账本是纯文本，运维人员可以手工编辑、添加注释。
//!
//! ## 逻辑（How）
//! - `lookup` 顺序扫描账本，忽略空行与 `#` 注释，首个键完全相等的行胜出；
//! - `verify` 串起完整流程：精确命中即信任；旧版 127 字符指纹与新指纹前缀一致时视为命中并升级记录；
//!   其余情况交给 `decide`，由回调给出拒绝、仅本次接受或永久信任；
//! - `persist` 在账本同目录创建临时文件，复制除目标主机外的所有行，追加新记录后原子重命名。
//!
//! ## 契约（What）
//! - 账本不存在等价于“没有记录”，不是错误；
//! - 任意一步持久化失败都不会让账本出现部分写入，临时文件在失败路径上随 drop 删除；
//! - 不提供跨线程、跨进程的互斥：并发 `persist` 以最后一次重命名为准。
//!
//! ## 风险与权衡（Trade-offs）
//! - 每次查询都重新读取文件，账本规模通常很小，换来的是无需缓存失效逻辑。

use std::{
    fmt, fs,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fingerprint::{FINGERPRINT_HEX_LEN, LEGACY_FINGERPRINT_HEX_LEN};

/// 触发 TOFU 决策的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustReason {
    /// 账本中没有该主机的记录。
    Unrecognized,
    /// 账本记录与本次指纹不一致。
    Mismatch,
}

/// 应用对未验证主机的决定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostDecision {
    Reject,
    AcceptOnce,
    /// 接受本次连接并写入账本。
    Trust,
}

/// 未验证主机的决策回调，参数依次为 `host:port`、指纹与原因。
pub trait UnverifiedHostCallback: Send + Sync {
    fn decide(&self, host: &str, fingerprint: &str, reason: TrustReason) -> HostDecision;
}

impl<F> UnverifiedHostCallback for F
where
    F: Fn(&str, &str, TrustReason) -> HostDecision + Send + Sync,
{
    fn decide(&self, host: &str, fingerprint: &str, reason: TrustReason) -> HostDecision {
        self(host, fingerprint, reason)
    }
}

/// `lookup` 的结果；账本缺失也归入 `NotFound`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(String),
    NotFound,
}

impl LookupOutcome {
    pub const fn code(&self) -> i32 {
        match self {
            LookupOutcome::Found(_) => 0,
            LookupOutcome::NotFound => 1,
        }
    }
}

/// TOFU 流程的三态结论。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustOutcome {
    /// 账本精确命中，或回调给出了接受/信任。
    Trusted,
    /// 不信任，且没有可咨询的回调。
    Untrusted,
    /// 不信任，回调已被咨询。
    UntrustedAfterCallback,
}

impl TrustOutcome {
    pub const fn code(self) -> i32 {
        match self {
            TrustOutcome::Trusted => 0,
            TrustOutcome::Untrusted => 1,
            TrustOutcome::UntrustedAfterCallback => 2,
        }
    }

    pub const fn is_trusted(self) -> bool {
        matches!(self, TrustOutcome::Trusted)
    }
}

/// 账本读写的硬错误。
#[derive(Debug, Error)]
pub enum KnownHostsError {
    #[error("known hosts: failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("known hosts: failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl KnownHostsError {
    pub const fn code(&self) -> i32 {
        -1
    }
}

/// 绑定到单个账本文件的句柄。
#[derive(Clone, PartialEq, Eq)]
pub struct KnownHosts {
    path: PathBuf,
}

impl KnownHosts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 查找 `host` 的首条记录。
    pub fn lookup(&self, host: &str) -> Result<LookupOutcome, KnownHostsError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "known hosts ledger absent");
                return Ok(LookupOutcome::NotFound);
            }
            Err(source) => return Err(self.read_error(source)),
        };

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| self.read_error(source))?;
            if let Some((key, fingerprint)) = parse_record(&line)
                && key == host
            {
                return Ok(LookupOutcome::Found(fingerprint.to_owned()));
            }
        }
        Ok(LookupOutcome::NotFound)
    }

    /// 完整 TOFU 流程：查账本，命中即信任，否则按原因咨询回调。
    pub fn verify(
        &self,
        host: &str,
        fingerprint: &str,
        callback: Option<&dyn UnverifiedHostCallback>,
    ) -> Result<TrustOutcome, KnownHostsError> {
        let stored = match self.lookup(host)? {
            LookupOutcome::Found(stored) => stored,
            LookupOutcome::NotFound => {
                return self.decide(host, fingerprint, TrustReason::Unrecognized, callback);
            }
        };

        if stored == fingerprint {
            debug!(host, "fingerprint matches known hosts entry");
            return Ok(TrustOutcome::Trusted);
        }

        if is_legacy_match(&stored, fingerprint) {
            info!(host, "upgrading truncated known hosts entry");
            if let Err(err) = self.persist(host, fingerprint) {
                warn!(host, error = %err, "failed to upgrade truncated known hosts entry");
            }
            return Ok(TrustOutcome::Trusted);
        }

        warn!(host, fingerprint, "fingerprint differs from known hosts entry");
        self.decide(host, fingerprint, TrustReason::Mismatch, callback)
    }

    /// 咨询回调；`Trust` 先持久化再按 `AcceptOnce` 处理，没有回调等价于 `Reject`。
    pub fn decide(
        &self,
        host: &str,
        fingerprint: &str,
        reason: TrustReason,
        callback: Option<&dyn UnverifiedHostCallback>,
    ) -> Result<TrustOutcome, KnownHostsError> {
        let Some(callback) = callback else {
            debug!(host, ?reason, "no unverified host callback registered");
            return Ok(TrustOutcome::Untrusted);
        };

        let decision = callback.decide(host, fingerprint, reason);
        debug!(host, ?reason, ?decision, "unverified host callback decided");
        match decision {
            HostDecision::Reject => Ok(TrustOutcome::UntrustedAfterCallback),
            HostDecision::AcceptOnce => Ok(TrustOutcome::Trusted),
            HostDecision::Trust => {
                self.persist(host, fingerprint)?;
                Ok(TrustOutcome::Trusted)
            }
        }
    }

    /// 原子地把 `host` 的记录替换为 `fingerprint`。
    pub fn persist(&self, host: &str, fingerprint: &str) -> Result<(), KnownHostsError> {
        self.persist_with(host, fingerprint, |out, line| writeln!(out, "{line}"))
    }

    /// `persist` 的实现，逐行写出经由 `write_line`，测试据此注入写失败。
    fn persist_with<F>(
        &self,
        host: &str,
        fingerprint: &str,
        mut write_line: F,
    ) -> Result<(), KnownHostsError>
    where
        F: FnMut(&mut dyn Write, &str) -> io::Result<()>,
    {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|source| self.persist_error(source))?;

        let staged = NamedTempFile::new_in(parent).map_err(|source| self.persist_error(source))?;
        let mut out = BufWriter::new(staged);

        match fs::File::open(&self.path) {
            Ok(existing) => {
                for line in BufReader::new(existing).lines() {
                    let line = line.map_err(|source| self.read_error(source))?;
                    if parse_record(&line).is_some_and(|(key, _)| key == host) {
                        continue;
                    }
                    write_line(&mut out, &line).map_err(|source| self.persist_error(source))?;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(self.read_error(source)),
        }
        write_line(&mut out, &format!("{host} {fingerprint}"))
            .map_err(|source| self.persist_error(source))?;

        let staged = out
            .into_inner()
            .map_err(|err| self.persist_error(err.into_error()))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|source| self.persist_error(source))?;
        staged
            .persist(&self.path)
            .map_err(|err| self.persist_error(err.error))?;

        info!(host, path = %self.path.display(), "known hosts entry persisted");
        Ok(())
    }

    fn read_error(&self, source: io::Error) -> KnownHostsError {
        KnownHostsError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn persist_error(&self, source: io::Error) -> KnownHostsError {
        KnownHostsError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}

impl fmt::Debug for KnownHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KnownHosts").field(&self.path).finish()
    }
}

/// 解析一行记录为 `(key, fingerprint)`；空行与注释返回 `None`。
fn parse_record(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((key, fingerprint)) => Some((key, fingerprint.trim())),
        None => Some((line, "")),
    }
}

fn is_legacy_match(stored: &str, fingerprint: &str) -> bool {
    stored.len() == LEGACY_FINGERPRINT_HEX_LEN
        && fingerprint.len() == FINGERPRINT_HEX_LEN
        && fingerprint.starts_with(stored)
}
