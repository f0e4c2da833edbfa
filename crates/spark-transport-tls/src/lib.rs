#![doc = r#"
# spark-transport-tls

## 设计动机（Why）
- **加密入口**：为数据库客户端在任意阻塞字节流之上建立 TLS 会话，保证链路机密性与完整性；
- **身份确认**：证书链可校验时按主机名确认身份；链无法校验（自签名、缺失颁发者）时，
  回退到 TOFU（首次使用即信任）指纹账本，由应用决定是否信任；
- **可运维性**：错误码使用稳定的 `spark.transport.tls.*` 命名空间，账本为可手工编辑的纯文本。

## 核心契约（What）
- [`CryptoEngine`]：进程级加密引擎，`init`/`cleanup` 各恰好执行一次；
- [`StreamBridge`]：把 [`TransportStream`] 暴露为引擎可推送字节的 `io::Read`/`io::Write`；
- [`TlsSession`]：`Built → ContextReady → HandshakeDone → Verified | Failed` 状态机，成功后交付 [`SecureStream`]；
- [`KnownHosts`]：`host:port fingerprint` 账本，支持查找、决策与原子持久化；
- [`verify_hostname`] 与 [`certificate_fingerprint`]：可独立使用的纯函数。

## 实现策略（How）
- 使用 `rustls`（`ring` provider）完成握手，自定义 `ServerCertVerifier` 记录链校验结论而不中断握手，
  握手结束后统一做信任决策；
- 账本更新借助 `tempfile` 在同目录暂存后原子重命名；
- 日志统一走 `tracing`，本 crate 不安装任何 subscriber。

## 风险与考量（Trade-offs）
- 全程阻塞 I/O，没有超时与取消；需要中断时由外部关闭底层描述符；
- 账本不做跨进程加锁，并发写入以最后一次重命名为准。
"#]

mod bridge;
mod channel;
mod config;
mod engine;
mod error;
pub mod fingerprint;
pub mod hostname;
mod known_hosts;
mod session;
mod verifier;

pub use bridge::{ENGINE_IO_LIMIT, StreamBridge, TransportStream};
pub use channel::SecureStream;
pub use config::{PasswordCallback, TlsConfig, default_known_hosts_path};
pub use engine::CryptoEngine;
pub use error::{TlsError, TlsErrorKind};
pub use fingerprint::certificate_fingerprint;
pub use hostname::{HostnameMatch, verify_hostname};
pub use known_hosts::{
    HostDecision, KnownHosts, KnownHostsError, LookupOutcome, TrustOutcome, TrustReason,
    UnverifiedHostCallback,
};
pub use session::{SessionState, TlsSession};
pub use verifier::{ChainVerdict, Decision, RecordingVerifier, evaluate};
