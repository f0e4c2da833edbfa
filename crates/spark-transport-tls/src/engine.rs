use std::sync::{
    Arc, Once, OnceLock,
    atomic::{AtomicBool, Ordering},
};

use rustls::{ClientConfig, RootCertStore, crypto::CryptoProvider};
use tracing::{debug, info, warn};

use crate::error::{self, ENGINE_INIT, TlsError, TlsErrorKind};

/// 会话允许协商的协议版本；更早的版本 `rustls` 本身即不支持。
pub(crate) const PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

static GLOBAL: CryptoEngine = CryptoEngine::new(rustls::crypto::ring::default_provider, true);

/// 进程级加密引擎。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 所有 TLS 会话共享同一个 `CryptoProvider`，它必须在任何会话创建前完成一次性初始化，
///   并在所有会话结束后恰好拆除一次；
/// - 初始化失败需要被“记住”：并发的首批调用者与之后的调用者看到的是同一个失败结果。
///
/// ## 逻辑（How）
/// - `init` 借助 `OnceLock::get_or_init` 保证初始化体至多执行一次，并发调用者阻塞等待同一结果；
/// - 初始化体创建 provider，尝试将其安装为进程默认值（已有默认值不算失败），随后构建并丢弃
///   一个临时 `ClientConfig`，以尽早确认存在可用的协议版本与密码套件；
/// - `cleanup` 借助 `Once` 只执行一次，将引擎标记为已拆除，此后任何会话创建都会失败。
///
/// ## 契约（What）
/// - `init` 与 `cleanup` 之间不保证互斥，调用方不得在仍有会话存活时调用 `cleanup`；
/// - 初始化成功后，provider 为 `Send + Sync`，多线程上的独立会话可并发使用，无需额外加锁。
///
/// ## 风险与权衡（Trade-offs）
/// - `rustls` 的进程默认 provider 一经安装无法卸载，`cleanup` 只能在本对象内部生效。
pub struct CryptoEngine {
    factory: fn() -> CryptoProvider,
    install_default: bool,
    init: OnceLock<Result<Arc<CryptoProvider>, TlsError>>,
    cleanup: Once,
    torn_down: AtomicBool,
}

impl CryptoEngine {
    const fn new(factory: fn() -> CryptoProvider, install_default: bool) -> Self {
        Self {
            factory,
            install_default,
            init: OnceLock::new(),
            cleanup: Once::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// 进程级单例，底层使用 `ring` provider。
    pub fn global() -> &'static CryptoEngine {
        &GLOBAL
    }

    /// 以自定义 provider 构造独立引擎；不会触碰进程默认 provider。
    pub const fn with_provider(factory: fn() -> CryptoProvider) -> Self {
        Self::new(factory, false)
    }

    /// 一次性初始化；重复调用返回首次记录的结果。
    pub fn init(&self) -> Result<(), TlsError> {
        self.init
            .get_or_init(|| self.initialize())
            .as_ref()
            .map(|_| ())
            .map_err(Clone::clone)
    }

    /// 一次性拆除。
    pub fn cleanup(&self) {
        self.cleanup.call_once(|| {
            self.torn_down.store(true, Ordering::Release);
            info!(
                initialized = self.init.get().is_some_and(Result::is_ok),
                "crypto engine torn down"
            );
        });
    }

    pub fn is_initialized(&self) -> bool {
        !self.is_torn_down() && self.init.get().is_some_and(Result::is_ok)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// 供会话使用的 provider；未初始化、初始化失败或已拆除时返回错误。
    pub(crate) fn provider(&self) -> Result<Arc<CryptoProvider>, TlsError> {
        if self.is_torn_down() {
            return Err(TlsError::new(
                TlsErrorKind::UnexpectedError,
                "crypto engine torn down",
            ));
        }
        match self.init.get() {
            Some(Ok(provider)) => Ok(Arc::clone(provider)),
            Some(Err(err)) => Err(err.clone()),
            None => Err(TlsError::new(
                TlsErrorKind::UnexpectedError,
                "crypto engine not initialized",
            )),
        }
    }

    fn initialize(&self) -> Result<Arc<CryptoProvider>, TlsError> {
        let provider = Arc::new((self.factory)());
        if self.install_default && CryptoProvider::install_default((*provider).clone()).is_err()
        {
            debug!("process default crypto provider already installed");
        }

        // 构建后立即丢弃，只为确认至少存在一组可用的协议版本与密码套件。
        let probe = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(PROTOCOL_VERSIONS)
            .map_err(|err| {
                warn!(error = %err, "crypto engine has no usable protocol method");
                error::engine_error(ENGINE_INIT, err)
            })?
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth();
        drop(probe);

        debug!(
            cipher_suites = provider.cipher_suites.len(),
            kx_groups = provider.kx_groups.len(),
            "crypto engine initialized"
        );
        Ok(provider)
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("initialized", &self.is_initialized())
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}
