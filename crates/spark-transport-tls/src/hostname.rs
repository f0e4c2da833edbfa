use tracing::debug;
use x509_parser::{certificate::X509Certificate, extensions::GeneralName, prelude::FromDer};

/// 主机身份校验结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostnameMatch {
    Matched,
    NotMatched,
    /// 证书结构异常（无法解析，或主机名字段内嵌 NUL），校验中止。
    Malformed,
}

/// 校验服务端叶子证书是否声明了 `hostname` 这一身份。
///
/// # 教案级注释
///
/// ## 逻辑（How）
/// 1. 先枚举 SAN 扩展中的 DNS 条目，任何一条内嵌 NUL（字符串长度短于 ASN.1 声明长度）即判定为畸形并立刻返回；
/// 2. 证书不含任何 SAN DNS 条目时，回退到主题的 CN 字段，做同样的 NUL 检查；
/// 3. 比较前将请求的主机名转为小写，与证书字段逐字节比较，仅最左侧标签允许通配。
///
/// ## 契约（What）
/// - 通配 `*.example.com` 匹配 `www.example.com`，不匹配 `example.com` 与 `a.b.example.com`；
/// - 存在 SAN DNS 条目时不再查看 CN。
pub fn verify_hostname(cert_der: &[u8], hostname: &str) -> HostnameMatch {
    let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
        debug!("peer certificate is not parseable X.509");
        return HostnameMatch::Malformed;
    };
    let Some(identities) = certificate_identities(&cert) else {
        return HostnameMatch::Malformed;
    };
    match_identities(identities.iter().copied(), hostname)
}

/// 收集证书声明的主机身份；扩展或 CN 无法解码时返回 `None`。
fn certificate_identities<'a>(cert: &'a X509Certificate<'a>) -> Option<Vec<&'a str>> {
    let san = cert.subject_alternative_name().ok()?;
    let dns_names: Vec<&str> = san
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(*dns),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    if !dns_names.is_empty() {
        return Some(dns_names);
    }

    match cert.subject().iter_common_name().next() {
        Some(cn) => Some(vec![cn.as_str().ok()?]),
        None => Some(Vec::new()),
    }
}

/// 依序比对证书身份与主机名；任何一条内嵌 NUL 的身份都会使整体结果为畸形。
pub fn match_identities<'a>(
    identities: impl IntoIterator<Item = &'a str>,
    hostname: &str,
) -> HostnameMatch {
    let hostname = hostname.to_ascii_lowercase();
    for identity in identities {
        if identity.contains('\0') {
            debug!("certificate identity carries an embedded NUL");
            return HostnameMatch::Malformed;
        }
        if matches_pattern(identity, &hostname) {
            return HostnameMatch::Matched;
        }
    }
    HostnameMatch::NotMatched
}

fn matches_pattern(pattern: &str, hostname: &str) -> bool {
    let Some(suffix) = pattern.strip_prefix("*.") else {
        return pattern == hostname;
    };
    let Some((label, rest)) = hostname.split_once('.') else {
        return false;
    };
    !label.is_empty() && !suffix.is_empty() && rest == suffix
}
