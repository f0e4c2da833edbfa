use sha2::{Digest, Sha512};

/// SHA-512 摘要的十六进制长度。
pub const FINGERPRINT_HEX_LEN: usize = 128;

/// 旧版本写入账本的指纹少一个字符（截断了末位），匹配时按前缀比较。
pub const LEGACY_FINGERPRINT_HEX_LEN: usize = 127;

/// 服务端叶子证书的指纹：对 DER 编码求 SHA-512，按小写十六进制输出。
pub fn certificate_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha512::digest(der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_is_lowercase_hex() {
        let fp = certificate_fingerprint(b"abc");
        assert_eq!(fp.len(), FINGERPRINT_HEX_LEN);
        assert_eq!(
            fp,
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn legacy_length_is_one_short() {
        assert_eq!(LEGACY_FINGERPRINT_HEX_LEN + 1, FINGERPRINT_HEX_LEN);
    }
}
