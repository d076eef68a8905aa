//! Deterministic mapping from a remote URI to an opaque, fixed-width local key.

use digest::Digest;
use md5::Md5;

/// Computes the cache key for `uri`: the lowercase 32-hex-character MD5
/// digest of its UTF-8 bytes.
///
/// Pure and stable across processes and releases — the key *is* the
/// filename under which the payload is stored, so changing this function
/// invalidates every existing cache on disk.
///
/// No escaping or normalization is performed; the caller is responsible
/// for supplying a canonical URI (e.g. consistent scheme casing, no
/// trailing slashes unless significant).
pub fn key_of(uri: &str) -> String {
    let digest = Md5::digest(uri.as_bytes());
    let mut out = String::with_capacity(crate::consts::KEY_HEX_LEN);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(
            key_of("gs://bucket/of/awesome"),
            "3ba505fc7774455169af6f50b7964dff"
        );
    }

    #[test]
    fn fingerprint_has_expected_width() {
        let key = key_of("gs://some/other/object");
        assert_eq!(key.len(), crate::consts::KEY_HEX_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn distinct_uris_hash_differently() {
        assert_ne!(key_of("gs://bucket/a"), key_of("gs://bucket/b"));
    }

    #[test]
    fn same_uri_hashes_identically() {
        assert_eq!(key_of("gs://bucket/a"), key_of("gs://bucket/a"));
    }

    #[rstest::rstest]
    #[case("gs://bucket/of/awesome", "3ba505fc7774455169af6f50b7964dff")]
    #[case("http://example.com/file.tar.gz", "a15276c2ec262520ecab8036f892ff61")]
    #[case("", "d41d8cd98f00b204e9800998ecf8427e")]
    fn known_digests_match_reference_md5(#[case] uri: &str, #[case] expected: &str) {
        assert_eq!(key_of(uri), expected);
    }
}
