/// Cache key for a normalized payload seen on `subject`: `"{subject}-{md5 hex}"`.
///
/// MD5 is fixed-width and stable across platforms and restarts, which is all a
/// dedup key needs; it is not used as a security boundary. Prefixing the subject
/// keeps identical bytes on different subjects apart.
pub fn fingerprint(subject: &str, payload: &[u8]) -> String {
    let digest = md5::compute(payload);
    format!("{subject}-{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        // md5("hello") is a well known value, pinning it guards against format drift
        assert_eq!(
            fingerprint("goldprices.ingest", b"hello"),
            "goldprices.ingest-5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            fingerprint("mapdata.ingest", b"{\"ZoneID\":1}"),
            fingerprint("mapdata.ingest", b"{\"ZoneID\":1}")
        );
    }

    #[test]
    fn test_different_payloads_produce_different_keys() {
        assert_ne!(
            fingerprint("marketorders.ingest", b"{\"UnitPriceSilver\":3}"),
            fingerprint("marketorders.ingest", b"{\"UnitPriceSilver\":3.0}")
        );
        assert_ne!(fingerprint("s", b""), fingerprint("s", b" "));
    }

    #[test]
    fn test_different_subjects_produce_different_keys() {
        assert_ne!(
            fingerprint("goldprices.ingest", b"same"),
            fingerprint("mapdata.ingest", b"same")
        );
    }

    #[test]
    fn test_empty_payload_has_fixed_width_hash() {
        let key = fingerprint("topic", b"");
        let hash = key.strip_prefix("topic-").unwrap();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
