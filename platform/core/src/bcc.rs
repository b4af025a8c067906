//! Block-check code: a one-byte XOR-reduce integrity marker stamped on
//! external-facing actuator and settings writes (§6). Matches the canonical
//! industrial convention, not a cryptographic checksum.

/// `bcc = 0; for each byte b in payload: bcc ^= b`, rendered as two
/// uppercase hex digits.
#[must_use]
pub fn compute_bcc(payload: &str) -> String {
    let bcc = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("{bcc:02X}")
}

/// Property #12: `verify(compute_bcc(p), p)` is always `true`; any mutation
/// of `p` almost always flips at least one bit of the reduction.
#[must_use]
pub fn verify(code: &str, payload: &str) -> bool {
    compute_bcc(payload).eq_ignore_ascii_case(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_holds_for_any_payload() {
        let payload = "USER_SET_pump_active_True";
        let code = compute_bcc(payload);
        assert!(verify(&code, payload));
        assert!(!verify(&code, &format!("{payload}x")));
    }

    #[test]
    fn empty_payload_reduces_to_zero() {
        assert_eq!(compute_bcc(""), "00");
    }
}
