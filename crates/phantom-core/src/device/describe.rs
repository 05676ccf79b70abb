//! Canned device descriptions.
//!
//! The cloud asks devices to describe themselves; a static blob is
//! sufficient for load generation. The request's flag byte selects the
//! system and application halves of the description.

/// Describe the system half (modules)
pub const DESCRIBE_SYSTEM: u8 = 1 << 0;

/// Describe the application half (functions, variables)
pub const DESCRIBE_APPLICATION: u8 = 1 << 1;

/// Describe everything
pub const DESCRIBE_ALL: u8 = DESCRIBE_SYSTEM | DESCRIBE_APPLICATION;

/// Extract the describe flags from a request payload.
///
/// The flag rides at payload byte 8. Values 0..=3 are honored verbatim;
/// anything else is logged and replaced with [`DESCRIBE_ALL`], as is a
/// payload too short to carry the byte.
#[must_use]
pub fn describe_flags(payload: &[u8]) -> u8 {
    match payload.get(8) {
        Some(&flag) if flag <= DESCRIBE_ALL => flag,
        Some(&flag) => {
            tracing::warn!(flag, "invalid describe flag, falling back to full description");
            DESCRIBE_ALL
        }
        None => DESCRIBE_ALL,
    }
}

/// Build the canned description JSON for a device.
#[must_use]
pub fn describe_blob(device_id_hex: &str, platform_id: u16, flags: u8) -> Vec<u8> {
    let mut blob = serde_json::json!({
        "id": device_id_hex,
        "p": platform_id,
    });

    if flags & DESCRIBE_APPLICATION != 0 {
        blob["f"] = serde_json::json!(["digitalread", "digitalwrite", "analogread", "analogwrite"]);
        blob["v"] = serde_json::json!({
            "temperature": "double",
            "uptime": "int32",
            "version": "string",
        });
    }

    if flags & DESCRIBE_SYSTEM != 0 {
        blob["m"] = serde_json::json!([
            { "s": 16384, "l": "m", "vc": 30, "vv": 30, "f": "b", "n": "0", "v": 1 },
            { "s": 262144, "l": "m", "vc": 30, "vv": 30, "f": "s", "n": "1", "v": 2 },
            { "s": 131072, "l": "m", "vc": 30, "vv": 30, "f": "u", "n": "2", "v": 3 },
        ]);
    }

    serde_json::to_vec(&blob).expect("static describe blob serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_honored_when_valid() {
        let mut payload = vec![0u8; 9];
        for flag in 0..=3u8 {
            payload[8] = flag;
            assert_eq!(describe_flags(&payload), flag);
        }
    }

    #[test]
    fn test_invalid_flag_falls_back() {
        let mut payload = vec![0u8; 9];
        payload[8] = 0x42;
        assert_eq!(describe_flags(&payload), DESCRIBE_ALL);
    }

    #[test]
    fn test_short_payload_means_all() {
        assert_eq!(describe_flags(&[]), DESCRIBE_ALL);
        assert_eq!(describe_flags(&[0u8; 8]), DESCRIBE_ALL);
    }

    #[test]
    fn test_blob_sections_follow_flags() {
        let id = "aabbccddeeff001122334455";

        let full: serde_json::Value =
            serde_json::from_slice(&describe_blob(id, 6, DESCRIBE_ALL)).unwrap();
        assert_eq!(full["id"], id);
        assert!(full["f"].is_array());
        assert!(full["m"].is_array());

        let app_only: serde_json::Value =
            serde_json::from_slice(&describe_blob(id, 6, DESCRIBE_APPLICATION)).unwrap();
        assert!(app_only["f"].is_array());
        assert!(app_only.get("m").is_none());

        let sys_only: serde_json::Value =
            serde_json::from_slice(&describe_blob(id, 6, DESCRIBE_SYSTEM)).unwrap();
        assert!(sys_only.get("f").is_none());
        assert!(sys_only["m"].is_array());
    }
}
