//! Static protocol-version → release-label table.
//!
//! Minecraft protocol numbers are not sequential per release; this table maps
//! the numbers the relay is likely to see to the release range they belong
//! to.  Read-only for the process lifetime, no synchronization needed.
//!
//! The table is informational only: an unknown number is still relayed, it
//! just logs as `unknown`.

/// Returns the release label for a known protocol number.
pub fn protocol_label(version: i16) -> Option<&'static str> {
    let label = match version {
        4 => "1.7.2-1.7.5",
        5 => "1.7.6-1.7.10",
        47 => "1.8.x",
        107 => "1.9",
        108 => "1.9.1",
        109 => "1.9.2",
        110 => "1.9.3-1.9.4",
        210 => "1.10.x",
        315 => "1.11",
        316 => "1.11.1-1.11.2",
        335 => "1.12",
        338 => "1.12.1",
        340 => "1.12.2",
        393 => "1.13",
        401 => "1.13.1",
        404 => "1.13.2",
        477 => "1.14",
        480 => "1.14.1",
        485 => "1.14.2",
        490 => "1.14.3",
        498 => "1.14.4",
        573 => "1.15",
        575 => "1.15.1",
        578 => "1.15.2",
        735 => "1.16",
        736 => "1.16.1",
        751 => "1.16.2",
        753 => "1.16.3",
        754 => "1.16.4-1.16.5",
        755 => "1.17",
        756 => "1.17.1",
        757 => "1.18-1.18.1",
        758 => "1.18.2",
        759 => "1.19",
        760 => "1.19.1-1.19.2",
        761 => "1.19.3",
        762 => "1.19.4",
        763 => "1.20-1.20.1",
        764 => "1.20.2",
        _ => return None,
    };
    Some(label)
}

/// Log-friendly description of a protocol number, known or not.
///
/// ```
/// use relay_core::protocol::versions::describe;
///
/// assert_eq!(describe(47), "1.8.x (protocol 47)");
/// assert_eq!(describe(46), "unknown (protocol 46)");
/// ```
pub fn describe(version: i16) -> String {
    match protocol_label(version) {
        Some(label) => format!("{label} (protocol {version})"),
        None => format!("unknown (protocol {version})"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_version_has_label() {
        assert_eq!(protocol_label(47), Some("1.8.x"));
        assert_eq!(protocol_label(340), Some("1.12.2"));
        assert_eq!(protocol_label(754), Some("1.16.4-1.16.5"));
    }

    #[test]
    fn test_unknown_version_has_no_label() {
        assert_eq!(protocol_label(46), None);
        assert_eq!(protocol_label(0), None);
        assert_eq!(protocol_label(-1), None);
    }

    #[test]
    fn test_describe_known() {
        assert_eq!(describe(47), "1.8.x (protocol 47)");
    }

    #[test]
    fn test_describe_unknown() {
        assert_eq!(describe(9999), "unknown (protocol 9999)");
    }
}
