//! Label key and value syntax checks

use super::SelectorError;

const MAX_NAME_LENGTH: usize = 63;
const MAX_PREFIX_LENGTH: usize = 253;

/// `[A-Za-z0-9]([-_.A-Za-z0-9]*[A-Za-z0-9])?`, at most 63 characters
fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name part must not be empty".into());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("must be no more than {} characters", MAX_NAME_LENGTH));
    }
    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return Err("must start and end with an alphanumeric character".into());
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err("may only contain alphanumerics, '-', '_' or '.'".into());
    }
    Ok(())
}

/// Lowercase RFC 1123 subdomain, at most 253 characters
fn check_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("prefix part must not be empty".into());
    }
    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(format!("prefix must be no more than {} characters", MAX_PREFIX_LENGTH));
    }
    for label in prefix.split('.') {
        let bytes = label.as_bytes();
        let valid = !bytes.is_empty()
            && bytes[0].is_ascii_alphanumeric()
            && bytes[bytes.len() - 1].is_ascii_alphanumeric()
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
        if !valid {
            return Err("prefix must be a lowercase DNS subdomain".into());
        }
    }
    Ok(())
}

/// Validate a label key: `[prefix/]name`
pub fn validate_label_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: String| SelectorError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    match key.split_once('/') {
        Some((prefix, name)) => {
            check_prefix(prefix).map_err(invalid)?;
            check_name(name).map_err(invalid)
        }
        None => check_name(key).map_err(invalid),
    }
}

/// Validate a label value: empty, or a valid name part
pub fn validate_label_value(value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }
    check_name(value).map_err(|reason| SelectorError::InvalidValue {
        value: value.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate_label_key("app").is_ok());
        assert!(validate_label_key("app.kubernetes.io/name").is_ok());
        assert!(validate_label_key("tier_1.x-y").is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate_label_key("").is_err());
        assert!(validate_label_key("-app").is_err());
        assert!(validate_label_key("app-").is_err());
        assert!(validate_label_key("Example.COM/name").is_err());
        assert!(validate_label_key("/name").is_err());
        assert!(validate_label_key("a/b/c").is_err());
        assert!(validate_label_key(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_values() {
        assert!(validate_label_value("").is_ok());
        assert!(validate_label_value("v1.2_3-rc").is_ok());
        assert!(validate_label_value("has space").is_err());
        assert!(validate_label_value(&"v".repeat(64)).is_err());
    }
}
