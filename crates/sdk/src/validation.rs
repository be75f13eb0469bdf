pub use silo_protocol::constants::MAX_BUCKET_NAME_LEN;
use silo_protocol::constants::check_bucket_name;

use crate::SdkError;

/// Longest accepted object name in bytes.
pub const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Validates a bucket name with the same rule the node applies.
pub fn validate_bucket_name(name: &str) -> Result<(), SdkError> {
    check_bucket_name(name).map_err(SdkError::Validation)
}

/// Validates an object name.
///
/// Rejects:
/// - Empty names
/// - Names longer than [`MAX_OBJECT_NAME_LEN`] bytes
/// - Control characters
/// - A leading `/` or any `.`/`..` path segment
pub fn validate_object_name(name: &str) -> Result<(), SdkError> {
    if name.is_empty() {
        return Err(SdkError::Validation("object name is empty".into()));
    }
    if name.len() > MAX_OBJECT_NAME_LEN {
        return Err(SdkError::Validation(format!(
            "object name exceeds {MAX_OBJECT_NAME_LEN} bytes"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(SdkError::Validation(format!(
            "control character in object name: {name:?}"
        )));
    }
    if name.starts_with('/') {
        return Err(SdkError::Validation(format!(
            "object name must not start with '/': {name}"
        )));
    }
    if name.split('/').any(|part| part == "." || part == "..") {
        return Err(SdkError::Validation(format!(
            "relative path segment not allowed: {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_plain_bucket_name() {
        assert!(validate_bucket_name("media").is_ok());
        assert!(validate_bucket_name("b").is_ok());
        assert!(validate_bucket_name("Bad_Bucket").is_ok());
        assert!(validate_bucket_name("has space").is_ok());
        assert!(validate_bucket_name("-leading.").is_ok());
        assert!(validate_bucket_name(&"a".repeat(MAX_BUCKET_NAME_LEN)).is_ok());
    }

    #[test]
    fn rejects_bad_bucket_names() {
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("a/b").is_err());
        assert!(validate_bucket_name("tab\there").is_err());
        assert!(validate_bucket_name(&"a".repeat(MAX_BUCKET_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn accepts_nested_object_names() {
        assert!(validate_object_name("file.bin").is_ok());
        assert!(validate_object_name("videos/2024/clip.mp4").is_ok());
        assert!(validate_object_name("..hidden").is_ok());
    }

    #[test]
    fn rejects_bad_object_names() {
        assert!(validate_object_name("").is_err());
        assert!(validate_object_name("/etc/passwd").is_err());
        assert!(validate_object_name("a/../b").is_err());
        assert!(validate_object_name("./a").is_err());
        assert!(validate_object_name("line\nbreak").is_err());
        assert!(validate_object_name(&"x".repeat(MAX_OBJECT_NAME_LEN + 1)).is_err());
    }
}
