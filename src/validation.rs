use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::RegistrationRequest;
use crate::upload::ImageFile;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("phone regex compiles"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageValidationError {
    #[error("Please select an image file")]
    NotAnImage,
    #[error("Image size should be less than {}MB", .max_bytes / (1024 * 1024))]
    TooLarge { size: usize, max_bytes: usize },
}

/// Checked before any upload is attempted.
pub fn validate_image(file: &ImageFile, max_bytes: usize) -> Result<(), ImageValidationError> {
    if !file.content_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(ImageValidationError::NotAnImage);
    }
    if file.bytes.len() > max_bytes {
        return Err(ImageValidationError::TooLarge {
            size: file.bytes.len(),
            max_bytes,
        });
    }
    Ok(())
}

pub fn validate_registration(request: &RegistrationRequest) -> Result<(), String> {
    if request.full_name.trim().is_empty() {
        return Err("Full name is required".into());
    }
    if !EMAIL_RE.is_match(request.email.trim()) {
        return Err("A valid email address is required".into());
    }
    if !PHONE_RE.is_match(request.phone.trim()) {
        return Err("A valid phone number is required".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(content_type: &str, size: usize) -> ImageFile {
        ImageFile {
            file_name: "coach.png".into(),
            content_type: content_type.into(),
            bytes: vec![0; size].into(),
        }
    }

    #[test]
    fn test_validate_image() {
        let max = 2 * 1024 * 1024;
        assert!(validate_image(&image("image/png", 1024), max).is_ok());
        assert!(validate_image(&image("image/jpeg", max), max).is_ok());
        assert_eq!(
            validate_image(&image("text/plain", 10), max),
            Err(ImageValidationError::NotAnImage)
        );
        assert!(matches!(
            validate_image(&image("image/png", 3_000_000), max),
            Err(ImageValidationError::TooLarge { size: 3_000_000, .. })
        ));
    }

    #[test]
    fn test_too_large_message_names_limit() {
        let err = ImageValidationError::TooLarge {
            size: 3_000_000,
            max_bytes: 2 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "Image size should be less than 2MB");
    }

    #[test]
    fn test_validate_registration() {
        let mut request = RegistrationRequest {
            full_name: "Asha Rao".into(),
            email: "asha@example.com".into(),
            phone: "+91 98765 43210".into(),
        };
        assert!(validate_registration(&request).is_ok());

        request.email = "not-an-email".into();
        assert!(validate_registration(&request).is_err());

        request.email = "asha@example.com".into();
        request.phone = "12".into();
        assert!(validate_registration(&request).is_err());

        request.phone = "9876543210".into();
        request.full_name = "  ".into();
        assert!(validate_registration(&request).is_err());
    }
}
