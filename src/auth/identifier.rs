use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

/// Which secondary identifier a deployment uses besides email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Phone,
    Username,
}

impl FromStr for IdentifierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phone" => Ok(IdentifierKind::Phone),
            "username" => Ok(IdentifierKind::Username),
            other => anyhow::bail!("unknown identifier kind: {other}"),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[a-z0-9_.-]{3,30}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Canonical phone format: `+<country code><9-digit subscriber number>`.
#[derive(Debug, Clone)]
pub struct PhoneRule {
    country_code: String,
    canonical: Regex,
}

impl PhoneRule {
    pub fn new(country_code: &str) -> anyhow::Result<Self> {
        let country_code = country_code.trim().trim_start_matches('+').to_string();
        if country_code.is_empty()
            || country_code.len() > 3
            || !country_code.chars().all(|c| c.is_ascii_digit())
        {
            anyhow::bail!("country code must be 1-3 digits, got {country_code:?}");
        }
        let canonical = Regex::new(&format!(r"^\+{country_code}\d{{9}}$"))?;
        Ok(Self {
            country_code,
            canonical,
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Rewrites local (`0712345678`) and spaced international input into the
    /// canonical form. Returns `None` if the result is not a valid number.
    pub fn canonicalize(&self, raw: &str) -> Option<String> {
        let compact: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();

        let canonical = if compact.starts_with('0') && compact.len() == 10 {
            format!("+{}{}", self.country_code, &compact[1..])
        } else if !compact.starts_with('+') && compact.starts_with(&self.country_code) {
            format!("+{compact}")
        } else {
            compact
        };

        self.canonical.is_match(&canonical).then_some(canonical)
    }
}

impl Default for PhoneRule {
    fn default() -> Self {
        Self {
            country_code: "254".into(),
            canonical: Regex::new(r"^\+254\d{9}$").unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_numbers_gain_country_code() {
        let rule = PhoneRule::default();
        assert_eq!(rule.canonicalize("0712345678").as_deref(), Some("+254712345678"));
        assert_eq!(rule.canonicalize("0712 345 678").as_deref(), Some("+254712345678"));
    }

    #[test]
    fn international_numbers_are_compacted() {
        let rule = PhoneRule::default();
        assert_eq!(rule.canonicalize("+254 712-345-678").as_deref(), Some("+254712345678"));
        assert_eq!(rule.canonicalize("254712345678").as_deref(), Some("+254712345678"));
    }

    #[test]
    fn rejects_malformed_numbers() {
        let rule = PhoneRule::default();
        assert_eq!(rule.canonicalize("12345"), None);
        assert_eq!(rule.canonicalize("+1 202 555 0100"), None);
        assert_eq!(rule.canonicalize(""), None);
    }

    #[test]
    fn custom_country_code() {
        let rule = PhoneRule::new("+44").unwrap();
        assert_eq!(rule.canonicalize("0712345678").as_deref(), Some("+44712345678"));
        assert!(PhoneRule::new("abc").is_err());
    }

    #[test]
    fn email_normalization_and_validation() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
        assert!(is_valid_email("jane@example.com"));
        assert!(!is_valid_email("jane.example.com"));
    }

    #[test]
    fn username_validation() {
        assert_eq!(normalize_username(" Jane_Doe "), "jane_doe");
        assert!(is_valid_username("jane_doe"));
        assert!(!is_valid_username("jd"));
        assert!(!is_valid_username("jane doe"));
    }

    #[test]
    fn parses_identifier_kind() {
        assert_eq!("Phone".parse::<IdentifierKind>().unwrap(), IdentifierKind::Phone);
        assert_eq!("username".parse::<IdentifierKind>().unwrap(), IdentifierKind::Username);
        assert!("email".parse::<IdentifierKind>().is_err());
    }
}
