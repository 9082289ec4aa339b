//! Syntax-only address validation. No DNS lookups happen here.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 253;

static DOMAIN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").unwrap());

// RFC 5322 dot-atom; quoted local parts are not accepted
static LOCAL_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct InvalidAddress {
    pub reason: String,
}

impl InvalidAddress {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub fn validate_address(address: &str) -> Result<(), InvalidAddress> {
    if address.is_empty() {
        return Err(InvalidAddress::new("address is empty"));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(InvalidAddress::new("address contains whitespace"));
    }

    let (local, domain) = match address.split_once('@') {
        Some(parts) => parts,
        None => return Err(InvalidAddress::new("address is missing '@'")),
    };
    if domain.contains('@') {
        return Err(InvalidAddress::new("address contains more than one '@'"));
    }

    validate_local_part(local)?;
    validate_domain(domain)
}

pub fn is_valid_address(address: &str) -> bool {
    validate_address(address).is_ok()
}

fn validate_local_part(local: &str) -> Result<(), InvalidAddress> {
    if local.is_empty() {
        return Err(InvalidAddress::new("address is missing the part before '@'"));
    }
    if local.len() > MAX_LOCAL_PART {
        return Err(InvalidAddress::new(format!(
            "local part is longer than {} characters",
            MAX_LOCAL_PART
        )));
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(InvalidAddress::new("local part has a misplaced '.'"));
    }
    if !LOCAL_PART.is_match(local) {
        return Err(InvalidAddress::new(format!(
            "local part '{}' contains characters not allowed in an address",
            local
        )));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<(), InvalidAddress> {
    if domain.is_empty() {
        return Err(InvalidAddress::new("address is missing a domain"));
    }
    if domain.len() > MAX_DOMAIN {
        return Err(InvalidAddress::new(format!(
            "domain is longer than {} characters",
            MAX_DOMAIN
        )));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(InvalidAddress::new(format!(
            "domain '{}' has no top-level label",
            domain
        )));
    }

    for label in &labels {
        if label.is_empty() {
            return Err(InvalidAddress::new(format!(
                "domain '{}' has an empty label",
                domain
            )));
        }
        if !DOMAIN_LABEL.is_match(label) {
            return Err(InvalidAddress::new(format!(
                "domain label '{}' is not valid",
                label
            )));
        }
    }

    // labels 至少有兩個元素，上面已檢查
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || tld.chars().all(|c| c.is_ascii_digit()) {
        return Err(InvalidAddress::new(format!(
            "top-level label '{}' is not valid",
            tld
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_addresses() {
        assert!(is_valid_address("a@good.com"));
        assert!(is_valid_address("first.last+tag@mail.example.co.uk"));
        assert!(is_valid_address("x_y-z@sub-domain.example.org"));
    }

    #[test]
    fn test_rejects_missing_at_sign() {
        let err = validate_address("not-an-email").unwrap_err();
        assert!(err.reason.contains("'@'"));
        assert!(!is_valid_address("bad-address"));
    }

    #[test]
    fn test_rejects_missing_domain_and_tld() {
        assert!(validate_address("user@").unwrap_err().reason.contains("domain"));
        assert!(validate_address("user@localhost")
            .unwrap_err()
            .reason
            .contains("top-level"));
        assert!(!is_valid_address("user@example."));
        assert!(!is_valid_address("user@example.c"));
        assert!(!is_valid_address("user@10.0.0.1"));
    }

    #[test]
    fn test_rejects_malformed_local_parts_and_labels() {
        assert!(!is_valid_address("@example.com"));
        assert!(!is_valid_address(".user@example.com"));
        assert!(!is_valid_address("us..er@example.com"));
        assert!(!is_valid_address("user@exa_mple.com"));
        assert!(!is_valid_address("user@-example.com"));
        assert!(!is_valid_address("user@@example.com"));
        assert!(!is_valid_address("us er@example.com"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address(&format!("{}@example.com", "a".repeat(65))));

        for address in [
            "a>b@x.com",
            "a<b@x.com",
            "a,b@x.com",
            "a\"b@x.com",
            "a(b)@x.com",
            "a:b@x.com",
            "a;b@x.com",
            "a[b]@x.com",
            "a\\b@x.com",
        ] {
            let err = validate_address(address).unwrap_err();
            assert!(err.reason.contains("not allowed"), "{}: {}", address, err);
        }
        assert!(is_valid_address("o'brien+news@example.com"));
        assert!(is_valid_address("a!#$%&*/=?^_`{|}~-b@example.com"));
    }
}
