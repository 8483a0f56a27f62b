use vigil_core::{Error, Result};

const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?/~`'\"\\";

/// Password policy for registration: at least 12 characters with upper case,
/// lower case, a digit, and a symbol.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < 12 {
        return Err(Error::validation("Password must be at least 12 characters long"));
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(Error::validation("Password must contain at least one uppercase letter"));
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(Error::validation("Password must contain at least one lowercase letter"));
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err(Error::validation("Password must contain at least one number"));
    }

    if !password.chars().any(|c| SYMBOLS.contains(c)) {
        return Err(Error::validation("Password must contain at least one special character"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_strong_password() {
        assert!(validate_password("CorrectHorse9!batt").is_ok());
    }

    #[test]
    fn rejects_short_password() {
        assert!(validate_password("Sh0rt!pass").is_err());
    }

    #[test]
    fn rejects_missing_character_classes() {
        assert!(validate_password("alllowercase9!aa").is_err());
        assert!(validate_password("ALLUPPERCASE9!AA").is_err());
        assert!(validate_password("NoDigitsHere!abc").is_err());
        assert!(validate_password("NoSymbolsHere9abc").is_err());
    }
}
