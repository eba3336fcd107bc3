//! Sign-in message the wallet signs to link an account

use chrono::{DateTime, SecondsFormat, Utc};

const NONCE_PREFIX: &str = "Nonce: ";

/// Fields of the sign-in message
#[derive(Debug, Clone)]
pub struct SignInMessage<'a> {
    pub address: &'a str,
    pub uri: &'a str,
    pub chain_id: Option<u64>,
    pub nonce: &'a str,
    pub issued_at: DateTime<Utc>,
}

impl SignInMessage<'_> {
    /// Render the newline-joined message text
    pub fn render(&self) -> String {
        let mut lines = vec![
            "circa wants you to sign in with your Ethereum account:".to_string(),
            self.address.to_string(),
            String::new(),
            "Sign in to Circa".to_string(),
            String::new(),
            format!("URI: {}", self.uri),
            "Version: 1".to_string(),
        ];
        if let Some(chain_id) = self.chain_id {
            lines.push(format!("Chain ID: {}", chain_id));
        }
        lines.push(format!("{}{}", NONCE_PREFIX, self.nonce));
        lines.push(format!(
            "Issued At: {}",
            self.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        lines.join("\n")
    }
}

/// Pull the nonce out of a signed message's `Nonce: ` line
pub fn extract_nonce(message: &str) -> Option<&str> {
    message
        .lines()
        .find_map(|line| line.trim_end_matches('\r').strip_prefix(NONCE_PREFIX))
        .map(str::trim)
        .filter(|nonce| !nonce.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn renders_without_chain_id() {
        let message = SignInMessage {
            address: "0xabc",
            uri: "https://circa.app",
            chain_id: None,
            nonce: "0x01",
            issued_at: issued_at(),
        };

        assert_eq!(
            message.render(),
            "circa wants you to sign in with your Ethereum account:\n\
             0xabc\n\
             \n\
             Sign in to Circa\n\
             \n\
             URI: https://circa.app\n\
             Version: 1\n\
             Nonce: 0x01\n\
             Issued At: 2025-03-01T12:30:00Z"
        );
    }

    #[test]
    fn renders_chain_id_before_nonce() {
        let text = SignInMessage {
            address: "0xabc",
            uri: "https://circa.app",
            chain_id: Some(8453),
            nonce: "0x01",
            issued_at: issued_at(),
        }
        .render();

        assert!(text.contains("Version: 1\nChain ID: 8453\nNonce: 0x01\n"));
    }

    #[test]
    fn extracts_nonce_line() {
        let text = SignInMessage {
            address: "0xabc",
            uri: "https://circa.app",
            chain_id: None,
            nonce: "0xfeed",
            issued_at: issued_at(),
        }
        .render();

        assert_eq!(extract_nonce(&text), Some("0xfeed"));
        assert_eq!(extract_nonce("Nonce: 0x1\r\nIssued At: now"), Some("0x1"));
        assert_eq!(extract_nonce("no nonce here"), None);
        assert_eq!(extract_nonce("Nonce: "), None);
        assert_eq!(extract_nonce("Nonce:0x1"), None);
    }
}
