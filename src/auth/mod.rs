//! NTLM challenge-response authentication
//!
//! The server issues an 8-byte challenge at NEGOTIATE time and validates
//! the LM/NTLM (v1 or v2) responses presented in SESSION_SETUP_ANDX against
//! locally stored password material.

pub mod ntlm;
pub mod ntlm_crypto;

use crate::error::{Error, Result};
use ntlm::NtlmV2Blob;
use std::collections::HashMap;
use tracing::debug;

/// A logged-on session, keyed by UID on the connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: u16,
    pub account: String,
    pub domain: String,
    pub guest: bool,
}

/// Per-account secret material, derived once at registration.
#[derive(Clone)]
struct UserSecrets {
    password: String,
    lm_hash: [u8; 16],
    ntlm_hash: [u8; 16],
}

/// Outcome of a validated session setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated { account: String },
    Guest,
}

/// Validates session-setup credentials against a static user table.
pub struct Authenticator {
    users: HashMap<String, UserSecrets>,
    allow_guest: bool,
}

impl Authenticator {
    pub fn new(allow_guest: bool) -> Self {
        Self {
            users: HashMap::new(),
            allow_guest,
        }
    }

    /// Register an account. Hashes are derived eagerly so the logon path
    /// never touches the clear-text password.
    pub fn add_user(&mut self, account: &str, password: &str) -> Result<()> {
        let secrets = UserSecrets {
            password: password.to_string(),
            lm_hash: ntlm_crypto::lm_hash(password)?,
            ntlm_hash: ntlm_crypto::ntlm_hash(password)?,
        };
        self.users.insert(account.to_uppercase(), secrets);
        Ok(())
    }

    pub fn allow_guest(&self) -> bool {
        self.allow_guest
    }

    /// Validate the response pair from SESSION_SETUP_ANDX.
    ///
    /// An NT response longer than 24 bytes is NTLMv2 (its blob must parse);
    /// exactly 24 bytes is classic NTLM. Absent an NT response, the LM
    /// field is tried as LMv2 and then LM. Unknown accounts and failed
    /// validations fall back to guest when enabled.
    pub fn validate(
        &self,
        account: &str,
        domain: &str,
        challenge: &[u8; 8],
        lm_response: &[u8],
        nt_response: &[u8],
    ) -> Result<AuthOutcome> {
        let anonymous = account.is_empty() && lm_response.len() <= 1 && nt_response.is_empty();
        if anonymous {
            return self.guest_or_deny("anonymous logon");
        }

        let secrets = match self.users.get(&account.to_uppercase()) {
            Some(secrets) => secrets,
            None => {
                debug!(account = %account, "unknown account");
                return self.guest_or_deny("unknown account");
            }
        };

        let valid = if nt_response.len() > 24 {
            NtlmV2Blob::parse(&nt_response[16..])?;
            let v2_hash = ntlm_crypto::ntlmv2_hash(account, domain, &secrets.password)?;
            ntlm_crypto::validate_ntlmv2_response(nt_response, &v2_hash, challenge)?
        } else if nt_response.len() == 24 {
            ntlm_crypto::validate_ntlm_response(nt_response, &secrets.ntlm_hash, challenge)?
        } else if lm_response.len() == 24 {
            let v2_hash = ntlm_crypto::ntlmv2_hash(account, domain, &secrets.password)?;
            ntlm_crypto::validate_lmv2_response(lm_response, &v2_hash, challenge)?
                || ntlm_crypto::validate_lm_response(lm_response, &secrets.lm_hash, challenge)?
        } else {
            false
        };

        if valid {
            Ok(AuthOutcome::Authenticated {
                account: account.to_string(),
            })
        } else {
            debug!(account = %account, "credential validation failed");
            Err(Error::AuthenticationFailed(format!(
                "logon failed for {}",
                account
            )))
        }
    }

    fn guest_or_deny(&self, reason: &str) -> Result<AuthOutcome> {
        if self.allow_guest {
            Ok(AuthOutcome::Guest)
        } else {
            Err(Error::AuthenticationFailed(reason.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ntlm_crypto::{
        generate_challenge, lmv2_response, ntlmv2_hash, ntlmv2_response, v1_response,
    };

    fn authenticator() -> Authenticator {
        let mut auth = Authenticator::new(false);
        auth.add_user("User", "Password").unwrap();
        auth
    }

    #[test]
    fn test_ntlm_v1_logon() {
        let auth = authenticator();
        let challenge = generate_challenge();
        let response = v1_response(&ntlm_crypto::ntlm_hash("Password").unwrap(), &challenge).unwrap();

        let outcome = auth
            .validate("User", "Domain", &challenge, &[], &response)
            .unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Authenticated {
                account: "User".into()
            }
        );
    }

    #[test]
    fn test_ntlmv2_logon() {
        let auth = authenticator();
        let challenge = generate_challenge();
        let hash = ntlmv2_hash("User", "Domain", "Password").unwrap();
        let blob = NtlmV2Blob::new(0x1DA_0000_0000_0000, [9; 8], vec![(2, b"D".to_vec())]);
        let response = ntlmv2_response(&hash, &challenge, &blob.to_bytes().unwrap()).unwrap();

        let outcome = auth
            .validate("User", "Domain", &challenge, &[], &response)
            .unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Authenticated {
                account: "User".into()
            }
        );
    }

    #[test]
    fn test_lmv2_logon() {
        let auth = authenticator();
        let challenge = generate_challenge();
        let hash = ntlmv2_hash("User", "Domain", "Password").unwrap();
        let response = lmv2_response(&hash, &challenge, &[7; 8]).unwrap();

        let outcome = auth
            .validate("User", "Domain", &challenge, &response, &[])
            .unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Authenticated {
                account: "User".into()
            }
        );
    }

    #[test]
    fn test_bad_password_rejected() {
        let auth = authenticator();
        let challenge = generate_challenge();
        let response = v1_response(&ntlm_crypto::ntlm_hash("wrong").unwrap(), &challenge).unwrap();
        assert!(auth
            .validate("User", "Domain", &challenge, &[], &response)
            .is_err());
    }

    #[test]
    fn test_guest_fallback() {
        let mut auth = Authenticator::new(true);
        auth.add_user("User", "Password").unwrap();
        let challenge = generate_challenge();

        let outcome = auth
            .validate("nobody", "Domain", &challenge, &[0; 24], &[0; 24])
            .unwrap();
        assert_eq!(outcome, AuthOutcome::Guest);

        let outcome = auth.validate("", "", &challenge, &[0], &[]).unwrap();
        assert_eq!(outcome, AuthOutcome::Guest);
    }
}
