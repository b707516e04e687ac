//! OS-native credential storage for character refresh tokens.
//!
//! Uses the `keyring` crate to store secrets in:
//! - macOS Keychain
//! - Windows Credential Manager
//!
//! Falls back to the `tokens` table in SQLite when the OS keychain is
//! unavailable or does not return what was written (headless sessions, CI,
//! platforms without a native store).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::TokenRow;

const SERVICE_NAME: &str = "org.evogames.eve-alts";

/// Keychain entry name for a character's refresh token.
pub fn refresh_token_key(character_id: i64) -> String {
    format!("refresh_token:{}", character_id)
}

/// Tracks whether the keychain is available. Once a keychain operation fails
/// with a platform-level error (not just "no entry"), we skip future attempts
/// for the rest of the process lifetime to avoid repeated slow failures.
static KEYCHAIN_UNAVAILABLE: AtomicBool = AtomicBool::new(false);

/// Store a secret in the OS keychain.
/// Returns `Ok(true)` if stored successfully, `Ok(false)` if keychain is unavailable.
pub fn store_secret(key: &str, value: &str) -> Result<bool, String> {
    if KEYCHAIN_UNAVAILABLE.load(Ordering::Relaxed) {
        return Ok(false);
    }

    let entry = keyring::Entry::new(SERVICE_NAME, key).map_err(|e| {
        mark_unavailable(&e);
        format!("Failed to create keychain entry for {}: {}", key, e)
    })?;

    match entry.set_password(value) {
        Ok(()) => {
            log::debug!("[keychain] Stored secret: {}", key);
            Ok(true)
        }
        Err(e) => {
            if is_platform_error(&e) {
                mark_unavailable_from_error(&e);
                log::warn!(
                    "[keychain] Platform error storing {}, falling back to SQLite: {}",
                    key,
                    e
                );
                Ok(false)
            } else {
                Err(format!("Failed to store secret {}: {}", key, e))
            }
        }
    }
}

/// Retrieve a secret from the OS keychain.
/// Returns `Ok(Some(value))` if found, `Ok(None)` if not found or keychain unavailable.
pub fn get_secret(key: &str) -> Result<Option<String>, String> {
    if KEYCHAIN_UNAVAILABLE.load(Ordering::Relaxed) {
        return Ok(None);
    }

    let entry = keyring::Entry::new(SERVICE_NAME, key).map_err(|e| {
        mark_unavailable(&e);
        format!("Failed to create keychain entry for {}: {}", key, e)
    })?;

    match entry.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => {
            if is_platform_error(&e) {
                mark_unavailable_from_error(&e);
                log::warn!(
                    "[keychain] Platform error reading {}, falling back to SQLite: {}",
                    key,
                    e
                );
                Ok(None)
            } else {
                Err(format!("Failed to get secret {}: {}", key, e))
            }
        }
    }
}

/// Delete a secret from the OS keychain.
/// Returns `Ok(true)` if deleted, `Ok(false)` if not found or keychain unavailable.
pub fn delete_secret(key: &str) -> Result<bool, String> {
    if KEYCHAIN_UNAVAILABLE.load(Ordering::Relaxed) {
        return Ok(false);
    }

    let entry = keyring::Entry::new(SERVICE_NAME, key).map_err(|e| {
        mark_unavailable(&e);
        format!("Failed to create keychain entry for {}: {}", key, e)
    })?;

    match entry.delete_credential() {
        Ok(()) => {
            log::info!("[keychain] Deleted secret: {}", key);
            Ok(true)
        }
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => {
            if is_platform_error(&e) {
                mark_unavailable_from_error(&e);
                log::warn!("[keychain] Platform error deleting {}: {}", key, e);
                Ok(false)
            } else {
                Err(format!("Failed to delete secret {}: {}", key, e))
            }
        }
    }
}

fn is_platform_error(e: &keyring::Error) -> bool {
    matches!(
        e,
        keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_)
    )
}

fn mark_unavailable(e: &keyring::Error) {
    if is_platform_error(e) {
        mark_unavailable_from_error(e);
    }
}

fn mark_unavailable_from_error(e: &keyring::Error) {
    log::warn!("[keychain] Marking keychain as unavailable: {}", e);
    KEYCHAIN_UNAVAILABLE.store(true, Ordering::Relaxed);
}

/// Move the refresh token out of `token` and into the keychain.
///
/// The write only counts once reading the entry back returns the same value;
/// then the returned row has an empty `refresh_token`. In every other case
/// the row is returned unchanged so SQLite keeps the secret.
pub fn seal_refresh_token(token: &TokenRow) -> TokenRow {
    if token.refresh_token.is_empty() {
        return token.clone();
    }

    let key = refresh_token_key(token.character_id);
    match store_secret(&key, &token.refresh_token) {
        Ok(true) => {}
        Ok(false) => return token.clone(),
        Err(e) => {
            log::warn!("[keychain] Failed to store {}: {}", key, e);
            return token.clone();
        }
    }

    match get_secret(&key) {
        Ok(Some(stored)) if stored == token.refresh_token => {
            let mut sealed = token.clone();
            sealed.refresh_token.clear();
            sealed
        }
        Ok(_) => {
            log::info!("[keychain] {} did not read back, keeping it in SQLite", key);
            token.clone()
        }
        Err(e) => {
            log::warn!("[keychain] Failed to verify {}: {}", key, e);
            token.clone()
        }
    }
}

/// Fill in a refresh token that was moved to the keychain. Rows that still
/// carry their own refresh token are returned as-is.
pub fn unseal_refresh_token(mut token: TokenRow) -> TokenRow {
    if !token.refresh_token.is_empty() {
        return token;
    }

    let key = refresh_token_key(token.character_id);
    match get_secret(&key) {
        Ok(Some(secret)) => token.refresh_token = secret,
        Ok(None) => log::warn!("[keychain] No refresh token stored for {}", key),
        Err(e) => log::warn!("[keychain] Failed to read {}: {}", key, e),
    }
    token
}

pub fn forget_refresh_token(character_id: i64) {
    let key = refresh_token_key(character_id);
    if let Err(e) = delete_secret(&key) {
        log::warn!("[keychain] Failed to delete {}: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that touch the process-wide KEYCHAIN_UNAVAILABLE flag.
    static FLAG_LOCK: Mutex<()> = Mutex::new(());

    /// Take the flag lock and reset KEYCHAIN_UNAVAILABLE. Hold the guard for
    /// the whole test.
    fn reset_keychain_flag() -> MutexGuard<'static, ()> {
        let guard = FLAG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        KEYCHAIN_UNAVAILABLE.store(false, Ordering::Relaxed);
        guard
    }

    fn token(character_id: i64, refresh: &str) -> TokenRow {
        TokenRow {
            character_id,
            access_token: "access".to_string(),
            refresh_token: refresh.to_string(),
            token_type: "Bearer".to_string(),
            expiration: Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_refresh_token_key() {
        assert_eq!(refresh_token_key(90000001), "refresh_token:90000001");
    }

    #[test]
    fn test_seal_empty_refresh_token_is_noop() {
        let row = token(1, "");
        assert_eq!(seal_refresh_token(&row), row);
    }

    #[test]
    fn test_unseal_keeps_inline_refresh_token() {
        let row = token(1, "inline");
        assert_eq!(unseal_refresh_token(row.clone()), row);
    }

    #[test]
    fn test_seal_only_clears_verified_secrets() {
        let _flag = reset_keychain_flag();
        let row = token(-424242, "rt-secret");
        let sealed = seal_refresh_token(&row);

        if sealed.refresh_token.is_empty() {
            // Native keychain: the secret must be recoverable.
            assert_eq!(unseal_refresh_token(sealed).refresh_token, "rt-secret");
            forget_refresh_token(-424242);
        } else {
            assert_eq!(sealed, row);
        }
    }

    #[test]
    fn test_keychain_unavailable_flag() {
        let _flag = reset_keychain_flag();
        KEYCHAIN_UNAVAILABLE.store(true, Ordering::Relaxed);

        assert_eq!(store_secret("test", "val").unwrap(), false);
        assert_eq!(get_secret("test").unwrap(), None);
        assert_eq!(delete_secret("test").unwrap(), false);

        let row = token(7, "kept");
        assert_eq!(seal_refresh_token(&row), row);

        KEYCHAIN_UNAVAILABLE.store(false, Ordering::Relaxed);
    }
}
