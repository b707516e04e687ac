//! User-facing errors. The message is what the user sees; the full cause
//! chain goes to the log.

use std::error::Error as StdError;
use std::fmt;

type Cause = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug)]
pub struct PublicError {
    message: String,
    internal_message: Option<String>,
    cause: Option<Cause>,
}

impl PublicError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            internal_message: None,
            cause: None,
        }
    }

    /// Attach the underlying error. A nested `PublicError` also contributes
    /// its message to what the user sees.
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        if let Some(public) = cause.downcast_ref::<PublicError>() {
            self.message = format!("{}: {}", self.message, public.message);
        }
        self.cause = Some(cause);
        self
    }

    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The message for the log: internal message (or the public one)
    /// followed by every cause in the chain.
    pub fn internal_error(&self) -> String {
        let mut out = self
            .internal_message
            .clone()
            .unwrap_or_else(|| self.message.clone());
        let mut next: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(e) = next {
            out.push_str(": ");
            out.push_str(&e.to_string());
            next = e.source();
        }
        out
    }

    /// Log the full chain and hand back the public message, for command
    /// return values.
    pub fn report(self) -> String {
        log::error!("[application error] {}", self.internal_error());
        self.message
    }
}

impl fmt::Display for PublicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for PublicError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

/// Shorthand for `map_err` at the command boundary.
pub fn public<E>(message: &str) -> impl FnOnce(E) -> String + '_
where
    E: Into<Cause>,
{
    move |e| PublicError::new(message).with_cause(e).report()
}

/// Show an error from background work in a native dialog.
#[cfg(feature = "desktop")]
pub fn show_error(app: &tauri::AppHandle, err: &PublicError) {
    use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

    log::error!("[show_error] {}", err.internal_error());
    app.dialog()
        .message(err.message())
        .kind(MessageDialogKind::Error)
        .title("EVE Alts")
        .show(|_| {});
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;

    #[test]
    fn test_message_hides_cause() {
        let err = PublicError::new("Could not load characters").with_cause(DbError::Poisoned);
        assert_eq!(err.to_string(), "Could not load characters");
        assert_eq!(
            err.internal_error(),
            "Could not load characters: database lock poisoned"
        );
    }

    #[test]
    fn test_nested_public_error_extends_message() {
        let inner = PublicError::new("token expired");
        let outer = PublicError::new("Could not refresh").with_cause(inner);
        assert_eq!(outer.message(), "Could not refresh: token expired");
    }

    #[test]
    fn test_internal_message_replaces_public_in_log() {
        let err = PublicError::new("Something went wrong")
            .with_internal_message("save_tag failed")
            .with_cause(DbError::Poisoned);
        assert_eq!(err.internal_error(), "save_tag failed: database lock poisoned");
    }

    #[test]
    fn test_public_helper_returns_message() {
        let result: Result<(), String> = Err(DbError::Poisoned).map_err(public("Could not save"));
        assert_eq!(result.unwrap_err(), "Could not save");
    }

    #[test]
    fn test_chain_walks_nested_sources() {
        let db = DbError::Exhausted(vec![DbError::Poisoned]);
        let err = PublicError::new("Could not save tag").with_cause(db);
        assert!(err
            .internal_error()
            .starts_with("Could not save tag: transaction failed after 1 attempt(s)"));
    }
}
