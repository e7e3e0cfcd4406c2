use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{BuildError, Result};

/// Cooperative cancellation flag shared between a driver and a build pass
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Fail with [`BuildError::Canceled`] if a token is present and tripped
pub fn check_canceled(token: Option<&CancellationToken>) -> Result<()> {
    match token {
        Some(token) if token.is_cancellation_requested() => Err(BuildError::Canceled),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(check_canceled(Some(&observer)).is_ok());

        token.cancel();
        assert!(observer.is_cancellation_requested());
        assert!(matches!(
            check_canceled(Some(&observer)),
            Err(BuildError::Canceled)
        ));
        assert!(check_canceled(None).is_ok());
    }
}
