use std::sync::Arc;

/// Callback invoked when a locally-derived preview locator is released.
pub type PreviewRevoker = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewKind {
    /// Derived from local bytes; must be revoked when the handle goes away.
    Local,
    /// Hosted elsewhere (an http URL); never revoked by this slot.
    Remote,
}

/// Locator usable for display, with guaranteed release of local resources.
///
/// Local handles call their revoker exactly once, on drop. Remote locators
/// (existing objects shown during edit flows) are left untouched.
pub struct PreviewHandle {
    uri: String,
    kind: PreviewKind,
    revoker: Option<PreviewRevoker>,
}

impl PreviewHandle {
    pub fn local(uri: impl Into<String>, revoker: Option<PreviewRevoker>) -> Self {
        Self {
            uri: uri.into(),
            kind: PreviewKind::Local,
            revoker,
        }
    }

    pub fn remote(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: PreviewKind::Remote,
            revoker: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_local(&self) -> bool {
        self.kind == PreviewKind::Local
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if self.kind == PreviewKind::Local {
            if let Some(revoker) = self.revoker.take() {
                revoker(&self.uri);
            }
        }
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("uri", &self.uri)
            .field("kind", &self.kind)
            .finish()
    }
}
