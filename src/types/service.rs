//! Identities of the hosted services.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three services hosted in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Frontend,
    Matching,
    History,
}

impl ServiceKind {
    /// Every hosted service, in membership order.
    pub const ALL: [ServiceKind; 3] = [
        ServiceKind::Frontend,
        ServiceKind::Matching,
        ServiceKind::History,
    ];

    /// Name the service registers under and logs with.
    pub fn service_name(self) -> &'static str {
        match self {
            ServiceKind::Frontend => "onebox-frontend",
            ServiceKind::Matching => "onebox-matching",
            ServiceKind::History => "onebox-history",
        }
    }

    /// Short label used for metrics and config keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Frontend => "frontend",
            ServiceKind::Matching => "matching",
            ServiceKind::History => "history",
        }
    }

    /// Startup wave. Services in wave N are serving before wave N+1 is built.
    ///
    /// Frontend routes through Matching and History, so it comes up last.
    pub fn startup_wave(self) -> usize {
        match self {
            ServiceKind::Matching | ServiceKind::History => 0,
            ServiceKind::Frontend => 1,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}
