//! Outbound notifications.
//!
//! Delivery is best-effort. A failed notification is logged as a warning and
//! never rolls back the state change that triggered it.

use async_trait::async_trait;
use tracing::info;

use taskshare_core::{Permission, RequestId, ShareScope, ShareToken, User};

use crate::lifecycle::GrantFailure;

/// A message about a share request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareNotice {
    /// Sent to the recipient when a request is created.
    Requested {
        request_id: RequestId,
        requester_email: String,
        scope: ShareScope,
        permission: Permission,
        token: ShareToken,
    },
    /// Sent to the requester when the recipient approves and the grant is
    /// in place.
    Approved {
        request_id: RequestId,
        recipient_email: String,
        scope: ShareScope,
        permission: Permission,
    },
    /// Sent to the requester when the recipient approves but no grant could
    /// be written.
    ApprovedWithoutGrant {
        request_id: RequestId,
        recipient_email: String,
        scope: ShareScope,
        reason: GrantFailure,
    },
    /// Sent to the requester when the recipient declines.
    Rejected {
        request_id: RequestId,
        recipient_email: String,
        scope: ShareScope,
    },
}

impl ShareNotice {
    /// Stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ShareNotice::Requested { .. } => "requested",
            ShareNotice::Approved { .. } => "approved",
            ShareNotice::ApprovedWithoutGrant { .. } => "approved_without_grant",
            ShareNotice::Rejected { .. } => "rejected",
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            ShareNotice::Requested { request_id, .. }
            | ShareNotice::Approved { request_id, .. }
            | ShareNotice::ApprovedWithoutGrant { request_id, .. }
            | ShareNotice::Rejected { request_id, .. } => *request_id,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            ShareNotice::Requested {
                requester_email, ..
            } => format!("{} wants to share with you", requester_email),
            ShareNotice::Approved {
                recipient_email, ..
            } => format!("{} accepted your share", recipient_email),
            ShareNotice::ApprovedWithoutGrant {
                recipient_email, ..
            } => format!(
                "{} accepted your share, but access was not granted",
                recipient_email
            ),
            ShareNotice::Rejected {
                recipient_email, ..
            } => format!("{} declined your share", recipient_email),
        }
    }

    /// Message text. For `Requested` this carries the full token, so it must
    /// only ever go to the recipient.
    pub fn body(&self) -> String {
        match self {
            ShareNotice::Requested {
                requester_email,
                scope,
                permission,
                token,
                ..
            } => format!(
                "{} invited you to {} their {}.\n\nTo respond, use invitation code:\n{}",
                requester_email,
                permission,
                describe(scope),
                token.expose()
            ),
            ShareNotice::Approved {
                recipient_email,
                scope,
                permission,
                ..
            } => format!(
                "{} can now {} your {}.",
                recipient_email,
                permission,
                describe(scope)
            ),
            ShareNotice::ApprovedWithoutGrant {
                recipient_email,
                scope,
                reason,
                ..
            } => format!(
                "{} accepted access to your {}, but it could not be granted: {}.",
                recipient_email,
                describe(scope),
                reason
            ),
            ShareNotice::Rejected {
                recipient_email,
                scope,
                ..
            } => format!(
                "{} declined access to your {}.",
                recipient_email,
                describe(scope)
            ),
        }
    }
}

fn describe(scope: &ShareScope) -> String {
    match scope {
        ShareScope::Category(id) => format!("category #{}", id),
        ShareScope::Task(id) => format!("task #{}", id),
        ShareScope::Global => "tasks".to_string(),
    }
}

/// Port for delivering notices to users.
///
/// Returns whether delivery succeeded. Channel selection (chat, email) is
/// the implementation's concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &User, notice: &ShareNotice) -> bool;
}

/// Development notifier that writes notices to tracing output.
///
/// The body is not logged because it may contain a token.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, recipient: &User, notice: &ShareNotice) -> bool {
        info!(
            to = %recipient.email,
            kind = notice.kind(),
            request_id = %notice.request_id(),
            subject = %notice.subject(),
            "share notice"
        );
        true
    }
}
