//! Classification of local vs remote state.

use crate::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncComparison {
    /// Same document content on both sides.
    InSync,
    /// Only the remote changed since the last sync.
    RemoteNewer,
    /// Both sides changed independently; needs a user decision.
    Diverged,
    /// Only the local side changed, or the remote holds nothing.
    LocalAhead,
}

/// What we remember about the last successful sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncAnchor {
    /// Checksum of the document set at the last successful sync.
    pub last_synced_checksum: Option<String>,
    /// The downloaded remote handle is provably the one recorded at that sync.
    /// Ignored without a checksum.
    pub same_remote_handle: bool,
}

/// Classify `local` against `remote`. `local` must be the plaintext
/// envelope of the current document set.
///
/// Rules, first match wins:
/// 1. no remote data: local ahead
/// 2. equal checksums: in sync
/// 3. remote changed, local unchanged since the anchor: remote newer
/// 4. remote changed, never synced, local empty: remote newer
/// 5. both changed (never synced counts as local changed): diverged
/// 6. otherwise local ahead
pub fn compare(local: &Envelope, remote: Option<&Envelope>, anchor: &SyncAnchor) -> SyncComparison {
    let remote = match remote {
        Some(remote) => remote,
        None => return SyncComparison::LocalAhead,
    };

    if local.same_content(remote) {
        return SyncComparison::InSync;
    }

    let matches_anchor = |checksum: &str| {
        anchor
            .last_synced_checksum
            .as_deref()
            .is_some_and(|anchor| anchor.eq_ignore_ascii_case(checksum))
    };

    let remote_unchanged = (anchor.same_remote_handle && anchor.last_synced_checksum.is_some())
        || matches_anchor(&remote.checksum);
    let local_unchanged = matches_anchor(&local.checksum);
    let local_empty = !local.encrypted && local.resumes.is_empty();

    if !remote_unchanged {
        if local_unchanged {
            return SyncComparison::RemoteNewer;
        }
        if anchor.last_synced_checksum.is_none() && local_empty {
            return SyncComparison::RemoteNewer;
        }
        return SyncComparison::Diverged;
    }

    SyncComparison::LocalAhead
}
