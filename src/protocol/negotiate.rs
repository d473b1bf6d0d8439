//! Version negotiation.
//!
//! [`intersect`] picks the highest version present in both tables. The
//! responder then runs the agreed version past an [`AcceptPolicy`] before
//! answering.

use std::collections::HashSet;

use thiserror::Error;

use super::message::Rejection;
use super::versions::{ParamValue, VersionNumber, VersionTable};

/// Outcome of a successful negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agreement {
    /// Agreed version
    pub version: VersionNumber,
    /// Local parameters for the agreed version
    pub params: ParamValue,
}

/// The two tables share no version.
///
/// Never sent on the wire; the responder reports it to the peer as
/// [`Rejection::VersionMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no version intersection found")]
pub struct NoIntersection;

/// Pick the highest version present in both tables.
///
/// The returned parameters are always the local side's: peers rely on the
/// same version number meaning the same parameter layout everywhere.
pub fn intersect(
    local: &VersionTable,
    remote: &VersionTable,
) -> Result<Agreement, NoIntersection> {
    local
        .iter()
        .filter(|(version, _)| remote.contains(**version))
        .max_by_key(|(version, _)| **version)
        .map(|(version, params)| Agreement {
            version: *version,
            params: *params,
        })
        .ok_or(NoIntersection)
}

/// Policy check applied by the responder to an agreed version.
///
/// Implementations must be cheap and must not block; one policy is shared
/// by every connection a server handles.
pub trait AcceptPolicy: Send + Sync {
    /// Return `Err(reason)` to refuse the agreed version.
    fn check(&self, agreed: &Agreement, remote: &ParamValue) -> Result<(), String>;
}

/// Policy that accepts every agreed version
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptPolicy for AcceptAll {
    fn check(&self, _agreed: &Agreement, _remote: &ParamValue) -> Result<(), String> {
        Ok(())
    }
}

/// Network policy: optional magic check plus a set of disabled versions.
#[derive(Debug, Clone, Default)]
pub struct NetworkPolicy {
    enforce_magic: bool,
    refused_versions: HashSet<VersionNumber>,
}

impl NetworkPolicy {
    /// Create a policy that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse peers whose parameters carry a different network magic
    pub fn with_magic_check(mut self) -> Self {
        self.enforce_magic = true;
        self
    }

    /// Refuse a version even when both sides support it
    pub fn with_refused_version(mut self, version: VersionNumber) -> Self {
        self.refused_versions.insert(version);
        self
    }

    /// Refuse every version in the iterator
    pub fn with_refused_versions(
        mut self,
        versions: impl IntoIterator<Item = VersionNumber>,
    ) -> Self {
        self.refused_versions.extend(versions);
        self
    }
}

impl AcceptPolicy for NetworkPolicy {
    fn check(&self, agreed: &Agreement, remote: &ParamValue) -> Result<(), String> {
        if self.refused_versions.contains(&agreed.version) {
            return Err(format!("version {} is disabled", agreed.version));
        }

        if self.enforce_magic && agreed.params.magic() != remote.magic() {
            return Err(format!(
                "network magic mismatch: local {}, remote {}",
                agreed.params.magic(),
                remote.magic()
            ));
        }

        Ok(())
    }
}

/// Run negotiation and policy for a received proposal.
///
/// Maps [`NoIntersection`] to [`Rejection::VersionMismatch`] and a policy
/// refusal to [`Rejection::Refused`].
pub fn negotiate(
    local: &VersionTable,
    remote: &VersionTable,
    policy: &dyn AcceptPolicy,
) -> Result<Agreement, Rejection> {
    let agreed = intersect(local, remote).map_err(|_| Rejection::version_mismatch(local))?;

    // intersect only returns versions present in both tables
    let remote_params = remote
        .get(agreed.version)
        .ok_or_else(|| Rejection::version_mismatch(local))?;

    policy
        .check(&agreed, remote_params)
        .map_err(|reason| Rejection::refused(agreed.version, reason))?;

    Ok(agreed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::versions::default_versions;

    const MAINNET: i64 = 764824073;

    #[test]
    fn test_highest_shared_version_uses_local_params() {
        let local = default_versions(MAINNET);
        let remote = VersionTable::new()
            .with(3, ParamValue::Scalar(MAINNET))
            .with(4, ParamValue::Pair(MAINNET, true))
            .with(7, ParamValue::Scalar(1));

        let agreed = intersect(&local, &remote).unwrap();
        assert_eq!(agreed.version, 4);
        // local flag, not the remote's `true`
        assert_eq!(agreed.params, ParamValue::Pair(MAINNET, false));
    }

    #[test]
    fn test_no_shared_version() {
        let local = default_versions(MAINNET);
        let remote = VersionTable::new()
            .with(7, ParamValue::Scalar(MAINNET))
            .with(8, ParamValue::Scalar(MAINNET));

        assert_eq!(intersect(&local, &remote), Err(NoIntersection));
        assert_eq!(intersect(&local, &VersionTable::new()), Err(NoIntersection));
    }

    #[test]
    fn test_single_shared_version() {
        let local = default_versions(MAINNET);
        let remote = VersionTable::new().with(2, ParamValue::Scalar(5));

        let agreed = intersect(&local, &remote).unwrap();
        assert_eq!(agreed.version, 2);
        assert_eq!(agreed.params, *local.get(2).unwrap());
    }

    #[test]
    fn test_negotiate_maps_no_intersection_to_mismatch() {
        let local = default_versions(MAINNET);
        let remote = VersionTable::new().with(9, ParamValue::Scalar(MAINNET));

        let rejection = negotiate(&local, &remote, &AcceptAll).unwrap_err();
        assert_eq!(
            rejection,
            Rejection::VersionMismatch {
                valid_versions: vec![1, 2, 3, 4, 5, 6]
            }
        );
    }

    #[test]
    fn test_policy_refuses_disabled_version() {
        let local = default_versions(MAINNET);
        let remote = default_versions(MAINNET);
        let policy = NetworkPolicy::new().with_refused_version(6);

        let rejection = negotiate(&local, &remote, &policy).unwrap_err();
        assert!(matches!(rejection, Rejection::Refused { version: 6, .. }));
    }

    #[test]
    fn test_policy_magic_check() {
        let local = default_versions(MAINNET);
        let remote = default_versions(1);

        // off by default
        assert!(negotiate(&local, &remote, &NetworkPolicy::new()).is_ok());

        let policy = NetworkPolicy::new().with_magic_check();
        let rejection = negotiate(&local, &remote, &policy).unwrap_err();
        assert_eq!(
            rejection,
            Rejection::refused(6, "network magic mismatch: local 764824073, remote 1")
        );
    }
}
