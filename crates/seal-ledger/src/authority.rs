//! # Authority Ledger
//!
//! Append-only record of who holds which authority, over what scope, and
//! when it ended. Grants and revocations are both chained entries; a grant
//! is never edited in place.
//!
//! ## Lifecycle per `authority_id`
//!
//! ```text
//! GRANTED ──(effective_at ≤ t < expires_at)──▶ ACTIVE ──▶ REVOKED | EXPIRED
//! ```
//!
//! Revocation appends a `grant_type = revocation` entry carrying the
//! original `authority_id`; a grant counts as revoked at `t` once any such
//! entry has `revoked_at ≤ t`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use seal_core::{det_id_of, AuthorityReason, IdKind, Timestamp, VerificationReport};

use crate::chain::{append_chained, verify_chain, Chained};
use crate::error::LedgerError;
use crate::store::NdjsonStore;

pub const AUTHORITY_ENTRY_VERSION: &str = "1.0";

/// How an authority was conferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Direct,
    Delegated,
    Emergency,
    Revocation,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Delegated => "delegated",
            Self::Emergency => "emergency",
            Self::Revocation => "revocation",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "direct" => Ok(Self::Direct),
            "delegated" => Ok(Self::Delegated),
            "emergency" => Ok(Self::Emergency),
            "revocation" => Ok(Self::Revocation),
            other => Err(LedgerError::InvalidEntry(format!(
                "unknown grant_type {other:?}"
            ))),
        }
    }
}

/// Identifiers a grant covers, by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeBound {
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub patches: Vec<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
}

impl ScopeBound {
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
            && self.claims.is_empty()
            && self.patches.is_empty()
            && self.prompts.is_empty()
            && self.datasets.is_empty()
    }

    /// Whether `decision_id` is named, or covered by a `*` wildcard.
    pub fn covers_decision(&self, decision_id: &str) -> bool {
        self.decisions.iter().any(|d| d == "*" || d == decision_id)
    }
}

/// Body of one authority ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityGrant {
    pub entry_version: String,
    pub entry_id: String,
    pub authority_id: String,
    pub actor_id: String,
    pub actor_role: String,
    pub grant_type: GrantType,
    #[serde(default)]
    pub scope_bound: ScopeBound,
    #[serde(default)]
    pub policy_version: String,
    #[serde(default)]
    pub policy_hash: String,
    pub effective_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
    pub revocation_reason: Option<String>,
    #[serde(default)]
    pub witness_required: bool,
    pub witness_role: Option<String>,
    pub signing_key_id: Option<String>,
    pub signature_ref: Option<String>,
    #[serde(default)]
    pub commit_hash_refs: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

pub type AuthorityEntry = Chained<AuthorityGrant>;

impl AuthorityGrant {
    pub fn is_revocation(&self) -> bool {
        self.grant_type == GrantType::Revocation
    }

    /// `effective_at ≤ at` and not yet expired at `at`.
    pub fn in_window(&self, at: Timestamp) -> bool {
        self.effective_at <= at && self.expires_at.map_or(true, |exp| exp > at)
    }
}

/// Parameters of a new grant.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub authority_id: String,
    pub actor_id: String,
    pub actor_role: String,
    pub grant_type: GrantType,
    pub scope_bound: ScopeBound,
    pub policy_version: String,
    pub policy_hash: String,
    pub effective_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub witness_required: bool,
    pub witness_role: Option<String>,
    pub signing_key_id: Option<String>,
    pub notes: String,
}

impl GrantRequest {
    pub fn new(
        authority_id: impl Into<String>,
        actor_id: impl Into<String>,
        actor_role: impl Into<String>,
        effective_at: Timestamp,
    ) -> Self {
        Self {
            authority_id: authority_id.into(),
            actor_id: actor_id.into(),
            actor_role: actor_role.into(),
            grant_type: GrantType::Direct,
            scope_bound: ScopeBound::default(),
            policy_version: String::new(),
            policy_hash: String::new(),
            effective_at,
            expires_at: None,
            witness_required: false,
            witness_role: None,
            signing_key_id: None,
            notes: String::new(),
        }
    }

    pub fn grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_type = grant_type;
        self
    }

    pub fn scope(mut self, scope: ScopeBound) -> Self {
        self.scope_bound = scope;
        self
    }

    pub fn policy(mut self, version: impl Into<String>, hash: impl Into<String>) -> Self {
        self.policy_version = version.into();
        self.policy_hash = hash.into();
        self
    }

    pub fn expires_at(mut self, at: Timestamp) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn witness(mut self, role: impl Into<String>) -> Self {
        self.witness_required = true;
        self.witness_role = Some(role.into());
        self
    }

    pub fn signing_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.signing_key_id = Some(key_id.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("authority_id", &self.authority_id),
            ("actor_id", &self.actor_id),
            ("actor_role", &self.actor_role),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidEntry(format!("{field} is required")));
            }
        }
        if let Some(exp) = self.expires_at {
            if exp <= self.effective_at {
                return Err(LedgerError::InvalidEntry(format!(
                    "expires_at {exp} must be after effective_at {}",
                    self.effective_at
                )));
            }
        }
        Ok(())
    }

    fn into_grant(self, revoked: Option<(Timestamp, String)>) -> Result<AuthorityGrant, LedgerError> {
        let entry_id = det_id_of(
            IdKind::Authority,
            &serde_json::json!({
                "authority_id": self.authority_id,
                "actor_id": self.actor_id,
                "grant_type": self.grant_type.as_str(),
                "effective_at": self.effective_at,
            }),
        )?;
        let (revoked_at, revocation_reason) = match revoked {
            Some((at, reason)) => (Some(at), Some(reason)),
            None => (None, None),
        };
        Ok(AuthorityGrant {
            entry_version: AUTHORITY_ENTRY_VERSION.to_string(),
            entry_id,
            authority_id: self.authority_id,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            grant_type: self.grant_type,
            scope_bound: self.scope_bound,
            policy_version: self.policy_version,
            policy_hash: self.policy_hash,
            effective_at: self.effective_at,
            expires_at: self.expires_at,
            revoked_at,
            revocation_reason,
            witness_required: self.witness_required,
            witness_role: self.witness_role,
            signing_key_id: self.signing_key_id,
            signature_ref: None,
            commit_hash_refs: Vec::new(),
            notes: self.notes,
        })
    }
}

/// State of one `authority_id` at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityStatus {
    Active,
    NotYetEffective { effective_at: Timestamp },
    Expired { expires_at: Timestamp },
    Revoked { revoked_at: Timestamp, reason: String },
    Unknown,
}

impl AuthorityStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn reason(&self) -> Option<AuthorityReason> {
        match self {
            Self::Active | Self::Unknown => None,
            Self::NotYetEffective { .. } => Some(AuthorityReason::NotYetEffective),
            Self::Expired { .. } => Some(AuthorityReason::Expired),
            Self::Revoked { .. } => Some(AuthorityReason::Revoked),
        }
    }
}

impl std::fmt::Display for AuthorityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::NotYetEffective { effective_at } => {
                write!(f, "not yet effective (effective_at {effective_at})")
            }
            Self::Expired { expires_at } => write!(f, "expired at {expires_at}"),
            Self::Revoked { revoked_at, reason } => write!(f, "revoked at {revoked_at}: {reason}"),
            Self::Unknown => write!(f, "unknown authority"),
        }
    }
}

/// Earliest revocation of `authority_id` with `revoked_at ≤ at`.
fn revoked_by<'a>(
    entries: &'a [AuthorityEntry],
    authority_id: &str,
    at: Timestamp,
) -> Option<&'a AuthorityGrant> {
    entries
        .iter()
        .map(|e| &e.body)
        .filter(|g| g.is_revocation() && g.authority_id == authority_id)
        .filter(|g| g.revoked_at.is_some_and(|r| r <= at))
        .min_by_key(|g| g.revoked_at)
}

/// Grants of `actor_id` that are active at `at`.
///
/// Active means: not a revocation entry, not revoked by an entry with
/// `revoked_at ≤ at`, `effective_at ≤ at`, and `expires_at` null or `> at`.
pub fn active_grants<'a>(
    entries: &'a [AuthorityEntry],
    actor_id: &str,
    at: Timestamp,
) -> Vec<&'a AuthorityEntry> {
    entries
        .iter()
        .filter(|e| !e.body.is_revocation() && e.body.actor_id == actor_id)
        .filter(|e| revoked_by(entries, &e.body.authority_id, at).is_none())
        .filter(|e| e.body.in_window(at))
        .collect()
}

/// Path-backed authority ledger.
#[derive(Debug, Clone)]
pub struct AuthorityLedger {
    store: NdjsonStore,
}

impl AuthorityLedger {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            store: NdjsonStore::new(path.as_ref()),
        }
    }

    pub fn from_store(store: NdjsonStore) -> Self {
        Self { store }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn store(&self) -> &NdjsonStore {
        &self.store
    }

    /// Append a grant. Fails before writing if a required field is missing or
    /// the window is empty.
    pub fn append(&self, request: GrantRequest) -> Result<AuthorityEntry, LedgerError> {
        if request.grant_type == GrantType::Revocation {
            return Err(LedgerError::InvalidEntry(
                "revocations are appended with revoke()".into(),
            ));
        }
        request.validate()?;
        let grant = request.into_grant(None)?;
        let entry = append_chained(&self.store, Some(Timestamp::now()), |_| Ok(grant))?;
        tracing::info!(
            entry_id = %entry.body.entry_id,
            authority_id = %entry.body.authority_id,
            actor_id = %entry.body.actor_id,
            "authority grant appended"
        );
        Ok(entry)
    }

    /// Append a revocation of `authority_id` effective at `at`.
    ///
    /// The original grant is looked up while the writer lock is held, so two
    /// concurrent revocations cannot both be appended.
    pub fn revoke(
        &self,
        authority_id: &str,
        reason: &str,
        at: Timestamp,
    ) -> Result<AuthorityEntry, LedgerError> {
        let entry = append_chained(&self.store, Some(Timestamp::now()), |_| {
            let entries = self.entries()?;
            let original = entries
                .iter()
                .rev()
                .find(|e| e.body.authority_id == authority_id && !e.body.is_revocation())
                .ok_or_else(|| {
                    LedgerError::NotFound(format!("authority grant {authority_id:?}"))
                })?
                .body
                .clone();
            if let Some(prior) = entries
                .iter()
                .find(|e| e.body.is_revocation() && e.body.authority_id == authority_id)
            {
                return Err(LedgerError::InvalidEntry(format!(
                    "{authority_id} already revoked by {}",
                    prior.body.entry_id
                )));
            }
            let request = GrantRequest {
                grant_type: GrantType::Revocation,
                scope_bound: original.scope_bound,
                policy_version: original.policy_version,
                policy_hash: original.policy_hash,
                notes: format!("Revocation of {authority_id}"),
                ..GrantRequest::new(authority_id, original.actor_id, original.actor_role, at)
            };
            request.into_grant(Some((at, reason.to_string())))
        })?;
        tracing::info!(
            entry_id = %entry.body.entry_id,
            authority_id = %authority_id,
            "authority revoked"
        );
        Ok(entry)
    }

    pub fn entries(&self) -> Result<Vec<AuthorityEntry>, LedgerError> {
        self.store.read_all()
    }

    pub fn find_entry(&self, entry_id: &str) -> Result<Option<AuthorityEntry>, LedgerError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.body.entry_id == entry_id))
    }

    /// The most recent non-revocation grant for `authority_id`.
    pub fn find_grant(&self, authority_id: &str) -> Result<Option<AuthorityEntry>, LedgerError> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .find(|e| e.body.authority_id == authority_id && !e.body.is_revocation()))
    }

    pub fn find_active(
        &self,
        actor_id: &str,
        at: Timestamp,
    ) -> Result<Vec<AuthorityEntry>, LedgerError> {
        let entries = self.entries()?;
        Ok(active_grants(&entries, actor_id, at)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Whether `authority_id` has a revocation entry with `revoked_at ≤ at`.
    pub fn revocation_of(
        &self,
        authority_id: &str,
        at: Timestamp,
    ) -> Result<Option<AuthorityGrant>, LedgerError> {
        let entries = self.entries()?;
        Ok(revoked_by(&entries, authority_id, at).cloned())
    }

    pub fn status(&self, authority_id: &str, at: Timestamp) -> Result<AuthorityStatus, LedgerError> {
        let entries = self.entries()?;
        let Some(grant) = entries
            .iter()
            .rev()
            .map(|e| &e.body)
            .find(|g| g.authority_id == authority_id && !g.is_revocation())
        else {
            return Ok(AuthorityStatus::Unknown);
        };
        if let Some(rev) = revoked_by(&entries, authority_id, at) {
            return Ok(AuthorityStatus::Revoked {
                revoked_at: rev.revoked_at.unwrap_or(rev.effective_at),
                reason: rev.revocation_reason.clone().unwrap_or_default(),
            });
        }
        if grant.effective_at > at {
            return Ok(AuthorityStatus::NotYetEffective {
                effective_at: grant.effective_at,
            });
        }
        if let Some(exp) = grant.expires_at.filter(|exp| *exp <= at) {
            return Ok(AuthorityStatus::Expired { expires_at: exp });
        }
        Ok(AuthorityStatus::Active)
    }

    /// The grant for `authority_id`, or the typed reason it is not usable.
    pub fn require_active(
        &self,
        authority_id: &str,
        at: Timestamp,
    ) -> Result<AuthorityEntry, LedgerError> {
        let status = self.status(authority_id, at)?;
        match status.reason() {
            None if status.is_active() => self
                .find_grant(authority_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("authority grant {authority_id:?}"))),
            Some(reason) => Err(LedgerError::authority(
                reason,
                format!("{authority_id}: {status}"),
            )),
            None => Err(LedgerError::NotFound(format!(
                "authority grant {authority_id:?}"
            ))),
        }
    }

    pub fn verify(&self) -> VerificationReport {
        verify_chain(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn ledger() -> (tempfile::TempDir, AuthorityLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuthorityLedger::open(dir.path().join("ledger.ndjson"));
        (dir, ledger)
    }

    fn grant(id: &str, actor: &str, eff: &str) -> GrantRequest {
        GrantRequest::new(id, actor, "Operator", ts(eff)).scope(ScopeBound {
            decisions: vec!["DEC-001".into()],
            ..ScopeBound::default()
        })
    }

    #[test]
    fn entry_id_is_deterministic() {
        let (_d1, a) = ledger();
        let (_d2, b) = ledger();
        let ea = a.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        let eb = b.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        assert_eq!(ea.body.entry_id, eb.body.entry_id);
        assert!(ea.body.entry_id.starts_with("AUTH-"));
        assert_eq!(ea.entry_hash, eb.entry_hash);
        assert!(ea.prev_entry_hash.is_none());
    }

    #[test]
    fn missing_actor_is_rejected_before_writing() {
        let (_d, l) = ledger();
        let err = l.append(grant("AUTH-001", " ", "2026-02-21T00:00:00Z")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry(_)));
        assert!(!l.path().exists());
    }

    #[test]
    fn empty_window_is_rejected() {
        let (_d, l) = ledger();
        let req = grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")
            .expires_at(ts("2026-02-21T00:00:00Z"));
        assert!(l.append(req).is_err());
    }

    #[test]
    fn revoke_without_grant_is_not_found() {
        let (_d, l) = ledger();
        let err = l
            .revoke("AUTH-404", "nope", ts("2026-02-21T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn revoke_appends_a_linked_revocation_entry() {
        let (_d, l) = ledger();
        let g = l.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        let r = l
            .revoke("AUTH-001", "policy expired", ts("2026-03-01T00:00:00Z"))
            .unwrap();
        assert_eq!(r.body.grant_type, GrantType::Revocation);
        assert_eq!(r.body.actor_id, "alice");
        assert_eq!(r.prev_entry_hash.as_deref(), Some(g.entry_hash.as_str()));
        assert_eq!(r.body.revocation_reason.as_deref(), Some("policy expired"));
        assert!(l.verify().passed());
    }

    #[test]
    fn second_revocation_is_rejected() {
        let (_d, l) = ledger();
        l.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        l.revoke("AUTH-001", "one", ts("2026-03-01T00:00:00Z")).unwrap();
        assert!(matches!(
            l.revoke("AUTH-001", "two", ts("2026-03-02T00:00:00Z")),
            Err(LedgerError::InvalidEntry(_))
        ));
    }

    #[test]
    fn status_transitions() {
        let (_d, l) = ledger();
        l.append(
            grant("AUTH-001", "alice", "2026-02-21T00:00:00Z").expires_at(ts("2026-06-01T00:00:00Z")),
        )
        .unwrap();
        assert_eq!(l.status("AUTH-404", ts("2026-03-01T00:00:00Z")).unwrap(), AuthorityStatus::Unknown);
        assert!(matches!(
            l.status("AUTH-001", ts("2026-02-20T00:00:00Z")).unwrap(),
            AuthorityStatus::NotYetEffective { .. }
        ));
        assert!(l.status("AUTH-001", ts("2026-03-01T00:00:00Z")).unwrap().is_active());
        assert!(matches!(
            l.status("AUTH-001", ts("2026-06-01T00:00:00Z")).unwrap(),
            AuthorityStatus::Expired { .. }
        ));

        l.revoke("AUTH-001", "rotated", ts("2026-04-01T00:00:00Z")).unwrap();
        assert!(l.status("AUTH-001", ts("2026-03-31T23:59:59Z")).unwrap().is_active());
        assert!(matches!(
            l.status("AUTH-001", ts("2026-04-01T00:00:00Z")).unwrap(),
            AuthorityStatus::Revoked { .. }
        ));
    }

    #[test]
    fn require_active_reports_reason_codes() {
        let (_d, l) = ledger();
        l.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        assert!(l.require_active("AUTH-001", ts("2026-02-22T00:00:00Z")).is_ok());
        l.revoke("AUTH-001", "gone", ts("2026-03-01T00:00:00Z")).unwrap();
        match l.require_active("AUTH-001", ts("2026-03-02T00:00:00Z")) {
            Err(LedgerError::Authority { reason, .. }) => assert_eq!(reason, AuthorityReason::Revoked),
            other => panic!("expected revoked, got {other:?}"),
        }
        assert!(matches!(
            l.require_active("AUTH-404", ts("2026-03-02T00:00:00Z")),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn find_active_filters_by_actor_and_window() {
        let (_d, l) = ledger();
        l.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        l.append(grant("AUTH-002", "bob", "2026-02-21T00:00:00Z")).unwrap();
        l.append(grant("AUTH-003", "alice", "2026-05-01T00:00:00Z")).unwrap();
        let active = l.find_active("alice", ts("2026-03-01T00:00:00Z")).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].body.authority_id, "AUTH-001");
    }

    #[test]
    fn revocation_at_grant_time_gets_its_own_id() {
        let (_d, l) = ledger();
        let at = "2026-02-21T00:00:00Z";
        let g = l.append(grant("AUTH-001", "alice", at)).unwrap();
        let r = l.revoke("AUTH-001", "issued in error", ts(at)).unwrap();
        assert_ne!(g.body.entry_id, r.body.entry_id);
        assert!(!l.find_entry(&g.body.entry_id).unwrap().unwrap().body.is_revocation());
        assert!(l.find_entry(&r.body.entry_id).unwrap().unwrap().body.is_revocation());
    }

    #[test]
    fn find_entry_by_id() {
        let (_d, l) = ledger();
        let e = l.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        assert_eq!(l.find_entry(&e.body.entry_id).unwrap().unwrap(), e);
        assert!(l.find_entry("AUTH-00000000").unwrap().is_none());
    }

    #[test]
    fn entries_round_trip_the_documented_shape() {
        let (_d, l) = ledger();
        l.append(grant("AUTH-001", "alice", "2026-02-21T00:00:00Z")).unwrap();
        let raw = l.store().read_values().unwrap().remove(0);
        for key in [
            "entry_version", "entry_id", "authority_id", "actor_id", "actor_role",
            "grant_type", "scope_bound", "policy_version", "policy_hash", "effective_at",
            "expires_at", "revoked_at", "revocation_reason", "witness_required",
            "witness_role", "signing_key_id", "signature_ref", "commit_hash_refs", "notes",
            "prev_entry_hash", "entry_hash", "observed_at",
        ] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
        assert_eq!(raw["effective_at"], "2026-02-21T00:00:00Z");
    }
}
