//! # Composition
//!
//! A parent ABP is the union of its children:
//!
//! - list sections are concatenated in child order, without dedup;
//! - `proof.required` is a sorted set union;
//! - delegation-review triggers are deduplicated by id, and the review
//!   policy with the smallest `timeout_ms` wins (missing timeout ranks last);
//! - `composition.children` lists every child's `(abp_id, hash)`.
//!
//! The merged document is built like any other, so a contradiction between
//! two children fails the composition.

use std::collections::{BTreeSet, HashSet};

use seal_core::Timestamp;

use crate::build::AbpBuilder;
use crate::error::AbpError;
use crate::model::*;

fn tighter(candidate: &ReviewPolicy, current: &ReviewPolicy) -> bool {
    candidate.timeout_ms.unwrap_or(u64::MAX) < current.timeout_ms.unwrap_or(u64::MAX)
}

/// Merge the delegation-review sections of `children`.
pub fn merge_delegation_review(children: &[Abp]) -> Option<DelegationReview> {
    let mut triggers = Vec::new();
    let mut seen = HashSet::new();
    let mut policy: Option<ReviewPolicy> = None;

    for review in children.iter().filter_map(|c| c.delegation_review.as_ref()) {
        for trigger in &review.triggers {
            if seen.insert(trigger.id.clone()) {
                triggers.push(trigger.clone());
            }
        }
        if let Some(candidate) = &review.review_policy {
            if policy.as_ref().map_or(true, |p| tighter(candidate, p)) {
                policy = Some(candidate.clone());
            }
        }
    }

    if triggers.is_empty() {
        return None;
    }
    Some(DelegationReview {
        triggers,
        review_policy: Some(policy.unwrap_or_default()),
    })
}

/// Parameters of the parent document.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub scope: AbpScope,
    pub authority_ref: AuthorityRef,
    pub clock: Timestamp,
    pub effective_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

/// Build a parent ABP from `children`. With no children the parent is an
/// empty-boundary ABP whose `composition.children` is empty.
pub fn compose(request: ComposeRequest, children: &[Abp]) -> Result<Abp, AbpError> {
    let mut objectives = Objectives::default();
    let mut tools = Tools::default();
    let mut data = DataSection::default();
    let mut approvals = Approvals::default();
    let mut escalation = Escalation::default();
    let mut runtime = Runtime::default();
    let mut proof = BTreeSet::new();
    let mut refs = Vec::with_capacity(children.len());

    for child in children {
        objectives.allowed.extend(child.objectives.allowed.iter().cloned());
        objectives.denied.extend(child.objectives.denied.iter().cloned());
        tools.allow.extend(child.tools.allow.iter().cloned());
        tools.deny.extend(child.tools.deny.iter().cloned());
        data.permissions.extend(child.data.permissions.iter().cloned());
        approvals.required.extend(child.approvals.required.iter().cloned());
        escalation.paths.extend(child.escalation.paths.iter().cloned());
        runtime.validators.extend(child.runtime.validators.iter().cloned());
        proof.extend(child.proof.required.iter().cloned());
        refs.push(ChildRef {
            abp_id: child.abp_id.clone(),
            abp_hash: child.hash.clone(),
        });
    }

    let mut builder = AbpBuilder::new(request.scope, request.authority_ref, request.clock)
        .objectives(objectives)
        .tools(tools)
        .data(data)
        .approvals(approvals)
        .escalation(escalation)
        .runtime(runtime)
        .proof(Proof {
            required: proof.into_iter().collect(),
        })
        .delegation_review(merge_delegation_review(children))
        .expires_at(request.expires_at)
        .children(refs);
    if let Some(at) = request.effective_at {
        builder = builder.effective_at(at);
    }
    let parent = builder.build()?;
    tracing::info!(
        abp_id = %parent.abp_id,
        children = parent.composition.children.len(),
        "ABP composed"
    );
    Ok(parent)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn clock() -> Timestamp {
        Timestamp::parse("2026-02-24T00:00:00Z").unwrap()
    }

    fn auth_ref() -> AuthorityRef {
        AuthorityRef {
            authority_entry_id: "AUTH-0000aaaa".into(),
            authority_entry_hash: format!("sha256:{}", "00".repeat(32)),
            authority_ledger_path: None,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn merged_lists_are_the_ordered_union(
            children_tools in prop::collection::vec(
                prop::collection::vec("[a-e]", 0..4), 1..5),
        ) {
            let children: Vec<Abp> = children_tools
                .iter()
                .enumerate()
                .map(|(i, names)| {
                    AbpBuilder::new(
                        AbpScope {
                            contract_id: format!("CTR-{i}"),
                            program: "P".into(),
                            modules: vec![],
                        },
                        auth_ref(),
                        clock(),
                    )
                    .tools(Tools {
                        allow: names.iter().map(Tool::new).collect(),
                        deny: vec![],
                    })
                    .build()
                    .unwrap()
                })
                .collect();
            let parent = compose(
                ComposeRequest {
                    scope: AbpScope { contract_id: "CTR".into(), program: "P".into(), modules: vec![] },
                    authority_ref: auth_ref(),
                    clock: clock(),
                    effective_at: None,
                    expires_at: None,
                },
                &children,
            ).unwrap();

            let expected: Vec<String> = children_tools.into_iter().flatten().collect();
            let got: Vec<String> = parent.tools.allow.iter().map(|t| t.name.clone()).collect();
            prop_assert_eq!(got, expected);
            prop_assert_eq!(parent.composition.children.len(), children.len());
            for (r, c) in parent.composition.children.iter().zip(&children) {
                prop_assert_eq!(&r.abp_id, &c.abp_id);
                prop_assert_eq!(&r.abp_hash, &c.hash);
            }
        }
    }
}
