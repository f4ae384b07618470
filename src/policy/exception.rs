// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{FailureKind, TaskFailure};
use crate::policy::redelivery::RedeliveryPolicy;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// What to do with a failure once a policy matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandlingIntent {
    /// Redeliver under the policy's redelivery settings.
    #[default]
    Retry,
    /// Clear the failure and stop routing.
    Handled,
    /// Clear the failure and keep routing.
    Continued,
    /// Fatal: go straight to recovery.
    None,
}

impl HandlingIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            HandlingIntent::Retry => "retry",
            HandlingIntent::Handled => "handled",
            HandlingIntent::Continued => "continued",
            HandlingIntent::None => "none",
        }
    }
}

pub const SPECIFICITY_EXACT_TYPE: u32 = 3;
pub const SPECIFICITY_CAUSE_TYPE: u32 = 2;
pub const SPECIFICITY_KIND: u32 = 1;
pub const SPECIFICITY_ANY: u32 = 0;

type MatchFn = Arc<dyn Fn(&TaskFailure) -> bool + Send + Sync>;

/// Decides whether a policy applies to a failure, with a specificity used to
/// rank competing matches.
#[derive(Clone)]
pub struct FailureMatcher {
    description: String,
    specificity: u32,
    predicate: MatchFn,
}

impl FailureMatcher {
    pub fn any() -> Self {
        Self::custom("any", SPECIFICITY_ANY, |_| true)
    }

    pub fn kind(kind: FailureKind) -> Self {
        Self::custom(format!("kind={}", kind), SPECIFICITY_KIND, move |failure| {
            failure.kind() == kind
        })
    }

    pub fn kinds(kinds: Vec<FailureKind>) -> Self {
        let description = kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join("|");
        Self::custom(format!("kind={}", description), SPECIFICITY_KIND, move |failure| {
            kinds.contains(&failure.kind())
        })
    }

    /// Matches when the outermost cause is an `E`.
    pub fn error_type<E>() -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::custom(
            std::any::type_name::<E>(),
            SPECIFICITY_EXACT_TYPE,
            TaskFailure::is_error::<E>,
        )
    }

    /// Matches when an `E` appears anywhere in the cause chain.
    pub fn cause_type<E>() -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::custom(
            format!("caused by {}", std::any::type_name::<E>()),
            SPECIFICITY_CAUSE_TYPE,
            TaskFailure::has_cause::<E>,
        )
    }

    pub fn custom<F>(description: impl Into<String>, specificity: u32, predicate: F) -> Self
    where
        F: Fn(&TaskFailure) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            specificity,
            predicate: Arc::new(predicate),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn specificity(&self) -> u32 {
        self.specificity
    }

    pub fn matches(&self, failure: &TaskFailure) -> bool {
        (self.predicate)(failure)
    }
}

impl fmt::Debug for FailureMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureMatcher")
            .field("description", &self.description)
            .field("specificity", &self.specificity)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionPolicy {
    intent: HandlingIntent,
    redelivery: Option<Arc<RedeliveryPolicy>>,
}

impl ExceptionPolicy {
    pub fn new(intent: HandlingIntent) -> Self {
        Self {
            intent,
            redelivery: None,
        }
    }

    pub fn retry(redelivery: RedeliveryPolicy) -> Self {
        Self {
            intent: HandlingIntent::Retry,
            redelivery: Some(Arc::new(redelivery)),
        }
    }

    pub fn with_redelivery(mut self, redelivery: Arc<RedeliveryPolicy>) -> Self {
        self.redelivery = Some(redelivery);
        self
    }

    pub fn intent(&self) -> HandlingIntent {
        self.intent
    }
}

/// The policy chosen for one failure, with its effective redelivery settings.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub intent: HandlingIntent,
    pub redelivery: &'a Arc<RedeliveryPolicy>,
    /// Description of the matcher that won, `None` for the default policy.
    pub matched: Option<&'a str>,
}

/// Ordered table of failure matchers and the policies they select.
#[derive(Debug, Clone)]
pub struct ExceptionPolicies {
    entries: Vec<(FailureMatcher, ExceptionPolicy)>,
    default_redelivery: Arc<RedeliveryPolicy>,
}

impl ExceptionPolicies {
    /// A table with no entries: every failure resolves to `Retry` under
    /// `default_redelivery`.
    pub fn new(default_redelivery: Arc<RedeliveryPolicy>) -> Self {
        Self {
            entries: Vec::new(),
            default_redelivery,
        }
    }

    pub fn with(mut self, matcher: FailureMatcher, policy: ExceptionPolicy) -> Self {
        self.push(matcher, policy);
        self
    }

    pub fn push(&mut self, matcher: FailureMatcher, policy: ExceptionPolicy) {
        self.entries.push((matcher, policy));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_redelivery(&self) -> &Arc<RedeliveryPolicy> {
        &self.default_redelivery
    }

    /// Highest specificity wins; ties go to the entry declared first.
    pub fn resolve(&self, failure: &TaskFailure) -> Resolution<'_> {
        let mut best: Option<&(FailureMatcher, ExceptionPolicy)> = None;
        for entry in &self.entries {
            if !entry.0.matches(failure) {
                continue;
            }
            if best.map_or(true, |(winner, _)| entry.0.specificity() > winner.specificity()) {
                best = Some(entry);
            }
        }

        match best {
            Some((matcher, policy)) => Resolution {
                intent: policy.intent,
                redelivery: policy.redelivery.as_ref().unwrap_or(&self.default_redelivery),
                matched: Some(matcher.description()),
            },
            None => Resolution {
                intent: HandlingIntent::Retry,
                redelivery: &self.default_redelivery,
                matched: None,
            },
        }
    }
}
