//! Ordered rule table mapping raw failures to [`RejectError`]s.
//!
//! # Design Decisions
//! - First matching rule wins; the table order is the classification policy
//! - The table is rebuilt from config and swapped with `ArcSwap`; a
//!   classification always sees one consistent table
//! - Custom rules survive reloads and run after the configured domain rules

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::classify::notice::BenignCodes;
use crate::classify::raw::{RawFailure, TransportKind};
use crate::classify::reject::RejectError;
use crate::config::{ClassifierConfig, DomainErrorKind};
use crate::session::BackendId;

const MAX_DETAIL_CHARS: usize = 200;

type Predicate = dyn Fn(&RawFailure) -> Option<RejectError> + Send + Sync;

/// A named predicate → kind mapping.
pub struct Rule {
    name: String,
    apply: Box<Predicate>,
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&RawFailure) -> Option<RejectError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

#[derive(Debug, Default)]
struct RuleTable {
    rules: Vec<Arc<Rule>>,
}

impl RuleTable {
    fn build(config: &ClassifierConfig, custom: &[Arc<Rule>]) -> Self {
        let mut rules = vec![
            Rule::new("transport_timeout", |raw| match raw {
                RawFailure::Transport {
                    kind: TransportKind::Timeout,
                    ..
                } => Some(RejectError::Timeout),
                _ => None,
            }),
            Rule::new("transport_connect", |raw| match raw {
                RawFailure::Transport {
                    kind: TransportKind::Connect,
                    ..
                } => Some(RejectError::NetworkError),
                _ => None,
            }),
            Rule::new("transport_other", |raw| match raw {
                RawFailure::Transport { message, .. } => Some(RejectError::internal(message.clone())),
                _ => None,
            }),
            Rule::new("relogin", |raw| match raw {
                RawFailure::Relogin { cause, reason } => {
                    Some(RejectError::relogin(*cause, reason.clone()))
                }
                _ => None,
            }),
            envelope_code_rule("primary_auth", &config.auth_codes, BackendId::Primary),
            envelope_code_rule(
                "academic_session",
                &config.academic_session_codes,
                BackendId::Academic,
            ),
            booking_status_rule(config.booking_auth_status),
        ]
        .into_iter()
        .map(Arc::new)
        .collect::<Vec<_>>();

        for (index, domain) in config.domain_rules.iter().enumerate() {
            let (backend, marker, kind, message) = (
                domain.backend,
                domain.marker.clone(),
                domain.kind,
                domain.message.clone(),
            );
            rules.push(Arc::new(Rule::new(format!("domain_{index}"), move |raw| {
                match raw {
                    RawFailure::Response(response)
                        if response.backend == backend && response.body.contains(&marker) =>
                    {
                        let message = message.clone();
                        Some(match kind {
                            DomainErrorKind::EvaluationNotFound => {
                                RejectError::EvaluationNotFound { message }
                            }
                            DomainErrorKind::NativeLoginFailed => {
                                RejectError::NativeLoginFailed { message }
                            }
                        })
                    }
                    _ => None,
                }
            })));
        }

        rules.extend(custom.iter().cloned());

        let success_code = config.success_code.clone();
        rules.push(Arc::new(Rule::new("business", move |raw| match raw {
            RawFailure::Response(response) => response
                .envelope
                .as_ref()
                .filter(|envelope| envelope.code != success_code)
                .map(|envelope| RejectError::BizFailed {
                    code: envelope.code.clone(),
                    message: envelope.message.clone(),
                    data: envelope.data.clone(),
                }),
            _ => None,
        })));
        rules.push(Arc::new(Rule::new("http_unauthorized", |raw| match raw {
            RawFailure::Response(response) if matches!(response.status, 401 | 403) => {
                Some(RejectError::AuthFailed {
                    backend: response.backend,
                })
            }
            _ => None,
        })));

        Self { rules }
    }

    fn classify(&self, raw: &RawFailure) -> RejectError {
        if let Some((rule, error)) = self
            .rules
            .iter()
            .find_map(|rule| (rule.apply)(raw).map(|error| (rule, error)))
        {
            tracing::trace!(rule = rule.name(), kind = error.kind().as_str(), "Failure classified");
            return error;
        }

        match raw {
            RawFailure::Response(response) => RejectError::InternalFailed {
                status: Some(response.status),
                detail: truncate(&response.body),
            },
            RawFailure::Malformed { detail, .. } => RejectError::internal(truncate(detail)),
            RawFailure::Transport { message, .. } => RejectError::internal(message.clone()),
            RawFailure::Relogin { cause, reason } => RejectError::relogin(*cause, reason.clone()),
        }
    }
}

/// Primary-envelope codes that report an expired credential of `target`.
fn envelope_code_rule(name: &str, codes: &[String], target: BackendId) -> Rule {
    let codes: HashSet<String> = codes.iter().cloned().collect();
    Rule::new(name, move |raw| match raw {
        RawFailure::Response(response) if response.backend == BackendId::Primary => response
            .envelope
            .as_ref()
            .filter(|envelope| codes.contains(&envelope.code))
            .map(|_| RejectError::AuthFailed { backend: target }),
        _ => None,
    })
}

fn booking_status_rule(status: u16) -> Rule {
    Rule::new("booking_auth", move |raw| match raw {
        RawFailure::Response(response)
            if response.backend == BackendId::Booking && response.status == status =>
        {
            Some(RejectError::AuthFailed {
                backend: BackendId::Booking,
            })
        }
        _ => None,
    })
}

fn truncate(detail: &str) -> String {
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}

/// Pure mapping from [`RawFailure`] to [`RejectError`], reloadable at runtime.
#[derive(Debug)]
pub struct Classifier {
    table: ArcSwap<RuleTable>,
    benign: ArcSwap<BenignCodes>,
    custom: Vec<Arc<Rule>>,
    config: ArcSwap<ClassifierConfig>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            table: ArcSwap::from_pointee(RuleTable::build(&config, &[])),
            benign: ArcSwap::from_pointee(BenignCodes::new(config.benign_codes.iter().cloned())),
            custom: Vec::new(),
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Append an integration-specific rule.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.custom.push(Arc::new(rule));
        let table = RuleTable::build(&self.config.load(), &self.custom);
        self.table.store(Arc::new(table));
        self
    }

    pub fn classify(&self, raw: &RawFailure) -> RejectError {
        self.table.load().classify(raw)
    }

    /// Swap in tables built from `config`.
    pub fn reload(&self, config: &ClassifierConfig) {
        self.table
            .store(Arc::new(RuleTable::build(config, &self.custom)));
        self.benign
            .store(Arc::new(BenignCodes::new(config.benign_codes.iter().cloned())));
        tracing::info!(
            rules = self.table.load().rules.len(),
            benign = config.benign_codes.len(),
            "Classifier tables reloaded"
        );
        self.config.store(Arc::new(config.clone()));
    }

    /// Configuration the current tables were built from.
    pub fn config(&self) -> Arc<ClassifierConfig> {
        self.config.load_full()
    }

    /// Current benign-code allow-list.
    pub fn benign_codes(&self) -> Arc<BenignCodes> {
        self.benign.load_full()
    }
}
