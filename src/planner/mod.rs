//! # Predicate Evaluator
//!
//! Decides, per predicate, whether storage or the client evaluates it.
//!
//! ```text
//! Predicate -> [field check] -> [simplify] -> [Translator] -> EvaluationPlan
//!                                                  |
//!                                 Ok(fragment) -> Pushed
//!                                 Err(reason)  -> Deferred
//! ```
//!
//! The decision depends only on the field expressions a predicate touches,
//! the storage capabilities, and configuration. Array representation is not
//! an input: it is erased before translation sees a column, so two fields
//! built by the same transformation over a sequence column and a fixed
//! column always receive the same plan kind.
//!
//! Translation failures never reach the caller. The only compile error is a
//! predicate naming a field the projection does not have.

pub mod translate;

pub use translate::{TranslationError, Translator};

use crate::ir::Predicate;
use crate::projection::{ProjectedRow, Projection};
use crate::storage::{Capabilities, SqlExpr};
use std::fmt;

/// Where a predicate is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanKind {
    Pushed,
    Deferred,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanKind::Pushed => write!(f, "pushed"),
            PlanKind::Deferred => write!(f, "deferred"),
        }
    }
}

/// Outcome of compiling one predicate
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationPlan {
    /// Storage evaluates `fragment`
    Pushed {
        predicate: Predicate,
        fragment: SqlExpr,
    },
    /// Storage returns unfiltered rows; `predicate` runs after materialisation
    Deferred {
        predicate: Predicate,
        reason: TranslationError,
    },
}

impl EvaluationPlan {
    pub fn kind(&self) -> PlanKind {
        match self {
            EvaluationPlan::Pushed { .. } => PlanKind::Pushed,
            EvaluationPlan::Deferred { .. } => PlanKind::Deferred,
        }
    }

    pub fn is_pushed(&self) -> bool {
        self.kind() == PlanKind::Pushed
    }

    /// The (simplified) predicate this plan evaluates
    pub fn predicate(&self) -> &Predicate {
        match self {
            EvaluationPlan::Pushed { predicate, .. } | EvaluationPlan::Deferred { predicate, .. } => {
                predicate
            }
        }
    }

    /// Storage fragment, for pushed plans
    pub fn fragment(&self) -> Option<&SqlExpr> {
        match self {
            EvaluationPlan::Pushed { fragment, .. } => Some(fragment),
            EvaluationPlan::Deferred { .. } => None,
        }
    }

    /// Why the plan was deferred
    pub fn reason(&self) -> Option<&TranslationError> {
        match self {
            EvaluationPlan::Pushed { .. } => None,
            EvaluationPlan::Deferred { reason, .. } => Some(reason),
        }
    }

    /// Client-side half of the plan. Pushed plans pass rows through since
    /// storage already filtered them.
    pub fn apply(&self, rows: Vec<ProjectedRow>) -> Vec<ProjectedRow> {
        match self {
            EvaluationPlan::Pushed { .. } => rows,
            EvaluationPlan::Deferred { predicate, .. } => {
                rows.into_iter().filter(|row| predicate.matches(row)).collect()
            }
        }
    }
}

impl fmt::Display for EvaluationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationPlan::Pushed { fragment, .. } => write!(f, "Pushed[{fragment}]"),
            EvaluationPlan::Deferred { predicate, reason } => {
                write!(f, "Deferred[{predicate}] ({reason})")
            }
        }
    }
}

/// Compile errors. Untranslatable predicates are not errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Predicate references unknown field '{field}' (projection over '{table}')")]
    UnknownField { table: String, field: String },
}

/// Per-predicate plan lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum PlanState {
    Untranslated(Predicate),
    Planned(EvaluationPlan),
}

impl PlanState {
    pub fn new(predicate: Predicate) -> Self {
        PlanState::Untranslated(predicate)
    }

    /// Move to `Planned`. A planned state is terminal and returned as is.
    pub fn advance(self, evaluator: &Evaluator, projection: &Projection) -> Result<Self, PlanError> {
        match self {
            PlanState::Untranslated(predicate) => {
                Ok(PlanState::Planned(evaluator.compile(&predicate, projection)?))
            }
            planned @ PlanState::Planned(_) => Ok(planned),
        }
    }

    pub fn plan(&self) -> Option<&EvaluationPlan> {
        match self {
            PlanState::Untranslated(_) => None,
            PlanState::Planned(plan) => Some(plan),
        }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self, PlanState::Planned(_))
    }
}

/// Compiles predicates against a storage engine's capabilities
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    capabilities: Capabilities,
    pushdown: bool,
}

impl Evaluator {
    pub fn new(capabilities: Capabilities) -> Self {
        Evaluator {
            capabilities,
            pushdown: true,
        }
    }

    /// Enable or disable pushdown. Disabled means every plan is deferred.
    pub fn with_pushdown(mut self, enabled: bool) -> Self {
        self.pushdown = enabled;
        self
    }

    pub fn pushdown_enabled(&self) -> bool {
        self.pushdown
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Compile a predicate over a projection's fields
    pub fn compile(
        &self,
        predicate: &Predicate,
        projection: &Projection,
    ) -> Result<EvaluationPlan, PlanError> {
        if let Some(field) = predicate
            .referenced_fields()
            .into_iter()
            .find(|f| projection.field(f).is_none())
        {
            return Err(PlanError::UnknownField {
                table: projection.schema().table().to_string(),
                field: field.to_string(),
            });
        }

        let predicate = simplify(predicate.clone());

        let translated = if self.pushdown {
            Translator::new(projection, self.capabilities).translate(&predicate)
        } else {
            Err(TranslationError::PushdownDisabled)
        };

        let plan = match translated {
            Ok(fragment) => EvaluationPlan::Pushed {
                predicate,
                fragment,
            },
            Err(reason) => {
                tracing::debug!(%predicate, %reason, "translation_fallback");
                EvaluationPlan::Deferred { predicate, reason }
            }
        };
        tracing::info!(kind = %plan.kind(), plan = %plan, "plan_compiled");
        Ok(plan)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Capabilities::default())
    }
}

/// Fold constant TRUE/FALSE leaves to fixpoint. Every rule holds under
/// three-valued logic, so the simplified predicate selects the same rows.
pub fn simplify(predicate: Predicate) -> Predicate {
    let mut current = predicate;
    loop {
        let next = simplify_once(current.clone());
        if next == current {
            return current;
        }
        current = next;
    }
}

fn simplify_once(predicate: Predicate) -> Predicate {
    match predicate {
        Predicate::And(l, r) => match (simplify_once(*l), simplify_once(*r)) {
            (Predicate::False, _) | (_, Predicate::False) => Predicate::False,
            (Predicate::True, other) | (other, Predicate::True) => other,
            (l, r) => l.and(r),
        },
        Predicate::Or(l, r) => match (simplify_once(*l), simplify_once(*r)) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (Predicate::False, other) | (other, Predicate::False) => other,
            (l, r) => l.or(r),
        },
        Predicate::Not(inner) => match simplify_once(*inner) {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Not(x) => *x,
            other => other.not(),
        },
        leaf => leaf,
    }
}
