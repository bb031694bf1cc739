//! Subpool predicates: parsing and evaluation
//!
//! The five comparison operators see a list-valued field as its comma-joined
//! flattened string, so `d_s_cat2 = 'cat21'` only matches items whose list is
//! exactly `["cat21"]`. `contains` is the list-aware operator for membership.

mod evaluator;
mod predicate;
mod subpool;

pub use evaluator::ConditionEvaluator;
pub use predicate::{Literal, Operator, Predicate, Term};
pub use subpool::Subpool;
