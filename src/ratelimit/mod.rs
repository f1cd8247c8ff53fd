//! Rate limiting logic: rule grammar, expression tree, selector
//! resolution, sliding-window counting, and orchestration.

mod expr;
mod limiter;
mod lock;
mod rule;
mod selector;
mod window;

pub use expr::{and, or, Expr, LeafPredicate};
pub use limiter::{Limit, RateLimiter, Verdict};
pub use rule::Rule;
pub use selector::{Selector, SelectorContext, SelectorSource};
