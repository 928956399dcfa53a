//! Enumerates small integer expressions and keeps the associative ones.
//!
//! The pipeline is a chain of filters over coordinates `(leaves, index)`:
//! [`tree::generate`] decodes the coordinate into an expression,
//! [`filter`] rejects degenerate ones, [`screen`] disproves associativity
//! cheaply on random inputs, and [`prover`] decides the survivors exactly and
//! synthesizes an identity element. [`search`] drives the whole thing.

pub mod decision;
pub mod filter;
pub mod grammar;
pub mod lang;
pub mod prover;
pub mod scheduler;
pub mod screen;
pub mod search;
pub mod table;
pub mod tree;
pub mod value;

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<K> = rustc_hash::FxHashSet<K>;

pub use decision::DecisionSource;
pub use grammar::{Bindings, Campaign, Grammar, Op, Role, VarName};
pub use lang::Arith;
pub use prover::{prove_associativity, AssociativeIds, Encoding, IsAssociative, Orientation};
pub use search::{Finding, Search, SearchConfig};
pub use tree::{AssocTuple, SlotExpr, Tree};
pub use value::{Value, ValueType};

#[macro_export]
macro_rules! time_fn_call {
    ($label:expr, $fn_call:expr) => {{
        use std::time::Instant;
        let start = Instant::now();
        let result = $fn_call;
        let duration = start.elapsed();
        ::log::info!("finished {} in {} ms", $label, duration.as_millis());
        result
    }};
}
