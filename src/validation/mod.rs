// Gate chain: structural and factual pass/fail checks over candidates

pub mod chain;
pub mod checks;
pub mod traits;

pub use chain::{GateChain, GateChainOutcome};
pub use checks::{CheckSpec, GateSpec, SpecGate};
pub use traits::{EvalContext, Gate, GateResult, STRUCTURAL_GATE};
