//! Backtest engine: replay persisted verdicts against an allocation policy.
//!
//! Pure computation over inputs supplied by the caller; the only I/O is the
//! [`PriceHistory`] trait the simulator reads bars through.

pub mod allocator;
pub mod engine;
pub mod metrics;
pub mod ranker;
pub mod simulator;

pub use allocator::{allocate, cash_reserve_pct, Allocation};
pub use engine::{BacktestEngine, PriceHistory};
pub use metrics::compute_metrics;
pub use ranker::{rank_signals, RankedSignal};
pub use simulator::{simulate_hold, SimulatedExit};
