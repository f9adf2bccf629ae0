// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Streaming RSI, Stochastic RSI and Bollinger Bands, plus the engine that
// chains them behind staged warm-up gates.  The math lives in small pure
// folds (`smoothing`) so each indicator can be checked against a batch
// computation.

pub mod bollinger;
pub mod engine;
pub mod rsi;
pub mod smoothing;
pub mod stoch_rsi;
