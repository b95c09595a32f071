pub mod bls;
pub mod chain;

pub use bls::BlsAggregationService;
pub use chain::{ChainReader, ChainSubscriber, ChainWriter, OnSetGasPrice};
