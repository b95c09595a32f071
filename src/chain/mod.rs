pub mod mock;
pub mod noop;
pub mod variant;

pub use mock::{
    MockChainReader, MockChainSubscriber, MockChainWriter, MockGcAnswer, MockSendOutcome,
    SentAggregatedResponse,
};
pub use noop::{NoopChainReader, NoopChainSubscriber, NoopChainWriter};
pub use variant::{ChainReaderVariant, ChainSubscriberVariant, ChainWriterVariant};
