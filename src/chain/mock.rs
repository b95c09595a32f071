use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kanal::AsyncSender;

use crate::aggregator::MAX_SENT_TX_RETRIES;
use crate::traits::{ChainReader, ChainSubscriber, ChainWriter, OnSetGasPrice};
use crate::types::{
    BatchIdentifier, GasBumpParams, NewBatchEvent, NonSignerStakesAndSignature, TxReceipt,
};

/// Mock chain subscriber for testing: replays a fixed set of
/// announcements, then lets the subscription end.
#[derive(Clone)]
pub struct MockChainSubscriber {
    pub events: Vec<NewBatchEvent>,
    pub delay_ms: u64,
    /// Blocks passed to `wait_for_one_block`, for assertions.
    pub wait_calls: Arc<Mutex<Vec<u64>>>,
    /// When set, `wait_for_one_block` fails (the caller should log and
    /// continue).
    pub fail_wait: bool,
}

impl MockChainSubscriber {
    pub fn new(events: Vec<NewBatchEvent>, delay_ms: u64) -> Self {
        Self {
            events,
            delay_ms,
            wait_calls: Arc::new(Mutex::new(Vec::new())),
            fail_wait: false,
        }
    }

    pub fn get_wait_calls(&self) -> Vec<u64> {
        self.wait_calls.lock().unwrap().clone()
    }
}

impl Default for MockChainSubscriber {
    fn default() -> Self {
        Self::new(Vec::new(), 0)
    }
}

#[async_trait]
impl ChainSubscriber for MockChainSubscriber {
    fn name(&self) -> &'static str {
        "mock-chain-subscriber"
    }

    async fn subscribe_new_batches(&self, tx: AsyncSender<NewBatchEvent>) -> Result<()> {
        let events = self.events.clone();
        let delay = self.delay_ms;

        tokio::spawn(async move {
            for event in events {
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(())
    }

    async fn wait_for_one_block(&self, from_block: u64) -> Result<()> {
        self.wait_calls.lock().unwrap().push(from_block);
        if self.fail_wait {
            return Err(anyhow!("mock rpc failure while waiting for block"));
        }
        Ok(())
    }
}

/// Scripted answer for one garbage-collector query.
#[derive(Debug, Clone)]
pub enum MockGcAnswer {
    OldTask(B256),
    NoneFound,
    RpcError(String),
}

/// Mock chain reader: answers `get_old_task_hash` from a script, one entry
/// per call. An exhausted script reports no old tasks.
#[derive(Clone)]
pub struct MockChainReader {
    answers: Arc<Mutex<VecDeque<MockGcAnswer>>>,
}

impl MockChainReader {
    pub fn new(answers: Vec<MockGcAnswer>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
        }
    }

    pub fn push_answer(&self, answer: MockGcAnswer) {
        self.answers.lock().unwrap().push_back(answer);
    }
}

impl Default for MockChainReader {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    fn name(&self) -> &'static str {
        "mock-chain-reader"
    }

    async fn get_old_task_hash(
        &self,
        _max_age: Duration,
        _scan_interval: u64,
    ) -> Result<Option<B256>> {
        let answer = self.answers.lock().unwrap().pop_front();
        match answer {
            Some(MockGcAnswer::OldTask(hash)) => Ok(Some(hash)),
            Some(MockGcAnswer::NoneFound) | None => Ok(None),
            Some(MockGcAnswer::RpcError(msg)) => Err(anyhow!(msg)),
        }
    }
}

/// One recorded submission, for assertions.
#[derive(Debug, Clone)]
pub struct SentAggregatedResponse {
    pub batch_identifier: BatchIdentifier,
    pub merkle_root: B256,
    pub sender_address: Address,
    pub payload: NonSignerStakesAndSignature,
}

/// Scripted outcome for one `send_aggregated_response` call.
#[derive(Debug, Clone)]
pub enum MockSendOutcome {
    Confirmed,
    ConfirmedWithoutReceipt,
    Failed(String),
}

/// Mock chain writer: records every submission, simulates the configured
/// number of gas escalations, and answers from an outcome script. An
/// exhausted script confirms with a receipt.
#[derive(Clone)]
pub struct MockChainWriter {
    sent: Arc<Mutex<Vec<SentAggregatedResponse>>>,
    outcomes: Arc<Mutex<VecDeque<MockSendOutcome>>>,
    /// Gas escalations simulated per send; each invokes the bump callback.
    pub simulated_bumps: u32,
    /// Artificial submission latency, for wallet serialization tests.
    pub send_delay_ms: u64,
}

/// Baseline gas price the mock escalates from, in wei.
const MOCK_BASE_GAS_PRICE: u64 = 1_000_000_000;

impl MockChainWriter {
    pub fn new(outcomes: Vec<MockSendOutcome>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            simulated_bumps: 0,
            send_delay_ms: 0,
        }
    }

    pub fn get_sent(&self) -> Vec<SentAggregatedResponse> {
        self.sent.lock().unwrap().clone()
    }

    fn bumped_gas_price(bump_params: &GasBumpParams, escalation: u32) -> U256 {
        let percentage = (bump_params.base_bump_percentage
            + bump_params.incremental_bump_percentage * escalation)
            .min(bump_params.bump_percentage_limit);
        U256::from(MOCK_BASE_GAS_PRICE) * U256::from(100 + percentage) / U256::from(100)
    }
}

impl Default for MockChainWriter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ChainWriter for MockChainWriter {
    fn name(&self) -> &'static str {
        "mock-chain-writer"
    }

    async fn send_aggregated_response(
        &self,
        batch_identifier: BatchIdentifier,
        merkle_root: B256,
        sender_address: Address,
        payload: &NonSignerStakesAndSignature,
        bump_params: &GasBumpParams,
        on_set_gas_price: OnSetGasPrice<'_>,
    ) -> Result<Option<TxReceipt>> {
        if self.send_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.send_delay_ms)).await;
        }

        let mut effective_gas_price = U256::from(MOCK_BASE_GAS_PRICE);
        for escalation in 0..self.simulated_bumps.min(MAX_SENT_TX_RETRIES) {
            effective_gas_price = Self::bumped_gas_price(bump_params, escalation);
            on_set_gas_price(effective_gas_price);
        }

        self.sent.lock().unwrap().push(SentAggregatedResponse {
            batch_identifier,
            merkle_root,
            sender_address,
            payload: payload.clone(),
        });

        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(MockSendOutcome::Confirmed) | None => Ok(Some(TxReceipt {
                tx_hash: keccak256(batch_identifier),
                effective_gas_price,
            })),
            Some(MockSendOutcome::ConfirmedWithoutReceipt) => Ok(None),
            Some(MockSendOutcome::Failed(msg)) => Err(anyhow!(msg)),
        }
    }
}
