use ::sigsmith::*;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use anyhow::{anyhow, Result};

use ::sigsmith::aggregator::batch_identifier;
use ::sigsmith::bls::MockBlsService;
use ::sigsmith::chain::{MockChainReader, MockChainSubscriber, MockChainWriter, MockGcAnswer};
use ::sigsmith::types::QuorumAttestation;

// ===== Test Helper Functions =====

fn test_root(id: u8) -> B256 {
    let mut root = [0u8; 32];
    root[0] = id;
    B256::from(root)
}

fn test_sender(id: u8) -> Address {
    Address::repeat_byte(id)
}

fn test_event(id: u8, block: u32) -> NewBatchEvent {
    NewBatchEvent {
        merkle_root: test_root(id),
        sender_address: test_sender(id),
        task_created_block: block,
    }
}

fn test_config() -> AggregatorConfig {
    AggregatorConfig {
        // Random ports so parallel tests never collide.
        operator_server_ip_port_address: "127.0.0.1:0".to_string(),
        metrics_ip_port_address: "127.0.0.1:0".to_string(),
        // Stay quiet unless a test opts in.
        garbage_collector_period_secs: 3600,
        ..Default::default()
    }
}

fn success_response(task_index: u32) -> BlsServiceResponse {
    BlsServiceResponse {
        task_index,
        outcome: Ok(QuorumAttestation::default()),
    }
}

/// Poll `check` until it passes or the deadline expires.
async fn wait_until<F>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!("timed out waiting for {what}"))
}

// ===== E2E Tests =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregator_e2e_full_cycle() -> Result<()> {
    let subscriber = MockChainSubscriber::new(vec![test_event(1, 100), test_event(2, 101)], 0);
    let subscriber_probe = subscriber.clone();
    let writer = MockChainWriter::default();
    let writer_probe = writer.clone();
    let bls = MockBlsService::new();
    let bls_probe = bls.clone();

    let aggregator = Aggregator::new(
        ChainSubscriberVariant::Mock(subscriber),
        ChainReaderVariant::Mock(MockChainReader::default()),
        ChainWriterVariant::Mock(writer),
        BlsServiceVariant::Mock(bls),
        test_config(),
    )?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run_handle = tokio::spawn(aggregator.run(shutdown_rx));

    // Both announcements get admitted and registered with the BLS service.
    wait_until("BLS task registrations", || {
        bls_probe.get_initialized().len() == 2
    })
    .await?;
    let initialized = bls_probe.get_initialized();
    assert_eq!(initialized[0].quorum_numbers, vec![QUORUM_NUMBER]);
    assert_eq!(
        initialized[0].quorum_threshold_percentages,
        vec![QUORUM_THRESHOLD_PERCENTAGE]
    );

    // Quorum completes for both tasks; responses may be handled in
    // parallel.
    bls_probe.push_response(success_response(0)).await?;
    bls_probe.push_response(success_response(1)).await?;

    wait_until("aggregated responses on-chain", || {
        writer_probe.get_sent().len() == 2
    })
    .await?;

    let mut roots: Vec<B256> = writer_probe.get_sent().iter().map(|s| s.merkle_root).collect();
    roots.sort();
    assert_eq!(roots, vec![test_root(1), test_root(2)]);

    for sent in writer_probe.get_sent() {
        let expected = batch_identifier(sent.merkle_root, sent.sender_address);
        assert_eq!(sent.batch_identifier, expected);
    }

    // Each submission waited one block past its announcement.
    let mut waits = subscriber_probe.get_wait_calls();
    waits.sort();
    assert_eq!(waits, vec![100, 101]);

    shutdown_tx.send(true)?;
    let result = tokio::time::timeout(Duration::from_secs(2), run_handle).await??;
    assert!(result.is_ok(), "run should return cleanly on shutdown: {result:?}");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregator_e2e_bls_init_failure_aborts_run() -> Result<()> {
    let subscriber = MockChainSubscriber::new(vec![test_event(1, 100)], 0);
    let mut bls = MockBlsService::new();
    bls.fail_init = true;

    let aggregator = Aggregator::new(
        ChainSubscriberVariant::Mock(subscriber),
        ChainReaderVariant::Mock(MockChainReader::default()),
        ChainWriterVariant::Mock(MockChainWriter::default()),
        BlsServiceVariant::Mock(bls),
        test_config(),
    )?;

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let result = tokio::time::timeout(Duration::from_secs(5), aggregator.run(shutdown_rx)).await?;

    assert!(
        result.is_err(),
        "a BLS initialization failure must abort the run"
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregator_e2e_garbage_collection() -> Result<()> {
    let subscriber = MockChainSubscriber::new(
        (0..5u8).map(|i| test_event(i + 1, 100 + i as u32)).collect(),
        0,
    );
    let bls = MockBlsService::new();
    let bls_probe = bls.clone();

    // The chain reports the batch at index 2 as the oldest finalized task.
    let old_hash = batch_identifier(test_root(3), test_sender(3));
    let reader = MockChainReader::new(vec![MockGcAnswer::OldTask(old_hash)]);

    let config = AggregatorConfig {
        garbage_collector_period_secs: 1,
        ..test_config()
    };

    let aggregator = Aggregator::new(
        ChainSubscriberVariant::Mock(subscriber),
        ChainReaderVariant::Mock(reader),
        ChainWriterVariant::Mock(MockChainWriter::default()),
        BlsServiceVariant::Mock(bls),
        config,
    )?;
    let registry = Arc::clone(&aggregator.registry);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run_handle = tokio::spawn(aggregator.run(shutdown_rx));

    wait_until("all admissions", || bls_probe.get_initialized().len() == 5).await?;

    // After the first sweep (one period in), indices 0..=2 are gone and
    // 3..=4 survive.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    {
        let reg = registry.lock().await;
        assert_eq!(reg.len(), 2);
        for index in 0..=2u32 {
            assert!(reg.lookup(index).is_none(), "index {index} should be evicted");
        }
        for index in 3..5u32 {
            assert!(reg.lookup(index).is_some(), "index {index} should survive");
        }
    }

    shutdown_tx.send(true)?;
    tokio::time::timeout(Duration::from_secs(2), run_handle).await???;

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregator_e2e_error_response_is_abandoned() -> Result<()> {
    let subscriber = MockChainSubscriber::new(vec![test_event(1, 100)], 0);
    let writer = MockChainWriter::default();
    let writer_probe = writer.clone();
    let bls = MockBlsService::new();
    let bls_probe = bls.clone();

    let aggregator = Aggregator::new(
        ChainSubscriberVariant::Mock(subscriber),
        ChainReaderVariant::Mock(MockChainReader::default()),
        ChainWriterVariant::Mock(writer),
        BlsServiceVariant::Mock(bls),
        test_config(),
    )?;
    let registry = Arc::clone(&aggregator.registry);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run_handle = tokio::spawn(aggregator.run(shutdown_rx));

    wait_until("admission", || bls_probe.get_initialized().len() == 1).await?;

    bls_probe
        .push_response(BlsServiceResponse {
            task_index: 0,
            outcome: Err(BlsServiceError::TaskExpired),
        })
        .await?;

    // The dispatcher keeps serving after the failed aggregation: a second
    // batch still flows through end to end.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(writer_probe.get_sent().is_empty());
    {
        let reg = registry.lock().await;
        assert!(
            reg.lookup(0).is_some(),
            "the abandoned entry stays until the garbage collector runs"
        );
    }

    shutdown_tx.send(true)?;
    tokio::time::timeout(Duration::from_secs(2), run_handle).await???;

    Ok(())
}
