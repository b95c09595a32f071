use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::types::GasBumpParams;

/// Aggregator configuration.
/// Concrete CLI parsing (clap) can be built on top of this.
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "sigsmith")]
#[command(about = "BLS signature aggregator for a decentralized verification network")]
pub struct AggregatorConfig {
    /// Maximum time the BLS service keeps a task open for signature
    /// collection, in seconds.
    #[arg(long, default_value_t = 7200)]
    pub bls_service_task_timeout_secs: u64,

    /// How often the garbage collector sweeps finalized tasks out of the
    /// registry, in seconds.
    #[arg(long, default_value_t = 900)]
    pub garbage_collector_period_secs: u64,

    /// Minimum age before a finalized task becomes eligible for
    /// reclamation, in seconds.
    #[arg(long, default_value_t = 10800)]
    pub garbage_collector_tasks_age_secs: u64,

    /// Block-scan window for the old-task query.
    #[arg(long, default_value_t = 2100)]
    pub garbage_collector_tasks_interval: u64,

    /// Gas bump applied on the first escalation of a stalled transaction,
    /// in percent.
    #[arg(long, default_value_t = 10)]
    pub gas_base_bump_percentage: u32,

    /// Additional gas bump applied on each subsequent escalation, in percent.
    #[arg(long, default_value_t = 5)]
    pub gas_bump_incremental_percentage: u32,

    /// Ceiling on the total gas bump, in percent.
    #[arg(long, default_value_t = 50)]
    pub gas_bump_percentage_limit: u32,

    /// How long to wait for inclusion before bumping, in seconds.
    #[arg(long, default_value_t = 36)]
    pub time_to_wait_before_bump_secs: u64,

    /// Whether to expose prometheus metrics.
    #[arg(long, default_value_t = false)]
    pub enable_metrics: bool,

    /// Address the metrics server binds to.
    #[arg(long, default_value = "127.0.0.1:9091")]
    pub metrics_ip_port_address: String,

    /// Address of the external telemetry collector. Empty disables reporting.
    #[arg(long, default_value = "")]
    pub telemetry_ip_port_address: String,

    /// Address the operator-facing RPC server binds to.
    #[arg(long, default_value = "127.0.0.1:8090")]
    pub operator_server_ip_port_address: String,
}

impl AggregatorConfig {
    pub fn bls_service_task_timeout(&self) -> Duration {
        Duration::from_secs(self.bls_service_task_timeout_secs)
    }

    pub fn garbage_collector_period(&self) -> Duration {
        Duration::from_secs(self.garbage_collector_period_secs)
    }

    pub fn garbage_collector_tasks_age(&self) -> Duration {
        Duration::from_secs(self.garbage_collector_tasks_age_secs)
    }

    /// Escalation policy handed to the chain writer on every submission.
    pub fn gas_bump_params(&self) -> GasBumpParams {
        GasBumpParams {
            base_bump_percentage: self.gas_base_bump_percentage,
            incremental_bump_percentage: self.gas_bump_incremental_percentage,
            bump_percentage_limit: self.gas_bump_percentage_limit,
            time_to_wait_before_bump: Duration::from_secs(self.time_to_wait_before_bump_secs),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            bls_service_task_timeout_secs: 7200, // 2 hours
            garbage_collector_period_secs: 900,
            garbage_collector_tasks_age_secs: 10800,
            garbage_collector_tasks_interval: 2100,
            gas_base_bump_percentage: 10,
            gas_bump_incremental_percentage: 5,
            gas_bump_percentage_limit: 50,
            time_to_wait_before_bump_secs: 36,
            enable_metrics: false,
            metrics_ip_port_address: "127.0.0.1:9091".to_string(),
            telemetry_ip_port_address: String::new(),
            operator_server_ip_port_address: "127.0.0.1:8090".to_string(),
        }
    }
}
