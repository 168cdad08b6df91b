use lazy_static::lazy_static;
use prometheus::{
    opts, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    // register_... 매크로는 기본 레지스트리에 자동 등록하므로,
    // 여기서는 Opts만 생성하고 register_custom_metrics 에서 수동으로 등록합니다.

    /// Messages currently owned by the reliable queue (in flight + waiting).
    pub static ref RELIABLE_QUEUE_PENDING: IntGauge =
        IntGauge::with_opts(opts!("reliable_queue_pending", "Messages pending in the reliable coordinator queue")).unwrap();

    /// 1 while the in-flight message is retrying, 0 otherwise.
    pub static ref RELIABLE_QUEUE_STALLED: IntGauge =
        IntGauge::with_opts(opts!("reliable_queue_stalled", "Whether the in-flight reliable message is stalled")).unwrap();

    pub static ref RELIABLE_MESSAGES_ENQUEUED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("reliable_messages_enqueued_total", "Total reliable messages enqueued")).unwrap();

    pub static ref RELIABLE_MESSAGES_COMPLETED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("reliable_messages_completed_total", "Total reliable messages that received their reply")).unwrap();

    /// Send failures, timeouts and attempts skipped because the coordinator was unreachable.
    pub static ref RELIABLE_ATTEMPTS_FAILED_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("reliable_attempts_failed_total", "Failed reliable send attempts by cause"),
            &["cause"],
        )
        .unwrap();

    pub static ref RELIABLE_PROTOCOL_DEFECTS_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("reliable_protocol_defects_total", "Reliable messages aborted because of a protocol defect")).unwrap();

    /// Time from first send attempt to processed reply (seconds)
    pub static ref RELIABLE_EXCHANGE_DURATION_SECONDS: Histogram =
        Histogram::with_opts(HistogramOpts::new(
            "reliable_exchange_duration_seconds",
            "Time from first send attempt until the reply was processed (seconds)"
        ).buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0])).unwrap();

    pub static ref COORDINATOR_CONNECTED: IntGauge =
        IntGauge::with_opts(opts!("coordinator_connected", "Whether the coordinator session is currently reachable")).unwrap();

    pub static ref MATCH_PLAYERS_ACTIVE: IntGauge =
        IntGauge::with_opts(opts!("match_players_active", "Players not dropped from the current match")).unwrap();

    pub static ref MATCH_PLAYERS_DROPPED_TOTAL_BY_REASON: IntCounterVec =
        IntCounterVec::new(
            Opts::new("match_players_dropped_total_by_reason", "Players dropped from a match by drop reason"),
            &["reason"],
        )
        .unwrap();

    pub static ref VOTE_KICK_DECISIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("vote_kick_decisions_total", "Vote kick request decisions"),
            &["decision"],
        )
        .unwrap();

    pub static ref TEAM_CHANGES_REVERTED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("team_changes_reverted_total", "Optimistic team changes reverted after coordinator rejection")).unwrap();

    pub static ref NEW_MATCHES_REQUESTED_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("new_matches_requested_total", "Rolling match transitions requested for the lobby")).unwrap();

    pub static ref UNOFFICIAL_MATCHES_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("unofficial_matches_total", "Speculative matches the coordinator rejected")).unwrap();

    pub static ref STATE_VIOLATIONS_TOTAL: IntCounter =
        IntCounter::with_opts(opts!("state_violations_total", "Rejected match state machine transitions")).unwrap();
}

/// Registers all custom metrics defined in this crate to the given registry.
///
/// This function should be called by each service during its startup phase
/// to ensure metrics are available for scraping.
///
/// # Arguments
///
/// * `registry` - The Prometheus registry served on `/metrics`.
///
/// # Returns
///
/// * `Result<(), prometheus::Error>` - Returns an error if any metric fails to register.
pub fn register_custom_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(RELIABLE_QUEUE_PENDING.clone()))?;
    registry.register(Box::new(RELIABLE_QUEUE_STALLED.clone()))?;
    registry.register(Box::new(RELIABLE_MESSAGES_ENQUEUED_TOTAL.clone()))?;
    registry.register(Box::new(RELIABLE_MESSAGES_COMPLETED_TOTAL.clone()))?;
    registry.register(Box::new(RELIABLE_ATTEMPTS_FAILED_TOTAL.clone()))?;
    registry.register(Box::new(RELIABLE_PROTOCOL_DEFECTS_TOTAL.clone()))?;
    registry.register(Box::new(RELIABLE_EXCHANGE_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(COORDINATOR_CONNECTED.clone()))?;
    // Match tracking
    registry.register(Box::new(MATCH_PLAYERS_ACTIVE.clone()))?;
    registry.register(Box::new(MATCH_PLAYERS_DROPPED_TOTAL_BY_REASON.clone()))?;
    registry.register(Box::new(VOTE_KICK_DECISIONS_TOTAL.clone()))?;
    registry.register(Box::new(TEAM_CHANGES_REVERTED_TOTAL.clone()))?;
    registry.register(Box::new(NEW_MATCHES_REQUESTED_TOTAL.clone()))?;
    registry.register(Box::new(UNOFFICIAL_MATCHES_TOTAL.clone()))?;
    registry.register(Box::new(STATE_VIOLATIONS_TOTAL.clone()))?;
    Ok(())
}
