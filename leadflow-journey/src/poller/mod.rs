//! Compliance reconciliation poller
//!
//! Periodically copies approved/rejected compliance results onto lead rows.
//! Each run goes `Idle -> Fetching -> Processing -> Idle`. A run that starts
//! while another is in flight is skipped, and a result id produces its lead
//! update at most once: the processed marker is written only after every
//! matched lead was updated (or after the result proved unmatchable).

pub mod markers;

pub use markers::{LocalMarkerFile, MarkedIn, ProcessedMarkers};

use crate::sources::{CpfDecryptor, NoDecryptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadflow_common::normalize::{normalize_id, normalize_phone};
use leadflow_common::records::CpfValue;
use leadflow_common::{ComplianceCheckRecord, ComplianceStatus, ContactRecord, Error, LeadUpdate, Result, Verdict};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mirror of the compliance provider's result table
#[async_trait]
pub trait ComplianceResultProvider: Send + Sync {
    /// Unprocessed results with a terminal status
    async fn fetch_pending_results(&self) -> Result<Vec<ComplianceCheckRecord>>;
    async fn mark_processed(&self, result_id: &str) -> Result<()>;
    async fn is_processed(&self, result_id: &str) -> Result<bool>;
}

/// Lead rows the poller writes to (across tenants)
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_leads_by_cpf(&self, cpf: &str) -> Result<Vec<ContactRecord>>;
    async fn find_leads_by_phone(&self, phone: &str) -> Result<Vec<ContactRecord>>;
    async fn apply_lead_update(&self, lead_id: &str, update: &LeadUpdate) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerPhase {
    Idle,
    Fetching,
    Processing,
}

/// Result of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    /// Results that produced their side effect (applied or unmatchable)
    pub processed_count: usize,
    pub applied_count: usize,
    pub unmatched_count: usize,
    /// Results left for the next run
    pub failed_count: usize,
    /// Another run was in flight; nothing was done
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of poller state for status endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    pub phase: PollerPhase,
    pub timer_active: bool,
    pub interval_secs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_outcome: Option<PollOutcome>,
    pub runs: u64,
    pub total_processed: u64,
    pub local_markers: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Bound on each provider / lead store call
    pub call_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct PollerState {
    phase: PollerPhase,
    last_run_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_outcome: Option<PollOutcome>,
    runs: u64,
    total_processed: u64,
}

struct PollerTimer {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

/// What happened to one result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultOutcome {
    Applied(usize),
    Unmatched,
    AlreadyProcessed,
    NotTerminal,
}

/// Run one provider / lead store call under `timeout`
async fn bounded<T>(what: &str, timeout: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::SourceUnavailable(format!(
            "{} timed out after {}ms",
            what,
            timeout.as_millis()
        ))),
    }
}

/// Clears the in-flight flag even if a run panics
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReconciliationPoller {
    provider: Arc<dyn ComplianceResultProvider>,
    leads: Arc<dyn LeadStore>,
    markers: ProcessedMarkers,
    decryptor: Arc<dyn CpfDecryptor>,
    config: PollerConfig,
    in_flight: AtomicBool,
    state: RwLock<PollerState>,
    timer: Mutex<Option<PollerTimer>>,
}

impl ReconciliationPoller {
    pub fn new(
        provider: Arc<dyn ComplianceResultProvider>,
        leads: Arc<dyn LeadStore>,
        markers: ProcessedMarkers,
        config: PollerConfig,
    ) -> Self {
        Self {
            provider,
            leads,
            markers: markers.with_call_timeout(config.call_timeout),
            decryptor: Arc::new(NoDecryptor),
            config,
            in_flight: AtomicBool::new(false),
            state: RwLock::new(PollerState {
                phase: PollerPhase::Idle,
                last_run_at: None,
                last_error: None,
                last_outcome: None,
                runs: 0,
                total_processed: 0,
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn CpfDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// Start the timer task; false if it is already running
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            return false;
        }

        info!(
            "Starting reconciliation poller (interval: {}s)",
            self.config.interval.as_secs()
        );

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(poller.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        // Each tick runs detached so a hung run shows up as skipped ticks
                        let run = Arc::clone(&poller);
                        tokio::spawn(async move {
                            run.poll_once().await;
                        });
                    }
                }
            }
            info!("Reconciliation poller stopped");
        });

        *timer = Some(PollerTimer { handle, token });
        true
    }

    /// Stop the timer task; an in-flight run finishes on its own
    pub async fn stop(&self) -> bool {
        let Some(timer) = self.timer.lock().await.take() else {
            return false;
        };
        timer.token.cancel();
        if let Err(e) = timer.handle.await {
            warn!("Poller timer task ended abnormally: {}", e);
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    pub async fn status(&self) -> PollerStatus {
        let timer_active = self.is_running().await;
        let local_markers = self.markers.local().len().await;
        let state = self.state.read().await;
        PollerStatus {
            phase: state.phase,
            timer_active,
            interval_secs: self.config.interval.as_secs(),
            last_run_at: state.last_run_at,
            last_error: state.last_error.clone(),
            last_outcome: state.last_outcome.clone(),
            runs: state.runs,
            total_processed: state.total_processed,
            local_markers,
        }
    }

    /// One reconciliation run (timer tick or manual trigger)
    pub async fn poll_once(&self) -> PollOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Reconciliation run already in progress, skipping this tick");
            return PollOutcome {
                skipped: true,
                ..PollOutcome::default()
            };
        }
        let _guard = FlightGuard(&self.in_flight);

        let outcome = self.run().await;

        let mut state = self.state.write().await;
        state.phase = PollerPhase::Idle;
        state.last_run_at = Some(leadflow_common::time::now());
        state.last_error = outcome.error.clone();
        state.last_outcome = Some(outcome.clone());
        state.runs += 1;
        state.total_processed += outcome.processed_count as u64;

        outcome
    }

    async fn set_phase(&self, phase: PollerPhase) {
        self.state.write().await.phase = phase;
    }

    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        bounded(what, self.config.call_timeout, call).await
    }

    async fn run(&self) -> PollOutcome {
        self.set_phase(PollerPhase::Fetching).await;

        let results = match self.bounded("fetch_pending_results", self.provider.fetch_pending_results()).await {
            Ok(results) => results,
            Err(e) => {
                error!("Reconciliation run failed to fetch results: {}", e);
                return PollOutcome {
                    error: Some(e.to_string()),
                    ..PollOutcome::default()
                };
            }
        };
        let results = self.markers.drop_locally_marked(results).await;

        self.set_phase(PollerPhase::Processing).await;

        let mut outcome = PollOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();
        for result in &results {
            if !seen.insert(result.id.clone()) {
                continue;
            }
            match self.process(result).await {
                Ok(ResultOutcome::Applied(_)) => {
                    outcome.applied_count += 1;
                    outcome.processed_count += 1;
                }
                Ok(ResultOutcome::Unmatched) => {
                    outcome.unmatched_count += 1;
                    outcome.processed_count += 1;
                }
                Ok(ResultOutcome::AlreadyProcessed) | Ok(ResultOutcome::NotTerminal) => {}
                Err(e) => {
                    outcome.failed_count += 1;
                    warn!(result_id = %result.id, error = %e, "Compliance result not reconciled, will retry");
                }
            }
        }

        if outcome.processed_count > 0 || outcome.failed_count > 0 {
            info!(
                fetched = results.len(),
                applied = outcome.applied_count,
                unmatched = outcome.unmatched_count,
                failed = outcome.failed_count,
                "Reconciliation run complete"
            );
        } else {
            debug!(fetched = results.len(), "Reconciliation run found nothing to do");
        }
        outcome
    }

    async fn process(&self, result: &ComplianceCheckRecord) -> Result<ResultOutcome> {
        if self.markers.is_processed(&result.id).await {
            return Ok(ResultOutcome::AlreadyProcessed);
        }

        let status = match result.verdict() {
            Verdict::Approved => ComplianceStatus::Approved,
            Verdict::Rejected => ComplianceStatus::Rejected,
            Verdict::Unset => {
                debug!(result_id = %result.id, status = result.status.as_str(), "Result not terminal, skipping");
                return Ok(ResultOutcome::NotTerminal);
            }
        };
        let Some(update) = LeadUpdate::for_status(&status, leadflow_common::time::now()) else {
            return Ok(ResultOutcome::NotTerminal);
        };

        let leads = self.resolve_leads(result).await?;
        if leads.is_empty() {
            info!(result_id = %result.id, "No lead matches compliance result, marking processed");
            self.markers.mark(&result.id).await?;
            return Ok(ResultOutcome::Unmatched);
        }
        if leads.len() > 1 {
            info!(result_id = %result.id, leads = leads.len(), "Compliance result matches several leads, updating all");
        }

        let mut first_error = None;
        let mut applied = 0usize;
        for lead in &leads {
            match self
                .bounded("apply_lead_update", self.leads.apply_lead_update(&lead.id, &update))
                .await
            {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(result_id = %result.id, lead_id = %lead.id, error = %e, "Lead update failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        // Leave unmarked so the next run retries every lead
        if let Some(e) = first_error {
            return Err(e);
        }

        let marked_in = self.markers.mark(&result.id).await?;
        debug!(result_id = %result.id, leads = applied, label = %update.label, marked_in = ?marked_in, "Applied compliance result");
        Ok(ResultOutcome::Applied(applied))
    }

    /// CPF match first; phone only when the CPF matched nothing
    async fn resolve_leads(&self, result: &ComplianceCheckRecord) -> Result<Vec<ContactRecord>> {
        let cpf = match result.cpf_value() {
            CpfValue::Plain(cpf) => Some(cpf.to_string()),
            CpfValue::Encrypted(enc) => self.decryptor.decrypt(enc),
            CpfValue::Missing => None,
        };
        if let Some(cpf) = cpf.filter(|c| !normalize_id(c).is_empty()) {
            let leads = self.bounded("find_leads_by_cpf", self.leads.find_leads_by_cpf(&cpf)).await?;
            if !leads.is_empty() {
                return Ok(leads);
            }
        }

        match result.person_phone.as_deref() {
            Some(phone) if !normalize_phone(phone).is_empty() => {
                self.bounded("find_leads_by_phone", self.leads.find_leads_by_phone(phone)).await
            }
            _ => Ok(Vec::new()),
        }
    }
}
