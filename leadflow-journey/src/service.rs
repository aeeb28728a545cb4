//! Journey read operations
//!
//! Every call fetches a fresh snapshot and re-aggregates; nothing is cached.
//! Source failures only shrink the result, they never fail the call.

use crate::aggregator::aggregate;
use crate::sources::{fetch_snapshot, CpfDecryptor, JourneySource, NoDecryptor};
use leadflow_common::normalize::normalize_phone;
use leadflow_common::{LeadJourney, PipelineStage};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub struct JourneyService {
    source: Arc<dyn JourneySource>,
    decryptor: Arc<dyn CpfDecryptor>,
    fetch_timeout: Duration,
}

impl JourneyService {
    pub fn new(source: Arc<dyn JourneySource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            decryptor: Arc::new(NoDecryptor),
            fetch_timeout,
        }
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn CpfDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// All journeys of a tenant, most recently updated first
    pub async fn aggregate_lead_journeys(&self, tenant_id: &str) -> Vec<LeadJourney> {
        let snapshot = fetch_snapshot(self.source.as_ref(), tenant_id, self.fetch_timeout).await;
        aggregate(tenant_id, snapshot, self.decryptor.as_ref(), leadflow_common::time::now())
    }

    /// The journey answering to `phone` (its own key or an alias)
    pub async fn get_lead_journey_by_phone(&self, tenant_id: &str, phone: &str) -> Option<LeadJourney> {
        let key = normalize_phone(phone);
        if key.is_empty() {
            return None;
        }
        self.aggregate_lead_journeys(tenant_id)
            .await
            .into_iter()
            .find(|j| j.answers_to_phone(&key))
    }

    /// Journey count per stage; every stage present, in pipeline order
    pub async fn get_pipeline_stage_counts(&self, tenant_id: &str) -> BTreeMap<PipelineStage, usize> {
        stage_counts(&self.aggregate_lead_journeys(tenant_id).await)
    }
}

pub fn stage_counts(journeys: &[LeadJourney]) -> BTreeMap<PipelineStage, usize> {
    let mut counts: BTreeMap<PipelineStage, usize> = PipelineStage::ALL.iter().map(|&s| (s, 0)).collect();
    for journey in journeys {
        *counts.entry(journey.pipeline_status).or_default() += 1;
    }
    counts
}
