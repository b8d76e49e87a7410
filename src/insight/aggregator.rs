use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::panel::{InsightPanel, Section};
use super::{approved_following, decode_transaction, summarize_decoded, DecodeOutcome, InsightBackend};
use crate::completion::Explanation;
use crate::error::{InsightError, InsightResult};
use crate::ethereum::{utils, ApprovalReport, SocialProfile};
use crate::store::{load_identity, StateStore};

pub const NOT_HUMAN_HEADING: &str = "Not a unique human!!";
pub const IDENTITY_HEADING: &str = "Verified with World ID🌐";
pub const SOCIAL_HEADING: &str = "Lens Insights🌿";
pub const EXPLANATION_HEADING: &str = "GPT Insights🤖";

const UNDETERMINED: &str = "unable to determine";
const NONE: &str = "none";

/// Transaction as the wallet presents it, before any validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(alias = "input")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Decoding,
    FetchingContext,
    Rendering,
    Done,
    Failed,
}

impl FlowState {
    pub fn can_transition_to(self, next: FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, next),
            (Idle, Decoding)
                | (Decoding, FetchingContext)
                | (FetchingContext, Rendering)
                | (Rendering, Done)
                | (Idle, Done)
                | (Idle, Failed)
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Flow {
    state: FlowState,
}

impl Flow {
    fn advance(&mut self, next: FlowState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!("Insight flow {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: InsightError) -> InsightError {
        warn!("Insight flow failed: {}", error);
        self.advance(FlowState::Failed);
        error
    }
}

/// Composes identity, decoding, social context and the explanation into one
/// panel per transaction.
pub struct InsightAggregator {
    backend: Arc<dyn InsightBackend>,
    verification_site: String,
}

impl InsightAggregator {
    pub fn new(backend: Arc<dyn InsightBackend>, verification_site: impl Into<String>) -> Self {
        Self {
            backend,
            verification_site: verification_site.into(),
        }
    }

    /// Only missing transaction fields and an unparseable chain id are
    /// errors; every upstream failure degrades its own section.
    pub async fn run(
        &self,
        store: &dyn StateStore,
        chain_id: Option<&str>,
        tx: &TransactionEvent,
    ) -> InsightResult<InsightPanel> {
        let mut flow = Flow {
            state: FlowState::Idle,
        };

        let from = required(tx.from.as_deref(), "from").map_err(|e| flow.fail(e))?;
        let to = required(tx.to.as_deref(), "to").map_err(|e| flow.fail(e))?;
        let data = required(tx.data.as_deref(), "input").map_err(|e| flow.fail(e))?;
        let chain_id = required(chain_id, "chain_id")
            .and_then(utils::parse_chain_id)
            .map_err(|e| flow.fail(e))?;

        let claims = match self.verified_identity(store).await {
            Some(claims) => claims,
            None => {
                flow.advance(FlowState::Done);
                return Ok(self.not_human_panel());
            }
        };

        flow.advance(FlowState::Decoding);
        let backend = self.backend.as_ref();
        let outcome = match utils::parse_input_data(data) {
            Ok(input) => decode_transaction(backend, chain_id, to, &input).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            warn!("Could not decode call to {}: {}", to, e);
        }

        flow.advance(FlowState::FetchingContext);
        let (profile, approvals, explanation) = tokio::join!(
            backend.default_profile(from),
            self.approvals(chain_id, from, to, &outcome),
            async {
                match &outcome {
                    Ok(outcome) => summarize_decoded(backend, to, outcome).await,
                    Err(e) => Err(e.clone()),
                }
            },
        );

        flow.advance(FlowState::Rendering);
        let subject = claims
            .get("sub")
            .and_then(|sub| sub.as_str())
            .unwrap_or(UNDETERMINED);
        let panel = InsightPanel::new(vec![
            Section::new(IDENTITY_HEADING).text(subject),
            social_section(profile, approvals),
            explanation_section(explanation),
        ]);

        flow.advance(FlowState::Done);
        info!("Rendered insights for {} -> {} on chain {}", from, to, chain_id);
        Ok(panel)
    }

    async fn verified_identity(&self, store: &dyn StateStore) -> Option<serde_json::Value> {
        let record = match load_identity(store).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No identity token stored");
                return None;
            }
            Err(e) => {
                warn!("Identity store unreadable: {}", e);
                return None;
            }
        };

        match self.backend.verify_identity(&record.world_id).await {
            Ok(claims) => Some(claims),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// `Ok(None)` when the call has no address operator to check
    async fn approvals(
        &self,
        chain_id: u64,
        from: &str,
        to: &str,
        outcome: &InsightResult<DecodeOutcome>,
    ) -> InsightResult<Option<ApprovalReport>> {
        let call = match outcome {
            Ok(DecodeOutcome::Decoded { call, .. }) => call,
            Ok(DecodeOutcome::Unverified) => {
                return Err(InsightError::InvalidInput(format!(
                    "operator of a call to unverified {} is unknown",
                    to
                )))
            }
            Err(e) => return Err(e.clone()),
        };

        match call.leading_address() {
            Some(operator) => {
                approved_following(self.backend.as_ref(), chain_id, from, to, &operator.to_string())
                    .await
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn not_human_panel(&self) -> InsightPanel {
        InsightPanel::new(vec![Section::new(NOT_HUMAN_HEADING)
            .text("Please prove that you are a unique human.")
            .copyable(self.verification_site.as_str())])
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> InsightResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(InsightError::MissingPrecondition(field))
}

fn social_section(
    profile: InsightResult<Option<SocialProfile>>,
    approvals: InsightResult<Option<ApprovalReport>>,
) -> Section {
    let mut section = Section::new(SOCIAL_HEADING).text("LensProfile:");
    section = match profile {
        Ok(Some(profile)) => section.text(profile.handle),
        Ok(None) => section.text(NONE),
        Err(e) => {
            warn!("{}", e);
            section.text(UNDETERMINED)
        }
    };

    section = section.text("LensFollowingExecution:");
    match approvals {
        Ok(Some(report)) => {
            if report.approved.is_empty() {
                section = section.text(NONE);
            }
            for handle in report.approved {
                section = section.text(handle);
            }
            if !report.failures.is_empty() {
                section = section.text(format!(
                    "({} approval lookups failed)",
                    report.failures.len()
                ));
            }
            section
        }
        Ok(None) => section.text(NONE),
        Err(e) => {
            debug!("Approvals undetermined: {}", e);
            section.text(UNDETERMINED)
        }
    }
}

fn explanation_section(explanation: InsightResult<Explanation>) -> Section {
    let section = Section::new(EXPLANATION_HEADING);
    match explanation {
        Ok(explanation) => section.text(explanation.text()),
        Err(InsightError::UnsupportedChain(chain_id)) => {
            section.text(format!("Chain id {} is not supported.", chain_id))
        }
        Err(e) => {
            warn!("{}", e);
            section.text(UNDETERMINED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::UNVERIFIED_WARNING;
    use crate::store::{save_identity, IdentityRecord, MemoryStore};
    use crate::test_support::{
        panel_text, set_approval_for_all_input, FakeBackend, CONTRACT, HUMAN_SUB, OPERATOR,
        VALID_TOKEN, WALLET,
    };
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    const SITE: &str = "https://verify.example.org/";

    fn transaction() -> TransactionEvent {
        TransactionEvent {
            from: Some(WALLET.to_string()),
            to: Some(CONTRACT.to_string()),
            data: Some(format!("0x{}", hex::encode(set_approval_for_all_input(OPERATOR, true)))),
        }
    }

    async fn verified_store() -> MemoryStore {
        let store = MemoryStore::new();
        save_identity(
            &store,
            &IdentityRecord {
                world_id: VALID_TOKEN.to_string(),
            },
        )
        .await
        .unwrap();
        store
    }

    fn aggregator(backend: Arc<FakeBackend>) -> InsightAggregator {
        InsightAggregator::new(backend, SITE)
    }

    #[tokio::test]
    async fn test_full_panel() {
        let backend = Arc::new(FakeBackend::verified());
        let store = verified_store().await;
        let panel = aggregator(backend.clone())
            .run(&store, Some("eip155:1"), &transaction())
            .await
            .unwrap();

        assert_eq!(
            panel_text(&panel, IDENTITY_HEADING),
            vec![HUMAN_SUB.to_string()]
        );
        assert_eq!(
            panel_text(&panel, SOCIAL_HEADING),
            vec![
                "LensProfile:",
                "me.lens",
                "LensFollowingExecution:",
                "alice.lens",
                "(1 approval lookups failed)"
            ]
        );
        assert_eq!(
            panel_text(&panel, EXPLANATION_HEADING),
            vec!["setApprovalForAll summary"]
        );
        assert_eq!(
            backend.operators.lock().unwrap().as_slice(),
            &[OPERATOR.to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetches_run_concurrently() {
        let backend = Arc::new(FakeBackend::verified().with_delay(Duration::from_millis(300)));
        let store = verified_store().await;

        let started = Instant::now();
        aggregator(backend)
            .run(&store, Some("1"), &transaction())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(850), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_unverified_contract_shows_warning() {
        let backend = Arc::new(FakeBackend::unverified());
        let store = verified_store().await;
        let panel = aggregator(backend.clone())
            .run(&store, Some("eip155:1"), &transaction())
            .await
            .unwrap();

        assert_eq!(
            panel_text(&panel, EXPLANATION_HEADING),
            vec![UNVERIFIED_WARNING]
        );
        assert_eq!(backend.summarize_calls.load(Ordering::SeqCst), 0);
        assert!(backend.operators.lock().unwrap().is_empty());
        assert_eq!(panel_text(&panel, SOCIAL_HEADING)[3], UNDETERMINED);
    }

    #[tokio::test]
    async fn test_missing_identity_stops_before_decoding() {
        let backend = Arc::new(FakeBackend::verified());
        let panel = aggregator(backend.clone())
            .run(&MemoryStore::new(), Some("eip155:1"), &transaction())
            .await
            .unwrap();

        assert_eq!(panel.sections.len(), 1);
        let section = panel.section(NOT_HUMAN_HEADING).unwrap();
        assert_eq!(
            section.lines.last(),
            Some(&crate::insight::panel::Line::Copyable(SITE.to_string()))
        );
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_identity_shows_verification_prompt() {
        let backend = Arc::new(FakeBackend::verified().rejecting_identity());
        let store = verified_store().await;
        let panel = aggregator(backend)
            .run(&store, Some("eip155:1"), &transaction())
            .await
            .unwrap();
        assert!(panel.section(NOT_HUMAN_HEADING).is_some());
    }

    #[tokio::test]
    async fn test_missing_preconditions_fail() {
        let backend = Arc::new(FakeBackend::verified());
        let store = verified_store().await;
        let aggregator = aggregator(backend);

        let mut tx = transaction();
        tx.to = None;
        assert_eq!(
            aggregator.run(&store, Some("eip155:1"), &tx).await,
            Err(InsightError::MissingPrecondition("to"))
        );

        let mut tx = transaction();
        tx.data = Some("  ".to_string());
        assert_eq!(
            aggregator.run(&store, Some("eip155:1"), &tx).await,
            Err(InsightError::MissingPrecondition("input"))
        );

        assert_eq!(
            aggregator.run(&store, None, &transaction()).await,
            Err(InsightError::MissingPrecondition("chain_id"))
        );
        assert!(matches!(
            aggregator.run(&store, Some("eip155:mainnet"), &transaction()).await,
            Err(InsightError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_upstream_failures_degrade_sections() {
        let backend = Arc::new(
            FakeBackend::verified()
                .with_social_down()
                .with_summarizer_down(),
        );
        let store = verified_store().await;
        let panel = aggregator(backend)
            .run(&store, Some("eip155:1"), &transaction())
            .await
            .unwrap();

        assert_eq!(
            panel_text(&panel, SOCIAL_HEADING),
            vec!["LensProfile:", UNDETERMINED, "LensFollowingExecution:", UNDETERMINED]
        );
        assert_eq!(panel_text(&panel, EXPLANATION_HEADING), vec![UNDETERMINED]);
    }

    #[tokio::test]
    async fn test_unsupported_chain_is_reported() {
        let backend = Arc::new(FakeBackend::verified());
        let store = verified_store().await;
        let panel = aggregator(backend)
            .run(&store, Some("eip155:5"), &transaction())
            .await
            .unwrap();

        assert_eq!(
            panel_text(&panel, EXPLANATION_HEADING),
            vec!["Chain id 5 is not supported."]
        );
    }

    #[tokio::test]
    async fn test_non_address_first_argument_skips_approvals() {
        let backend = Arc::new(FakeBackend::verified());
        let store = verified_store().await;
        let mut tx = transaction();
        // burn(uint256)
        tx.data = Some(format!("0x42966c68{}", "07".repeat(32)));

        let panel = aggregator(backend.clone())
            .run(&store, Some("eip155:1"), &tx)
            .await
            .unwrap();
        assert_eq!(panel_text(&panel, SOCIAL_HEADING)[3], NONE);
        assert_eq!(panel_text(&panel, EXPLANATION_HEADING), vec!["burn summary"]);
        assert!(backend.operators.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_input_degrades_sections() {
        let backend = Arc::new(FakeBackend::verified());
        let store = verified_store().await;
        let mut tx = transaction();
        tx.data = Some("0xdeadbeef".to_string());

        let panel = aggregator(backend.clone())
            .run(&store, Some("eip155:1"), &tx)
            .await
            .unwrap();
        assert_eq!(panel_text(&panel, SOCIAL_HEADING)[1], "me.lens");
        assert_eq!(panel_text(&panel, SOCIAL_HEADING)[3], UNDETERMINED);
        assert_eq!(panel_text(&panel, EXPLANATION_HEADING), vec![UNDETERMINED]);
        assert_eq!(backend.summarize_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_flow_transitions() {
        assert!(FlowState::Idle.can_transition_to(FlowState::Decoding));
        assert!(FlowState::Rendering.can_transition_to(FlowState::Done));
        assert!(!FlowState::Decoding.can_transition_to(FlowState::Failed));
        assert!(!FlowState::Done.can_transition_to(FlowState::Idle));
    }
}
